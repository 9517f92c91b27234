//! Sensor module command codes

use int_enum::IntEnum;

/// Commands understood by the sensor module
///
/// The code is sent in byte 0 of a request frame, and the module echoes it back in byte 3 of its
/// response so that the reply can be matched to the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandCode {
    /// Read the module firmware version
    ReadVersion = 1,
    /// Read the current raw sensor value
    ReadData = 2,
    /// Start recording samples into the module's flash
    FlashStart = 3,
    /// Read the module's current flash recording position
    FlashReadPos = 4,
    /// Erase the module's sample flash
    FlashEraseFull = 5,
    /// Set the number of sample bytes the module records
    FlashSetSampleSize = 6,
    /// Read the module's flash recording status
    FlashStatus = 7,
    /// Stream the module's recorded samples to the host, one word per response
    FlashGetData = 8,
    /// Export the locally stored samples as CSV
    ///
    /// This is handled locally by the host; a response echoing this code is treated as raw data.
    FlashGenCsv = 9,
}

impl CommandCode {
    /// All command codes, in menu order
    pub const ALL: [CommandCode; 9] = [
        CommandCode::ReadVersion,
        CommandCode::ReadData,
        CommandCode::FlashStart,
        CommandCode::FlashReadPos,
        CommandCode::FlashEraseFull,
        CommandCode::FlashSetSampleSize,
        CommandCode::FlashStatus,
        CommandCode::FlashGetData,
        CommandCode::FlashGenCsv,
    ];

    /// Get the raw wire value
    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Look up a command from an operator entered number
    ///
    /// Returns None for anything outside of 1..=9
    pub fn from_operator(value: u32) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .and_then(|v| CommandCode::try_from(v).ok())
    }

    /// Text describing the command in the operator menu
    pub fn menu_label(self) -> &'static str {
        match self {
            CommandCode::ReadVersion => "Read Version",
            CommandCode::ReadData => "Sensor Read Data",
            CommandCode::FlashStart => "Start recording sensor data to flash memory",
            CommandCode::FlashReadPos => "Read Flash at position",
            CommandCode::FlashEraseFull => "Erase Flash",
            CommandCode::FlashSetSampleSize => "Set flash memory sample size",
            CommandCode::FlashStatus => "Get flash memory status",
            CommandCode::FlashGetData => "Get flash memory sample.",
            CommandCode::FlashGenCsv => "Generate a CSV file from flash memory sample.",
        }
    }
}

impl core::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command_codes_are_sequential() {
        for (i, cmd) in CommandCode::ALL.iter().enumerate() {
            assert_eq!(i as u8 + 1, cmd.raw());
            assert_eq!(Some(*cmd), CommandCode::from_operator(i as u32 + 1));
        }
    }

    #[test]
    fn test_from_operator_rejects_out_of_range() {
        assert_eq!(None, CommandCode::from_operator(0));
        assert_eq!(None, CommandCode::from_operator(10));
        assert_eq!(None, CommandCode::from_operator(0x101));
    }
}
