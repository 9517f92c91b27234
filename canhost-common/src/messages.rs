//! CAN identifier and frame types

/// A CAN identifier, either 11-bit standard or 29-bit extended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanId {
    /// An extended 29-bit identifier
    Extended(u32),
    /// A standard 11-bit identifier
    Std(u16),
}

impl CanId {
    /// Create a standard identifier
    pub const fn std(id: u16) -> Self {
        CanId::Std(id)
    }

    /// Create an extended identifier
    pub const fn extended(id: u32) -> Self {
        CanId::Extended(id)
    }

    /// Get the raw identifier value
    pub const fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }

    /// Return true if this is an extended identifier
    pub const fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }

    /// The identifier as the 16-bit value carried inside request payloads
    ///
    /// Extended identifiers are truncated to their low 16 bits.
    pub const fn payload_id(&self) -> u16 {
        self.raw() as u16
    }
}

impl core::fmt::Display for CanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CanId::Extended(id) => write!(f, "0x{:08X}", id),
            CanId::Std(id) => write!(f, "0x{:03X}", id),
        }
    }
}

/// Maximum number of data bytes in a classic CAN frame
pub const MAX_DATA_LEN: usize = 8;

/// A single CAN frame: identifier plus up to 8 data bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanMessage {
    id: CanId,
    /// Number of valid data bytes
    pub dlc: u8,
    data: [u8; MAX_DATA_LEN],
    rtr: bool,
}

impl Default for CanMessage {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl CanMessage {
    /// A zero length data frame with ID 0
    pub const EMPTY: Self = Self {
        id: CanId::Std(0),
        dlc: 0,
        data: [0; MAX_DATA_LEN],
        rtr: false,
    };

    /// Create a data frame
    ///
    /// Data beyond 8 bytes is ignored.
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let dlc = data.len().min(MAX_DATA_LEN);
        let mut buf = [0; MAX_DATA_LEN];
        buf[..dlc].copy_from_slice(&data[..dlc]);
        Self {
            id,
            dlc: dlc as u8,
            data: buf,
            rtr: false,
        }
    }

    /// Create a remote transmission request frame
    pub fn new_rtr(id: CanId) -> Self {
        Self {
            id,
            rtr: true,
            ..Default::default()
        }
    }

    /// The frame identifier
    pub fn id(&self) -> CanId {
        self.id
    }

    /// The valid data bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }

    /// The data bytes padded with zeros to a full 8 byte payload
    pub fn padded_data(&self) -> [u8; MAX_DATA_LEN] {
        // Bytes beyond dlc are always zero, see `new`
        self.data
    }

    /// Return true if this is a remote frame
    pub fn is_rtr(&self) -> bool {
        self.rtr
    }
}
