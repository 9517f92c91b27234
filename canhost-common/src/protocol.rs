//! Wire format of the sensor module protocol
//!
//! All frames carry a full 8 byte payload. Multi-byte fields are big-endian.
//!
//! Request (host to module):
//!
//! | byte | content |
//! |------|---------|
//! | 0    | command code |
//! | 1-2  | requesting host identifier |
//! | 3-6  | command argument (FlashSetSampleSize only) |
//! | 7    | unused |
//!
//! Response (module to host, sent on the host identifier):
//!
//! | byte | content |
//! |------|---------|
//! | 3    | echoed command code |
//! | 4-7  | result value |
//!
//! Broadcast (module to all, sent on the broadcast identifier):
//!
//! | byte | content |
//! |------|---------|
//! | 1-2  | module identifier |
//! | 4-7  | status value |

use crate::commands::CommandCode;
use crate::messages::CanMessage;

/// A request frame payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Request {
    /// The command to execute
    pub command: CommandCode,
    /// Identifier of the requesting host, so the module knows where to reply
    pub host_id: u16,
    /// Optional 32-bit argument
    pub argument: Option<u32>,
}

impl Request {
    /// Create a request without an argument
    pub fn new(command: CommandCode, host_id: u16) -> Self {
        Self {
            command,
            host_id,
            argument: None,
        }
    }

    /// Serialize the request payload
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut payload = [0u8; 8];
        payload[0] = self.command.raw();
        payload[1..3].copy_from_slice(&self.host_id.to_be_bytes());
        if let Some(arg) = self.argument {
            payload[3..7].copy_from_slice(&arg.to_be_bytes());
        }
        payload
    }

    /// Parse a request payload
    ///
    /// Returns None if byte 0 is not a known command. A zero argument is indistinguishable from
    /// no argument and is reported as `Some(0)` only for FlashSetSampleSize.
    pub fn from_bytes(payload: &[u8; 8]) -> Option<Self> {
        let command = CommandCode::try_from(payload[0]).ok()?;
        let host_id = u16::from_be_bytes([payload[1], payload[2]]);
        let argument = if command == CommandCode::FlashSetSampleSize {
            Some(u32::from_be_bytes([
                payload[3], payload[4], payload[5], payload[6],
            ]))
        } else {
            None
        };
        Some(Self {
            command,
            host_id,
            argument,
        })
    }
}

/// A response frame payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Response {
    /// The command code echoed by the module
    ///
    /// This is kept raw, as the module may echo codes the host does not know.
    pub echo: u8,
    /// The result value
    pub value: u32,
}

impl Response {
    /// Parse a response payload
    pub fn from_bytes(payload: &[u8; 8]) -> Self {
        Self {
            echo: payload[3],
            value: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
        }
    }

    /// Serialize a response payload
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut payload = [0u8; 8];
        payload[3] = self.echo;
        payload[4..8].copy_from_slice(&self.value.to_be_bytes());
        payload
    }

    /// The echoed command, if it is a known one
    pub fn command(&self) -> Option<CommandCode> {
        CommandCode::try_from(self.echo).ok()
    }
}

/// A module presence broadcast
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Broadcast {
    /// The announcing module's identifier
    pub module_id: u16,
    /// Module status value
    pub value: u32,
}

impl Broadcast {
    /// Parse a broadcast payload
    pub fn from_bytes(payload: &[u8; 8]) -> Self {
        Self {
            module_id: u16::from_be_bytes([payload[1], payload[2]]),
            value: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
        }
    }

    /// Serialize a broadcast payload
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut payload = [0u8; 8];
        payload[1..3].copy_from_slice(&self.module_id.to_be_bytes());
        payload[4..8].copy_from_slice(&self.value.to_be_bytes());
        payload
    }
}

impl From<&CanMessage> for Response {
    fn from(msg: &CanMessage) -> Self {
        Response::from_bytes(&msg.padded_data())
    }
}

impl From<&CanMessage> for Broadcast {
    fn from(msg: &CanMessage) -> Self {
        Broadcast::from_bytes(&msg.padded_data())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_layout() {
        let req = Request::new(CommandCode::ReadVersion, 0x101);
        assert_eq!([1, 0x01, 0x01, 0, 0, 0, 0, 0], req.to_bytes());

        let req = Request {
            command: CommandCode::FlashSetSampleSize,
            host_id: 0x101,
            argument: Some(0x0002_0000),
        };
        assert_eq!([6, 0x01, 0x01, 0x00, 0x02, 0x00, 0x00, 0], req.to_bytes());
        assert_eq!(Some(req), Request::from_bytes(&req.to_bytes()));
    }

    #[test]
    fn test_request_unknown_command() {
        assert_eq!(None, Request::from_bytes(&[0, 1, 1, 0, 0, 0, 0, 0]));
        assert_eq!(None, Request::from_bytes(&[42, 1, 1, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn test_response_decode() {
        let resp = Response::from_bytes(&[0, 0, 0, 1, 0x00, 0x00, 0x03, 0xE8]);
        assert_eq!(1, resp.echo);
        assert_eq!(1000, resp.value);
        assert_eq!(Some(CommandCode::ReadVersion), resp.command());

        let resp = Response::from_bytes(&[0, 0, 0, 0x55, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(None, resp.command());
        assert_eq!(0xDEADBEEF, resp.value);
    }

    #[test]
    fn test_broadcast_decode() {
        let b = Broadcast::from_bytes(&[0xFF, 0x12, 0x34, 0xFF, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(0x1234, b.module_id);
        assert_eq!(1, b.value);
    }
}
