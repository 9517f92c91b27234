//! Traits implemented by the platform for the session core
//!
//! The session never touches hardware directly. The application provides implementations of
//! these traits for its CAN controller, non-volatile storage, delay source and serial console.

use embedded_io::{ErrorType, Read, ReadReady, Write};
use snafu::Snafu;

use crate::{config::LayoutError, messages::CanMessage};

/// Transmit side of a CAN controller
///
/// The controller is expected to have a set of numbered message objects ("slots"), one of which is
/// reserved for transmission.
pub trait CanTransmitter {
    /// Load `msg` into the transmit slot and request transmission
    fn transmit(&mut self, slot: u8, msg: &CanMessage);

    /// Return true while a transmission request is still pending
    fn tx_pending(&mut self) -> bool;
}

/// The cause of a CAN controller interrupt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptCause {
    /// No interrupt is pending
    None,
    /// A controller status change, e.g. bus-off or error counter update
    Status,
    /// A message object requires service
    MessageObject(u8),
}

/// Receive side of a CAN controller, used from interrupt context
pub trait CanReceiveController {
    /// Read and acknowledge the current interrupt cause
    fn interrupt_cause(&mut self) -> InterruptCause;

    /// Return true if `slot` holds a frame which has not been read
    fn new_data(&mut self, slot: u8) -> bool;

    /// Read the frame held in `slot`, clearing its new data flag
    fn fetch(&mut self, slot: u8) -> Option<CanMessage>;
}

/// A blocking delay source
pub trait Delay {
    /// Block for at least `us` microseconds
    fn delay_us(&mut self, us: u32);

    /// Block for at least `ms` milliseconds
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }
}

/// Error returned by [`SampleStorage`] implementations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// The address is outside of the storage device
    #[snafu(display("Address 0x{addr:x} is out of range"))]
    OutOfRange {
        /// The offending address
        addr: u32,
    },
    /// The address is not aligned as required by the operation
    #[snafu(display("Address 0x{addr:x} is not aligned"))]
    Unaligned {
        /// The offending address
        addr: u32,
    },
    /// The device reported a failure while erasing or programming
    #[snafu(display("Storage device failure at 0x{addr:x}"))]
    Device {
        /// The address of the failed operation
        addr: u32,
    },
    /// The storage layout cannot be used
    #[snafu(display("Invalid storage layout: {source}"))]
    Layout {
        /// The layout problem
        source: LayoutError,
    },
}

/// Non-volatile sample storage
///
/// Addresses are absolute device addresses. Programming only clears bits, so a block must be
/// erased before it is written.
pub trait SampleStorage {
    /// Erase the erase block starting at `addr`
    fn erase(&mut self, addr: u32) -> Result<(), StorageError>;

    /// Program `data` starting at `addr`. `addr` and `data.len()` are multiples of 4.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageError>;

    /// Read the 32-bit word stored at `addr`
    fn read_word(&self, addr: u32) -> Result<u32, StorageError>;
}

/// Error returned by [`Console`] implementations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum ConsoleError {
    /// The underlying serial port failed
    #[snafu(display("Serial port error: {kind:?}"))]
    Io {
        /// The error kind reported by the port
        kind: embedded_io::ErrorKind,
    },
    /// A line did not fit in the provided buffer
    LineTooLong,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConsoleError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConsoleError::Io { .. } => defmt::write!(f, "Io"),
            ConsoleError::LineTooLong => defmt::write!(f, "LineTooLong"),
        }
    }
}

/// A line-oriented operator console
pub trait Console {
    /// Return true if input is waiting to be read
    fn has_input(&mut self) -> bool;

    /// Block until a full line has been received, storing it in `buf` without the terminator
    ///
    /// Returns the number of bytes stored.
    fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, ConsoleError>;

    /// Write a string to the console
    fn write_str(&mut self, s: &str) -> Result<(), ConsoleError>;
}

/// A [`Console`] on top of an `embedded-io` serial port
///
/// Received characters are echoed back as they are read. A line ends at the first carriage
/// return or line feed.
#[derive(Debug)]
pub struct EchoConsole<T> {
    port: T,
}

impl<T> EchoConsole<T> {
    /// Wrap a serial port
    pub fn new(port: T) -> Self {
        Self { port }
    }

    /// Get the wrapped port back
    pub fn into_inner(self) -> T {
        self.port
    }
}

fn io_error<E: embedded_io::Error>(e: E) -> ConsoleError {
    ConsoleError::Io { kind: e.kind() }
}

impl<T> EchoConsole<T>
where
    T: ErrorType + Read + Write,
{
    fn read_byte(&mut self) -> Result<u8, ConsoleError> {
        let mut byte = [0u8; 1];
        loop {
            if self.port.read(&mut byte).map_err(io_error)? == 1 {
                return Ok(byte[0]);
            }
        }
    }
}

impl<T> Console for EchoConsole<T>
where
    T: ErrorType + Read + ReadReady + Write,
{
    fn has_input(&mut self) -> bool {
        self.port.read_ready().unwrap_or(false)
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, ConsoleError> {
        let mut pos = 0;
        let mut overflow = false;
        loop {
            let c = self.read_byte()?;
            self.port.write_all(&[c]).map_err(io_error)?;
            if c == b'\r' || c == b'\n' {
                break;
            }
            if pos < buf.len() {
                buf[pos] = c;
                pos += 1;
            } else {
                overflow = true;
            }
        }
        if overflow {
            LineTooLongSnafu.fail()
        } else {
            Ok(pos)
        }
    }

    fn write_str(&mut self, s: &str) -> Result<(), ConsoleError> {
        self.port.write_all(s.as_bytes()).map_err(io_error)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A serial port fed from a fixed input, recording everything written
    struct LoopPort {
        input: &'static [u8],
        pos: usize,
        output: Vec<u8>,
    }

    impl ErrorType for LoopPort {
        type Error = core::convert::Infallible;
    }

    impl Read for LoopPort {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let n = buf.len().min(self.input.len() - self.pos);
            buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl ReadReady for LoopPort {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            Ok(self.pos < self.input.len())
        }
    }

    impl Write for LoopPort {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_echo_console_reads_lines() {
        let port = LoopPort {
            input: b"6\r0x20000\n",
            pos: 0,
            output: Vec::new(),
        };
        let mut console = EchoConsole::new(port);
        let mut buf = [0u8; 16];

        assert!(console.has_input());
        let n = console.read_line(&mut buf).unwrap();
        assert_eq!(b"6", &buf[..n]);
        let n = console.read_line(&mut buf).unwrap();
        assert_eq!(b"0x20000", &buf[..n]);
        assert!(!console.has_input());

        console.write_str(">").unwrap();
        // Input is echoed, including terminators
        assert_eq!(b"6\r0x20000\n>", console.into_inner().output.as_slice());
    }

    #[test]
    fn test_echo_console_line_too_long() {
        let port = LoopPort {
            input: b"123456789\r1\r",
            pos: 0,
            output: Vec::new(),
        };
        let mut console = EchoConsole::new(port);
        let mut buf = [0u8; 4];
        assert_eq!(Err(ConsoleError::LineTooLong), console.read_line(&mut buf));
        // The rest of the long line was consumed, the next line reads normally
        assert_eq!(Ok(1), console.read_line(&mut buf));
    }
}
