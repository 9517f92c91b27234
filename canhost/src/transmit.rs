//! Blocking frame transmission with a bounded wait for completion
use canhost_common::{
    config::TransmitConfig,
    messages::{CanId, CanMessage},
    traits::{CanTransmitter, Delay},
};
use defmt_or_log::warn;
use snafu::Snafu;

/// Error returned when sending a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError {
    /// The controller still reported the frame pending after the whole poll budget
    #[snafu(display("Transmit still pending after {polls} polls"))]
    Timeout {
        /// Number of times the pending flag was checked
        polls: u32,
    },
}

/// Sends frames through a single transmit slot of a CAN controller
///
/// Each send places the frame in the slot, then polls the controller's pending flag a fixed
/// number of times, with a delay between checks. There is no retry. Taking `&mut self` means only
/// one send can be in flight at a time.
#[derive(Debug)]
pub struct Transmitter<T, D> {
    can: T,
    delay: D,
    slot: u8,
    config: TransmitConfig,
}

impl<T: CanTransmitter, D: Delay> Transmitter<T, D> {
    /// Create a new transmitter using message object `slot`
    pub fn new(can: T, delay: D, slot: u8, config: TransmitConfig) -> Self {
        Self {
            can,
            delay,
            slot,
            config,
        }
    }

    /// Send an 8 byte frame
    pub fn send_frame(&mut self, id: CanId, payload: [u8; 8]) -> Result<(), TransmitError> {
        let msg = CanMessage::new(id, &payload);
        self.can.transmit(self.slot, &msg);
        self.wait_complete(self.config.frame_polls, self.config.frame_poll_interval_us)
    }

    /// Send a 32-bit value as a 4 byte frame, least significant byte first
    pub fn send_integer(&mut self, id: CanId, value: u32) -> Result<(), TransmitError> {
        let msg = CanMessage::new(id, &value.to_le_bytes());
        self.can.transmit(self.slot, &msg);
        self.wait_complete(
            self.config.integer_polls,
            self.config.integer_poll_interval_us,
        )
    }

    fn wait_complete(&mut self, polls: u32, interval_us: u32) -> Result<(), TransmitError> {
        for _ in 0..polls {
            if !self.can.tx_pending() {
                return Ok(());
            }
            self.delay.delay_us(interval_us);
        }
        warn!("CAN transmit timed out after {} polls", polls);
        TimeoutSnafu { polls }.fail()
    }

    /// Access the underlying controller
    pub fn controller(&mut self) -> &mut T {
        &mut self.can
    }

    /// Access the delay source
    pub fn delay(&mut self) -> &mut D {
        &mut self.delay
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct FakeCan {
        sent: Vec<(u8, CanMessage)>,
        /// Number of polls before pending clears; None never clears
        busy_polls: Option<u32>,
        polls: u32,
    }

    impl CanTransmitter for FakeCan {
        fn transmit(&mut self, slot: u8, msg: &CanMessage) {
            self.sent.push((slot, *msg));
        }

        fn tx_pending(&mut self) -> bool {
            self.polls += 1;
            match self.busy_polls {
                Some(n) => self.polls <= n,
                None => true,
            }
        }
    }

    #[derive(Default)]
    struct CountingDelay {
        total_us: u64,
    }

    impl Delay for CountingDelay {
        fn delay_us(&mut self, us: u32) {
            self.total_us += us as u64;
        }
    }

    #[test]
    fn test_send_frame_completes() {
        let can = FakeCan {
            busy_polls: Some(3),
            ..Default::default()
        };
        let mut tx = Transmitter::new(can, CountingDelay::default(), 32, TransmitConfig::DEFAULT);
        tx.send_frame(CanId::std(0x107), [1, 1, 1, 0, 0, 0, 0, 0])
            .unwrap();

        assert_eq!(4, tx.controller().polls);
        assert_eq!(3000, tx.delay().total_us);
        let (slot, msg) = tx.controller().sent[0];
        assert_eq!(32, slot);
        assert_eq!(CanId::std(0x107), msg.id());
        assert_eq!(8, msg.data().len());
    }

    #[test]
    fn test_send_frame_timeout() {
        let config = TransmitConfig {
            frame_polls: 10,
            ..TransmitConfig::DEFAULT
        };
        let mut tx = Transmitter::new(FakeCan::default(), CountingDelay::default(), 32, config);
        assert_eq!(
            Err(TransmitError::Timeout { polls: 10 }),
            tx.send_frame(CanId::std(0x107), [0; 8])
        );
        assert_eq!(10, tx.controller().polls);
    }

    #[test]
    fn test_send_integer_uses_own_budget() {
        let mut tx = Transmitter::new(
            FakeCan::default(),
            CountingDelay::default(),
            32,
            TransmitConfig::DEFAULT,
        );
        assert_eq!(
            Err(TransmitError::Timeout { polls: 0x1000 }),
            tx.send_integer(CanId::std(0x107), 0x12345678)
        );
        assert_eq!(0x1000, tx.controller().polls);
        assert_eq!(0x1000 * 100, tx.delay().total_us);
        let (_, msg) = tx.controller().sent[0];
        assert_eq!(&[0x78, 0x56, 0x34, 0x12], msg.data());
    }
}
