use std::sync::Arc;
use std::time::Duration;

use crate::{
    messages::{CanId, CanMessage},
    traits::{CanReceiveController, CanTransmitter, InterruptCause},
};
use defmt_or_log::warn;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Frame, ShouldRetry, Socket};

fn socketcan_id_to_canhost_id(id: socketcan::CanId) -> CanId {
    match id {
        socketcan::CanId::Standard(id) => CanId::std(id.as_raw()),
        socketcan::CanId::Extended(id) => CanId::extended(id.as_raw()),
    }
}

fn canhost_id_to_socketcan_id(id: CanId) -> Option<socketcan::CanId> {
    match id {
        CanId::Extended(id) => socketcan::ExtendedId::new(id).map(Into::into),
        CanId::Std(id) => socketcan::StandardId::new(id).map(Into::into),
    }
}

fn socketcan_frame_to_canhost_message(frame: CanFrame) -> Option<CanMessage> {
    let id = socketcan_id_to_canhost_id(frame.can_id());

    match frame {
        CanFrame::Data(frame) => Some(CanMessage::new(id, frame.data())),
        CanFrame::Remote(_) => Some(CanMessage::new_rtr(id)),
        CanFrame::Error(_) => None,
    }
}

fn canhost_message_to_socket_frame(msg: &CanMessage) -> Option<CanFrame> {
    let id = canhost_id_to_socketcan_id(msg.id())?;

    if msg.is_rtr() {
        CanFrame::new_remote(id, 0)
    } else {
        CanFrame::new(id, msg.data())
    }
}

/// Transmit half of a socketcan device
///
/// A frame which the kernel queue does not accept is held as pending, and retried each time [`CanTransmitter::tx_pending`] is called.
#[derive(Debug)]
pub struct SocketCanTransmitter {
    socket: Arc<CanSocket>,
    pending: Option<CanFrame>,
}

impl SocketCanTransmitter {
    fn try_send(&mut self) {
        if let Some(frame) = self.pending.as_ref() {
            match self.socket.write_frame(frame) {
                Ok(()) => self.pending = None,
                Err(e) if e.should_retry() => (),
                Err(e) => {
                    warn!("Dropping frame after socket write error: {:?}", e);
                    self.pending = None;
                }
            }
        }
    }
}

impl CanTransmitter for SocketCanTransmitter {
    fn transmit(&mut self, _slot: u8, msg: &CanMessage) {
        match canhost_message_to_socket_frame(msg) {
            Some(frame) => {
                self.pending = Some(frame);
                self.try_send();
            }
            None => warn!("Cannot convert message with ID {:?} to a socketcan frame", msg.id()),
        }
    }

    fn tx_pending(&mut self) -> bool {
        self.try_send();
        self.pending.is_some()
    }
}

/// Receive half of a socketcan device
///
/// The socket has no message objects, so all received frames are reported on the configured
/// receive slot. [`CanReceiveController::interrupt_cause`] blocks for up to the poll timeout
/// waiting for a frame, which makes a thread calling it in a loop behave like an interrupt
/// handler.
#[derive(Debug)]
pub struct SocketCanReceiver {
    socket: Arc<CanSocket>,
    rx_slot: u8,
    buffered: Option<CanMessage>,
}

impl CanReceiveController for SocketCanReceiver {
    fn interrupt_cause(&mut self) -> InterruptCause {
        if self.buffered.is_some() {
            return InterruptCause::MessageObject(self.rx_slot);
        }
        match self.socket.read_frame() {
            Ok(frame) => match socketcan_frame_to_canhost_message(frame) {
                Some(msg) => {
                    self.buffered = Some(msg);
                    InterruptCause::MessageObject(self.rx_slot)
                }
                None => InterruptCause::Status,
            },
            Err(e) if e.should_retry() => InterruptCause::None,
            Err(e) => {
                warn!("Socket read error: {:?}", e);
                InterruptCause::Status
            }
        }
    }

    fn new_data(&mut self, slot: u8) -> bool {
        slot == self.rx_slot && self.buffered.is_some()
    }

    fn fetch(&mut self, slot: u8) -> Option<CanMessage> {
        if slot == self.rx_slot {
            self.buffered.take()
        } else {
            None
        }
    }
}

/// Open a socketcan device and split it into a transmitter and receiver for use with canhost
///
/// # Arguments
/// * `device` - The name of the socketcan device to open, e.g. "vcan0", or "can0"
/// * `rx_slot` - The message object number received frames are reported on
/// * `poll_timeout` - How long the receiver blocks waiting for a frame
///
/// By creating both objects from a shared socket, the receiver will not receive frames sent by
/// the transmitter.
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub fn open_socketcan<S: AsRef<str>>(
    device: S,
    rx_slot: u8,
    poll_timeout: Duration,
) -> Result<(SocketCanTransmitter, SocketCanReceiver), socketcan::IoError> {
    let device: &str = device.as_ref();
    let socket = CanSocket::open(device)?;
    socket.set_read_timeout(poll_timeout)?;
    let socket = Arc::new(socket);
    let receiver = SocketCanReceiver {
        socket: socket.clone(),
        rx_slot,
        buffered: None,
    };
    let transmitter = SocketCanTransmitter {
        socket,
        pending: None,
    };
    Ok((transmitter, receiver))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_frame_conversion() {
        let msg = CanMessage::new(CanId::std(0x107), &[1, 2, 3, 4, 5, 6, 7, 8]);
        let frame = canhost_message_to_socket_frame(&msg).unwrap();
        assert_eq!(Some(msg), socketcan_frame_to_canhost_message(frame));

        let msg = CanMessage::new(CanId::extended(0x1234567), &[9, 9]);
        let frame = canhost_message_to_socket_frame(&msg).unwrap();
        assert_eq!(Some(msg), socketcan_frame_to_canhost_message(frame));
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let msg = CanMessage::new(CanId::std(0x800), &[0]);
        assert!(canhost_message_to_socket_frame(&msg).is_none());
    }
}
