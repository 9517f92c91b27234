//! Single slot receive mailbox shared between the interrupt handler and the session loop
use core::cell::RefCell;

use critical_section::Mutex;
use canhost_common::{bits::BitField, messages::CanMessage};

/// Bit positions in the mailbox flag byte
pub mod flags {
    /// Set when an unread frame is in the mailbox
    pub const NEW: u32 = 1;
    /// Set when a frame arrived while the previous one was still unread
    pub const OVERRUN: u32 = 2;
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    flags: u8,
    msg: CanMessage,
}

/// A single frame buffer with a NEW and a sticky OVERRUN flag
///
/// The mailbox holds at most one unread frame. A frame stored while NEW is still set replaces the
/// unread one and sets OVERRUN; the replaced frame is lost. All flag updates happen inside a
/// critical section, so a writer in interrupt context never races the reader's clear.
#[derive(Debug)]
pub struct Mailbox {
    slot: Mutex<RefCell<Slot>>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    /// Create an empty mailbox
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(Slot {
                flags: 0,
                msg: CanMessage::EMPTY,
            })),
        }
    }

    /// Store a received frame
    ///
    /// Returns true if an unread frame was overwritten.
    pub fn store(&self, msg: CanMessage) -> bool {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);
            let overrun = slot.flags.bit(flags::NEW);
            if overrun {
                slot.flags = slot.flags.set_bit(flags::OVERRUN);
            }
            slot.msg = msg;
            slot.flags = slot.flags.set_bit(flags::NEW);
            overrun
        })
    }

    /// Copy out the unread frame, if there is one, and clear NEW
    ///
    /// OVERRUN is left untouched.
    pub fn take(&self) -> Option<CanMessage> {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);
            if slot.flags.bit(flags::NEW) {
                slot.flags = slot.flags.clear_bit(flags::NEW);
                Some(slot.msg)
            } else {
                None
            }
        })
    }

    /// Clear the OVERRUN flag, returning whether it was set
    pub fn take_overrun(&self) -> bool {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);
            let overrun = slot.flags.bit(flags::OVERRUN);
            slot.flags = slot.flags.clear_bit(flags::OVERRUN);
            overrun
        })
    }

    /// Read the raw flag byte
    pub fn flags(&self) -> u8 {
        critical_section::with(|cs| self.slot.borrow_ref(cs).flags)
    }

    /// Return true if an unread frame is present
    pub fn has_new(&self) -> bool {
        self.flags().bit(flags::NEW)
    }

    /// Return true if the OVERRUN flag is set
    pub fn overrun(&self) -> bool {
        self.flags().bit(flags::OVERRUN)
    }

    /// Read the last accepted frame without changing any flags
    pub fn peek(&self) -> CanMessage {
        critical_section::with(|cs| self.slot.borrow_ref(cs).msg)
    }
}
