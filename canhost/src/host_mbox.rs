//! Receive context shared between the CAN interrupt and the session loop
use core::cell::RefCell;

use canhost_common::{
    config::{CanIds, SessionConfig},
    constants::MAX_MODULES,
    messages::CanMessage,
    protocol::Broadcast,
    traits::{CanReceiveController, InterruptCause},
    AtomicCell,
};
use critical_section::Mutex;
use defmt_or_log::{debug, info, warn};

use crate::{
    mailbox::Mailbox,
    registry::{ModuleEntry, ModuleRegistry},
};

/// A data structure to be shared between a receiving context (e.g. a CAN controller IRQ) and the
/// [`Session`](crate::Session) object.
///
/// It holds the single slot response [`Mailbox`] and the registry of modules discovered from
/// broadcasts. The interrupt side writes both, through [`HostMbox::handle_interrupt`] or
/// [`HostMbox::store_message`]; the session reads and clears them.
#[allow(missing_debug_implementations)]
pub struct HostMbox {
    ids: CanIds,
    mailbox: Mailbox,
    registry: Mutex<RefCell<ModuleRegistry<MAX_MODULES>>>,
    process_notify_cb: AtomicCell<Option<&'static (dyn Fn() + Sync)>>,
}

impl HostMbox {
    /// Create a new HostMbox
    ///
    /// Only the CAN identifiers and the registry policy are used from `config`.
    pub const fn new(config: SessionConfig) -> Self {
        Self {
            ids: config.can,
            mailbox: Mailbox::new(),
            registry: Mutex::new(RefCell::new(ModuleRegistry::new(
                config.options.registry_policy,
            ))),
            process_notify_cb: AtomicCell::new(None),
        }
    }

    /// Set a callback for notification when a frame is received and requires processing.
    ///
    /// It must be static. Usually this will be a static fn, but in some circumstances, it may be
    /// desirable to use Box::leak to pass a heap allocated closure instead.
    pub fn set_process_notify_callback(&self, callback: &'static (dyn Fn() + Sync)) {
        self.process_notify_cb.store(Some(callback));
    }

    fn process_notify(&self) {
        if let Some(notify_cb) = self.process_notify_cb.load() {
            notify_cb();
        }
    }

    /// The identifiers this mailbox filters on
    pub fn ids(&self) -> &CanIds {
        &self.ids
    }

    /// The response mailbox
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Store a received CAN message
    ///
    /// Responses on the session ID go to the mailbox, broadcasts update the module registry. Any
    /// other message is returned as an Err.
    pub fn store_message(&self, msg: CanMessage) -> Result<(), CanMessage> {
        let id = msg.id();
        if id == self.ids.session() {
            if self.mailbox.store(msg) {
                debug!("Response mailbox overrun");
            }
            self.process_notify();
            return Ok(());
        }

        if id == self.ids.broadcast() {
            let broadcast = Broadcast::from(&msg);
            let discovered = critical_section::with(|cs| {
                let mut registry = self.registry.borrow_ref_mut(cs);
                let known = registry.find(broadcast.module_id).is_some();
                registry.update(broadcast).is_some() && !known
            });
            if discovered {
                info!(
                    "Discovered module {:04X}, value {}",
                    broadcast.module_id, broadcast.value
                );
            }
            return Ok(());
        }

        Err(msg)
    }

    /// Service a CAN controller interrupt
    ///
    /// Reads and acknowledges the interrupt cause. Unless it is a pure status event, a frame
    /// waiting in the receive slot is fetched and passed to [`HostMbox::store_message`].
    ///
    /// This can be called from the interrupt handler itself, or polled from a timer tick, a
    /// thread, or the main loop.
    ///
    /// Returns true if a frame was accepted.
    pub fn handle_interrupt<C: CanReceiveController + ?Sized>(&self, controller: &mut C) -> bool {
        let cause = controller.interrupt_cause();
        if cause == InterruptCause::Status {
            return false;
        }
        let rx_slot = self.ids.rx_slot;
        if !controller.new_data(rx_slot) {
            return false;
        }
        match controller.fetch(rx_slot) {
            Some(msg) => match self.store_message(msg) {
                Ok(()) => true,
                Err(msg) => {
                    debug!("Ignoring frame with ID {}", msg.id().raw());
                    false
                }
            },
            None => {
                warn!("Receive slot {} reported new data but fetch failed", rx_slot);
                false
            }
        }
    }

    /// The module in registry entry 0, if any
    pub fn primary_module(&self) -> Option<ModuleEntry> {
        critical_section::with(|cs| self.registry.borrow_ref(cs).primary())
    }

    /// Look up a discovered module by ID
    pub fn find_module(&self, id: u16) -> Option<ModuleEntry> {
        critical_section::with(|cs| self.registry.borrow_ref(cs).find(id))
    }

    /// Get a copy of the module registry
    pub fn registry(&self) -> ModuleRegistry<MAX_MODULES> {
        critical_section::with(|cs| *self.registry.borrow_ref(cs))
    }

    /// Drop any unread response, clear the mailbox flags and forget all discovered modules
    pub fn reset(&self) {
        self.mailbox.take();
        self.mailbox.take_overrun();
        critical_section::with(|cs| self.registry.borrow_ref_mut(cs).clear());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use canhost_common::{config::RegistryPolicy, messages::CanId};

    struct OneShot {
        cause: InterruptCause,
        pending: Option<CanMessage>,
    }

    impl CanReceiveController for OneShot {
        fn interrupt_cause(&mut self) -> InterruptCause {
            self.cause
        }

        fn new_data(&mut self, slot: u8) -> bool {
            slot == 1 && self.pending.is_some()
        }

        fn fetch(&mut self, _slot: u8) -> Option<CanMessage> {
            self.pending.take()
        }
    }

    #[test]
    fn test_routes_by_id() {
        let mbox = HostMbox::new(SessionConfig::DEFAULT);

        let resp = CanMessage::new(CanId::std(0x101), &[0, 0, 0, 1, 0, 0, 3, 0xE8]);
        assert_eq!(Ok(()), mbox.store_message(resp));
        assert!(mbox.mailbox().has_new());

        let bcast = CanMessage::new(CanId::std(0x7DF), &[0, 0x12, 0x34, 0, 0, 0, 0, 1]);
        assert_eq!(Ok(()), mbox.store_message(bcast));
        assert_eq!(
            Some(ModuleEntry {
                id: 0x1234,
                value: 1
            }),
            mbox.primary_module()
        );

        let other = CanMessage::new(CanId::std(0x200), &[0; 8]);
        assert_eq!(Err(other), mbox.store_message(other));
    }

    #[test]
    fn test_status_interrupt_skips_receive() {
        let mbox = HostMbox::new(SessionConfig::DEFAULT);
        let mut ctrl = OneShot {
            cause: InterruptCause::Status,
            pending: Some(CanMessage::new(CanId::std(0x101), &[0; 8])),
        };
        assert!(!mbox.handle_interrupt(&mut ctrl));
        assert!(!mbox.mailbox().has_new());

        ctrl.cause = InterruptCause::MessageObject(1);
        assert!(mbox.handle_interrupt(&mut ctrl));
        assert!(mbox.mailbox().has_new());
        assert!(ctrl.pending.is_none());
    }

    #[test]
    fn test_keyed_policy() {
        let config = SessionConfig {
            options: canhost_common::config::SessionOptions {
                registry_policy: RegistryPolicy::Keyed,
                ..Default::default()
            },
            ..SessionConfig::DEFAULT
        };
        let mbox = HostMbox::new(config);
        for (id, value) in [(0x10, 1), (0x20, 2), (0x10, 3)] {
            let b = Broadcast {
                module_id: id,
                value,
            };
            mbox.store_message(CanMessage::new(CanId::std(0x7DF), &b.to_bytes()))
                .unwrap();
        }
        assert_eq!(2, mbox.registry().entries().count());
        assert_eq!(Some(ModuleEntry { id: 0x10, value: 3 }), mbox.find_module(0x10));
    }
}
