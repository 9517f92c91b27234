//! Table of sensor modules discovered from broadcast frames
use canhost_common::{config::RegistryPolicy, protocol::Broadcast};
use defmt_or_log::{debug, warn};

/// One discovered module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleEntry {
    /// Module identifier. Zero marks an unused entry.
    pub id: u16,
    /// The value carried by the module's most recent broadcast
    pub value: u32,
}

impl ModuleEntry {
    /// An unused entry
    pub const EMPTY: Self = Self { id: 0, value: 0 };

    /// Return true if the entry does not hold a module
    pub fn is_empty(&self) -> bool {
        self.id == 0
    }
}

/// A fixed capacity registry of modules
///
/// How broadcasts are recorded depends on the [`RegistryPolicy`]:
///
/// - `SingleSlot`: every broadcast overwrites entry 0, whatever its module ID. This is enough to
///   track a single module, and is the stock behavior.
/// - `Keyed`: a broadcast updates the entry with the same module ID, or claims the first unused
///   entry. Broadcasts are dropped when the table is full, or when they carry module ID 0.
#[derive(Clone, Copy, Debug)]
pub struct ModuleRegistry<const N: usize> {
    entries: [ModuleEntry; N],
    policy: RegistryPolicy,
}

impl<const N: usize> ModuleRegistry<N> {
    /// Create an empty registry
    pub const fn new(policy: RegistryPolicy) -> Self {
        Self {
            entries: [ModuleEntry::EMPTY; N],
            policy,
        }
    }

    /// The update policy
    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    /// Record a broadcast
    ///
    /// Returns the index of the entry which was written, or None if the broadcast was dropped.
    pub fn update(&mut self, broadcast: Broadcast) -> Option<usize> {
        let entry = ModuleEntry {
            id: broadcast.module_id,
            value: broadcast.value,
        };
        let index = match self.policy {
            RegistryPolicy::SingleSlot => {
                if N == 0 {
                    return None;
                }
                0
            }
            RegistryPolicy::Keyed => {
                if entry.is_empty() {
                    debug!("Ignoring broadcast with module ID 0");
                    return None;
                }
                let existing = self.entries.iter().position(|e| e.id == entry.id);
                match existing.or_else(|| self.entries.iter().position(|e| e.is_empty())) {
                    Some(i) => i,
                    None => {
                        warn!("Module registry full, dropping module {:04X}", entry.id);
                        return None;
                    }
                }
            }
        };
        self.entries[index] = entry;
        Some(index)
    }

    /// The module in entry 0, if there is one
    pub fn primary(&self) -> Option<ModuleEntry> {
        self.entries.first().copied().filter(|e| !e.is_empty())
    }

    /// Find a module by ID
    pub fn find(&self, id: u16) -> Option<ModuleEntry> {
        if id == 0 {
            return None;
        }
        self.entries.iter().copied().find(|e| e.id == id)
    }

    /// Iterate over the occupied entries
    pub fn entries(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.entries.iter().filter(|e| !e.is_empty())
    }

    /// Remove all modules
    pub fn clear(&mut self) {
        self.entries = [ModuleEntry::EMPTY; N];
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn broadcast(module_id: u16, value: u32) -> Broadcast {
        Broadcast { module_id, value }
    }

    #[test]
    fn test_single_slot_overwrites() {
        let mut reg = ModuleRegistry::<4>::new(RegistryPolicy::SingleSlot);
        assert_eq!(None, reg.primary());

        assert_eq!(Some(0), reg.update(broadcast(0x1234, 1)));
        assert_eq!(Some(ModuleEntry { id: 0x1234, value: 1 }), reg.primary());

        assert_eq!(Some(0), reg.update(broadcast(0x5678, 2)));
        assert_eq!(Some(ModuleEntry { id: 0x5678, value: 2 }), reg.primary());
        assert_eq!(None, reg.find(0x1234));
        assert_eq!(1, reg.entries().count());
    }

    #[test]
    fn test_keyed_insert_or_update() {
        let mut reg = ModuleRegistry::<2>::new(RegistryPolicy::Keyed);
        assert_eq!(Some(0), reg.update(broadcast(0x1234, 1)));
        assert_eq!(Some(1), reg.update(broadcast(0x5678, 2)));
        assert_eq!(Some(0), reg.update(broadcast(0x1234, 3)));

        assert_eq!(Some(ModuleEntry { id: 0x1234, value: 3 }), reg.find(0x1234));
        assert_eq!(Some(ModuleEntry { id: 0x5678, value: 2 }), reg.find(0x5678));

        // Full
        assert_eq!(None, reg.update(broadcast(0x9ABC, 4)));
        assert_eq!(None, reg.find(0x9ABC));

        // Module ID 0 is never recorded
        assert_eq!(None, reg.update(broadcast(0, 5)));

        reg.clear();
        assert_eq!(0, reg.entries().count());
    }
}
