//! Configuration of a host session
//!
//! All configuration types have a `const DEFAULT` matching the stock firmware, so a session can be
//! built in a `static` without any runtime setup. With the `std` feature they can also be loaded
//! from a TOML file, see [`host_config`](crate::host_config).

use snafu::Snafu;

use crate::constants;
use crate::messages::CanId;

/// CAN identifiers and controller message objects used by the session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "std",
    derive(serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct CanIds {
    /// This host's identifier. Responses are accepted on it, and it is embedded in requests.
    pub session_id: u16,
    /// The sensor module identifier requests are sent to
    pub sensor_id: u16,
    /// Reserved identifier of module broadcast frames
    pub broadcast_id: u16,
    /// Use 29-bit identifiers instead of 11-bit identifiers
    pub extended: bool,
    /// Controller message object which receives frames
    pub rx_slot: u8,
    /// Controller message object used for transmission
    pub tx_slot: u8,
}

impl CanIds {
    /// Stock identifiers
    pub const DEFAULT: Self = Self {
        session_id: constants::ids::SESSION_ID,
        sensor_id: constants::ids::SENSOR_ID,
        broadcast_id: constants::ids::BROADCAST_ID,
        extended: false,
        rx_slot: constants::ids::RX_SLOT,
        tx_slot: constants::ids::TX_SLOT,
    };

    const fn make_id(&self, id: u16) -> CanId {
        if self.extended {
            CanId::Extended(id as u32)
        } else {
            CanId::Std(id)
        }
    }

    /// The identifier responses arrive on
    pub const fn session(&self) -> CanId {
        self.make_id(self.session_id)
    }

    /// The identifier requests are sent to
    pub const fn sensor(&self) -> CanId {
        self.make_id(self.sensor_id)
    }

    /// The broadcast identifier
    pub const fn broadcast(&self) -> CanId {
        self.make_id(self.broadcast_id)
    }
}

impl Default for CanIds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Poll budgets for the blocking transmit encoder
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "std",
    derive(serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct TransmitConfig {
    /// Checks of the pending flag after sending an 8-byte frame
    pub frame_polls: u32,
    /// Delay between checks after sending an 8-byte frame
    pub frame_poll_interval_us: u32,
    /// Checks of the pending flag after sending a 4-byte integer frame
    pub integer_polls: u32,
    /// Delay between checks after sending a 4-byte integer frame
    pub integer_poll_interval_us: u32,
}

impl TransmitConfig {
    /// Stock poll budgets
    pub const DEFAULT: Self = Self {
        frame_polls: constants::transmit::FRAME_POLLS,
        frame_poll_interval_us: constants::transmit::FRAME_POLL_INTERVAL_US,
        integer_polls: constants::transmit::INTEGER_POLLS,
        integer_poll_interval_us: constants::transmit::INTEGER_POLL_INTERVAL_US,
    };
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Error returned by [`StorageLayout::validate`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// The erase block size is zero or not a multiple of the word size
    #[snafu(display("Erase block size 0x{erase_block:x} is not a non-zero multiple of 4"))]
    BadEraseBlock {
        /// Configured erase block size
        erase_block: u32,
    },
    /// The base address does not start an erase block
    #[snafu(display("Base address 0x{base:x} is not aligned to the erase block size"))]
    UnalignedBase {
        /// Configured base address
        base: u32,
    },
    /// The region does not fit in the 32-bit address space
    #[snafu(display("Storage region at 0x{base:x} with size 0x{capacity:x} overflows"))]
    RegionOverflow {
        /// Configured base address
        base: u32,
        /// Configured capacity
        capacity: u32,
    },
}

/// Location of the local sample storage region
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "std",
    derive(serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct StorageLayout {
    /// First address of the region
    pub base: u32,
    /// Size of the region in bytes
    pub capacity: u32,
    /// Size of one erase block in bytes
    pub erase_block: u32,
}

impl StorageLayout {
    /// Stock layout
    pub const DEFAULT: Self = Self {
        base: constants::storage::BASE,
        capacity: constants::storage::CAPACITY,
        erase_block: constants::storage::ERASE_BLOCK,
    };

    /// One past the last address of the region
    pub const fn end(&self) -> u32 {
        self.base.saturating_add(self.capacity)
    }

    /// Return true if `addr` is the first address of an erase block
    ///
    /// Always false when the erase block size is zero.
    pub const fn is_block_start(&self, addr: u32) -> bool {
        match addr.wrapping_sub(self.base).checked_rem(self.erase_block) {
            Some(rem) => rem == 0,
            None => false,
        }
    }

    /// Check that the layout can be used for sample storage
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.erase_block == 0 || self.erase_block % constants::storage::WORD_SIZE != 0 {
            return BadEraseBlockSnafu {
                erase_block: self.erase_block,
            }
            .fail();
        }
        if self.base % self.erase_block != 0 {
            return UnalignedBaseSnafu { base: self.base }.fail();
        }
        if self.base.checked_add(self.capacity).is_none() {
            return RegionOverflowSnafu {
                base: self.base,
                capacity: self.capacity,
            }
            .fail();
        }
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// How broadcast frames update the module registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "std",
    derive(serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum RegistryPolicy {
    /// Every broadcast overwrites slot 0. Sufficient when a single module is on the bus.
    #[default]
    SingleSlot,
    /// Broadcasts update the entry with a matching module ID, or claim the first free slot
    Keyed,
}

/// Behavior options of the session state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "std",
    derive(serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct SessionOptions {
    /// Registry update policy
    pub registry_policy: RegistryPolicy,
    /// Refuse to send a new request while a previous one is unanswered, and flag responses which
    /// do not echo the outstanding command
    ///
    /// Requests carry no sequence number, so without this a response cannot be reliably matched
    /// to its request when the operator issues commands faster than replies arrive.
    pub track_outstanding: bool,
    /// Number of sample bytes exported as CSV until changed by the operator or a transfer
    pub default_sample_size: u32,
}

impl SessionOptions {
    /// Stock behavior
    pub const DEFAULT: Self = Self {
        registry_policy: RegistryPolicy::SingleSlot,
        track_outstanding: false,
        default_sample_size: constants::storage::DEFAULT_SAMPLE_SIZE,
    };
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Complete configuration of a host session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionConfig {
    /// CAN identifiers
    pub can: CanIds,
    /// Transmit poll budgets
    pub transmit: TransmitConfig,
    /// Sample storage layout
    pub storage: StorageLayout,
    /// Behavior options
    pub options: SessionOptions,
}

impl SessionConfig {
    /// Stock configuration
    pub const DEFAULT: Self = Self {
        can: CanIds::DEFAULT,
        transmit: TransmitConfig::DEFAULT,
        storage: StorageLayout::DEFAULT,
        options: SessionOptions::DEFAULT,
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_layout_is_valid() {
        assert_eq!(Ok(()), StorageLayout::DEFAULT.validate());
        assert_eq!(0x40000, StorageLayout::DEFAULT.end());
    }

    #[test]
    fn test_layout_validation() {
        let layout = StorageLayout {
            base: 0x30100,
            ..StorageLayout::DEFAULT
        };
        assert_eq!(
            Err(LayoutError::UnalignedBase { base: 0x30100 }),
            layout.validate()
        );

        let layout = StorageLayout {
            erase_block: 6,
            ..StorageLayout::DEFAULT
        };
        assert!(layout.validate().is_err());

        let layout = StorageLayout {
            base: 0xFFFF_FC00,
            capacity: 0x800,
            erase_block: 0x400,
        };
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::RegionOverflow { .. })
        ));
    }

    #[test]
    fn test_block_start() {
        let layout = StorageLayout::DEFAULT;
        assert!(layout.is_block_start(0x30000));
        assert!(layout.is_block_start(0x30400));
        assert!(!layout.is_block_start(0x30404));

        let layout = StorageLayout {
            erase_block: 0,
            ..StorageLayout::DEFAULT
        };
        assert!(!layout.is_block_start(0x30000));
        assert!(!layout.is_block_start(0x30004));
    }

    #[test]
    fn test_extended_ids() {
        let ids = CanIds {
            extended: true,
            ..CanIds::DEFAULT
        };
        assert_eq!(CanId::Extended(0x101), ids.session());
        assert_eq!(CanId::Std(0x107), CanIds::DEFAULT.sensor());
    }
}
