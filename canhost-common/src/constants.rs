//! Constants defining default identifiers, timing and storage layout

/// Default CAN identifiers
pub mod ids {
    /// The identifier of this host; sensor module responses are addressed to it
    pub const SESSION_ID: u16 = 0x101;
    /// The identifier of the sensor module; requests are addressed to it
    pub const SENSOR_ID: u16 = 0x107;
    /// Reserved diagnostic identifier used by modules to broadcast their presence
    pub const BROADCAST_ID: u16 = 0x7DF;
    /// Controller message object configured to receive all frames
    pub const RX_SLOT: u8 = 1;
    /// Controller message object used for transmission
    pub const TX_SLOT: u8 = 32;
}

/// Default transmit poll budgets
pub mod transmit {
    /// Number of "transmit pending" checks for an 8-byte frame before giving up
    pub const FRAME_POLLS: u32 = 5000;
    /// Delay between checks for an 8-byte frame, in microseconds
    pub const FRAME_POLL_INTERVAL_US: u32 = 1000;
    /// Number of "transmit pending" checks for a 4-byte integer frame before giving up
    pub const INTEGER_POLLS: u32 = 0x1000;
    /// Delay between checks for a 4-byte integer frame, in microseconds
    pub const INTEGER_POLL_INTERVAL_US: u32 = 100;
}

/// Default layout of the local sample storage region
pub mod storage {
    /// First address of the sample region
    pub const BASE: u32 = 0x30000;
    /// Total size of the sample region in bytes
    pub const CAPACITY: u32 = 0x10000;
    /// Size of one erase block in bytes
    pub const ERASE_BLOCK: u32 = 0x400;
    /// Default number of sample bytes
    pub const DEFAULT_SAMPLE_SIZE: u32 = 0x10000;
    /// Size of one stored sample word
    pub const WORD_SIZE: u32 = 4;
}

/// Number of entries in the module registry
pub const MAX_MODULES: usize = 10;
