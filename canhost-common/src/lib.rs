//! Common functionality shared among the canhost crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `canhost`.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod atomic_cell;
pub use atomic_cell::AtomicCell;
pub mod bits;
pub mod commands;
pub mod config;
pub mod constants;
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod host_config;
pub mod messages;
pub mod protocol;
pub mod traits;

#[cfg(feature = "socketcan")]
mod socketcan;

#[cfg(feature = "socketcan")]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub use socketcan::{open_socketcan, SocketCanReceiver, SocketCanTransmitter};

pub use commands::CommandCode;
pub use config::{
    CanIds, LayoutError, RegistryPolicy, SessionConfig, SessionOptions, StorageLayout, TransmitConfig,
};
pub use messages::{CanId, CanMessage};
