//! A library implementing the host side of a CAN sensor module session
//!
//! Canhost runs on a microcontroller (or a Linux machine with socketcan) acting as the host for a
//! remote sensor module. An operator selects commands on a serial console; the host sends them to
//! the module as request frames, and decodes the module's responses back into text. It is no_std
//! compatible and performs no heap allocation. It provides the following features:
//!
//! * A single slot receive [`Mailbox`](mailbox::Mailbox) filled from the CAN interrupt, with
//!   overrun detection.
//! * A [registry](registry::ModuleRegistry) of modules discovered from broadcast frames.
//! * A blocking [`Transmitter`](transmit::Transmitter) with a bounded wait for completion.
//! * Decoding of command responses, including the multi-frame sample stream which is written to
//!   local non-volatile storage as it arrives.
//! * Export of the stored samples as CSV.
//!
//! # Getting Started
//!
//! ## Configuration
//!
//! A session is configured with a [`SessionConfig`](common::SessionConfig). The `DEFAULT` constant
//! matches the stock sensor firmware. With the `std` feature, the configuration can also be loaded
//! from a TOML file, see [`common::host_config`].
//!
//! ## Platform services
//!
//! The application implements the traits in [`common::traits`] for its hardware:
//!
//! - [`CanTransmitter`](common::traits::CanTransmitter) and
//!   [`CanReceiveController`](common::traits::CanReceiveController) for the CAN controller
//! - [`Delay`](common::traits::Delay)
//! - [`SampleStorage`](common::traits::SampleStorage) for the flash region samples are stored in
//! - [`Console`](common::traits::Console) for the operator. Any `embedded-io` serial port can be
//!   wrapped in an [`EchoConsole`](common::traits::EchoConsole).
//!
//! ## Creating the [`HostMbox`]
//!
//! The mailbox is shared between the CAN interrupt and the session loop, so it is usually a static:
//!
//! ```ignore
//! static HOST_MBOX: HostMbox = HostMbox::new(SessionConfig::DEFAULT);
//! ```
//!
//! ## Handling CAN interrupts
//!
//! The CAN interrupt passes the receive controller to the mailbox:
//!
//! ```ignore
//! #[interrupt]
//! fn CAN0() {
//!     HOST_MBOX.handle_interrupt(&mut can_rx());
//! }
//! ```
//!
//! Frames received some other way can be handed over with [`HostMbox::store_message`]. A
//! [callback](HostMbox::set_process_notify_callback) can be registered to wake the session task
//! when a response arrives.
//!
//! ## Running the session
//!
//! ```ignore
//! let mut session = Session::new(
//!     SessionConfig::DEFAULT,
//!     &HOST_MBOX,
//!     can_tx,
//!     delay,
//!     flash,
//!     EchoConsole::new(uart),
//!     clocks.sysclk().to_Hz(),
//! );
//! session.show_menu().ok();
//! loop {
//!     if let Err(e) = session.poll() {
//!         defmt::error!("Session error: {}", e);
//!     }
//! }
//! ```
//!
//! On targets without a usable CAN interrupt, [`Session::poll_with`] services the controller on
//! each iteration instead.
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod csv;
pub mod flash_transfer;
mod host_mbox;
pub mod mailbox;
pub mod menu;
pub mod registry;
mod session;
pub mod transmit;

// Re-export types used by applications
pub use canhost_common as common;
pub use critical_section;

#[cfg(feature = "socketcan")]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub use common::open_socketcan;
pub use host_mbox::HostMbox;
pub use session::{Session, SessionError, SessionStats, UserMessage};
