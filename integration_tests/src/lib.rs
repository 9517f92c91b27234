use canhost::{common::SessionConfig, HostMbox, Session};

pub mod sim_bus;
pub mod sim_sensor;
pub mod utils;

/// Mailbox shared with background receive tasks, which need a 'static reference
///
/// Tests using it must be `#[serial]`, and should call `HOST_MBOX.reset()` first.
pub static HOST_MBOX: HostMbox = HostMbox::new(SessionConfig::DEFAULT);

pub type SimSession<'a> =
    Session<'a, sim_bus::SimTransmitter, utils::NoDelay, utils::MemoryFlash, utils::ScriptedConsole>;

/// Create a session on `bus` using `mbox`, with an empty console and erased flash
pub fn new_session<'a>(
    config: SessionConfig,
    mbox: &'a HostMbox,
    bus: &sim_bus::SimBus,
) -> SimSession<'a> {
    Session::new(
        config,
        mbox,
        bus.new_transmitter(),
        utils::NoDelay::default(),
        utils::MemoryFlash::new(config.storage),
        utils::ScriptedConsole::new(),
        120_000_000,
    )
}

pub mod prelude {
    pub use super::sim_bus::{SimBus, SimController, SimTransmitter, StatusOnlyController};
    pub use super::sim_sensor::SimSensor;
    pub use super::utils::{
        broadcast_frame, response_frame, BusLogger, MemoryFlash, NoDelay, ScriptedConsole,
    };
    pub use super::{new_session, SimSession, HOST_MBOX};
    pub use canhost::common::{CommandCode, SessionConfig};
    pub use canhost::{HostMbox, Session, UserMessage};
}
