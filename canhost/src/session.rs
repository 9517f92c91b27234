//! The command/response session run by the main loop
use canhost_common::{
    commands::CommandCode,
    config::SessionConfig,
    messages::CanMessage,
    protocol::{Request, Response},
    traits::{
        CanReceiveController, CanTransmitter, Console, ConsoleError, Delay, SampleStorage,
        StorageError,
    },
};
use defmt_or_log::{debug, error, info, warn};
use snafu::{ResultExt, Snafu};

use crate::{
    csv,
    flash_transfer::{FlashTransfer, TransferEvent},
    host_mbox::HostMbox,
    menu::{self, write_line, LINE_LEN},
    transmit::Transmitter,
};

/// Error returned by session operations
///
/// None of these are fatal; the main loop can report them and keep polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    /// Writing to or reading from the console failed
    #[snafu(display("Console error: {source}"))]
    Console {
        /// The underlying error
        source: ConsoleError,
    },
    /// Reading or writing sample storage failed
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// The underlying error
        source: StorageError,
    },
}

/// Result of dispatching a command, reported to the operator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UserMessage {
    /// The request frame was sent
    CommandSent,
    /// The request frame could not be sent
    NetworkFailed,
    /// A previous request is still waiting for its response, so nothing was sent
    ///
    /// Only returned when outstanding request tracking is enabled.
    RequestOutstanding(CommandCode),
}

impl UserMessage {
    /// Console text for the message
    pub fn text(&self) -> &'static str {
        match self {
            UserMessage::CommandSent => "Command Sent. \r\n",
            UserMessage::NetworkFailed => "CAN Network Failed! \r\n",
            UserMessage::RequestOutstanding(_) => "Waiting for response to previous command. \r\n",
        }
    }
}

/// Counters kept by the session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionStats {
    /// Requests sent successfully
    pub requests: u32,
    /// Sends which timed out
    pub send_failures: u32,
    /// Responses handled
    pub responses: u32,
    /// Mailbox overruns observed; each one is at least one lost response
    pub overruns: u32,
    /// Responses which did not match the outstanding request
    pub unmatched: u32,
}

/// The host session
///
/// Owns the transmit side of the CAN controller, the sample storage and the operator console, and
/// shares a [`HostMbox`] with the receive interrupt. Call [`Session::poll`] (or
/// [`Session::poll_with`]) from the main loop.
///
/// Requests carry no sequence number. A response is attributed to whatever command its echo byte
/// names, so issuing a command before the previous one is answered can make replies ambiguous.
/// With `track_outstanding` set in the [`SessionOptions`](canhost_common::SessionOptions), the
/// session refuses to send while a request is unanswered and labels unexpected responses.
#[allow(missing_debug_implementations)]
pub struct Session<'a, T, D, S, C> {
    config: SessionConfig,
    mbox: &'a HostMbox,
    tx: Transmitter<T, D>,
    storage: S,
    console: C,
    clock_hz: u32,
    transfer: FlashTransfer,
    sample_size: u32,
    last_detected: u16,
    outstanding: Option<CommandCode>,
    stats: SessionStats,
}

impl<'a, T, D, S, C> Session<'a, T, D, S, C>
where
    T: CanTransmitter,
    D: Delay,
    S: SampleStorage,
    C: Console,
{
    /// Create a new session
    ///
    /// # Arguments
    /// - `config`: Session configuration. It should be the same one `mbox` was created with.
    /// - `mbox`: The receive context shared with the CAN interrupt
    /// - `can`: The transmit side of the CAN controller
    /// - `delay`: Delay source used while waiting for transmission
    /// - `storage`: Local sample storage
    /// - `console`: Operator console
    /// - `clock_hz`: System clock frequency, shown in the menu
    pub fn new(
        config: SessionConfig,
        mbox: &'a HostMbox,
        can: T,
        delay: D,
        storage: S,
        console: C,
        clock_hz: u32,
    ) -> Self {
        if let Err(e) = config.storage.validate() {
            warn!("Sample storage layout is unusable: {}", e);
        }
        Self {
            config,
            mbox,
            tx: Transmitter::new(can, delay, config.can.tx_slot, config.transmit),
            storage,
            console,
            clock_hz,
            transfer: FlashTransfer::new(config.storage),
            sample_size: config.options.default_sample_size,
            last_detected: 0,
            outstanding: None,
            stats: SessionStats::default(),
        }
    }

    /// Send a command to the sensor module
    ///
    /// `argument` is only used by `FlashSetSampleSize`, where it also becomes the local sample
    /// size; it defaults to 0.
    pub fn dispatch(&mut self, command: CommandCode, argument: Option<u32>) -> UserMessage {
        if self.config.options.track_outstanding {
            if let Some(previous) = self.outstanding {
                warn!("Not sending {}, still waiting for {}", command, previous);
                return UserMessage::RequestOutstanding(previous);
            }
        }

        let mut request = Request::new(command, self.config.can.session_id);
        if command == CommandCode::FlashSetSampleSize {
            let size = argument.unwrap_or(0);
            request.argument = Some(size);
            self.sample_size = size;
        } else if argument.is_some() {
            debug!("Ignoring argument to {}", command);
        }

        match self.tx.send_frame(self.config.can.sensor(), request.to_bytes()) {
            Ok(()) => {
                self.stats.requests += 1;
                if self.config.options.track_outstanding {
                    self.outstanding = Some(command);
                }
                UserMessage::CommandSent
            }
            Err(e) => {
                error!("Failed to send {}: {:?}", command, e);
                self.stats.send_failures += 1;
                UserMessage::NetworkFailed
            }
        }
    }

    /// Decode one response frame and report it to the operator
    pub fn handle_response(&mut self, msg: &CanMessage) -> Result<(), SessionError> {
        let resp = Response::from(msg);
        self.stats.responses += 1;

        if self.config.options.track_outstanding {
            self.check_outstanding(&resp)?;
        }

        let value = resp.value;
        match resp.command() {
            Some(CommandCode::ReadVersion) => {
                self.print(format_args!("Module firmware: {}\r\n", value))?
            }
            Some(CommandCode::ReadData) => {
                self.print(format_args!("RAW sensor data: {}\r\n", value))?
            }
            Some(CommandCode::FlashStart) => {
                self.print(format_args!("Flash Recording Started: {:08X}\r\n", value))?
            }
            Some(CommandCode::FlashReadPos) => {
                self.print(format_args!("Flash Recording Position: {:08X}\r\n", value))?
            }
            Some(CommandCode::FlashEraseFull) => {
                self.print(format_args!("Flash Erase Done: {:08X}\r\n", value))?
            }
            Some(CommandCode::FlashSetSampleSize) => {
                self.print(format_args!("Flash Sample Size Set: {:08X}\r\n", value))?
            }
            Some(CommandCode::FlashStatus) => self.print(format_args!(
                "Flash Start Position Status: {:08X}\r\n",
                value
            ))?,
            Some(CommandCode::FlashGetData) => self.handle_sample(value)?,
            Some(CommandCode::FlashGenCsv) | None => {
                self.print(format_args!("Recv Data: {}\r\n", value))?
            }
        }
        Ok(())
    }

    fn check_outstanding(&mut self, resp: &Response) -> Result<(), SessionError> {
        match self.outstanding {
            Some(cmd) if cmd.raw() == resp.echo => {
                // A sample stream stays outstanding until its end marker
                let streaming = cmd == CommandCode::FlashGetData
                    && (!self.transfer.is_active() || resp.value != 0);
                if !streaming {
                    self.outstanding = None;
                }
                Ok(())
            }
            expected => {
                self.stats.unmatched += 1;
                warn!(
                    "Response echo {} does not match outstanding request {:?}",
                    resp.echo, expected
                );
                self.print(format_args!("Unexpected response {:02X}: ", resp.echo))
            }
        }
    }

    fn handle_sample(&mut self, value: u32) -> Result<(), SessionError> {
        match self
            .transfer
            .on_value(value, &mut self.storage)
            .context(StorageSnafu)?
        {
            TransferEvent::Started { total } => {
                self.sample_size = total;
                self.print(format_args!("Receiving Sample Data Size: {:08X}\r\n", total))
            }
            TransferEvent::Completed { words } => {
                info!("Sample transfer complete, {} words stored", words);
                self.console.write_str("Sample Received.\r\n").context(ConsoleSnafu)
            }
            TransferEvent::Stored { .. } | TransferEvent::Dropped => Ok(()),
        }
    }

    /// Handle a pending response and clear any overrun
    ///
    /// Returns true if a response was handled.
    pub fn process_responses(&mut self) -> Result<bool, SessionError> {
        let result = match self.mbox.mailbox().take() {
            Some(msg) => self.handle_response(&msg).map(|_| true),
            None => Ok(false),
        };

        if self.mbox.mailbox().take_overrun() {
            self.stats.overruns += 1;
            warn!("Response mailbox overrun, a response was lost");
        }

        if let Some(module) = self.mbox.primary_module() {
            if module.id != self.last_detected {
                info!("Detected module {:04X}", module.id);
                self.last_detected = module.id;
            }
        }

        result
    }

    /// Run one main loop iteration
    ///
    /// Handles a line of operator input if one is waiting, then any pending response. Receiving
    /// frames is left to whatever calls [`HostMbox::handle_interrupt`].
    pub fn poll(&mut self) -> Result<(), SessionError> {
        self.process_input()?;
        self.process_responses()?;
        Ok(())
    }

    /// Run one main loop iteration, servicing the receive controller in between
    ///
    /// For platforms where the CAN interrupt is not used, or as a backstop to it.
    pub fn poll_with<R>(&mut self, controller: &mut R) -> Result<(), SessionError>
    where
        R: CanReceiveController + ?Sized,
    {
        self.process_input()?;
        self.mbox.handle_interrupt(controller);
        self.process_responses()?;
        Ok(())
    }

    fn process_input(&mut self) -> Result<(), SessionError> {
        if !self.console.has_input() {
            return Ok(());
        }
        let mut buf = [0u8; LINE_LEN];
        match self.console.read_line(&mut buf) {
            Ok(n) => self.handle_line(&buf[..n]),
            Err(ConsoleError::LineTooLong) => self.redraw_menu(),
            Err(e) => Err(e).context(ConsoleSnafu),
        }
    }

    /// Act on one line of operator input
    ///
    /// Selecting `FlashSetSampleSize` reads a second line holding the size.
    pub fn handle_line(&mut self, line: &[u8]) -> Result<(), SessionError> {
        let Some(command) = CommandCode::from_operator(menu::parse_number(line)) else {
            return self.redraw_menu();
        };

        if command == CommandCode::FlashGenCsv {
            self.export_csv()?;
            return Ok(());
        }

        if let Some(text) = menu::announcement(command) {
            self.console.write_str(text).context(ConsoleSnafu)?;
        }

        let argument = if command == CommandCode::FlashSetSampleSize {
            let mut buf = [0u8; LINE_LEN];
            match self.console.read_line(&mut buf) {
                Ok(n) => Some(menu::parse_number(&buf[..n])),
                Err(ConsoleError::LineTooLong) => return self.redraw_menu(),
                Err(e) => return Err(e).context(ConsoleSnafu),
            }
        } else {
            None
        };

        let result = self.dispatch(command, argument);
        self.console.write_str(result.text()).context(ConsoleSnafu)
    }

    /// Write the operator menu
    pub fn show_menu(&mut self) -> Result<(), SessionError> {
        let module = self.mbox.primary_module();
        if let Some(module) = module {
            self.last_detected = module.id;
        }
        menu::write_menu(&mut self.console, self.clock_hz, module).context(ConsoleSnafu)
    }

    fn redraw_menu(&mut self) -> Result<(), SessionError> {
        self.console
            .write_str(menu::CLEAR_SCREEN)
            .context(ConsoleSnafu)?;
        self.show_menu()
    }

    /// Write the stored samples to the console as CSV
    ///
    /// Returns the number of samples written.
    pub fn export_csv(&mut self) -> Result<u32, SessionError> {
        csv::export(
            &self.storage,
            &mut self.console,
            &self.config.storage,
            self.sample_size,
        )
    }

    fn print(&mut self, args: core::fmt::Arguments<'_>) -> Result<(), SessionError> {
        write_line(&mut self.console, args).context(ConsoleSnafu)
    }

    /// The number of sample bytes exported by [`Session::export_csv`]
    pub fn sample_size(&self) -> u32 {
        self.sample_size
    }

    /// The state of the sample stream
    pub fn transfer(&self) -> &FlashTransfer {
        &self.transfer
    }

    /// The request waiting for a response, when tracking is enabled
    pub fn outstanding(&self) -> Option<CommandCode> {
        self.outstanding
    }

    /// Forget about the outstanding request, e.g. after the module failed to answer
    pub fn clear_outstanding(&mut self) {
        self.outstanding = None;
    }

    /// Session counters
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The module ID last reported as detected
    pub fn last_detected(&self) -> Option<u16> {
        if self.last_detected == 0 {
            None
        } else {
            Some(self.last_detected)
        }
    }

    /// The session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Access the transmitter, e.g. to send a raw integer frame
    pub fn transmitter(&mut self) -> &mut Transmitter<T, D> {
        &mut self.tx
    }

    /// Access the sample storage
    pub fn storage(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Access the console
    pub fn console(&mut self) -> &mut C {
        &mut self.console
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use canhost_common::{
        config::SessionOptions,
        messages::CanId,
        protocol::Broadcast,
    };
    use std::collections::{HashMap, VecDeque};

    #[derive(Default)]
    struct FakeCan {
        sent: Vec<CanMessage>,
        stuck: bool,
    }

    impl CanTransmitter for &mut FakeCan {
        fn transmit(&mut self, _slot: u8, msg: &CanMessage) {
            self.sent.push(*msg);
        }

        fn tx_pending(&mut self) -> bool {
            self.stuck
        }
    }

    struct NoDelay;

    impl Delay for NoDelay {
        fn delay_us(&mut self, _us: u32) {}
    }

    #[derive(Default)]
    struct MemStorage(HashMap<u32, u32>);

    impl SampleStorage for MemStorage {
        fn erase(&mut self, addr: u32) -> Result<(), StorageError> {
            for a in (addr..addr + 0x400).step_by(4) {
                self.0.remove(&a);
            }
            Ok(())
        }

        fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageError> {
            self.0
                .insert(addr, u32::from_le_bytes(data.try_into().unwrap()));
            Ok(())
        }

        fn read_word(&self, addr: u32) -> Result<u32, StorageError> {
            Ok(*self.0.get(&addr).unwrap_or(&u32::MAX))
        }
    }

    #[derive(Default)]
    struct Script {
        input: VecDeque<&'static str>,
        output: String,
    }

    impl Console for Script {
        fn has_input(&mut self) -> bool {
            !self.input.is_empty()
        }

        fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, ConsoleError> {
            let line = self.input.pop_front().unwrap_or("");
            buf[..line.len()].copy_from_slice(line.as_bytes());
            Ok(line.len())
        }

        fn write_str(&mut self, s: &str) -> Result<(), ConsoleError> {
            self.output.push_str(s);
            Ok(())
        }
    }

    fn response(echo: u8, value: u32) -> CanMessage {
        let resp = Response { echo, value };
        CanMessage::new(CanId::std(0x101), &resp.to_bytes())
    }

    #[test]
    fn test_dispatch_frames() {
        let mbox = HostMbox::new(SessionConfig::DEFAULT);
        let mut can = FakeCan::default();
        let mut session = Session::new(
            SessionConfig::DEFAULT,
            &mbox,
            &mut can,
            NoDelay,
            MemStorage::default(),
            Script::default(),
            120_000_000,
        );
        for cmd in CommandCode::ALL {
            assert_eq!(UserMessage::CommandSent, session.dispatch(cmd, None));
        }
        assert_eq!(
            UserMessage::CommandSent,
            session.dispatch(CommandCode::FlashSetSampleSize, Some(0x20000))
        );
        assert_eq!(0x20000, session.sample_size());
        drop(session);

        for (msg, cmd) in can.sent.iter().zip(CommandCode::ALL) {
            assert_eq!(CanId::std(0x107), msg.id());
            assert_eq!(&[cmd.raw(), 0x01, 0x01], &msg.data()[..3]);
        }
        assert_eq!(
            &[6, 0x01, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00],
            can.sent[9].data()
        );
    }

    #[test]
    fn test_network_failure() {
        let mbox = HostMbox::new(SessionConfig::DEFAULT);
        let mut can = FakeCan {
            stuck: true,
            ..Default::default()
        };
        let mut console = Script::default();
        console.input.push_back("1");
        let mut session = Session::new(
            SessionConfig::DEFAULT,
            &mbox,
            &mut can,
            NoDelay,
            MemStorage::default(),
            console,
            120_000_000,
        );
        session.poll().unwrap();
        assert!(session
            .console()
            .output
            .ends_with("Requesting Version from sensor module. \r\nCAN Network Failed! \r\n"));
        assert_eq!(1, session.stats().send_failures);
    }

    #[test]
    fn test_decodes_responses() {
        let mbox = HostMbox::new(SessionConfig::DEFAULT);
        let mut can = FakeCan::default();
        let mut session = Session::new(
            SessionConfig::DEFAULT,
            &mbox,
            &mut can,
            NoDelay,
            MemStorage::default(),
            Script::default(),
            120_000_000,
        );

        for (echo, value) in [(1, 1000), (2, 42), (5, 0xAB), (7, 0x30000), (9, 3), (0x55, 7)] {
            mbox.store_message(response(echo, value)).unwrap();
            assert_eq!(Ok(true), session.process_responses());
        }
        assert_eq!(Ok(false), session.process_responses());
        assert_eq!(
            "Module firmware: 1000\r\n\
             RAW sensor data: 42\r\n\
             Flash Erase Done: 000000AB\r\n\
             Flash Start Position Status: 00030000\r\n\
             Recv Data: 3\r\n\
             Recv Data: 7\r\n",
            session.console().output
        );
    }

    #[test]
    fn test_overrun_is_counted_and_cleared() {
        let mbox = HostMbox::new(SessionConfig::DEFAULT);
        let mut can = FakeCan::default();
        let mut session = Session::new(
            SessionConfig::DEFAULT,
            &mbox,
            &mut can,
            NoDelay,
            MemStorage::default(),
            Script::default(),
            120_000_000,
        );
        mbox.store_message(response(1, 1)).unwrap();
        mbox.store_message(response(1, 2)).unwrap();
        session.process_responses().unwrap();
        assert_eq!("Module firmware: 2\r\n", session.console().output);
        assert_eq!(1, session.stats().overruns);
        assert_eq!(0, mbox.mailbox().flags());
    }

    #[test]
    fn test_sample_stream_and_csv() {
        let mbox = HostMbox::new(SessionConfig::DEFAULT);
        let mut can = FakeCan::default();
        let mut session = Session::new(
            SessionConfig::DEFAULT,
            &mbox,
            &mut can,
            NoDelay,
            MemStorage::default(),
            Script::default(),
            120_000_000,
        );
        for value in [12, 100, 200, 300, 0] {
            mbox.store_message(response(8, value)).unwrap();
            session.process_responses().unwrap();
        }
        assert_eq!(12, session.sample_size());
        assert!(!session.transfer().is_active());

        session.console().output.clear();
        assert_eq!(Ok(3), session.export_csv());
        assert_eq!(
            "CSV BEGIN:\r\n\r\n\r\nTimeStamp,Pressure\r\n0,100\r\n1,200\r\n2,300\r\n\r\n\r\n\r\n CSV END:\r\n",
            session.console().output
        );
    }

    #[test]
    fn test_unknown_input_redraws_menu() {
        let mbox = HostMbox::new(SessionConfig::DEFAULT);
        mbox.store_message(CanMessage::new(
            CanId::std(0x7DF),
            &Broadcast {
                module_id: 0x107,
                value: 0,
            }
            .to_bytes(),
        ))
        .unwrap();
        let mut can = FakeCan::default();
        let mut console = Script::default();
        console.input.push_back("hello");
        let mut session = Session::new(
            SessionConfig::DEFAULT,
            &mbox,
            &mut can,
            NoDelay,
            MemStorage::default(),
            console,
            120_000_000,
        );
        session.poll().unwrap();
        assert!(session.console().output.starts_with(menu::CLEAR_SCREEN));
        assert!(session.console().output.contains("Detected Module: 0107"));
        assert_eq!(Some(0x107), session.last_detected());
        drop(session);
        assert!(can.sent.is_empty());
    }

    #[test]
    fn test_outstanding_tracking() {
        let config = SessionConfig {
            options: SessionOptions {
                track_outstanding: true,
                ..SessionOptions::DEFAULT
            },
            ..SessionConfig::DEFAULT
        };
        let mbox = HostMbox::new(config);
        let mut can = FakeCan::default();
        let mut session = Session::new(
            config,
            &mbox,
            &mut can,
            NoDelay,
            MemStorage::default(),
            Script::default(),
            120_000_000,
        );

        assert_eq!(
            UserMessage::CommandSent,
            session.dispatch(CommandCode::ReadVersion, None)
        );
        assert_eq!(
            UserMessage::RequestOutstanding(CommandCode::ReadVersion),
            session.dispatch(CommandCode::ReadData, None)
        );

        // A reply to something else is flagged, and does not release the request
        mbox.store_message(response(2, 5)).unwrap();
        session.process_responses().unwrap();
        assert_eq!(1, session.stats().unmatched);
        assert_eq!(Some(CommandCode::ReadVersion), session.outstanding());
        assert!(session
            .console()
            .output
            .contains("Unexpected response 02: RAW sensor data: 5\r\n"));

        mbox.store_message(response(1, 1000)).unwrap();
        session.process_responses().unwrap();
        assert_eq!(None, session.outstanding());

        // A sample stream is outstanding until its end marker
        session.dispatch(CommandCode::FlashGetData, None);
        for value in [8, 1, 2] {
            mbox.store_message(response(8, value)).unwrap();
            session.process_responses().unwrap();
            assert_eq!(Some(CommandCode::FlashGetData), session.outstanding());
        }
        mbox.store_message(response(8, 0)).unwrap();
        session.process_responses().unwrap();
        assert_eq!(None, session.outstanding());
        assert_eq!(1, session.stats().unmatched);
    }
}
