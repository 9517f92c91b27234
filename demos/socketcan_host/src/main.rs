use std::{
    fs::{File, OpenOptions},
    io::{BufRead as _, Write as _},
    os::unix::fs::FileExt as _,
    path::{Path, PathBuf},
    sync::mpsc,
    time::Duration,
};

use canhost::{
    common::{
        host_config::HostConfig,
        traits::{Console, ConsoleError, Delay, SampleStorage, StorageError},
        StorageLayout,
    },
    open_socketcan, HostMbox, Session,
};
use clap::Parser;
use tokio::time::timeout;

#[derive(Parser, Debug)]
struct Args {
    /// CAN interface, e.g. can0
    socket: String,
    /// Host config file
    #[clap(long, short)]
    config: Option<PathBuf>,
    /// File holding the local sample storage
    #[clap(long, short, default_value = "canhost.flash")]
    storage: PathBuf,
    /// Clock frequency to report in the menu
    #[clap(long, default_value = "120000000")]
    clock_hz: u32,
}

/// Sample storage kept in a file, one byte per byte of the region
struct FileStorage {
    layout: StorageLayout,
    file: File,
}

impl FileStorage {
    fn open(path: &Path, layout: StorageLayout) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        if len < layout.capacity as u64 {
            // Fill the missing part as erased
            let fill = vec![0xFF; (layout.capacity as u64 - len) as usize];
            file.write_all_at(&fill, len)?;
        }
        Ok(Self { layout, file })
    }

    fn offset(&self, addr: u32, len: u32) -> Result<u64, StorageError> {
        if addr < self.layout.base || addr.saturating_add(len) > self.layout.end() {
            return Err(StorageError::OutOfRange { addr });
        }
        Ok((addr - self.layout.base) as u64)
    }
}

impl SampleStorage for FileStorage {
    fn erase(&mut self, addr: u32) -> Result<(), StorageError> {
        if !self.layout.is_block_start(addr) {
            return Err(StorageError::Unaligned { addr });
        }
        let offset = self.offset(addr, self.layout.erase_block)?;
        let erased = vec![0xFF; self.layout.erase_block as usize];
        self.file.write_all_at(&erased, offset).map_err(|e| {
            log::error!("Erase at {addr:08X} failed: {e}");
            StorageError::Device { addr }
        })
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageError> {
        if addr % 4 != 0 {
            return Err(StorageError::Unaligned { addr });
        }
        let offset = self.offset(addr, data.len() as u32)?;
        self.file.write_all_at(data, offset).map_err(|e| {
            log::error!("Write at {addr:08X} failed: {e}");
            StorageError::Device { addr }
        })
    }

    fn read_word(&self, addr: u32) -> Result<u32, StorageError> {
        let offset = self.offset(addr, 4)?;
        let mut word = [0u8; 4];
        self.file
            .read_exact_at(&mut word, offset)
            .map_err(|_| StorageError::Device { addr })?;
        Ok(u32::from_le_bytes(word))
    }
}

/// Console on stdin/stdout
///
/// Lines are read by a separate thread, so checking for input never blocks.
struct StdioConsole {
    lines: mpsc::Receiver<String>,
    pending: Option<String>,
    stdout: std::io::Stdout,
}

impl Console for StdioConsole {
    fn has_input(&mut self) -> bool {
        if self.pending.is_none() {
            self.pending = self.lines.try_recv().ok();
        }
        self.pending.is_some()
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, ConsoleError> {
        let line = match self.pending.take() {
            Some(line) => line,
            None => self.lines.recv().map_err(|_| ConsoleError::Io {
                kind: embedded_io::ErrorKind::BrokenPipe,
            })?,
        };
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() > buf.len() {
            return Err(ConsoleError::LineTooLong);
        }
        buf[..line.len()].copy_from_slice(line.as_bytes());
        Ok(line.len())
    }

    fn write_str(&mut self, s: &str) -> Result<(), ConsoleError> {
        self.stdout
            .write_all(s.as_bytes())
            .and_then(|_| self.stdout.flush())
            .map_err(|_| ConsoleError::Io {
                kind: embedded_io::ErrorKind::Other,
            })
    }
}

struct SleepDelay;

impl Delay for SleepDelay {
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}

#[tokio::main]
async fn main() {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    let host_config = match &args.config {
        Some(path) => match HostConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        },
        None => HostConfig::default(),
    };
    let config = host_config.session_config();
    log::info!(
        "Starting host {}...",
        host_config.device_name.as_deref().unwrap_or("canhost")
    );

    // The mailbox is shared with the receive thread, so use Box::leak to make it static
    let mbox: &'static HostMbox = Box::leak(Box::new(HostMbox::new(config)));

    let poll_timeout = Duration::from_millis(100);
    let (tx, mut rx) = match open_socketcan(&args.socket, config.can.rx_slot, poll_timeout) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("Failed to open {}: {e}", args.socket);
            std::process::exit(1);
        }
    };

    let storage = match FileStorage::open(&args.storage, config.storage) {
        Ok(storage) => storage,
        Err(e) => {
            log::error!("Failed to open {}: {e}", args.storage.display());
            std::process::exit(1);
        }
    };

    let process_notify: &'static tokio::sync::Notify =
        Box::leak(Box::new(tokio::sync::Notify::new()));
    let notify_cb = Box::leak(Box::new(move || {
        process_notify.notify_one();
    }));
    mbox.set_process_notify_callback(notify_cb);

    // Stands in for the CAN interrupt
    tokio::task::spawn_blocking(move || loop {
        mbox.handle_interrupt(&mut rx);
    });

    let (line_tx, line_rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
            process_notify.notify_one();
        }
    });
    let console = StdioConsole {
        lines: line_rx,
        pending: None,
        stdout: std::io::stdout(),
    };

    let mut session = Session::new(
        config,
        mbox,
        tx,
        SleepDelay,
        storage,
        console,
        args.clock_hz,
    );

    if let Err(e) = session.show_menu() {
        log::error!("{e}");
    }
    loop {
        // Blocks while waiting on the bus, or on the operator for a command argument
        if let Err(e) = session.poll() {
            log::error!("{e}");
        }

        // Wait for notification to run, or a timeout
        timeout(Duration::from_millis(10), process_notify.notified())
            .await
            .ok();
    }
}
