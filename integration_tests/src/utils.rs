#![allow(dead_code)]
use std::collections::{HashMap, VecDeque};

use canhost_common::{
    config::StorageLayout,
    messages::{CanId, CanMessage},
    protocol::{Broadcast, Response},
    traits::{Console, ConsoleError, Delay, SampleStorage, StorageError},
};

use crate::sim_bus::SimBus;

pub fn response_frame(echo: u8, value: u32) -> CanMessage {
    CanMessage::new(CanId::std(0x101), &Response { echo, value }.to_bytes())
}

pub fn broadcast_frame(module_id: u16, value: u32) -> CanMessage {
    CanMessage::new(CanId::std(0x7DF), &Broadcast { module_id, value }.to_bytes())
}

/// A delay which returns immediately, but keeps track of the total requested time
#[derive(Debug, Default)]
pub struct NoDelay {
    pub total_us: u64,
}

impl Delay for NoDelay {
    fn delay_us(&mut self, us: u32) {
        self.total_us += us as u64;
    }
}

/// Sample storage backed by memory, with NOR flash semantics
///
/// Erased bytes read as 0xFF, and programming can only clear bits.
pub struct MemoryFlash {
    layout: StorageLayout,
    data: Vec<u8>,
    pub erase_count: HashMap<u32, u32>,
}

impl MemoryFlash {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            data: vec![0xFF; layout.capacity as usize],
            erase_count: HashMap::new(),
        }
    }

    fn offset(&self, addr: u32, len: u32) -> Result<usize, StorageError> {
        if addr < self.layout.base || addr.saturating_add(len) > self.layout.end() {
            return Err(StorageError::OutOfRange { addr });
        }
        Ok((addr - self.layout.base) as usize)
    }

    /// Total number of block erases
    pub fn erases(&self) -> u32 {
        self.erase_count.values().sum()
    }
}

impl SampleStorage for MemoryFlash {
    fn erase(&mut self, addr: u32) -> Result<(), StorageError> {
        if !self.layout.is_block_start(addr) {
            return Err(StorageError::Unaligned { addr });
        }
        let block = self.layout.erase_block;
        let start = self.offset(addr, block)?;
        self.data[start..start + block as usize].fill(0xFF);
        *self.erase_count.entry(addr).or_default() += 1;
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageError> {
        if addr % 4 != 0 || data.len() % 4 != 0 {
            return Err(StorageError::Unaligned { addr });
        }
        let start = self.offset(addr, data.len() as u32)?;
        for (dst, src) in self.data[start..start + data.len()].iter_mut().zip(data) {
            *dst &= *src;
        }
        Ok(())
    }

    fn read_word(&self, addr: u32) -> Result<u32, StorageError> {
        let start = self.offset(addr, 4)?;
        let bytes: [u8; 4] = self.data[start..start + 4].try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }
}

/// A console fed from a script of input lines, capturing all output
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    input: VecDeque<String>,
    output: String,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) {
        self.input.push_back(line.to_string());
    }

    /// Get the output written since the last call
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl Console for ScriptedConsole {
    fn has_input(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, ConsoleError> {
        let line = self.input.pop_front().unwrap_or_default();
        if line.len() > buf.len() {
            return Err(ConsoleError::LineTooLong);
        }
        buf[..line.len()].copy_from_slice(line.as_bytes());
        Ok(line.len())
    }

    fn write_str(&mut self, s: &str) -> Result<(), ConsoleError> {
        self.output.push_str(s);
        Ok(())
    }
}

/// Prints the frames seen on a bus when dropped, to help debug failing tests
pub struct BusLogger {
    bus: SimBus,
}

impl BusLogger {
    pub fn new(bus: &SimBus) -> Self {
        Self { bus: bus.clone() }
    }

    pub fn print(&mut self) {
        println!("Bus message history");
        println!("-------------------");
        for msg in self.bus.history() {
            println!("{} {:02X?}", msg.id(), msg.data());
        }
    }
}

impl Drop for BusLogger {
    fn drop(&mut self) {
        self.print();
    }
}
