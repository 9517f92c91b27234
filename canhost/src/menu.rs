//! Operator console text and input parsing
use core::fmt::Write as _;

use canhost_common::{
    commands::CommandCode,
    traits::{Console, ConsoleError},
};
use defmt_or_log::warn;

use crate::registry::ModuleEntry;

/// Longest formatted console line
pub const LINE_LEN: usize = 128;

/// ANSI sequence clearing the terminal and homing the cursor
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[0;0H";

/// Format a line into a fixed buffer and write it to the console
///
/// Output beyond [`LINE_LEN`] bytes is cut off.
pub fn write_line<C: Console + ?Sized>(
    console: &mut C,
    args: core::fmt::Arguments<'_>,
) -> Result<(), ConsoleError> {
    let mut line: heapless::String<LINE_LEN> = heapless::String::new();
    if line.write_fmt(args).is_err() {
        warn!("Console line truncated");
    }
    console.write_str(&line)
}

/// Write the operator menu
///
/// `module` is the module currently in registry entry 0, if any.
pub fn write_menu<C: Console + ?Sized>(
    console: &mut C,
    clock_hz: u32,
    module: Option<ModuleEntry>,
) -> Result<(), ConsoleError> {
    console.write_str("\r\nInkley Sensor Controller Online.\r\n")?;
    console.write_str("\r\n")?;
    write_line(
        console,
        format_args!("\r\nHost Clock: {} MHZ \r\n", clock_hz / 1_000_000),
    )?;
    if let Some(module) = module {
        write_line(console, format_args!("Detected Module: {:04X}\r\n", module.id))?;
    }
    console.write_str("\r\nType command # and press enter.\r\n\r\n")?;
    console.write_str("\r\nCommands:\r\n")?;
    for cmd in CommandCode::ALL {
        write_line(
            console,
            format_args!("{} - {}\r\n", cmd.raw(), cmd.menu_label()),
        )?;
    }
    console.write_str("\r\n\r\n>")
}

/// Line printed when the operator selects a command, before the request is sent
pub fn announcement(command: CommandCode) -> Option<&'static str> {
    match command {
        CommandCode::ReadVersion => Some("Requesting Version from sensor module. \r\n"),
        CommandCode::ReadData => Some("Reading Sensor Data. \r\n"),
        CommandCode::FlashStart => Some("Starting FLASH memory recording. \r\n"),
        CommandCode::FlashReadPos => Some("Reading FLASH memory data. \r\n"),
        CommandCode::FlashEraseFull => Some("Erasing FLASH memory. \r\n"),
        CommandCode::FlashSetSampleSize => {
            Some("Setting Sample size. Enter Value in HEX. Default is 0x10000. \r\n")
        }
        CommandCode::FlashStatus => Some("Getting FLASH memory status... \r\n"),
        CommandCode::FlashGetData => {
            Some("Requesting flash memory samples from sensor module. \r\n")
        }
        CommandCode::FlashGenCsv => None,
    }
}

/// Parse an operator entered number
///
/// Follows the rules of C's `strtoul` with base 0: leading whitespace and an optional sign are
/// skipped, a `0x` prefix selects hexadecimal, a leading `0` selects octal, and anything else is
/// decimal. Parsing stops at the first invalid digit. Input without any digits parses as 0, and
/// values which do not fit saturate at `u32::MAX`.
pub fn parse_number(text: &[u8]) -> u32 {
    let mut s = text;
    while let [c, rest @ ..] = s {
        if c.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }

    let negative = match s {
        [b'-', rest @ ..] => {
            s = rest;
            true
        }
        [b'+', rest @ ..] => {
            s = rest;
            false
        }
        _ => false,
    };

    let radix = match s {
        [b'0', b'x' | b'X', d, ..] if d.is_ascii_hexdigit() => {
            s = &s[2..];
            16
        }
        [b'0', ..] => 8,
        _ => 10,
    };

    let mut value: u32 = 0;
    let mut overflow = false;
    for &c in s {
        let Some(digit) = (c as char).to_digit(radix) else {
            break;
        };
        match value.checked_mul(radix).and_then(|v| v.checked_add(digit)) {
            Some(v) => value = v,
            None => overflow = true,
        }
    }

    if overflow {
        u32::MAX
    } else if negative {
        value.wrapping_neg()
    } else {
        value
    }
}
