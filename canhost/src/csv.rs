//! CSV export of locally stored samples
use canhost_common::{
    config::StorageLayout,
    constants::storage::WORD_SIZE,
    traits::{Console, SampleStorage, StorageError},
};
use snafu::ResultExt;

use crate::{
    menu::write_line,
    session::{ConsoleSnafu, SessionError, StorageSnafu},
};

/// Marker written before the CSV data
pub const BEGIN: &str = "CSV BEGIN:\r\n\r\n\r\n";
/// Column header line
pub const HEADER: &str = "TimeStamp,Pressure\r\n";
/// Marker written after the CSV data
pub const END: &str = "\r\n\r\n\r\n CSV END:\r\n";

/// Write `size` bytes of stored samples to the console as CSV
///
/// Each 4 byte word becomes one `<timestamp>,<value>` line. The timestamp is the word index,
/// starting at 0. `size` is limited to the capacity of the region, and rounded down to whole
/// words. Nothing is written for a layout which fails [`StorageLayout::validate`].
///
/// Returns the number of data lines written.
pub fn export<S, C>(
    storage: &S,
    console: &mut C,
    layout: &StorageLayout,
    size: u32,
) -> Result<u32, SessionError>
where
    S: SampleStorage + ?Sized,
    C: Console + ?Sized,
{
    layout
        .validate()
        .map_err(|source| StorageError::Layout { source })
        .context(StorageSnafu)?;
    let words = size.min(layout.capacity) / WORD_SIZE;

    console.write_str(BEGIN).context(ConsoleSnafu)?;
    console.write_str(HEADER).context(ConsoleSnafu)?;
    for timestamp in 0..words {
        let value = storage
            .read_word(layout.base + timestamp * WORD_SIZE)
            .context(StorageSnafu)?;
        write_line(console, format_args!("{},{}\r\n", timestamp, value)).context(ConsoleSnafu)?;
    }
    console.write_str(END).context(ConsoleSnafu)?;

    Ok(words)
}
