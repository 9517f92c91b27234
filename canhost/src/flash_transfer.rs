//! Receiving a sample stream into local storage
//!
//! A `FlashGetData` request makes the module answer with a series of responses, all echoing the
//! same command code:
//!
//! 1. The first carries the total number of sample bytes to follow.
//! 2. Each following response carries one 32-bit sample word.
//! 3. A response with value 0 ends the transfer.
//!
//! The end marker cannot be told apart from a genuine zero sample, so a zero sample ends a
//! transfer early.
use canhost_common::{
    config::StorageLayout,
    constants::storage::WORD_SIZE,
    traits::{SampleStorage, StorageError},
};
use defmt_or_log::{debug, warn};

/// What a received value did to the transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferEvent {
    /// A new transfer started, announcing `total` bytes
    Started {
        /// Size announced by the module
        total: u32,
    },
    /// A sample word was written
    Stored {
        /// Address the word was written to
        addr: u32,
    },
    /// The end marker was received
    Completed {
        /// Number of words written during the transfer
        words: u32,
    },
    /// The storage region is full, and the word was discarded
    Dropped,
}

/// State of the sample stream
///
/// Idle when `cursor` is None. Owned by the session loop.
#[derive(Clone, Copy, Debug)]
pub struct FlashTransfer {
    layout: StorageLayout,
    expected_total: Option<u32>,
    cursor: Option<u32>,
    words: u32,
}

impl FlashTransfer {
    /// Create an idle transfer writing into `layout`
    pub const fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            expected_total: None,
            cursor: None,
            words: 0,
        }
    }

    /// Return true while a transfer is in progress
    pub fn is_active(&self) -> bool {
        self.cursor.is_some()
    }

    /// The address the next word will be written to
    pub fn cursor(&self) -> Option<u32> {
        self.cursor
    }

    /// The size announced by the module for the current transfer
    pub fn expected_total(&self) -> Option<u32> {
        self.expected_total
    }

    /// Number of words written in the current transfer
    pub fn words_stored(&self) -> u32 {
        self.words
    }

    /// Return true once more words were stored than the module announced
    pub fn exceeds_announced(&self) -> bool {
        match self.expected_total {
            Some(total) => self.words.saturating_mul(WORD_SIZE) > total,
            None => false,
        }
    }

    /// Abandon any transfer in progress
    pub fn reset(&mut self) {
        self.expected_total = None;
        self.cursor = None;
        self.words = 0;
    }

    /// Handle the value of one `FlashGetData` response
    ///
    /// A storage error abandons the transfer. A layout which fails
    /// [`StorageLayout::validate`] is reported as [`StorageError::Layout`] when a transfer starts,
    /// and nothing is written.
    pub fn on_value<S: SampleStorage + ?Sized>(
        &mut self,
        value: u32,
        storage: &mut S,
    ) -> Result<TransferEvent, StorageError> {
        let result = self.advance(value, storage);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn advance<S: SampleStorage + ?Sized>(
        &mut self,
        value: u32,
        storage: &mut S,
    ) -> Result<TransferEvent, StorageError> {
        let Some(cursor) = self.cursor else {
            self.layout
                .validate()
                .map_err(|source| StorageError::Layout { source })?;
            let base = self.layout.base;
            storage.erase(base)?;
            self.expected_total = Some(value);
            self.cursor = Some(base);
            self.words = 0;
            debug!("Sample transfer of {} bytes started", value);
            return Ok(TransferEvent::Started { total: value });
        };

        if value == 0 {
            let words = self.words;
            self.reset();
            return Ok(TransferEvent::Completed { words });
        }

        if cursor.saturating_add(WORD_SIZE) > self.layout.end() {
            warn!("Sample storage full, dropping word {}", value);
            return Ok(TransferEvent::Dropped);
        }
        if cursor != self.layout.base && self.layout.is_block_start(cursor) {
            storage.erase(cursor)?;
        }
        storage.program(cursor, &value.to_le_bytes())?;
        self.cursor = Some(cursor + WORD_SIZE);
        let was_over = self.exceeds_announced();
        self.words += 1;
        if !was_over && self.exceeds_announced() {
            warn!(
                "Module is sending more than the announced {} bytes",
                self.expected_total.unwrap_or(0)
            );
        }
        Ok(TransferEvent::Stored { addr: cursor })
    }
}
