//! One file per (symbol, interval) series.
//!
//! # Layout
//!
//! A series file is a dense array of 64-byte slots. Slot `i` holds the
//! record whose timestamp is `interval.offset(start_time, i)`; the start
//! time lives only in the file name (`<symbol>-<code>@<start-hex>`).
//! Never-written slots read back as zeros and decode as holes.
//!
//! # Locking
//!
//! Each series carries its own `RwLock`. A batch write holds the write
//! lock for the whole batch; a range query holds the read lock for the
//! whole query. All file I/O is positional, so readers share the handle
//! without touching a file cursor.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use crate::codec::{decode_slots, Kline, KLINE_SIZE};
use crate::error::BatchError;
use crate::interval::Interval;
use crate::{Error, Result};

const RECORD_LEN: u64 = KLINE_SIZE as u64;

/// Largest end offset a record may have; file offsets are signed.
const MAX_END_OFFSET: u64 = i64::MAX as u64;

// ============================================================================
// Series Naming
// ============================================================================

/// Registry key of a series, e.g. `"BTCUSDT-1m"`.
pub fn series_key(symbol: &str, interval_code: &str) -> String {
    format!("{symbol}-{interval_code}")
}

/// File name of a series, e.g. `"BTCUSDT-1m@125e72e7800"`.
pub fn series_filename(key: &str, start_time: i64) -> String {
    if start_time < 0 {
        format!("{key}@-{:x}", start_time.unsigned_abs())
    } else {
        format!("{key}@{start_time:x}")
    }
}

/// Splits a file name at its single `@` into key and start-hex parts.
///
/// Names that do not split into exactly two parts are not series files.
pub fn split_series_filename(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.split('@');
    let key = parts.next()?;
    let hex = parts.next()?;
    if parts.next().is_some() || key.is_empty() {
        return None;
    }
    Some((key, hex))
}

/// Splits a series file name into its registry key and start time.
///
/// Returns `None` unless the name has exactly one `@` followed by a
/// (possibly negative) hex timestamp.
pub fn parse_series_filename(name: &str) -> Option<(&str, i64)> {
    let (key, hex) = split_series_filename(name)?;
    let start_time = i64::from_str_radix(hex, 16).ok()?;
    Some((key, start_time))
}

/// Splits a registry key into symbol and interval code at the last `-`.
pub fn split_series_key(key: &str) -> Option<(&str, &str)> {
    let (symbol, code) = key.rsplit_once('-')?;
    if symbol.is_empty() || code.is_empty() {
        return None;
    }
    Some((symbol, code))
}

// ============================================================================
// Series File
// ============================================================================

/// Point-in-time view of a series' bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesInfo {
    pub key: String,
    pub interval: String,
    pub path: PathBuf,
    pub start_time: i64,
    pub end_time: i64,
    /// Logical length of the file in bytes.
    pub end_offset: u64,
    /// Number of slots, holes included.
    pub slots: u64,
}

#[derive(Debug)]
struct SeriesState {
    file: File,
    end_time: i64,
    end_offset: u64,
    write_cursor: u64,
}

#[derive(Debug)]
pub struct SeriesFile {
    key: String,
    path: PathBuf,
    interval: Interval,
    start_time: i64,
    state: RwLock<SeriesState>,
}

impl SeriesFile {
    /// Creates an empty series whose first slot is `start_time`.
    ///
    /// A stale file with the same name is truncated.
    pub fn create(root: &Path, key: String, interval: Interval, start_time: i64) -> Result<Self> {
        let path = root.join(series_filename(&key, start_time));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            key,
            path,
            interval,
            start_time,
            state: RwLock::new(SeriesState {
                file,
                end_time: start_time,
                end_offset: 0,
                write_cursor: 0,
            }),
        })
    }

    /// Reopens a series found on disk.
    ///
    /// # Errors
    ///
    /// - `Error::Corrupt`: file length is not a whole number of records
    /// - `Error::Io`: failed to open or stat the file
    pub fn open(path: PathBuf, key: String, interval: Interval, start_time: i64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len % RECORD_LEN != 0 {
            return Err(Error::Corrupt {
                path,
                reason: format!("file size {len} is not a multiple of {KLINE_SIZE}"),
            });
        }
        let slots = (len / RECORD_LEN) as i64;
        let end_time = if slots == 0 {
            start_time
        } else {
            match interval.checked_offset(start_time, slots - 1) {
                Some(end_time) => end_time,
                None => {
                    return Err(Error::Corrupt {
                        path,
                        reason: format!("{slots} slots from {start_time} overflow i64 timestamps"),
                    })
                }
            }
        };
        Ok(Self {
            key,
            path,
            interval,
            start_time,
            state: RwLock::new(SeriesState {
                file,
                end_time,
                end_offset: len,
                write_cursor: len,
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn info(&self) -> Result<SeriesInfo> {
        let state = self.read_state()?;
        Ok(SeriesInfo {
            key: self.key.clone(),
            interval: self.interval.code().to_string(),
            path: self.path.clone(),
            start_time: self.start_time,
            end_time: state.end_time,
            end_offset: state.end_offset,
            slots: state.end_offset / RECORD_LEN,
        })
    }

    /// Flushes file contents and metadata to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.read_state()?.file.sync_all()?;
        Ok(())
    }

    /// Writes `klines` at the slots their timestamps address.
    ///
    /// Records need not be contiguous or ordered; a jump in slot position
    /// flushes the pending buffer and continues at the new offset. On
    /// failure the records accepted before it are flushed and counted.
    pub fn write_batch(
        &self,
        klines: &[Kline],
        buffer_records: usize,
        zero_fill_gaps: bool,
    ) -> std::result::Result<usize, BatchError> {
        let mut state = self
            .write_state()
            .map_err(|err| BatchError::new(0, err))?;
        let mut writer = BatchWriter::new(&mut state, buffer_records, zero_fill_gaps);

        let mut written = 0;
        for kline in klines {
            if let Err(err) = writer.push(&self.interval, self.start_time, kline) {
                let pending = writer.pending;
                return Err(match writer.flush() {
                    Ok(()) => BatchError::new(written, err),
                    Err(flush_err) => BatchError::new(written.saturating_sub(pending), flush_err),
                });
            }
            written += 1;
        }

        let pending = writer.pending;
        writer
            .flush()
            .map_err(|err| BatchError::new(written.saturating_sub(pending), err))?;
        Ok(written)
    }

    /// Returns the occupied records in `[begin, end]`, timestamps rebuilt
    /// from slot position.
    ///
    /// Bounds are widened to slot boundaries first.
    ///
    /// # Errors
    ///
    /// - `Error::OutOfRange`: an aligned bound lies outside the series
    /// - `Error::Misaligned`: series start or a bound is not on a slot
    /// - `Error::Io` / `Error::Corrupt`: read or decode failure
    pub fn query(&self, begin: i64, end: i64) -> Result<Vec<Kline>> {
        let state = self.read_state()?;
        let interval = &self.interval;

        let begin = interval.floor(begin);
        let end = interval.checked_ceil(end).ok_or(Error::OutOfRange {
            timestamp: end,
            start_time: self.start_time,
            end_time: state.end_time,
        })?;
        for bound in [begin, end] {
            if bound < self.start_time || bound > state.end_time {
                return Err(Error::OutOfRange {
                    timestamp: bound,
                    start_time: self.start_time,
                    end_time: state.end_time,
                });
            }
        }
        for timestamp in [self.start_time, begin, end] {
            if !interval.is_aligned(timestamp) {
                return Err(Error::Misaligned {
                    timestamp,
                    interval: interval.code().to_string(),
                });
            }
        }

        let unaddressable = |timestamp| Error::Unaddressable {
            timestamp,
            start_time: self.start_time,
        };
        let offset =
            slot_offset(interval, self.start_time, begin).ok_or_else(|| unaddressable(begin))?;
        // With `end` addressable, the range length and its end fit in a u64.
        slot_offset(interval, self.start_time, end).ok_or_else(|| unaddressable(end))?;
        let begin_slot = (offset / RECORD_LEN) as i64;
        let mut len = interval.count_in_range(begin, end) as u64 * RECORD_LEN;
        if offset + len > state.end_offset {
            len = state.end_offset.saturating_sub(offset);
        }

        let mut buf = vec![0u8; len as usize];
        let filled = read_full_at(&state.file, &mut buf, offset)?;
        buf.truncate(filled - filled % KLINE_SIZE);

        let mut klines = Vec::with_capacity(buf.len() / KLINE_SIZE);
        for slot in decode_slots(&buf)? {
            let (slot, mut kline) = slot?;
            if kline.is_empty() {
                continue;
            }
            kline.timestamp = interval.offset(self.start_time, begin_slot + slot as i64);
            klines.push(kline);
        }
        Ok(klines)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, SeriesState>> {
        self.state
            .read()
            .map_err(|_| Error::LockPoisoned("series state"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, SeriesState>> {
        self.state
            .write()
            .map_err(|_| Error::LockPoisoned("series state"))
    }
}

/// Byte offset of the slot addressed by `timestamp`.
///
/// `None` when the slot precedes `start_time` or the record would end
/// past the largest file offset.
fn slot_offset(interval: &Interval, start_time: i64, timestamp: i64) -> Option<u64> {
    let slot = u64::try_from(interval.slots_between(start_time, timestamp)?).ok()?;
    slot.checked_mul(RECORD_LEN)
        .filter(|offset| *offset <= MAX_END_OFFSET - RECORD_LEN)
}

/// Reads until `buf` is full or the file ends. Returns bytes read.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

// ============================================================================
// Batch Writer
// ============================================================================

/// Buffers contiguous records and writes them at `buf_start` on flush.
///
/// Series bounds only advance when a flush lands, so a failed write
/// leaves the state describing what is on disk.
struct BatchWriter<'a> {
    state: &'a mut SeriesState,
    buf: Vec<u8>,
    pending: usize,
    capacity: usize,
    buf_start: u64,
    /// Latest timestamp among buffered records.
    pending_end_time: i64,
    zero_fill_gaps: bool,
}

impl<'a> BatchWriter<'a> {
    fn new(state: &'a mut SeriesState, capacity: usize, zero_fill_gaps: bool) -> Self {
        let capacity = capacity.max(1);
        let buf_start = state.write_cursor;
        Self {
            state,
            buf: vec![0u8; capacity * KLINE_SIZE],
            pending: 0,
            capacity,
            buf_start,
            pending_end_time: i64::MIN,
            zero_fill_gaps,
        }
    }

    fn cursor(&self) -> u64 {
        self.buf_start + (self.pending * KLINE_SIZE) as u64
    }

    fn push(&mut self, interval: &Interval, start_time: i64, kline: &Kline) -> Result<()> {
        if !interval.is_aligned(kline.timestamp) {
            return Err(Error::Misaligned {
                timestamp: kline.timestamp,
                interval: interval.code().to_string(),
            });
        }
        if kline.timestamp < start_time {
            return Err(Error::OutOfOrder {
                timestamp: kline.timestamp,
                start_time,
            });
        }

        let target = slot_offset(interval, start_time, kline.timestamp).ok_or(
            Error::Unaddressable {
                timestamp: kline.timestamp,
                start_time,
            },
        )?;
        if self.cursor() != target {
            self.seek(target)?;
        }

        kline.encode_into(&mut self.buf, self.pending * KLINE_SIZE);
        self.pending += 1;
        self.pending_end_time = self.pending_end_time.max(kline.timestamp);

        if self.pending == self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    fn seek(&mut self, target: u64) -> Result<()> {
        self.flush()?;
        if self.zero_fill_gaps && target > self.state.end_offset {
            self.state.file.set_len(target)?;
        }
        debug!(
            "series seek: cursor={} target={} end_offset={}",
            self.state.write_cursor, target, self.state.end_offset
        );
        self.buf_start = target;
        self.state.write_cursor = target;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        let len = self.pending * KLINE_SIZE;
        self.state.file.write_all_at(&self.buf[..len], self.buf_start)?;
        self.buf_start += len as u64;
        self.state.write_cursor = self.buf_start;
        self.state.end_offset = self.state.end_offset.max(self.buf_start);
        self.state.end_time = self.state.end_time.max(self.pending_end_time);
        self.pending = 0;
        self.pending_end_time = i64::MIN;
        Ok(())
    }
}
