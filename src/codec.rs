//! Fixed 64-byte big-endian kline record.
//!
//! The timestamp is not part of the wire format: a record's time is its
//! slot position within the series file plus the series start time.

use crate::{Error, Result};

pub const KLINE_SIZE: usize = 64;

/// Bit 0 of the flag word. A slot with this bit clear is a hole.
pub const FLAG_OCCUPIED: i64 = 1;

pub const FLAG_OFFSET: usize = 0;
pub const DEAL_COUNT_OFFSET: usize = 8;
pub const OPEN_OFFSET: usize = 16;
pub const CLOSE_OFFSET: usize = 24;
pub const HIGH_OFFSET: usize = 32;
pub const LOW_OFFSET: usize = 40;
pub const VOLUME_OFFSET: usize = 48;
pub const QUOTE_VOLUME_OFFSET: usize = 56;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Kline {
    pub flag: i64,
    /// Unix milliseconds. Recomputed from slot position on read.
    pub timestamp: i64,
    pub deal_count: i64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub quote_volume: f64,
}

impl Kline {
    /// An occupied record at `timestamp` with zeroed values.
    pub fn new(timestamp: i64) -> Self {
        Self {
            flag: FLAG_OCCUPIED,
            timestamp,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flag & FLAG_OCCUPIED == 0
    }

    /// Writes the record into `buf[offset..offset + KLINE_SIZE]`.
    ///
    /// # Panics
    ///
    /// Panics if the destination range is out of bounds.
    pub fn encode_into(&self, buf: &mut [u8], offset: usize) {
        let out = &mut buf[offset..offset + KLINE_SIZE];
        out[FLAG_OFFSET..FLAG_OFFSET + 8].copy_from_slice(&self.flag.to_be_bytes());
        out[DEAL_COUNT_OFFSET..DEAL_COUNT_OFFSET + 8]
            .copy_from_slice(&self.deal_count.to_be_bytes());
        out[OPEN_OFFSET..OPEN_OFFSET + 8].copy_from_slice(&self.open.to_bits().to_be_bytes());
        out[CLOSE_OFFSET..CLOSE_OFFSET + 8].copy_from_slice(&self.close.to_bits().to_be_bytes());
        out[HIGH_OFFSET..HIGH_OFFSET + 8].copy_from_slice(&self.high.to_bits().to_be_bytes());
        out[LOW_OFFSET..LOW_OFFSET + 8].copy_from_slice(&self.low.to_bits().to_be_bytes());
        out[VOLUME_OFFSET..VOLUME_OFFSET + 8]
            .copy_from_slice(&self.volume.to_bits().to_be_bytes());
        out[QUOTE_VOLUME_OFFSET..QUOTE_VOLUME_OFFSET + 8]
            .copy_from_slice(&self.quote_volume.to_bits().to_be_bytes());
    }

    pub fn to_bytes(&self) -> [u8; KLINE_SIZE] {
        let mut buf = [0u8; KLINE_SIZE];
        self.encode_into(&mut buf, 0);
        buf
    }

    /// Decodes the record at `offset`. The returned timestamp is zero.
    ///
    /// # Errors
    ///
    /// - `Error::Corrupt`: `buf` is not a whole number of records, or
    ///   `offset` does not address a full record
    pub fn decode(buf: &[u8], offset: usize) -> Result<Self> {
        if buf.len() % KLINE_SIZE != 0 {
            return Err(corrupt(format!(
                "buffer length {} is not a multiple of {KLINE_SIZE}",
                buf.len()
            )));
        }
        let Some(src) = buf.get(offset..offset + KLINE_SIZE) else {
            return Err(corrupt(format!("record offset {offset} out of bounds")));
        };
        Ok(Self {
            flag: read_i64(src, FLAG_OFFSET),
            timestamp: 0,
            deal_count: read_i64(src, DEAL_COUNT_OFFSET),
            open: read_f64(src, OPEN_OFFSET),
            close: read_f64(src, CLOSE_OFFSET),
            high: read_f64(src, HIGH_OFFSET),
            low: read_f64(src, LOW_OFFSET),
            volume: read_f64(src, VOLUME_OFFSET),
            quote_volume: read_f64(src, QUOTE_VOLUME_OFFSET),
        })
    }
}

/// Iterates `(slot, record)` over every record of `buf`, holes included.
pub fn decode_slots(buf: &[u8]) -> Result<impl Iterator<Item = Result<(usize, Kline)>> + '_> {
    if buf.len() % KLINE_SIZE != 0 {
        return Err(corrupt(format!(
            "buffer length {} is not a multiple of {KLINE_SIZE}",
            buf.len()
        )));
    }
    Ok((0..buf.len() / KLINE_SIZE)
        .map(move |slot| Kline::decode(buf, slot * KLINE_SIZE).map(|kline| (slot, kline))))
}

fn read_i64(src: &[u8], at: usize) -> i64 {
    i64::from_be_bytes(src[at..at + 8].try_into().expect("slice length"))
}

fn read_f64(src: &[u8], at: usize) -> f64 {
    f64::from_bits(u64::from_be_bytes(
        src[at..at + 8].try_into().expect("slice length"),
    ))
}

fn corrupt(reason: String) -> Error {
    Error::Corrupt {
        path: "<buffer>".into(),
        reason,
    }
}
