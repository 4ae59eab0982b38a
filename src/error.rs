use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timestamp {timestamp} is not aligned to interval {interval}")]
    Misaligned { timestamp: i64, interval: String },

    #[error("timestamp {timestamp} precedes series start {start_time}")]
    OutOfOrder { timestamp: i64, start_time: i64 },

    #[error("invalid range: begin {begin} is after end {end}")]
    InvalidRange { begin: i64, end: i64 },

    #[error("timestamp {timestamp} outside series range [{start_time}, {end_time}]")]
    OutOfRange {
        timestamp: i64,
        start_time: i64,
        end_time: i64,
    },

    #[error("timestamp {timestamp} is too far from series start {start_time} to address")]
    Unaddressable { timestamp: i64, start_time: i64 },

    #[error("interval {code} has a non-positive cadence of {duration_ms}ms")]
    InvalidCadence { code: String, duration_ms: i64 },

    #[error("corrupt series file {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("series not found: {0}")]
    NotFound(String),

    #[error("interval {0} is not in the catalog")]
    UnknownInterval(String),

    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A batch write that stopped partway.
///
/// Records before `written` are on disk and stay queryable.
#[derive(Debug, Error)]
#[error("batch stopped after {written} records: {source}")]
pub struct BatchError {
    pub written: usize,
    #[source]
    pub source: Error,
}

impl BatchError {
    pub fn new(written: usize, source: Error) -> Self {
        Self { written, source }
    }
}
