//! Interval bindings and the catalog that names them.
//!
//! An [`Interval`] pairs a short code (`"1m"`, `"1M"`, ...) with the
//! [`IndexingMethod`] that maps timestamps of that cadence to slots. The
//! code also names series files on disk, so it must be stable.

mod method;

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

pub use method::{CalendarMonth, FixedCadence, IndexingMethod};

pub const MILLISECOND: i64 = 1;
pub const SECOND: i64 = 1_000;
pub const MINUTE: i64 = 60 * SECOND;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;
pub const WEEK: i64 = 7 * DAY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    code: String,
    method: IndexingMethod,
}

impl Interval {
    pub fn new(code: impl Into<String>, method: IndexingMethod) -> Self {
        Self {
            code: code.into(),
            method,
        }
    }

    /// Uniform cadence of `duration_ms` milliseconds.
    ///
    /// # Panics
    ///
    /// Panics if `duration_ms` is not positive; see [`Interval::try_fixed`].
    pub fn fixed(code: impl Into<String>, duration_ms: i64) -> Self {
        Self::new(code, IndexingMethod::Fixed(FixedCadence::new(duration_ms)))
    }

    /// Like [`Interval::fixed`], for cadences read from configuration or
    /// user input.
    pub fn try_fixed(code: impl Into<String>, duration_ms: i64) -> Result<Self> {
        let code = code.into();
        match FixedCadence::try_new(duration_ms) {
            Some(cadence) => Ok(Self::new(code, IndexingMethod::Fixed(cadence))),
            None => Err(Error::InvalidCadence { code, duration_ms }),
        }
    }

    pub fn calendar_month(code: impl Into<String>) -> Self {
        Self::new(code, IndexingMethod::CalendarMonth(CalendarMonth))
    }

    pub fn one_minute() -> Self {
        Self::fixed("1m", MINUTE)
    }

    pub fn one_hour() -> Self {
        Self::fixed("1h", HOUR)
    }

    pub fn one_day() -> Self {
        Self::fixed("1d", DAY)
    }

    pub fn one_month() -> Self {
        Self::calendar_month("1M")
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn method(&self) -> &IndexingMethod {
        &self.method
    }

    pub fn index(&self, timestamp: i64) -> i64 {
        self.method.index(timestamp)
    }

    pub fn timestamp_of(&self, index: i64) -> i64 {
        self.method.timestamp_of(index)
    }

    pub fn count_in_range(&self, begin: i64, end: i64) -> i64 {
        self.method.count_in_range(begin, end)
    }

    pub fn is_aligned(&self, timestamp: i64) -> bool {
        self.method.is_aligned(timestamp)
    }

    pub fn offset(&self, timestamp: i64, intervals: i64) -> i64 {
        self.method.offset(timestamp, intervals)
    }

    pub fn floor(&self, timestamp: i64) -> i64 {
        self.method.floor(timestamp)
    }

    pub fn ceil(&self, timestamp: i64) -> i64 {
        self.method.ceil(timestamp)
    }

    pub fn checked_offset(&self, timestamp: i64, intervals: i64) -> Option<i64> {
        self.method.checked_offset(timestamp, intervals)
    }

    pub fn checked_ceil(&self, timestamp: i64) -> Option<i64> {
        self.method.checked_ceil(timestamp)
    }

    pub fn slots_between(&self, start: i64, timestamp: i64) -> Option<i64> {
        self.method.slots_between(start, timestamp)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Code-addressed set of intervals known to a store.
///
/// Bootstrap resolves the interval of each file through the catalog, so
/// every interval written through a store must be registered in it.
#[derive(Debug, Clone, Default)]
pub struct IntervalCatalog {
    intervals: HashMap<String, Interval>,
}

impl IntervalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Millisecond through one-week fixed cadences plus calendar months.
    pub fn standard() -> Self {
        Self::new()
            .with(Interval::fixed("1ms", MILLISECOND))
            .with(Interval::fixed("1s", SECOND))
            .with(Interval::one_minute())
            .with(Interval::fixed("3m", 3 * MINUTE))
            .with(Interval::fixed("5m", 5 * MINUTE))
            .with(Interval::fixed("15m", 15 * MINUTE))
            .with(Interval::fixed("30m", 30 * MINUTE))
            .with(Interval::one_hour())
            .with(Interval::fixed("2h", 2 * HOUR))
            .with(Interval::fixed("4h", 4 * HOUR))
            .with(Interval::fixed("6h", 6 * HOUR))
            .with(Interval::fixed("8h", 8 * HOUR))
            .with(Interval::fixed("12h", 12 * HOUR))
            .with(Interval::one_day())
            .with(Interval::fixed("3d", 3 * DAY))
            .with(Interval::fixed("1w", WEEK))
            .with(Interval::one_month())
    }

    /// Adds or replaces the interval registered under its code.
    pub fn with(mut self, interval: Interval) -> Self {
        self.insert(interval);
        self
    }

    pub fn insert(&mut self, interval: Interval) {
        self.intervals.insert(interval.code.clone(), interval);
    }

    pub fn get(&self, code: &str) -> Option<&Interval> {
        self.intervals.get(code)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}
