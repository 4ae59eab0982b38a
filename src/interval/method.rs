//! Timestamp/slot arithmetic for one cadence family.
//!
//! All timestamps are Unix milliseconds. A method never touches storage;
//! it only answers "which slot does this instant fall in" and the inverse.

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// Uniform cadence: every slot spans `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCadence {
    duration_ms: i64,
}

impl FixedCadence {
    /// # Panics
    ///
    /// Panics if `duration_ms` is not positive. Use [`try_new`] for
    /// cadences that come from input.
    ///
    /// [`try_new`]: FixedCadence::try_new
    pub const fn new(duration_ms: i64) -> Self {
        assert!(duration_ms > 0, "cadence must be positive");
        Self { duration_ms }
    }

    /// `None` if `duration_ms` is not positive.
    pub const fn try_new(duration_ms: i64) -> Option<Self> {
        if duration_ms > 0 {
            Some(Self { duration_ms })
        } else {
            None
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    pub fn index(&self, timestamp: i64) -> i64 {
        timestamp / self.duration_ms
    }

    pub fn timestamp_of(&self, index: i64) -> i64 {
        index * self.duration_ms
    }

    pub fn count_in_range(&self, begin: i64, end: i64) -> i64 {
        (end - begin) / self.duration_ms + 1
    }

    pub fn is_aligned(&self, timestamp: i64) -> bool {
        timestamp % self.duration_ms == 0
    }

    pub fn offset(&self, timestamp: i64, intervals: i64) -> i64 {
        timestamp + intervals * self.duration_ms
    }

    pub fn checked_offset(&self, timestamp: i64, intervals: i64) -> Option<i64> {
        intervals
            .checked_mul(self.duration_ms)
            .and_then(|delta| timestamp.checked_add(delta))
    }

    pub fn floor(&self, timestamp: i64) -> i64 {
        timestamp - timestamp % self.duration_ms
    }

    pub fn ceil(&self, timestamp: i64) -> i64 {
        let rem = timestamp % self.duration_ms;
        if rem != 0 {
            timestamp + self.duration_ms - rem
        } else {
            timestamp
        }
    }

    /// `None` when the next boundary is past `i64::MAX`.
    pub fn checked_ceil(&self, timestamp: i64) -> Option<i64> {
        let rem = timestamp % self.duration_ms;
        if rem > 0 {
            timestamp.checked_add(self.duration_ms - rem)
        } else {
            Some(self.ceil(timestamp))
        }
    }
}

/// Calendar months in UTC. Slots have variable length, so the
/// arithmetic goes through calendar fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarMonth;

impl CalendarMonth {
    /// `year * 12 + month`, with month numbered 1..=12.
    pub fn index(&self, timestamp: i64) -> i64 {
        let dt = to_datetime(timestamp);
        i64::from(dt.year()) * 12 + i64::from(u8::from(dt.month()))
    }

    /// First day of the month at midnight UTC.
    ///
    /// A zero remainder of `index % 12` normalizes to December of the
    /// previous year, which makes this the exact inverse of [`index`].
    ///
    /// [`index`]: CalendarMonth::index
    pub fn timestamp_of(&self, index: i64) -> i64 {
        first_of_month(index, Time::MIDNIGHT)
    }

    pub fn count_in_range(&self, begin: i64, end: i64) -> i64 {
        self.index(end) - self.index(begin) + 1
    }

    pub fn is_aligned(&self, _timestamp: i64) -> bool {
        true
    }

    /// Moves `intervals` months from the first day of `timestamp`'s month.
    ///
    /// Normalizing to day 1 first keeps Jan 31 + 1 month from rolling
    /// into March. Time of day is kept.
    pub fn offset(&self, timestamp: i64, intervals: i64) -> i64 {
        let dt = to_datetime(timestamp);
        first_of_month(self.index(timestamp) + intervals, dt.time()) + timestamp.rem_euclid(1000)
    }

    pub fn floor(&self, timestamp: i64) -> i64 {
        timestamp
    }

    pub fn ceil(&self, timestamp: i64) -> i64 {
        timestamp
    }
}

fn to_datetime(timestamp: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(timestamp.div_euclid(1000)).unwrap_or_else(|_| {
        if timestamp < 0 {
            PrimitiveDateTime::MIN.assume_utc()
        } else {
            PrimitiveDateTime::MAX.assume_utc()
        }
    })
}

fn to_millis(dt: OffsetDateTime) -> i64 {
    (dt.unix_timestamp_nanos() / 1_000_000) as i64
}

fn first_of_month(month_index: i64, time: Time) -> i64 {
    let zero_based = month_index - 1;
    let year = zero_based
        .div_euclid(12)
        .clamp(i64::from(Date::MIN.year()), i64::from(Date::MAX.year())) as i32;
    let month = Month::January.nth_next(zero_based.rem_euclid(12) as u8);
    let date = Date::from_calendar_date(year, month, 1).unwrap_or(Date::MIN);
    to_millis(PrimitiveDateTime::new(date, time).assume_utc())
}

/// Strategy selected once per [`Interval`](super::Interval).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingMethod {
    Fixed(FixedCadence),
    CalendarMonth(CalendarMonth),
}

impl IndexingMethod {
    pub fn index(&self, timestamp: i64) -> i64 {
        match self {
            IndexingMethod::Fixed(m) => m.index(timestamp),
            IndexingMethod::CalendarMonth(m) => m.index(timestamp),
        }
    }

    pub fn timestamp_of(&self, index: i64) -> i64 {
        match self {
            IndexingMethod::Fixed(m) => m.timestamp_of(index),
            IndexingMethod::CalendarMonth(m) => m.timestamp_of(index),
        }
    }

    pub fn count_in_range(&self, begin: i64, end: i64) -> i64 {
        match self {
            IndexingMethod::Fixed(m) => m.count_in_range(begin, end),
            IndexingMethod::CalendarMonth(m) => m.count_in_range(begin, end),
        }
    }

    pub fn is_aligned(&self, timestamp: i64) -> bool {
        match self {
            IndexingMethod::Fixed(m) => m.is_aligned(timestamp),
            IndexingMethod::CalendarMonth(m) => m.is_aligned(timestamp),
        }
    }

    pub fn offset(&self, timestamp: i64, intervals: i64) -> i64 {
        match self {
            IndexingMethod::Fixed(m) => m.offset(timestamp, intervals),
            IndexingMethod::CalendarMonth(m) => m.offset(timestamp, intervals),
        }
    }

    pub fn floor(&self, timestamp: i64) -> i64 {
        match self {
            IndexingMethod::Fixed(m) => m.floor(timestamp),
            IndexingMethod::CalendarMonth(m) => m.floor(timestamp),
        }
    }

    pub fn ceil(&self, timestamp: i64) -> i64 {
        match self {
            IndexingMethod::Fixed(m) => m.ceil(timestamp),
            IndexingMethod::CalendarMonth(m) => m.ceil(timestamp),
        }
    }

    pub fn checked_offset(&self, timestamp: i64, intervals: i64) -> Option<i64> {
        match self {
            IndexingMethod::Fixed(m) => m.checked_offset(timestamp, intervals),
            IndexingMethod::CalendarMonth(m) => Some(m.offset(timestamp, intervals)),
        }
    }

    pub fn checked_ceil(&self, timestamp: i64) -> Option<i64> {
        match self {
            IndexingMethod::Fixed(m) => m.checked_ceil(timestamp),
            IndexingMethod::CalendarMonth(m) => Some(m.ceil(timestamp)),
        }
    }

    /// Zero-based slot of `timestamp` in a series starting at `start`.
    ///
    /// Fixed cadences index the elapsed time directly. Calendar months
    /// index both ends, since elapsed milliseconds do not map to months.
    /// `None` when the elapsed time does not fit in an `i64`.
    pub fn slots_between(&self, start: i64, timestamp: i64) -> Option<i64> {
        match self {
            IndexingMethod::Fixed(m) => timestamp.checked_sub(start).map(|elapsed| m.index(elapsed)),
            IndexingMethod::CalendarMonth(m) => Some(m.index(timestamp) - m.index(start)),
        }
    }
}
