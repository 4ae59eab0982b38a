//! Fixed-cadence positional store for OHLCV kline series.
//!
//! Each (symbol, interval) pair maps to one file of 64-byte slots. A
//! record's slot is computed from its timestamp, so writes and range
//! reads address the file directly instead of searching an index.

pub mod codec;
pub mod config;
pub mod error;
pub mod interval;
pub mod series;
pub mod store;

pub use codec::{Kline, FLAG_OCCUPIED, KLINE_SIZE};
pub use config::StoreConfig;
pub use error::{BatchError, Error, Result};
pub use interval::{CalendarMonth, FixedCadence, IndexingMethod, Interval, IntervalCatalog};
pub use series::SeriesInfo;
pub use store::KlineStore;
