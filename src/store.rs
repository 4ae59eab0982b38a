//! Series registry and the public write/query operations.
//!
//! # Design
//!
//! - **Registry**: `RwLock<HashMap<key, Arc<SeriesFile>>>`; lookups take the
//!   read lock, creation re-checks under the write lock
//! - **Series**: each [`SeriesFile`] guards its own state, so series never
//!   contend with each other once resolved
//! - **Bootstrap**: [`KlineStore::open`] rebuilds the registry from the
//!   file names and sizes under the storage root
//!
//! # Example
//!
//! ```no_run
//! use klinedb::{Interval, Kline, KlineStore, StoreConfig};
//!
//! let store = KlineStore::open(StoreConfig::new("./klines"))?;
//! let minute = Interval::one_minute();
//!
//! let t = 1_262_304_060_000;
//! store.write_batch("BTCUSDT", &minute, &[Kline::new(t)])?;
//! let klines = store.query_range("BTCUSDT", &minute, t, t)?;
//! assert_eq!(klines.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use log::{debug, info, warn};

use crate::codec::{Kline, KLINE_SIZE};
use crate::config::StoreConfig;
use crate::error::BatchError;
use crate::interval::{Interval, IntervalCatalog};
use crate::series::{
    parse_series_filename, series_key, split_series_filename, split_series_key, SeriesFile,
    SeriesInfo,
};
use crate::{Error, Result};

type Registry = HashMap<String, Arc<SeriesFile>>;

pub struct KlineStore {
    config: StoreConfig,
    catalog: IntervalCatalog,
    series: RwLock<Registry>,
}

impl KlineStore {
    /// Opens the store at `config.root` with the standard interval catalog.
    ///
    /// # Errors
    ///
    /// - `Error::Corrupt`: a series file is not a whole number of records
    /// - `Error::Io`: failed to create or scan the root directory
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_catalog(config, IntervalCatalog::standard())
    }

    pub fn open_with_catalog(config: StoreConfig, catalog: IntervalCatalog) -> Result<Self> {
        std::fs::create_dir_all(&config.root)?;
        let series = bootstrap(&config.root, &catalog)?;
        info!(
            "klinedb opened: root={} series={}",
            config.root.display(),
            series.len()
        );
        Ok(Self {
            config,
            catalog,
            series: RwLock::new(series),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn catalog(&self) -> &IntervalCatalog {
        &self.catalog
    }

    /// Writes a batch of records to the `(symbol, interval)` series,
    /// creating it on first use with the first record's timestamp as start.
    ///
    /// Returns the number of records written. An empty batch writes
    /// nothing and creates nothing.
    ///
    /// # Errors
    ///
    /// The error carries how many records were written before the failure.
    ///
    /// - `Error::InvalidSymbol`: symbol cannot be encoded in a file name
    /// - `Error::UnknownInterval`: interval is not in the store's catalog
    /// - `Error::Misaligned`: a timestamp is not on a slot boundary
    /// - `Error::OutOfOrder`: a timestamp precedes the series start
    /// - `Error::Io`: file creation or write failure
    pub fn write_batch(
        &self,
        symbol: &str,
        interval: &Interval,
        klines: &[Kline],
    ) -> std::result::Result<usize, BatchError> {
        let Some(first) = klines.first() else {
            return Ok(0);
        };
        self.check_interval(interval)
            .and_then(|()| check_symbol(symbol))
            .map_err(|err| BatchError::new(0, err))?;
        if !interval.is_aligned(first.timestamp) {
            return Err(BatchError::new(
                0,
                Error::Misaligned {
                    timestamp: first.timestamp,
                    interval: interval.code().to_string(),
                },
            ));
        }

        let series = self
            .get_or_create(symbol, interval, first.timestamp)
            .map_err(|err| BatchError::new(0, err))?;
        series.write_batch(
            klines,
            self.config.write_buffer_records,
            self.config.zero_fill_gaps,
        )
    }

    /// Returns the occupied records of `[begin, end]` in time order.
    ///
    /// Unaligned bounds are widened to slot boundaries. Holes are skipped.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRange`: `begin > end`
    /// - `Error::NotFound`: the series was never written
    /// - `Error::OutOfRange`: a bound lies outside the series
    /// - `Error::Misaligned`: a bound is not on a slot boundary
    /// - `Error::Io`: read failure
    pub fn query_range(
        &self,
        symbol: &str,
        interval: &Interval,
        begin: i64,
        end: i64,
    ) -> Result<Vec<Kline>> {
        if begin > end {
            return Err(Error::InvalidRange { begin, end });
        }
        let key = series_key(symbol, interval.code());
        let series = self.get(&key)?.ok_or(Error::NotFound(key))?;
        series.query(begin, end)
    }

    pub fn series_info(&self, symbol: &str, interval: &Interval) -> Result<Option<SeriesInfo>> {
        self.get(&series_key(symbol, interval.code()))?
            .map(|series| series.info())
            .transpose()
    }

    /// Registry keys in sorted order.
    pub fn series_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<_> = self.read_registry()?.keys().cloned().collect();
        keys.sort_unstable();
        Ok(keys)
    }

    /// Flushes every series file to stable storage.
    pub fn sync(&self) -> Result<()> {
        let series: Vec<_> = self.read_registry()?.values().cloned().collect();
        for file in series {
            file.sync()?;
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Arc<SeriesFile>>> {
        Ok(self.read_registry()?.get(key).cloned())
    }

    fn get_or_create(
        &self,
        symbol: &str,
        interval: &Interval,
        start_time: i64,
    ) -> Result<Arc<SeriesFile>> {
        let key = series_key(symbol, interval.code());
        if let Some(series) = self.get(&key)? {
            return Ok(series);
        }

        let mut registry = self
            .series
            .write()
            .map_err(|_| Error::LockPoisoned("series registry"))?;
        // Another writer may have created it between the two locks.
        if let Some(series) = registry.get(&key) {
            return Ok(Arc::clone(series));
        }

        let series = Arc::new(SeriesFile::create(
            &self.config.root,
            key.clone(),
            interval.clone(),
            start_time,
        )?);
        debug!(
            "series created: key={} path={}",
            key,
            series.path().display()
        );
        registry.insert(key, Arc::clone(&series));
        Ok(series)
    }

    fn check_interval(&self, interval: &Interval) -> Result<()> {
        match self.catalog.get(interval.code()) {
            Some(known) if known == interval => Ok(()),
            _ => Err(Error::UnknownInterval(interval.code().to_string())),
        }
    }

    fn read_registry(&self) -> Result<std::sync::RwLockReadGuard<'_, Registry>> {
        self.series
            .read()
            .map_err(|_| Error::LockPoisoned("series registry"))
    }
}

fn check_symbol(symbol: &str) -> Result<()> {
    if symbol.is_empty() || symbol.contains(['@', '/', '\\']) {
        return Err(Error::InvalidSymbol(symbol.to_string()));
    }
    Ok(())
}

/// Rebuilds the registry from the series files under `root`.
///
/// Names that are not series files are skipped. The first file whose
/// length is not a whole number of records aborts the scan.
fn bootstrap(root: &Path, catalog: &IntervalCatalog) -> Result<Registry> {
    let mut registry = Registry::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if split_series_filename(file_name).is_none() {
            continue;
        }
        // A torn file aborts startup even if its name is otherwise unusable.
        let len = entry.metadata()?.len();
        if len % KLINE_SIZE as u64 != 0 {
            return Err(Error::Corrupt {
                path,
                reason: format!("file size {len} is not a multiple of {KLINE_SIZE}"),
            });
        }

        let Some((key, start_time)) = parse_series_filename(file_name) else {
            warn!("skipping series file with unparsable start: {}", path.display());
            continue;
        };
        let Some(interval) = split_series_key(key).and_then(|(_, code)| catalog.get(code)) else {
            warn!("skipping series file with unknown interval: {}", path.display());
            continue;
        };
        if let Some(existing) = registry.get(key) {
            return Err(Error::Corrupt {
                path: path.clone(),
                reason: format!(
                    "series {key} already loaded from {}",
                    existing.path().display()
                ),
            });
        }

        let key = key.to_string();
        let series = SeriesFile::open(path, key.clone(), interval.clone(), start_time)?;
        debug!(
            "series loaded: key={} start={} end={}",
            key,
            start_time,
            series.info()?.end_time
        );
        registry.insert(key, Arc::new(series));
    }

    Ok(registry)
}
