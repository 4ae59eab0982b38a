//! Store configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Configuration for a [`KlineStore`](crate::KlineStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one file per series.
    pub root: PathBuf,

    /// Records buffered by a batch write before it hits the file.
    /// Default: 4096 (256 KiB)
    #[serde(default = "default_write_buffer_records")]
    pub write_buffer_records: usize,

    /// Extend the file with explicit zeros before seeking past its end.
    /// Needed on storage that does not zero-fill sparse regions.
    /// Default: false
    #[serde(default)]
    pub zero_fill_gaps: bool,
}

fn default_write_buffer_records() -> usize {
    4096
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/klinedb"),
            write_buffer_records: default_write_buffer_records(),
            zero_fill_gaps: false,
        }
    }
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Reads a JSON config file.
    ///
    /// # Errors
    ///
    /// - `Error::Io`: the file cannot be read or is not valid config JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let config = serde_json::from_slice(&bytes).map_err(std::io::Error::from)?;
        Ok(config)
    }

    pub fn with_write_buffer_records(mut self, records: usize) -> Self {
        self.write_buffer_records = records.max(1);
        self
    }

    pub fn with_zero_fill_gaps(mut self, enabled: bool) -> Self {
        self.zero_fill_gaps = enabled;
        self
    }
}
