use std::fs::OpenOptions;
use std::io::Write;

use klinedb::interval::{HOUR, MINUTE};
use klinedb::{Error, Interval, Kline, KlineStore, StoreConfig};
use tempfile::tempdir;

const BASE: i64 = 1_262_304_000_000;

fn kline(timestamp: i64, deal_count: i64) -> Kline {
    Kline {
        deal_count,
        close: deal_count as f64,
        ..Kline::new(timestamp)
    }
}

#[test]
fn reopen_restores_series_bounds() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let minute = Interval::one_minute();
    let hour = Interval::one_hour();

    let (minute_info, hour_info) = {
        let store = KlineStore::open(StoreConfig::new(dir.path()))?;
        store.write_batch("BTCUSDT", &minute, &[kline(BASE, 1), kline(BASE + 9 * MINUTE, 2)])?;
        store.write_batch("ETHUSDT", &hour, &[kline(BASE + HOUR, 3)])?;
        store.sync()?;
        (
            store.series_info("BTCUSDT", &minute)?,
            store.series_info("ETHUSDT", &hour)?,
        )
    };

    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    assert_eq!(
        store.series_keys()?,
        vec!["BTCUSDT-1m".to_string(), "ETHUSDT-1h".to_string()]
    );
    assert_eq!(store.series_info("BTCUSDT", &minute)?, minute_info);
    assert_eq!(store.series_info("ETHUSDT", &hour)?, hour_info);

    let list = store.query_range("BTCUSDT", &minute, BASE, BASE + 9 * MINUTE)?;
    assert_eq!(list, vec![kline(BASE, 1), kline(BASE + 9 * MINUTE, 2)]);
    Ok(())
}

#[test]
fn reopened_series_appends_at_the_end() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let minute = Interval::one_minute();
    {
        let store = KlineStore::open(StoreConfig::new(dir.path()))?;
        store.write_batch("BTCUSDT", &minute, &[kline(BASE, 1), kline(BASE + MINUTE, 2)])?;
    }

    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    store.write_batch("BTCUSDT", &minute, &[kline(BASE + 2 * MINUTE, 3)])?;

    let list = store.query_range("BTCUSDT", &minute, BASE, BASE + 2 * MINUTE)?;
    let counts: Vec<_> = list.iter().map(|k| k.deal_count).collect();
    assert_eq!(counts, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn torn_file_aborts_open() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let minute = Interval::one_minute();
    let path = {
        let store = KlineStore::open(StoreConfig::new(dir.path()))?;
        store.write_batch("BTCUSDT", &minute, &[kline(BASE, 1)])?;
        store.series_info("BTCUSDT", &minute)?.expect("series").path
    };
    OpenOptions::new().append(true).open(&path)?.write_all(b"torn")?;

    let err = KlineStore::open(StoreConfig::new(dir.path())).err().expect("corrupt");
    assert!(matches!(err, Error::Corrupt { .. }));
    Ok(())
}

#[test]
fn open_creates_missing_root() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let root = dir.path().join("nested").join("klines");

    let store = KlineStore::open(StoreConfig::new(&root))?;
    assert!(root.is_dir());
    assert!(store.series_keys()?.is_empty());
    Ok(())
}
