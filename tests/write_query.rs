use klinedb::interval::MINUTE;
use klinedb::{Error, Interval, Kline, KlineStore, StoreConfig};
use tempfile::tempdir;

// 2010-01-01 00:00 at UTC+8
const BASE: i64 = 1_262_275_200_000;

fn kline(timestamp: i64, deal_count: i64) -> Kline {
    Kline {
        deal_count,
        open: 0.1 * deal_count as f64,
        close: 0.2 * deal_count as f64,
        high: 0.3 * deal_count as f64,
        low: 0.05 * deal_count as f64,
        volume: 1_000.5,
        quote_volume: 20_010.25,
        ..Kline::new(timestamp)
    }
}

#[test]
fn single_record_round_trip() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let minute = Interval::one_minute();
    let t = minute.offset(BASE, 1);
    let item = kline(t, 9_999_998);

    assert_eq!(store.write_batch("BTCUSDT", &minute, &[item])?, 1);

    let list = store.query_range("BTCUSDT", &minute, t, t)?;
    assert_eq!(list, vec![item]);
    Ok(())
}

#[test]
fn holes_are_skipped() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let minute = Interval::one_minute();

    store.write_batch("BTCUSDT", &minute, &[kline(minute.offset(BASE, 1), 1)])?;
    let item1 = kline(minute.offset(BASE, 100), 1_335_345_436);
    let item2 = kline(minute.offset(BASE, 105), 55_555_555);
    assert_eq!(store.write_batch("BTCUSDT", &minute, &[item1, item2])?, 2);

    let list = store.query_range("BTCUSDT", &minute, item1.timestamp, item2.timestamp)?;
    assert_eq!(list, vec![item1, item2]);

    let info = store.series_info("BTCUSDT", &minute)?.expect("series");
    assert_eq!(info.start_time, minute.offset(BASE, 1));
    assert_eq!(info.end_time, item2.timestamp);
    assert_eq!(info.slots, 105);
    Ok(())
}

#[test]
fn query_aligns_unaligned_bounds() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let minute = Interval::one_minute();
    let batch: Vec<_> = (0..5).map(|i| kline(BASE + i * MINUTE, i)).collect();
    store.write_batch("BTCUSDT", &minute, &batch)?;

    let list = store.query_range("BTCUSDT", &minute, BASE + MINUTE + 1, BASE + 3 * MINUTE - 1)?;
    assert_eq!(list, batch[1..4].to_vec());
    Ok(())
}

#[test]
fn reversed_range_is_rejected() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let minute = Interval::one_minute();
    store.write_batch("BTCUSDT", &minute, &[kline(BASE, 1), kline(BASE + MINUTE, 2)])?;

    let err = store
        .query_range("BTCUSDT", &minute, BASE + MINUTE, BASE)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRange { .. }));

    // Rejected before alignment even when both round to the same slot.
    let err = store
        .query_range("BTCUSDT", &minute, BASE + 2, BASE + 1)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRange { .. }));

    // And before the series lookup.
    let err = store.query_range("NOPE", &minute, 2, 1).unwrap_err();
    assert!(matches!(err, Error::InvalidRange { .. }));
    Ok(())
}

#[test]
fn query_outside_series_is_rejected() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let minute = Interval::one_minute();
    store.write_batch("BTCUSDT", &minute, &[kline(BASE, 1), kline(BASE + MINUTE, 2)])?;

    let before = store.query_range("BTCUSDT", &minute, BASE - MINUTE, BASE);
    assert!(matches!(before, Err(Error::OutOfRange { .. })));

    let after = store.query_range("BTCUSDT", &minute, BASE, BASE + 2 * MINUTE);
    assert!(matches!(after, Err(Error::OutOfRange { .. })));
    Ok(())
}

#[test]
fn unknown_series_is_not_found() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;

    let err = store
        .query_range("ETHUSDT", &Interval::one_minute(), BASE, BASE)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(ref key) if key == "ETHUSDT-1m"));
    Ok(())
}

#[test]
fn misaligned_write_is_rejected() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let minute = Interval::one_minute();
    store.write_batch("BTCUSDT", &minute, &[kline(BASE, 1)])?;

    let err = store
        .write_batch("BTCUSDT", &minute, &[kline(BASE + MINUTE + 30_000, 2)])
        .unwrap_err();
    assert_eq!(err.written, 0);
    assert!(matches!(err.source, Error::Misaligned { .. }));
    Ok(())
}

#[test]
fn write_before_start_leaves_series_untouched() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let minute = Interval::one_minute();
    store.write_batch("BTCUSDT", &minute, &[kline(BASE, 1), kline(BASE + MINUTE, 2)])?;
    let before = store.series_info("BTCUSDT", &minute)?;

    let err = store
        .write_batch("BTCUSDT", &minute, &[kline(BASE - MINUTE, 3)])
        .unwrap_err();
    assert_eq!(err.written, 0);
    assert!(matches!(err.source, Error::OutOfOrder { .. }));

    assert_eq!(store.series_info("BTCUSDT", &minute)?, before);
    let path = before.expect("series").path;
    assert_eq!(std::fs::metadata(path)?.len(), 2 * 64);
    Ok(())
}

#[test]
fn far_future_write_is_rejected_and_series_stays_usable() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let millis = Interval::fixed("1ms", 1);
    store.write_batch("X", &millis, &[Kline::new(0)])?;

    let err = store
        .write_batch("X", &millis, &[Kline::new(i64::MAX)])
        .unwrap_err();
    assert_eq!(err.written, 0);
    assert!(matches!(err.source, Error::Unaddressable { .. }));

    assert_eq!(store.write_batch("X", &millis, &[Kline::new(2)])?, 1);
    let list = store.query_range("X", &millis, 0, 2)?;
    assert_eq!(list, vec![Kline::new(0), Kline::new(2)]);

    let err = store.query_range("X", &millis, 0, i64::MAX).unwrap_err();
    assert!(matches!(err, Error::OutOfRange { .. }));
    Ok(())
}

#[test]
fn batch_may_be_unordered_after_start() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let minute = Interval::one_minute();
    let batch = [
        kline(BASE, 0),
        kline(BASE + 3 * MINUTE, 3),
        kline(BASE + MINUTE, 1),
        kline(BASE + 2 * MINUTE, 2),
    ];

    assert_eq!(store.write_batch("BTCUSDT", &minute, &batch)?, 4);

    let list = store.query_range("BTCUSDT", &minute, BASE, BASE + 3 * MINUTE)?;
    let counts: Vec<_> = list.iter().map(|k| k.deal_count).collect();
    assert_eq!(counts, vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn large_batch_spans_buffer_flushes() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()).with_write_buffer_records(64))?;
    let minute = Interval::one_minute();
    let batch: Vec<_> = (0..1_000).map(|i| kline(BASE + i * MINUTE, i)).collect();

    assert_eq!(store.write_batch("BTCUSDT", &minute, &batch)?, 1_000);

    let list = store.query_range("BTCUSDT", &minute, BASE, BASE + 999 * MINUTE)?;
    assert_eq!(list, batch);
    let middle = store.query_range("BTCUSDT", &minute, BASE + 500 * MINUTE, BASE + 509 * MINUTE)?;
    assert_eq!(middle, batch[500..510].to_vec());
    Ok(())
}

#[test]
fn monthly_series() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = KlineStore::open(StoreConfig::new(dir.path()))?;
    let month = Interval::one_month();
    // 2019-11-01T00:00:00Z
    let nov = 1_572_566_400_000;
    let dec = month.offset(nov, 1);
    let feb = month.offset(nov, 3);

    store.write_batch("BTCUSDT", &month, &[kline(nov, 1), kline(dec, 2), kline(feb, 4)])?;

    let list = store.query_range("BTCUSDT", &month, nov, feb)?;
    let stamps: Vec<_> = list.iter().map(|k| k.timestamp).collect();
    assert_eq!(stamps, vec![nov, dec, feb]);
    assert_eq!(store.series_info("BTCUSDT", &month)?.expect("series").slots, 4);
    Ok(())
}
