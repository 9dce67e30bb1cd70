//! Integration tests for the pipeline store and parallel processing.

use std::sync::Arc;
use std::thread;

use chanlun::prelude::*;

/// Deterministic wave with a per-instrument phase
fn wave(n: usize, phase: f64) -> Vec<Bar> {
    let mut prev = 50.0;
    (0..n)
        .map(|i| {
            let x = i as f64 + phase;
            let c = 50.0 + 6.0 * (x * 0.2).sin() + 2.0 * (x * 0.7).cos();
            let o = prev;
            prev = c;
            Bar::new(i as i64 * 300, o, o.max(c) + 0.2, o.min(c) - 0.2, c, 10.0)
        })
        .collect()
}

#[test]
fn test_process_parallel_matches_sequential() {
    let codes = ["SH.600000", "SZ.000001", "HK.00700", "US.MSFT"];
    let data: Vec<Vec<Bar>> = (0..codes.len()).map(|i| wave(300, i as f64 * 3.0)).collect();

    let store = ChanStore::new(ChanConfig::default()).unwrap();
    let batches: Vec<(&str, &str, &[Bar])> =
        codes.iter().zip(&data).map(|(code, bars)| (*code, "5m", bars.as_slice())).collect();
    let (ok, errors) = process_parallel(&store, batches);

    assert!(errors.is_empty());
    assert_eq!(ok.len(), codes.len());
    assert_eq!(store.len(), codes.len());

    for (code, bars) in codes.iter().zip(&data) {
        let sequential = ChanEngine::new(*code, "5m", ChanConfig::default()).unwrap();
        sequential.process(bars).unwrap();
        let parallel = store.get(code, "5m").unwrap();
        assert_eq!(parallel.get_strokes(), sequential.get_strokes());
        assert_eq!(parallel.get_segments(), sequential.get_segments());

        let result = ok.iter().find(|r| r.code == *code).unwrap();
        assert_eq!(result.summary.total_bars, 300);
    }
}

#[test]
fn test_process_parallel_reports_failures() {
    let store = ChanStore::new(ChanConfig::default()).unwrap();
    let good = wave(50, 0.0);
    let mut bad = wave(50, 1.0);
    bad[10].low = bad[10].high + 1.0;

    let (ok, errors) = process_parallel(
        &store,
        vec![("A", "d", good.as_slice()), ("B", "d", bad.as_slice())],
    );

    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].code, "A");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "B");
    assert!(matches!(errors[0].error, ChanError::InvalidBar { index: 10, .. }));
    assert!(store.get("B", "d").unwrap().get_bars().is_empty());
}

#[test]
fn test_readers_see_whole_snapshots() {
    let store = ChanStore::new(ChanConfig::default()).unwrap();
    let engine = store.get_or_create("X", "1m").unwrap();
    let bars = wave(400, 0.0);

    thread::scope(|s| {
        let writer = Arc::clone(&engine);
        let bars = &bars;
        s.spawn(move || {
            for chunk in bars.chunks(10) {
                writer.process(chunk).unwrap();
            }
        });

        for _ in 0..4 {
            let reader = Arc::clone(&engine);
            s.spawn(move || {
                for _ in 0..200 {
                    let snapshot = reader.snapshot();
                    let merged_bars: usize = snapshot.merged_bars.iter().map(|m| m.bar_count()).sum();
                    assert_eq!(merged_bars, snapshot.bars.len());
                    assert!(snapshot.verify(reader.config()).is_ok());
                }
            });
        }
    });

    assert_eq!(engine.get_bars().len(), 400);
}

#[test]
fn test_concurrent_writers_serialise() {
    let engine = Arc::new(ChanEngine::new("Y", "1m", ChanConfig::default()).unwrap());
    let bars = wave(100, 0.0);

    // same batch from several threads: exactly one wins, the rest are stale
    let outcomes: Vec<bool> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let bars = &bars;
                s.spawn(move || engine.process(bars).is_ok())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(engine.get_bars().len(), 100);
}
