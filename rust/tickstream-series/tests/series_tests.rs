//! End-to-end tests exercising the public series API.

use std::thread;

use tickstream_series::{GrowthPolicy, TickSeries};

#[test]
fn count_and_order_survive_many_growths() {
    let mut series = TickSeries::with_policy(GrowthPolicy::new());
    for i in 0..10_000u64 {
        series.append(i).unwrap();
    }
    assert_eq!(series.len(), 10_000);
    for i in 0..10_000u64 {
        assert_eq!(series.get(i), Some(&i));
    }
    assert_eq!(series.get(10_000), None);
    assert_eq!(series.get(u64::MAX), None);
}

#[test]
fn segment_count_is_bounded_by_the_growth_cap() {
    let policy = GrowthPolicy::new()
        .with_first_block_size(32)
        .with_max_block_size(100);
    let mut series = TickSeries::with_policy(policy);
    for i in 0..10_000u32 {
        series.append(i).unwrap();
    }
    // Ramp of 32 + 32 + 64 slots, then capped segments of 100.
    assert_eq!(series.segment_count(), 3 + (10_000usize - 128).div_ceil(100));
    assert_eq!(series.to_vec(), (0..10_000).collect::<Vec<_>>());
}

#[test]
fn snapshots_are_immutable_under_further_appends() {
    let mut series = TickSeries::with_capacity(8);
    for i in 0..50u32 {
        series.append(i).unwrap();
    }
    let snapshot = series.snapshot();
    for i in 50..100u32 {
        series.append(i).unwrap();
    }
    assert_eq!(snapshot.len(), 50);
    assert_eq!(snapshot.to_vec(), (0..50).collect::<Vec<_>>());
}

#[test]
fn clear_starts_the_series_fresh() {
    let mut series = TickSeries::with_capacity(10);
    for i in 0..1_000u32 {
        series.append(i).unwrap();
    }
    series.clear();
    for i in 0..5u32 {
        series.append(i).unwrap();
    }
    assert_eq!(series.to_vec(), vec![0, 1, 2, 3, 4]);

    // Forcing growth again behaves exactly like a brand-new series with the
    // same first capacity.
    let mut fresh = TickSeries::with_capacity(10);
    for i in 0..5u32 {
        fresh.append(i).unwrap();
    }
    for i in 5..1_000u32 {
        series.append(i).unwrap();
        fresh.append(i).unwrap();
    }
    assert_eq!(series.segment_count(), fresh.segment_count());
    assert_eq!(series.to_vec(), fresh.to_vec());
}

#[test]
fn materialization_round_trips_against_indexed_access() {
    let mut series = TickSeries::with_capacity(5);
    for i in 0..777u64 {
        series.append(i * 7).unwrap();
    }
    let materialized = series.to_vec();
    assert_eq!(materialized.len() as u64, series.len());
    for (i, value) in materialized.iter().enumerate() {
        assert_eq!(series.get(i as u64), Some(value));
    }
}

#[test]
fn ranged_find_checks_its_bounds() {
    let mut series = TickSeries::with_capacity(4);
    for i in 0..10u32 {
        series.append(i).unwrap();
    }
    assert!(series.find_index_in(11, 0, |_| true).is_err());
    assert!(series.find_index_in(0, 11, |_| true).is_err());
    assert_eq!(series.find_index_in(0, 10, |_| false).unwrap(), None);
    assert_eq!(series.find_index_in(0, 10, |&v| v == 7).unwrap(), Some(7));
}

#[test]
fn readers_observe_a_consistent_prefix_while_the_writer_appends() {
    const TOTAL: u64 = 200_000;

    let series = TickSeries::with_capacity(64);
    let reader = series.reader();
    let observers: Vec<_> = (0..2)
        .map(|_| {
            let reader = reader.clone();
            thread::spawn(move || {
                let mut last_len = 0u64;
                loop {
                    let snapshot = reader.snapshot();
                    let len = snapshot.len();
                    assert!(len >= last_len, "published count went backwards");
                    last_len = len;
                    // Every captured element must already hold its final
                    // value: the element at index i is i.
                    if len > 0 {
                        assert_eq!(snapshot.get(0), Some(&0));
                        assert_eq!(snapshot.get(len / 2), Some(&(len / 2)));
                        assert_eq!(snapshot.get(len - 1), Some(&(len - 1)));
                    }
                    if len == TOTAL {
                        return;
                    }
                    thread::yield_now();
                }
            })
        })
        .collect();

    let writer = thread::spawn(move || {
        let mut series = series;
        for i in 0..TOTAL {
            series.append(i).unwrap();
        }
        series
    });

    let series = writer.join().unwrap();
    for observer in observers {
        observer.join().unwrap();
    }
    assert_eq!(series.len(), TOTAL);
}

#[test]
fn snapshot_iteration_agrees_with_random_mirrors() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    for _ in 0..20 {
        let capacity = rng.usize(1..64);
        let count = rng.usize(0..2_000);
        let policy = GrowthPolicy::new().with_max_block_size(rng.usize(1..256));
        let mut series = TickSeries::with_capacity_and_policy(capacity, policy);
        let mut mirror = Vec::with_capacity(count);
        for _ in 0..count {
            let value = rng.u64(..);
            series.append(value).unwrap();
            mirror.push(value);
        }

        assert_eq!(series.to_vec(), mirror);
        let snapshot = series.snapshot();
        assert_eq!(snapshot.iter().copied().collect::<Vec<_>>(), mirror);
        for _ in 0..50 {
            let index = rng.u64(0..(count.max(1) as u64 + 10));
            assert_eq!(snapshot.get(index), mirror.get(index as usize));
        }
    }
}
