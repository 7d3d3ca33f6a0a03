//! Scan-deferred mutation under real threads

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, Utc};
use multisensor_skeleton_fusion_rs::scenario::standing_skeleton;
use multisensor_skeleton_fusion_rs::{
    CollectionError, FusionConfig, ManualClock, MergeOutcome, ScanCollection, SkeletonFusionEngine,
};
use nalgebra::Point3;

fn t(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(ms)
}

#[test]
fn mutations_from_many_threads_wait_for_the_scan() {
    let collection = ScanCollection::new(64);
    for v in 0..10u32 {
        collection.add(v).unwrap();
    }

    let scan = collection.begin_scan();
    thread::scope(|s| {
        for worker in 0..4u32 {
            let collection = &collection;
            s.spawn(move || {
                // Overlapping removals: indices 0..=4 in total
                collection.remove_at(worker as usize).unwrap();
                collection.remove_at(worker as usize + 1).unwrap();
                for k in 0..10 {
                    collection.add(100 * (worker + 1) + k).unwrap();
                }
            });
        }
    });

    // Nothing visible has changed while the scan is alive
    assert_eq!(collection.len(), 10);
    let seen: Vec<u32> = scan.iter().map(|v| **v).collect();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
    assert_eq!(collection.pending(), 45);

    drop(scan);
    assert_eq!(collection.pending(), 0);
    assert_eq!(collection.len(), 45);

    let values: Vec<u32> = collection.snapshot().iter().map(|v| **v).collect();
    assert_eq!(&values[..5], &[5, 6, 7, 8, 9]);
    let mut added = values[5..].to_vec();
    added.sort_unstable();
    let mut expected: Vec<u32> = (1..=4).flat_map(|w| (0..10).map(move |k| 100 * w + k)).collect();
    expected.sort_unstable();
    assert_eq!(added, expected);
}

#[test]
fn visible_length_is_stable_inside_every_scan() {
    let collection = ScanCollection::new(1024);
    thread::scope(|s| {
        for worker in 0..4u32 {
            let collection = &collection;
            s.spawn(move || {
                for k in 0..50 {
                    collection.add(worker * 1000 + k).unwrap();
                    thread::yield_now();
                }
            });
        }
        for _ in 0..2 {
            let collection = &collection;
            s.spawn(move || {
                for _ in 0..200 {
                    let scan = collection.begin_scan();
                    let before = collection.len();
                    thread::yield_now();
                    assert_eq!(collection.len(), before);
                    assert_eq!(scan.len(), before);
                }
            });
        }
    });

    assert_eq!(collection.active_scans(), 0);
    assert_eq!(collection.pending(), 0);
    assert_eq!(collection.len(), 200);
}

#[test]
fn pending_growth_is_bounded() {
    let collection = ScanCollection::new(2);
    collection.add(0u32).unwrap();
    collection.add(1u32).unwrap();

    let scan = collection.begin_scan();
    collection.add(2).unwrap();
    collection.remove_at(0).unwrap();
    // Re-queuing a removal does not count twice
    collection.remove_at(0).unwrap();
    assert_eq!(collection.add(3), Err(CollectionError::PendingOverflow { limit: 2 }));
    assert_eq!(collection.remove_at(1), Err(CollectionError::PendingOverflow { limit: 2 }));
    assert_eq!(collection.remove_at(7), Err(CollectionError::OutOfBounds { index: 7, len: 2 }));
    drop(scan);

    let values: Vec<u32> = collection.snapshot().iter().map(|v| **v).collect();
    assert_eq!(values, vec![1, 2]);
}

#[test]
fn sensors_merge_while_publisher_predicts() {
    let clock = Arc::new(ManualClock::new(t(0)));
    let engine = Arc::new(
        SkeletonFusionEngine::with_clock(FusionConfig::default(), clock.clone()).expect("default configuration"),
    );

    let roots = [-2.0, 0.0, 2.0];
    for (id, x) in roots.iter().enumerate() {
        let seed = standing_skeleton("seed", id as u64, Point3::new(*x, 0.9, 3.0), t(0));
        assert!(matches!(engine.merge_skeleton(&seed), MergeOutcome::Created { .. }));
    }

    let sensors: Vec<_> = roots
        .iter()
        .enumerate()
        .map(|(id, &x)| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut matched = 0;
                for k in 1..=100 {
                    let obs = standing_skeleton(&format!("k{}", id), id as u64, Point3::new(x, 0.9, 3.0), t(33 * k));
                    if matches!(engine.merge_skeleton(&obs), MergeOutcome::Matched { .. }) {
                        matched += 1;
                    }
                }
                matched
            })
        })
        .collect();

    let publisher = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let mut largest = 0;
            for _ in 0..200 {
                largest = largest.max(engine.get_all_predicted_skeletons(0.033).len());
                thread::yield_now();
            }
            largest
        })
    };

    for handle in sensors {
        assert_eq!(handle.join().unwrap(), 100);
    }
    assert_eq!(publisher.join().unwrap(), 3);
    assert_eq!(engine.len(), 3);
    assert_eq!(engine.pending_mutations(), 0);
}
