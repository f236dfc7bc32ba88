use chrono::Utc;
use std::sync::{Arc, Barrier};
use std::thread;

use vehicle_watch::{
    admit, BoundingBox, DetectionBatch, RawDetection, StatsAggregator, VehicleClass,
    HISTORY_CAPACITY,
};

const THREADS: usize = 8;
const BATCHES_PER_THREAD: usize = 250;

fn batch(index: u64, class_id: u32) -> DetectionBatch {
    let raw = [RawDetection::new(
        class_id,
        0.9,
        BoundingBox::new(1.0, 1.0, 20.0, 20.0),
    )];
    DetectionBatch::new(index, Utc::now(), admit(&raw, 64, 64))
}

#[test]
fn concurrent_records_are_never_lost() {
    let stats = Arc::new(StatsAggregator::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let stats = Arc::clone(&stats);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let class_id = if worker % 2 == 0 { 2 } else { 7 };
                barrier.wait();
                for i in 0..BATCHES_PER_THREAD {
                    stats.record(&batch(i as u64, class_id));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let snapshot = stats.snapshot();
    let expected = (THREADS * BATCHES_PER_THREAD) as u64;
    assert_eq!(snapshot.total_detections, expected);
    assert_eq!(snapshot.per_class.car, expected / 2);
    assert_eq!(snapshot.per_class.truck, expected / 2);
    assert_eq!(snapshot.per_class.total(), snapshot.total_detections);
    assert_eq!(snapshot.history.len(), HISTORY_CAPACITY);
}

#[test]
fn readers_always_see_consistent_snapshots() {
    let stats = Arc::new(StatsAggregator::new());
    let writer = {
        let stats = Arc::clone(&stats);
        thread::spawn(move || {
            for i in 0..2_000u64 {
                stats.record(&batch(i, 3));
            }
        })
    };

    let mut last_total = 0;
    while !writer.is_finished() {
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.per_class.total(), snapshot.total_detections);
        assert!(snapshot.history.len() <= HISTORY_CAPACITY);
        assert!(snapshot.total_detections >= last_total);
        last_total = snapshot.total_detections;

        let series = stats.history(&[VehicleClass::Motorcycle]);
        assert_eq!(series.timestamps.len(), series.detections.len());
        assert_eq!(series.per_class[&VehicleClass::Motorcycle], series.detections);
    }
    writer.join().unwrap();
    assert_eq!(stats.snapshot().total_detections, 2_000);
}

#[test]
fn reset_racing_records_leaves_a_coherent_state() {
    let stats = Arc::new(StatsAggregator::new());
    let barrier = Arc::new(Barrier::new(3));

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let stats = Arc::clone(&stats);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..500u64 {
                    stats.record(&batch(i, 5));
                }
            })
        })
        .collect();
    barrier.wait();
    for _ in 0..20 {
        stats.reset();
        thread::yield_now();
    }
    for writer in writers {
        writer.join().unwrap();
    }

    let snapshot = stats.snapshot();
    assert!(snapshot.total_detections <= 1_000);
    assert_eq!(snapshot.per_class.bus, snapshot.total_detections);
    if snapshot.history.len() < HISTORY_CAPACITY {
        // Nothing evicted since the last reset, so the ring still covers every record.
        let held: u64 = snapshot.history.iter().map(|e| e.detection_count).sum();
        assert_eq!(held, snapshot.total_detections);
    }

    stats.reset();
    let cleared = stats.snapshot();
    assert_eq!(cleared.total_detections, 0);
    assert!(cleared.history.is_empty());
    assert_eq!(cleared.last_detection, None);
}
