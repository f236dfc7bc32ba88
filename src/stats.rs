//! Process-wide detection statistics.
//!
//! `StatsAggregator` is the only shared mutable state in the pipeline. One
//! `RwLock` guards the counters and the history ring together, so a reader
//! sees every `record` either fully applied or not at all.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detect::{ClassCounts, DetectionBatch, VehicleClass};

/// Maximum number of history entries retained.
pub const HISTORY_CAPACITY: usize = 100;

/// Summary of one recorded batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub detection_count: u64,
    pub per_class: ClassCounts,
}

/// Point-in-time copy of the aggregate.
///
/// `total_detections` equals the sum of `history[..].detection_count` only
/// until the ring first evicts; cumulative totals are never decremented.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub total_detections: u64,
    pub per_class: ClassCounts,
    pub last_detection: Option<DateTime<Utc>>,
    pub history: Vec<HistoryEntry>,
}

/// Per-class series aligned with the history timestamps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistorySeries {
    pub timestamps: Vec<DateTime<Utc>>,
    pub detections: Vec<u64>,
    pub per_class: BTreeMap<VehicleClass, Vec<u64>>,
}

#[derive(Default)]
struct StatsState {
    total_detections: u64,
    per_class: ClassCounts,
    last_detection: Option<DateTime<Utc>>,
    history: VecDeque<HistoryEntry>,
}

pub struct StatsAggregator {
    state: RwLock<StatsState>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StatsState {
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
                ..StatsState::default()
            }),
        }
    }

    /// Apply one batch: totals, per-class counters, last timestamp and a new
    /// history entry, all under a single write lock.
    pub fn record(&self, batch: &DetectionBatch) {
        let counts = batch.counts();
        let entry = HistoryEntry {
            timestamp: batch.timestamp,
            detection_count: batch.len() as u64,
            per_class: counts,
        };

        let mut state = self.write_state();
        state.total_detections = state.total_detections.saturating_add(entry.detection_count);
        state.per_class.merge(&counts);
        state.last_detection = Some(batch.timestamp);
        while state.history.len() >= HISTORY_CAPACITY {
            state.history.pop_front();
        }
        state.history.push_back(entry);
    }

    pub fn snapshot(&self) -> AggregateStats {
        let state = self.read_state();
        AggregateStats {
            total_detections: state.total_detections,
            per_class: state.per_class,
            last_detection: state.last_detection,
            history: state.history.iter().cloned().collect(),
        }
    }

    /// Series for the requested classes, one value per held history entry.
    /// Classes absent from an entry count as zero.
    pub fn history(&self, classes: &[VehicleClass]) -> HistorySeries {
        let state = self.read_state();
        let mut series = HistorySeries {
            timestamps: Vec::with_capacity(state.history.len()),
            detections: Vec::with_capacity(state.history.len()),
            per_class: classes
                .iter()
                .map(|class| (*class, Vec::with_capacity(state.history.len())))
                .collect(),
        };
        for entry in &state.history {
            series.timestamps.push(entry.timestamp);
            series.detections.push(entry.detection_count);
            for (class, values) in series.per_class.iter_mut() {
                values.push(entry.per_class.get(*class));
            }
        }
        series
    }

    /// Clear counters and history. Interactive modes only.
    pub fn reset(&self) {
        let mut state = self.write_state();
        state.total_detections = 0;
        state.per_class = ClassCounts::default();
        state.last_detection = None;
        state.history.clear();
        log::info!("statistics reset");
    }

    /// Cumulative per-class counters without copying the history ring.
    pub fn cumulative(&self) -> ClassCounts {
        self.read_state().per_class
    }

    pub fn history_len(&self) -> usize {
        self.read_state().history.len()
    }

    // Poisoning is recovered: every critical section leaves the state consistent.
    fn read_state(&self) -> RwLockReadGuard<'_, StatsState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StatsState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{admit, BoundingBox, RawDetection};
    use chrono::TimeZone;

    fn batch(index: u64, class_ids: &[u32]) -> DetectionBatch {
        let raw: Vec<_> = class_ids
            .iter()
            .map(|id| RawDetection::new(*id, 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)))
            .collect();
        let ts = Utc.timestamp_opt(1_700_000_000 + index as i64, 0).unwrap();
        DetectionBatch::new(index, ts, admit(&raw, 100, 100))
    }

    #[test]
    fn record_updates_every_field() {
        let stats = StatsAggregator::new();
        let b = batch(1, &[2, 2, 7]);
        stats.record(&b);

        let snap = stats.snapshot();
        assert_eq!(snap.total_detections, 3);
        assert_eq!(snap.per_class.car, 2);
        assert_eq!(snap.per_class.truck, 1);
        assert_eq!(snap.last_detection, Some(b.timestamp));
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].detection_count, 3);
    }

    #[test]
    fn empty_batches_still_enter_history() {
        let stats = StatsAggregator::new();
        stats.record(&batch(0, &[]));
        let snap = stats.snapshot();
        assert_eq!(snap.total_detections, 0);
        assert_eq!(snap.history.len(), 1);
        assert!(snap.last_detection.is_some());
    }

    #[test]
    fn history_is_bounded_and_evicts_oldest_first() {
        let stats = StatsAggregator::new();
        for i in 0..(HISTORY_CAPACITY as u64 + 1) {
            stats.record(&batch(i, &[5]));
            assert!(stats.history_len() <= HISTORY_CAPACITY);
        }
        let snap = stats.snapshot();
        assert_eq!(snap.history.len(), HISTORY_CAPACITY);
        let first_ts = batch(0, &[]).timestamp;
        assert!(snap.history.iter().all(|e| e.timestamp != first_ts));
        assert_eq!(snap.history[0].timestamp, batch(1, &[]).timestamp);
        // cumulative total keeps counting past eviction
        assert_eq!(snap.total_detections, HISTORY_CAPACITY as u64 + 1);
        let windowed: u64 = snap.history.iter().map(|e| e.detection_count).sum();
        assert_eq!(windowed, HISTORY_CAPACITY as u64);
    }

    #[test]
    fn total_matches_history_sum_before_eviction() {
        let stats = StatsAggregator::new();
        for i in 0..40 {
            let ids: Vec<u32> = (0..(i % 4)).map(|_| 3).collect();
            stats.record(&batch(i, &ids));
        }
        let snap = stats.snapshot();
        let windowed: u64 = snap.history.iter().map(|e| e.detection_count).sum();
        assert_eq!(snap.total_detections, windowed);
    }

    #[test]
    fn history_series_aligns_and_defaults_missing_classes() {
        let stats = StatsAggregator::new();
        stats.record(&batch(0, &[2]));
        stats.record(&batch(1, &[5, 5]));
        stats.record(&batch(2, &[]));

        let series = stats.history(&VehicleClass::ALL);
        assert_eq!(series.timestamps.len(), 3);
        assert_eq!(series.detections, vec![1, 2, 0]);
        assert_eq!(series.per_class[&VehicleClass::Car], vec![1, 0, 0]);
        assert_eq!(series.per_class[&VehicleClass::Bus], vec![0, 2, 0]);
        assert_eq!(series.per_class[&VehicleClass::Truck], vec![0, 0, 0]);

        let only_bus = stats.history(&[VehicleClass::Bus]);
        assert_eq!(only_bus.per_class.len(), 1);
    }

    #[test]
    fn reset_clears_counters_and_history() {
        let stats = StatsAggregator::new();
        stats.record(&batch(0, &[2, 3]));
        stats.reset();
        assert_eq!(stats.snapshot(), AggregateStats::default());
        stats.record(&batch(1, &[7]));
        assert_eq!(stats.snapshot().total_detections, 1);
    }
}
