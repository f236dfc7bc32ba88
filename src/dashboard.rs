//! Read-only dashboard views over the statistics aggregator.
//!
//! Each call takes one read-locked copy and shapes it for JSON; nothing here
//! mutates state or holds the lock beyond the copy.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;

use crate::detect::{ClassCounts, VehicleClass};
use crate::stats::StatsAggregator;

const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SnapshotView {
    pub total_detections: u64,
    pub vehicle_counts: ClassCounts,
    pub last_detection_time: Option<DateTime<Utc>>,
}

/// Arrays aligned by index over the bounded history window.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HistoryView {
    pub timestamps: Vec<String>,
    pub detections: Vec<u64>,
    pub vehicles: BTreeMap<&'static str, Vec<u64>>,
}

#[derive(Clone)]
pub struct Dashboard {
    stats: Arc<StatsAggregator>,
}

impl Dashboard {
    pub fn new(stats: Arc<StatsAggregator>) -> Self {
        Self { stats }
    }

    pub fn snapshot_view(&self) -> SnapshotView {
        let snapshot = self.stats.snapshot();
        SnapshotView {
            total_detections: snapshot.total_detections,
            vehicle_counts: snapshot.per_class,
            last_detection_time: snapshot.last_detection,
        }
    }

    /// History series with timestamps rendered in local time.
    pub fn history_view(&self) -> HistoryView {
        self.history_view_in(&Local)
    }

    /// History series with timestamps rendered in `tz`. Empty history yields
    /// empty arrays and no vehicle series at all.
    pub fn history_view_in<Tz>(&self, tz: &Tz) -> HistoryView
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let series = self.stats.history(&VehicleClass::ALL);
        if series.timestamps.is_empty() {
            return HistoryView::default();
        }
        HistoryView {
            timestamps: series
                .timestamps
                .iter()
                .map(|ts| ts.with_timezone(tz).format(TIME_FORMAT).to_string())
                .collect(),
            detections: series.detections,
            vehicles: series
                .per_class
                .into_iter()
                .map(|(class, values)| (class.name(), values))
                .collect(),
        }
    }
}
