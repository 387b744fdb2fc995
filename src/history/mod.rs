// src/history/mod.rs

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One processed sample as kept in the rolling history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Seconds since session start (or since the last reset).
    pub timestamp: f64,
    pub raw_value: i32,
    /// Smoothed BPM at this point, 0.0 while there is no estimate yet.
    pub smoothed_bpm: f64,
}

/// A value derived from history by a filter, aligned with its source point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredSample {
    pub timestamp: f64,
    pub value: f64,
}

// ROLLING BUFFER --------------------------------------------------------------

/// Bounded FIFO of history points with non-decreasing timestamps.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a point, evicting the oldest one when full. Points older than
    /// the newest stored point are rejected and `false` is returned.
    pub fn push(&mut self, point: HistoryPoint) -> bool {
        if let Some(last) = self.points.back() {
            if point.timestamp < last.timestamp {
                log::warn!(
                    "rejecting out-of-order history point at {:.4}s (latest {:.4}s)",
                    point.timestamp,
                    last.timestamp
                );
                return false;
            }
        }

        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
        true
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryPoint> + '_ {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn time_range(&self) -> Option<(f64, f64)> {
        let min_time = self.points.front()?.timestamp;
        let max_time = self.points.back()?.timestamp;
        Some((min_time, max_time))
    }

    /// Points within `seconds` of the newest point, oldest first.
    pub fn window(&self, seconds: f64) -> Vec<HistoryPoint> {
        let Some((_, max_time)) = self.time_range() else {
            return Vec::new();
        };
        let start = (max_time - seconds).max(0.0);

        // timestamps are sorted, so the window is a suffix
        let first = self.points.partition_point(|p| p.timestamp < start);
        self.points.range(first..).copied().collect()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
