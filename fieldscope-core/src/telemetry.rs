//! Telemetry aggregation and chart derivation
//!
//! One bounded history buffer per series key (sensor type, or sensor type
//! plus sensor id when configured). Chart series are derived from buffer
//! state as a pure function: readings are bucketed by timestamp truncated
//! to the second, bucket values are averaged and rounded to 2 decimals,
//! and buckets come out sorted ascending by time. Each series carries a
//! display color derived deterministically from its key and the unit of
//! the first reading seen for that key.
//!
//! Derivation is memoized on a content hash of the buffers, so repeated
//! reads between pushes cost one hash pass instead of a resort.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, VecDeque};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::TelemetryConfig;
use crate::types::Reading;

/// Normalize a series key: lowercase, spaces become underscores.
///
/// Keeps casing and spacing drift in the sensor-type tag from splitting
/// one logical series into several.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

// ============================================
// History buffers
// ============================================

#[derive(Debug, Clone)]
struct HistoryEntry {
    timestamp: DateTime<Utc>,
    value: f64,
}

/// Bounded reading history for one series.
///
/// Pushing beyond capacity evicts the oldest entry. The unit is pinned to
/// the first reading ever seen for the series and survives eviction.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    unit: String,
}

impl HistoryBuffer {
    fn new(capacity: usize, unit: String) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            unit,
        }
    }

    /// Append a reading, evicting the oldest entry at capacity. A zero
    /// capacity drops everything.
    fn push(&mut self, timestamp: DateTime<Utc>, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { timestamp, value });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unit of the first reading seen for this series.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Values in arrival order, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|entry| entry.value)
    }
}

// ============================================
// Derived chart series
// ============================================

/// Stable display color derived from a series key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl SeriesColor {
    /// Hash the key into the bright two-thirds of the channel range so
    /// every series stays readable on a dark background.
    pub fn for_key(key: &str) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        SeriesColor {
            r: 64 + digest[0] % 192,
            g: 64 + digest[1] % 192,
            b: 64 + digest[2] % 192,
        }
    }

    /// `#rrggbb` rendering.
    pub fn hex(&self) -> String {
        format!("#{}", hex::encode([self.r, self.g, self.b]))
    }
}

/// One bucketed chart point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    /// Bucket start, epoch seconds
    pub timestamp: i64,
    /// Mean of the bucket's values, rounded to 2 decimals
    pub value: f64,
}

/// One derived series, points sorted ascending by time.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    /// Normalized series key
    pub key: String,
    /// Unit inherited from the series buffer
    pub unit: String,
    pub color: SeriesColor,
    pub points: Vec<ChartPoint>,
}

impl ChartSeries {
    /// Latest bucketed value, if any.
    pub fn latest(&self) -> Option<&ChartPoint> {
        self.points.last()
    }
}

// ============================================
// Aggregator
// ============================================

/// Bounded per-series reading history with derived chart output.
pub struct TelemetryAggregator {
    buffers: BTreeMap<String, HistoryBuffer>,
    capacity: usize,
    group_by_sensor: bool,
    cache: Option<(u64, Vec<ChartSeries>)>,
}

impl TelemetryAggregator {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            buffers: BTreeMap::new(),
            capacity: config.history_capacity,
            group_by_sensor: config.group_by_sensor,
            cache: None,
        }
    }

    /// Replace all buffers with a snapshot of readings.
    ///
    /// The gateway returns snapshots newest first; they are re-sorted
    /// ascending so buffer arrival order matches chronology and eviction
    /// discards the oldest readings first.
    pub fn seed(&mut self, readings: &[Reading]) {
        self.buffers.clear();
        self.cache = None;

        let mut ordered: Vec<&Reading> = readings.iter().collect();
        ordered.sort_by_key(|reading| reading.timestamp);
        for reading in ordered {
            self.insert(reading);
        }
        tracing::debug!(
            readings = readings.len(),
            series = self.buffers.len(),
            "Seeded telemetry buffers"
        );
    }

    /// Fold one pushed reading into its series buffer.
    pub fn push(&mut self, reading: &Reading) {
        self.insert(reading);
    }

    /// True when no series holds any reading.
    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(|buffer| buffer.is_empty())
    }

    /// Look up the history buffer behind a normalized series key.
    pub fn buffer(&self, key: &str) -> Option<&HistoryBuffer> {
        self.buffers.get(key)
    }

    /// Total readings currently held across all series.
    pub fn reading_count(&self) -> usize {
        self.buffers.values().map(|buffer| buffer.len()).sum()
    }

    /// Derive chart series for the current buffer contents.
    ///
    /// Memoized: when the buffers have not changed since the last call the
    /// cached derivation is returned. An empty aggregator yields an empty
    /// list.
    pub fn series(&mut self) -> Vec<ChartSeries> {
        let hash = self.content_hash();
        if let Some((cached_hash, cached)) = &self.cache {
            if *cached_hash == hash {
                return cached.clone();
            }
        }

        let computed = self.compute_series();
        self.cache = Some((hash, computed.clone()));
        computed
    }

    fn insert(&mut self, reading: &Reading) {
        let key = self.series_key(reading);
        let capacity = self.capacity;
        self.buffers
            .entry(key)
            .or_insert_with(|| HistoryBuffer::new(capacity, reading.unit.clone()))
            .push(reading.timestamp, reading.value);
    }

    fn series_key(&self, reading: &Reading) -> String {
        if self.group_by_sensor {
            normalize_key(&format!("{} {}", reading.sensor_type, reading.sensor_id))
        } else {
            normalize_key(&reading.sensor_type)
        }
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for (key, buffer) in &self.buffers {
            key.hash(&mut hasher);
            buffer.unit.hash(&mut hasher);
            for entry in &buffer.entries {
                entry.timestamp.timestamp_millis().hash(&mut hasher);
                entry.value.to_bits().hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    fn compute_series(&self) -> Vec<ChartSeries> {
        let mut series = Vec::with_capacity(self.buffers.len());

        for (key, buffer) in &self.buffers {
            if buffer.is_empty() {
                continue;
            }

            // Bucket by timestamp truncated to the second; the BTreeMap
            // keeps buckets ascending regardless of arrival order
            let mut buckets: BTreeMap<i64, (f64, u32)> = BTreeMap::new();
            for entry in &buffer.entries {
                let slot = buckets.entry(entry.timestamp.timestamp()).or_insert((0.0, 0));
                slot.0 += entry.value;
                slot.1 += 1;
            }

            let points = buckets
                .into_iter()
                .map(|(second, (sum, count))| ChartPoint {
                    timestamp: second,
                    value: round2(sum / count as f64),
                })
                .collect();

            series.push(ChartSeries {
                key: key.clone(),
                unit: buffer.unit.clone(),
                color: SeriesColor::for_key(key),
                points,
            });
        }

        series
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
