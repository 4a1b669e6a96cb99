// Domain models: targets, probe results, minute buckets and published snapshots.

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Latency recorded when no valid measurement could be taken.
pub const FAILED_LATENCY: i32 = -1;

/// A configured endpoint: display name plus the locator handed to the probe runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub locator: String,
}

/// Target names in configuration order. Defines column order everywhere and
/// never changes for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOrder(Arc<[String]>);

impl TargetOrder {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// True when the bucket holds a sample for every target.
    pub fn covers(&self, bucket: &Bucket) -> bool {
        self.0.iter().all(|n| bucket.samples.contains_key(n))
    }
}

impl From<&[Target]> for TargetOrder {
    fn from(targets: &[Target]) -> Self {
        Self::new(targets.iter().map(|t| t.name.clone()))
    }
}

/// One probe outcome, attributed to the start time of the round that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkResult {
    pub name: String,
    pub rt_ms: i32,
    pub started_at: DateTime<Local>,
}

impl BenchmarkResult {
    pub fn new(name: impl Into<String>, rt_ms: i32, started_at: DateTime<Local>) -> Self {
        Self {
            name: name.into(),
            rt_ms,
            started_at,
        }
    }

    /// Builds a result from a unix-seconds timestamp (log replay).
    pub fn from_unix(name: impl Into<String>, rt_ms: i32, unix_secs: i64) -> Option<Self> {
        let started_at = Local.timestamp_opt(unix_secs, 0).single()?;
        Some(Self::new(name, rt_ms, started_at))
    }
}

/// One minute-aligned row of the series. `minute` is unix seconds with the
/// seconds component dropped; targets missing from `samples` were not measured yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub minute: i64,
    pub samples: HashMap<String, i32>,
}

impl Bucket {
    pub fn new(minute: i64) -> Self {
        Self {
            minute,
            samples: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<i32> {
        self.samples.get(name).copied()
    }
}

/// Point-in-time copy of the series, laid out in target order for rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub names: Vec<String>,
    pub rows: Vec<SnapshotRow>,
    pub generated_at: String,
    pub slow_threshold_ms: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRow {
    pub minute: i64,
    /// Local time formatted as `YYYY-MM-DD HH:MM`.
    pub time: String,
    /// One cell per target name; `None` when the target has no sample in this minute.
    pub latencies: Vec<Option<i32>>,
}

impl Snapshot {
    pub fn build(
        order: &TargetOrder,
        buckets: &[Bucket],
        slow_threshold_ms: i32,
        now: DateTime<Local>,
    ) -> Self {
        let rows = buckets
            .iter()
            .map(|b| SnapshotRow {
                minute: b.minute,
                time: Local
                    .timestamp_opt(b.minute, 0)
                    .single()
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
                latencies: order.names().iter().map(|n| b.get(n)).collect(),
            })
            .collect();
        Self {
            names: order.names().to_vec(),
            rows,
            generated_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            slow_threshold_ms,
        }
    }

    /// A cell is slow when it failed or reached the configured threshold.
    pub fn is_slow(&self, rt_ms: i32) -> bool {
        rt_ms < 0 || rt_ms >= self.slow_threshold_ms
    }
}
