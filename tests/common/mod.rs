// Shared test helpers
#![allow(dead_code)]

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use pingboard::models::{BenchmarkResult, Bucket, TargetOrder};
use pingboard::publisher::SnapshotPublisher;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A minute boundary: 2023-11-14T22:13:00Z.
pub const T: i64 = 1_699_999_980;

pub fn at(unix_secs: i64) -> DateTime<Local> {
    Local.timestamp_opt(unix_secs, 0).single().unwrap()
}

pub fn result(name: &str, rt_ms: i32, unix_secs: i64) -> BenchmarkResult {
    BenchmarkResult::new(name, rt_ms, at(unix_secs))
}

pub fn order(names: &[&str]) -> TargetOrder {
    TargetOrder::new(names.iter().copied())
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Noon local time on the given day.
pub fn noon(day: NaiveDate) -> DateTime<Local> {
    Local
        .from_local_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
        .single()
        .unwrap()
}

pub fn write_segment(dir: &Path, day: NaiveDate, lines: &[String]) {
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(pingboard::data_log::segment_path(dir, day), body).unwrap();
}

pub fn minutes(buckets: &[Bucket]) -> Vec<i64> {
    buckets.iter().map(|b| b.minute).collect()
}

/// What a publisher was handed on one call.
#[derive(Debug, Clone)]
pub struct Published {
    pub names: Vec<String>,
    pub minutes: Vec<i64>,
}

/// Records every publish call; clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    pub calls: Arc<Mutex<Vec<Published>>>,
}

impl RecordingPublisher {
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Published> {
        self.calls.lock().unwrap().last().cloned()
    }
}

impl SnapshotPublisher for RecordingPublisher {
    fn publish(&mut self, order: &TargetOrder, buckets: &[Bucket]) {
        self.calls.lock().unwrap().push(Published {
            names: order.names().to_vec(),
            minutes: minutes(buckets),
        });
    }
}
