// Startup replay: walk segments backward from today until the series is full.
// Lines go through the same merge as live results, with no log writes and no publishing.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use crate::data_log::{LogRecord, segment_path};
use crate::models::{BenchmarkResult, TargetOrder};
use crate::series::Series;

/// What a replay did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub segments_read: usize,
    pub records_applied: usize,
    pub lines_skipped: usize,
}

/// Replays segments into `series`, newest day first. The walk stops once the
/// series is full or a day has no segment.
///
/// Capacity is only checked between segments, never mid-file: a segment's
/// newest minutes are at its bottom, so stopping early on a busy day would keep
/// its oldest minutes and lose the latest ones. While the rest of the file is
/// read, the bounded series evicts the older minutes instead.
pub fn load(
    series: &mut Series,
    order: &TargetOrder,
    dir: &Path,
    today: NaiveDate,
) -> LoadReport {
    let mut report = LoadReport::default();
    let mut day = Some(today);

    while let Some(date) = day {
        if series.is_full() {
            break;
        }
        let path = segment_path(dir, date);
        if !path.is_file() {
            debug!(path = %path.display(), "no segment; warm start stops");
            break;
        }
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "open segment failed");
                break;
            }
        };
        replay_segment(series, order, &path, BufReader::new(file), &mut report);
        report.segments_read += 1;
        day = date.checked_sub_days(Days::new(1));
    }

    info!(
        buckets = series.len(),
        capacity = series.capacity(),
        segments = report.segments_read,
        applied = report.records_applied,
        skipped = report.lines_skipped,
        "warm start complete"
    );
    report
}

fn replay_segment(
    series: &mut Series,
    order: &TargetOrder,
    path: &Path,
    mut reader: impl BufRead,
    report: &mut LoadReport,
) {
    let mut buf = Vec::new();
    let mut lineno = 0usize;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, path = %path.display(), line = lineno + 1, "read segment failed");
                return;
            }
        }
        lineno += 1;
        let raw = buf.strip_suffix(b"\n").unwrap_or(&buf);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            continue;
        }
        // A torn write can leave half a multi-byte character behind.
        let line = match std::str::from_utf8(raw) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, path = %path.display(), line = lineno, "skipping non-UTF-8 record");
                report.lines_skipped += 1;
                continue;
            }
        };
        let record = match LogRecord::parse(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, path = %path.display(), line = lineno, "skipping malformed record");
                report.lines_skipped += 1;
                continue;
            }
        };
        if !order.contains(&record.name) {
            debug!(name = %record.name, line = lineno, "skipping record for unknown target");
            report.lines_skipped += 1;
            continue;
        }
        let Some(result) = BenchmarkResult::from_unix(record.name, record.rt_ms, record.unix_secs)
        else {
            warn!(line = lineno, "skipping record with out-of-range timestamp");
            report.lines_skipped += 1;
            continue;
        };
        series.insert(&result, order);
        report.records_applied += 1;
    }
}
