// Durable log: one append-only CSV segment per calendar day (`data.YYYY-MM-DD.csv`).
// Every raw result is written as `<unix-secs>,<name>,<rt-ms>\n` in arrival order.

use chrono::{DateTime, Local, NaiveDate};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DataLogError {
    #[error("open segment {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("write segment {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("sync segment {}: {source}", path.display())]
    Sync {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordParseError {
    #[error("expected 3 comma-separated fields")]
    FieldCount,
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("invalid latency {0:?}")]
    Latency(String),
}

/// One persisted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub unix_secs: i64,
    pub name: String,
    pub rt_ms: i32,
}

impl LogRecord {
    /// Parses a line without its terminator. The name is the middle field;
    /// the latency is everything after the second comma.
    pub fn parse(line: &str) -> Result<Self, RecordParseError> {
        let mut fields = line.splitn(3, ',');
        let (Some(ts), Some(name), Some(rt)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(RecordParseError::FieldCount);
        };
        let unix_secs = ts
            .parse::<u64>()
            .ok()
            .and_then(|v| i64::try_from(v).ok())
            .ok_or_else(|| RecordParseError::Timestamp(ts.to_string()))?;
        let rt_ms = rt
            .trim_end_matches('\r')
            .parse::<i32>()
            .map_err(|_| RecordParseError::Latency(rt.to_string()))?;
        Ok(Self {
            unix_secs,
            name: name.to_string(),
            rt_ms,
        })
    }

    pub fn to_line(&self) -> String {
        format!("{},{},{}\n", self.unix_secs, self.name, self.rt_ms)
    }
}

/// File name of the segment holding `date`.
pub fn segment_file_name(date: NaiveDate) -> String {
    format!("data.{}.csv", date.format("%Y-%m-%d"))
}

pub fn segment_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(segment_file_name(date))
}

struct Segment {
    date: NaiveDate,
    path: PathBuf,
    file: File,
}

/// Owns the single open segment handle. Only the aggregator holds one.
pub struct DataLog {
    dir: PathBuf,
    current: Segment,
}

impl DataLog {
    /// Opens (creating if absent) the segment for `now`'s calendar day.
    pub fn open(dir: impl Into<PathBuf>, now: DateTime<Local>) -> Result<Self, DataLogError> {
        let dir = dir.into();
        let current = open_segment(&dir, now.date_naive())?;
        info!(segment = %current.path.display(), "data log opened");
        Ok(Self { dir, current })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current.date
    }

    pub fn current_path(&self) -> &Path {
        &self.current.path
    }

    /// Segment that `now` belongs to.
    pub fn segment_for(&self, now: DateTime<Local>) -> PathBuf {
        segment_path(&self.dir, now.date_naive())
    }

    /// Writes one record as a single line. No buffering: a crash loses at most this line.
    pub fn append(&mut self, unix_secs: i64, name: &str, rt_ms: i32) -> Result<(), DataLogError> {
        let line = LogRecord {
            unix_secs,
            name: name.to_string(),
            rt_ms,
        }
        .to_line();
        self.current
            .file
            .write_all(line.as_bytes())
            .map_err(|source| DataLogError::Write {
                path: self.current.path.clone(),
                source,
            })
    }

    /// Switches to the segment for `now` when the calendar day changed.
    /// Returns true when a new segment was opened.
    pub fn rotate(&mut self, now: DateTime<Local>) -> Result<bool, DataLogError> {
        let date = now.date_naive();
        if date == self.current.date {
            return Ok(false);
        }
        self.sync()?;
        let next = open_segment(&self.dir, date)?;
        info!(
            from = %self.current.path.display(),
            to = %next.path.display(),
            "data log rotated"
        );
        self.current = next;
        sync_dir(&self.dir);
        Ok(true)
    }

    pub fn sync(&mut self) -> Result<(), DataLogError> {
        self.current
            .file
            .sync_all()
            .map_err(|source| DataLogError::Sync {
                path: self.current.path.clone(),
                source,
            })
    }
}

fn open_segment(dir: &Path, date: NaiveDate) -> Result<Segment, DataLogError> {
    let path = segment_path(dir, date);
    let open = || -> std::io::Result<File> {
        std::fs::create_dir_all(dir)?;
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        opts.open(&path)
    };
    let file = open().map_err(|source| DataLogError::Open {
        path: path.clone(),
        source,
    })?;
    Ok(Segment { date, path, file })
}

/// Persists the directory entry of a newly created segment.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!(error = %e, path = %dir.display(), "data dir sync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
