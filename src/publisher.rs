// Snapshot publication: called by the aggregator each time a minute becomes complete.
// IndexPublisher renders index.htm for the file route and keeps the latest snapshot for the JSON route.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::models::{Bucket, Snapshot, TargetOrder};

pub const INDEX_FILE: &str = "index.htm";

/// Latest published snapshot; `None` until the first complete minute.
pub type SnapshotRx = watch::Receiver<Option<Arc<Snapshot>>>;

pub trait SnapshotPublisher: Send + 'static {
    /// Receives the whole series (newest first) and the column order.
    fn publish(&mut self, order: &TargetOrder, buckets: &[Bucket]);
}

pub struct IndexPublisher {
    path: PathBuf,
    slow_threshold_ms: i32,
    latest: watch::Sender<Option<Arc<Snapshot>>>,
}

impl IndexPublisher {
    pub fn new(dir: impl Into<PathBuf>, slow_threshold_ms: i32) -> (Self, SnapshotRx) {
        let (latest, rx) = watch::channel(None);
        let publisher = Self {
            path: dir.into().join(INDEX_FILE),
            slow_threshold_ms,
            latest,
        };
        (publisher, rx)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn write_index(&self, html: &str) -> std::io::Result<()> {
        let tmp = self.path.with_extension("htm.tmp");
        std::fs::write(&tmp, html)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl SnapshotPublisher for IndexPublisher {
    fn publish(&mut self, order: &TargetOrder, buckets: &[Bucket]) {
        let snapshot = Snapshot::build(order, buckets, self.slow_threshold_ms, Local::now());
        let html = render_html(&snapshot);
        match self.write_index(&html) {
            Ok(()) => info!(rows = snapshot.rows.len(), path = %self.path.display(), "render index complete"),
            Err(e) => warn!(error = %e, path = %self.path.display(), "render index failed"),
        }
        self.latest.send_replace(Some(Arc::new(snapshot)));
    }
}

/// Renders the snapshot as a standalone HTML table, newest minute first.
pub fn render_html(snapshot: &Snapshot) -> String {
    let mut out = String::with_capacity(1024 + snapshot.rows.len() * 64 * snapshot.names.len().max(1));
    out.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Latency</title>\n\
         <style>\
         body{font-family:sans-serif}\
         table{border-collapse:collapse}\
         th,td{border:1px solid #ccc;padding:2px 8px;text-align:right}\
         td.slow{background:#f8d7da}\
         </style>\n</head>\n<body>\n<table>\n<tr><th>Time</th>",
    );
    for name in &snapshot.names {
        let _ = write!(out, "<th>{}</th>", escape(name));
    }
    out.push_str("</tr>\n");
    for row in &snapshot.rows {
        let _ = write!(out, "<tr><td>{}</td>", escape(&row.time));
        for cell in &row.latencies {
            match cell {
                Some(rt) if snapshot.is_slow(*rt) => {
                    let _ = write!(out, "<td class=\"slow\">{rt}</td>");
                }
                Some(rt) => {
                    let _ = write!(out, "<td>{rt}</td>");
                }
                None => out.push_str("<td></td>"),
            }
        }
        out.push_str("</tr>\n");
    }
    let _ = write!(
        out,
        "</table>\n<p>Generated at {}</p>\n</body>\n</html>\n",
        escape(&snapshot.generated_at)
    );
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
