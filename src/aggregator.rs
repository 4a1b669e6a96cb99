// Single consumer of probe results and sole owner of the series and the open log segment.
// Per result: append to the log, merge into the series, publish when a minute just became complete.

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::{debug, error, instrument};

use crate::data_log::{DataLog, DataLogError};
use crate::models::{BenchmarkResult, TargetOrder};
use crate::publisher::SnapshotPublisher;
use crate::series::{Placement, Series};

pub struct Aggregator<P> {
    series: Series,
    order: TargetOrder,
    log: DataLog,
    publisher: P,
}

impl<P: SnapshotPublisher> Aggregator<P> {
    /// Takes over a series already warmed from disk.
    pub fn new(series: Series, order: TargetOrder, log: DataLog, publisher: P) -> Self {
        Self {
            series,
            order,
            log,
            publisher,
        }
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn log(&self) -> &DataLog {
        &self.log
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Processes one result. A log failure is returned before the series is touched.
    pub fn handle(
        &mut self,
        result: &BenchmarkResult,
        now: DateTime<Local>,
    ) -> Result<Option<Placement>, DataLogError> {
        self.log
            .append(result.started_at.timestamp(), &result.name, result.rt_ms)?;

        let placement = self.series.insert(result, &self.order);
        match placement {
            Some(p) if p.completed => {
                self.log.rotate(now)?;
                self.publisher.publish(&self.order, self.series.buckets());
            }
            Some(p) => {
                debug!(site = %result.name, index = p.index, "result merged");
            }
            None => {
                debug!(site = %result.name, "result older than retained history; dropped from series");
            }
        }
        Ok(placement)
    }

    /// Consumes results until every sender is gone. Returns the first log
    /// failure; the caller must treat it as fatal.
    #[instrument(name = "aggregator", skip_all)]
    pub async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<BenchmarkResult>,
    ) -> Result<(), DataLogError> {
        debug!(
            capacity = self.series.capacity(),
            buckets = self.series.len(),
            targets = self.order.len(),
            "aggregator started"
        );
        while let Some(result) = rx.recv().await {
            if let Err(e) = self.handle(&result, Local::now()) {
                error!(error = %e, "data log failure; stopping aggregation");
                return Err(e);
            }
        }
        debug!("result channel closed; aggregator shutting down");
        self.log.sync()
    }
}

/// Spawns the aggregator task.
pub fn spawn<P: SnapshotPublisher>(
    aggregator: Aggregator<P>,
    rx: mpsc::UnboundedReceiver<BenchmarkResult>,
) -> tokio::task::JoinHandle<Result<(), DataLogError>> {
    tokio::spawn(aggregator.run(rx))
}
