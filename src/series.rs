// Bounded minute series: buckets kept newest-first, at most `capacity` of them.
// Results are placed by their round-start minute, not by arrival order.

use crate::models::{BenchmarkResult, Bucket, TargetOrder};

const SECS_PER_MINUTE: i64 = 60;

/// Drops the seconds component of a unix timestamp.
pub fn truncate_to_minute(unix_secs: i64) -> i64 {
    unix_secs - unix_secs.rem_euclid(SECS_PER_MINUTE)
}

/// Where a result landed after [`Series::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub index: usize,
    /// The bucket went from partial to covering every target with this result.
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct Series {
    buckets: Vec<Bucket>,
    capacity: usize,
}

impl Series {
    pub fn new(capacity: usize) -> Self {
        Self {
            buckets: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buckets.len() >= self.capacity
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Merges one result. Overwrites the target's cell when the minute already
    /// exists; otherwise inserts a new bucket at its ordered position and evicts
    /// from the oldest end past capacity. Returns `None` when the new bucket was
    /// itself the one evicted.
    pub fn insert(&mut self, result: &BenchmarkResult, order: &TargetOrder) -> Option<Placement> {
        let minute = truncate_to_minute(result.started_at.timestamp());
        let index = self.buckets.partition_point(|b| b.minute > minute);

        if let Some(bucket) = self.buckets.get_mut(index)
            && bucket.minute == minute
        {
            let was_complete = order.covers(bucket);
            bucket.samples.insert(result.name.clone(), result.rt_ms);
            return Some(Placement {
                index,
                completed: !was_complete && order.covers(bucket),
            });
        }

        let mut bucket = Bucket::new(minute);
        bucket.samples.insert(result.name.clone(), result.rt_ms);
        self.buckets.insert(index, bucket);
        if self.buckets.len() > self.capacity {
            self.buckets.truncate(self.capacity);
            if index >= self.capacity {
                return None;
            }
        }
        Some(Placement {
            index,
            completed: order.covers(&self.buckets[index]),
        })
    }
}
