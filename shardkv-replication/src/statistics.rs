use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Counter = AtomicU64;

#[derive(Debug, Clone, Default)]
/// Live metrics of a replication syncer.
pub struct ReplicationStatistics(Arc<ReplicationStatisticsInner>);

impl Deref for ReplicationStatistics {
    type Target = ReplicationStatisticsInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct ReplicationStatisticsInner {
    pub(crate) num_ticks: Counter,
    pub(crate) num_applied: Counter,
    pub(crate) num_empty_polls: Counter,
    pub(crate) num_failed_syncs: Counter,
    pub(crate) num_failed_acks: Counter,
}

impl ReplicationStatisticsInner {
    /// The number of timer ticks the syncer has handled.
    pub fn num_ticks(&self) -> u64 {
        self.num_ticks.load(Ordering::Relaxed)
    }

    /// The number of entries applied to the local primary namespace.
    ///
    /// Redelivered entries are counted every time they are applied.
    pub fn num_applied(&self) -> u64 {
        self.num_applied.load(Ordering::Relaxed)
    }

    /// The number of polls where the leader had nothing pending.
    pub fn num_empty_polls(&self) -> u64 {
        self.num_empty_polls.load(Ordering::Relaxed)
    }

    /// The number of polls which failed before an entry was applied.
    pub fn num_failed_syncs(&self) -> u64 {
        self.num_failed_syncs.load(Ordering::Relaxed)
    }

    /// The number of applied entries the leader did not accept an
    /// acknowledgment for.
    pub fn num_failed_acks(&self) -> u64 {
        self.num_failed_acks.load(Ordering::Relaxed)
    }

    pub(crate) fn inc(counter: &Counter) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
