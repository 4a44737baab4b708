use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::atomic::AtomicCell;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::statistics::ReplicationStatisticsInner;
use crate::{ReplicationClient, ReplicationError, ReplicationStatistics, Storage};

/// The time between two sync attempts.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(1);
/// The time a single request to the leader may take.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// The shortest interval the syncer ticks at.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
/// Tuning of the replication syncer.
pub struct ReplicationConfig {
    /// The time interval which should elapse between each tick.
    ///
    /// Intervals shorter than [MIN_SYNC_INTERVAL] are raised to it.
    pub interval: Duration,
    /// The timeout applied to every request sent to the leader.
    pub request_timeout: Duration,
    /// The maximum number of entries pulled within a single tick.
    ///
    /// A tick stops early as soon as the leader has nothing pending or
    /// anything fails. Values below `1` are treated as `1`.
    pub max_entries_per_tick: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_entries_per_tick: 1,
        }
    }
}

/// The required context for the syncer to run.
pub struct ReplicationSyncerContext<S>
where
    S: Storage + Send + Sync + 'static,
{
    /// The local store entries are applied to.
    pub storage: Arc<S>,
    /// The HTTP address of the shard's leader.
    pub leader_addr: String,
    pub config: ReplicationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The current state of the syncer task.
pub enum SyncerState {
    /// Waiting for the next tick.
    Idle,
    /// Pulling, applying or acknowledging entries.
    Syncing,
    /// The syncer has been killed and will not tick again.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The result of a single pull from the leader.
pub enum SyncOutcome {
    /// The leader had nothing pending.
    NothingPending,
    /// An entry was applied locally.
    ///
    /// If the acknowledgment did not go through the leader keeps the entry
    /// pending and it will be delivered again.
    Applied { key: String, acknowledged: bool },
}

/// A handle for communicating with the replication syncer task.
///
/// Dropping the handle also stops the syncer.
pub struct ReplicationHandle {
    kill_switch: watch::Sender<bool>,
    state: Arc<AtomicCell<SyncerState>>,
    statistics: ReplicationStatistics,
    task: JoinHandle<()>,
}

impl ReplicationHandle {
    /// Signals the syncer to stop.
    ///
    /// A tick which is already running is allowed to finish, the syncer
    /// stops before the next one.
    pub fn kill(&self) {
        let _ = self.kill_switch.send(true);
    }

    /// Stops the syncer and waits for it to exit.
    pub async fn shutdown(self) {
        self.kill();
        if let Err(e) = self.task.await {
            error!(error = ?e, "Replication syncer task failed.");
        }
    }

    #[inline]
    /// The current state of the syncer.
    pub fn state(&self) -> SyncerState {
        self.state.load()
    }

    #[inline]
    /// Gets the live syncer statistics.
    pub fn statistics(&self) -> ReplicationStatistics {
        self.statistics.clone()
    }
}

/// Starts the replication syncer task.
///
/// The task pulls pending entries from the leader once every configured
/// interval until the returned handle is killed or dropped. It never stops
/// on its own, every failure is logged and retried on the next tick.
///
/// This must be called from within a tokio runtime.
pub fn start_replication_syncer<S>(ctx: ReplicationSyncerContext<S>) -> ReplicationHandle
where
    S: Storage + Send + Sync + 'static,
{
    let (kill_switch, kill_rx) = watch::channel(false);
    let state = Arc::new(AtomicCell::new(SyncerState::Idle));
    let statistics = ReplicationStatistics::default();

    info!(
        leader_addr = %ctx.leader_addr,
        interval = ?ctx.config.interval.max(MIN_SYNC_INTERVAL),
        max_entries_per_tick = ctx.config.max_entries_per_tick,
        "Starting replication syncer."
    );

    let task = tokio::spawn(replication_cycle(
        ctx,
        kill_rx,
        state.clone(),
        statistics.clone(),
    ));

    ReplicationHandle {
        kill_switch,
        state,
        statistics,
        task,
    }
}

async fn replication_cycle<S>(
    ctx: ReplicationSyncerContext<S>,
    mut kill_switch: watch::Receiver<bool>,
    state: Arc<AtomicCell<SyncerState>>,
    statistics: ReplicationStatistics,
) where
    S: Storage + Send + Sync + 'static,
{
    let client = ReplicationClient::new(ctx.leader_addr.clone(), ctx.config.request_timeout);

    let mut interval = interval(ctx.config.interval.max(MIN_SYNC_INTERVAL));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            // A closed channel means the handle was dropped.
            _ = kill_switch.changed() => break,
            _ = interval.tick() => {},
        }

        state.store(SyncerState::Syncing);
        run_tick(
            ctx.storage.as_ref(),
            &client,
            ctx.config.max_entries_per_tick,
            &statistics,
        )
        .await;
        state.store(SyncerState::Idle);
    }

    state.store(SyncerState::Stopped);
    info!(leader_addr = %ctx.leader_addr, "Replication syncer stopped.");
}

#[instrument(
    name = "replication-tick",
    skip_all,
    fields(leader_addr = %client.leader_addr())
)]
async fn run_tick<S>(
    storage: &S,
    client: &ReplicationClient,
    max_entries: usize,
    statistics: &ReplicationStatistics,
) where
    S: Storage + Send + Sync + 'static,
{
    ReplicationStatisticsInner::inc(&statistics.num_ticks);

    for _ in 0..max_entries.max(1) {
        match sync_once(storage, client).await {
            Ok(SyncOutcome::NothingPending) => {
                ReplicationStatisticsInner::inc(&statistics.num_empty_polls);
                debug!("Leader has no pending entries.");
                break;
            },
            Ok(SyncOutcome::Applied {
                key,
                acknowledged: true,
            }) => {
                ReplicationStatisticsInner::inc(&statistics.num_applied);
                debug!(key = %key, "Replicated entry.");
            },
            Ok(SyncOutcome::Applied {
                acknowledged: false,
                ..
            }) => {
                ReplicationStatisticsInner::inc(&statistics.num_applied);
                ReplicationStatisticsInner::inc(&statistics.num_failed_acks);
                break;
            },
            Err(e) => {
                ReplicationStatisticsInner::inc(&statistics.num_failed_syncs);
                error!(error = %e, "Failed to sync with leader.");
                break;
            },
        }
    }
}

/// Pulls a single pending entry from the leader, applies it and
/// acknowledges it.
///
/// The entry is only acknowledged after it has been applied locally. A failed
/// acknowledgment is not an error, the entry simply stays pending on the
/// leader and is delivered again later.
pub async fn sync_once<S>(
    storage: &S,
    client: &ReplicationClient,
) -> Result<SyncOutcome, ReplicationError>
where
    S: Storage + Send + Sync + 'static,
{
    let (key, value) = match client.poll_next().await? {
        None => return Ok(SyncOutcome::NothingPending),
        Some(entry) => entry,
    };

    storage
        .put_replicated(&key, &value)
        .await
        .map_err(|e| ReplicationError::Storage(Box::new(e)))?;

    let acknowledged = match client.acknowledge(&key, &value).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                error = %e,
                key = %key,
                "Failed to acknowledge replicated entry, it will be delivered again."
            );
            false
        },
    };

    Ok(SyncOutcome::Applied { key, acknowledged })
}
