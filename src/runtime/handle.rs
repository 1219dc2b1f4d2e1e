use std::sync::Arc;

use futures::future::join_all;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{self, Duration, Instant, Interval, MissedTickBehavior},
};

use crate::{
    backend::{BackendError, DeviceBackend},
    config::{ConfigError, parse_millis},
    core::store::{OperationStore, Registered, StoreSnapshot},
    operation::OperationRecord,
    types::OperationId,
};

use super::{events::TrackerEvent, waiter::Waiter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("operation {id} did not finish within {after:?}")]
    TimedOut { id: OperationId, after: Duration },
    #[error("tracker is not running")]
    ChannelClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Period of background polling and of waiter re-checks.
    pub poll_interval: Duration,
    /// Deadline applied by waiters; `None` waits forever.
    pub wait_timeout: Option<Duration>,
    pub command_queue_bound: usize,
    pub event_capacity: usize,
    /// Run one full fetch before serving commands, so a fresh tracker
    /// starts with the device's current operations.
    pub initial_fetch: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            wait_timeout: None,
            command_queue_bound: 256,
            event_capacity: 1024,
            initial_fetch: false,
        }
    }
}

impl RuntimeConfig {
    /// Reads `QUESTLOG_POLL_INTERVAL_MS` and `QUESTLOG_WAIT_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(interval) = parse_millis(&lookup, "QUESTLOG_POLL_INTERVAL_MS")? {
            config.poll_interval = interval;
        }
        config.wait_timeout = parse_millis(&lookup, "QUESTLOG_WAIT_TIMEOUT_MS")?;
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn with_initial_fetch(mut self, on: bool) -> Self {
        self.initial_fetch = on;
        self
    }
}

/// Outcome of [`TrackerHandle::clear_finished`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Deleted on the device and dropped locally.
    pub cleared: Vec<OperationId>,
    /// Delete failed; local state untouched.
    pub failed: Vec<OperationId>,
}

pub struct TrackerHandle {
    cmd_tx: mpsc::Sender<Command>,
    lease_tx: mpsc::UnboundedSender<LeaseMsg>,
    events_tx: broadcast::Sender<TrackerEvent>,
    config: RuntimeConfig,
}

impl Clone for TrackerHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            lease_tx: self.lease_tx.clone(),
            events_tx: self.events_tx.clone(),
            config: self.config.clone(),
        }
    }
}

/// Keeps background polling active until stopped or dropped.
#[must_use = "polling stops when the lease is dropped"]
pub struct PollLease {
    lease_tx: mpsc::UnboundedSender<LeaseMsg>,
    cmd_tx: mpsc::Sender<Command>,
    released: bool,
}

impl PollLease {
    /// Releases the lease and returns once the tracker has observed it.
    ///
    /// No poll fetch is issued after this returns unless another lease or
    /// the fetching flag keeps polling active.
    pub async fn stop(mut self) {
        self.release();
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::IsPolling { resp: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.lease_tx.send(LeaseMsg::Release);
        }
    }
}

impl Drop for PollLease {
    fn drop(&mut self) {
        self.release();
    }
}

enum LeaseMsg {
    Acquire,
    Release,
}

enum Command {
    FetchAll {
        resp: oneshot::Sender<()>,
    },
    FetchOne {
        id: OperationId,
        resp: oneshot::Sender<()>,
    },
    Refresh {
        id: OperationId,
        resp: oneshot::Sender<Result<OperationRecord, TrackerError>>,
    },
    ClearFinished {
        resp: oneshot::Sender<ClearReport>,
    },
    Get {
        id: OperationId,
        resp: oneshot::Sender<Option<OperationRecord>>,
    },
    Tree {
        id: OperationId,
        resp: oneshot::Sender<Option<OperationRecord>>,
    },
    MainIds {
        resp: oneshot::Sender<Vec<OperationId>>,
    },
    Snapshot {
        resp: oneshot::Sender<StoreSnapshot>,
    },
    SetFetching {
        on: bool,
        resp: oneshot::Sender<()>,
    },
    IsPolling {
        resp: oneshot::Sender<bool>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

struct Poller {
    fetching: bool,
    leases: usize,
    ticker: Option<Interval>,
    period: Duration,
}

impl Poller {
    fn is_active(&self) -> bool {
        self.fetching || self.leases > 0
    }

    /// Arms or disarms the single interval after a flag or lease change.
    fn sync(&mut self, events_tx: &broadcast::Sender<TrackerEvent>) {
        match (self.is_active(), self.ticker.is_some()) {
            (true, false) => {
                let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ticker = Some(ticker);
                tracing::debug!(period_ms = self.period.as_millis() as u64, "polling started");
                let _ = events_tx.send(TrackerEvent::PollingStarted);
            }
            (false, true) => {
                self.ticker = None;
                tracing::debug!("polling stopped");
                let _ = events_tx.send(TrackerEvent::PollingStopped);
            }
            _ => {}
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Starts the tracker task that owns `store`.
///
/// Without [`RuntimeConfig::initial_fetch`] the store stays as given until
/// the first [`TrackerHandle::fetch_all`] or poll tick.
pub fn spawn_tracker(
    store: OperationStore,
    backend: Arc<dyn DeviceBackend>,
    config: RuntimeConfig,
) -> TrackerHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound);
    let (lease_tx, mut lease_rx) = mpsc::unbounded_channel::<LeaseMsg>();
    let (events_tx, _) = broadcast::channel::<TrackerEvent>(config.event_capacity);

    let events_tx_loop = events_tx.clone();
    let period = config.poll_interval;
    let initial_fetch = config.initial_fetch;

    tokio::spawn(async move {
        let mut store = store;
        let mut poller = Poller {
            fetching: false,
            leases: 0,
            ticker: None,
            period,
        };
        let mut leases_open = true;

        if initial_fetch && store.is_empty() {
            let _ = fetch_all_into(&mut store, backend.as_ref(), &events_tx_loop).await;
        }

        loop {
            tokio::select! {
                biased;
                lease = lease_rx.recv(), if leases_open => {
                    match lease {
                        Some(LeaseMsg::Acquire) => poller.leases += 1,
                        Some(LeaseMsg::Release) => poller.leases = poller.leases.saturating_sub(1),
                        None => leases_open = false,
                    }
                    poller.sync(&events_tx_loop);
                }
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    let done = handle_command(
                        cmd,
                        &mut store,
                        &mut poller,
                        backend.as_ref(),
                        &events_tx_loop,
                    ).await;
                    if done {
                        break;
                    }
                }
                _ = next_tick(&mut poller.ticker), if poller.ticker.is_some() => {
                    let _ = fetch_all_into(&mut store, backend.as_ref(), &events_tx_loop).await;
                }
            }
        }
        tracing::debug!("tracker loop exited");
    });

    TrackerHandle {
        cmd_tx,
        lease_tx,
        events_tx,
        config,
    }
}

impl TrackerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events_tx.subscribe()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Waiter using this handle and its configured interval and deadline.
    pub fn waiter(&self) -> Waiter {
        Waiter::new(self.clone(), &self.config)
    }

    /// Refreshes every top-level operation. Backend failures are logged and
    /// leave the store unchanged.
    pub async fn fetch_all(&self) -> Result<(), TrackerError> {
        self.call(|resp| Command::FetchAll { resp }).await
    }

    /// Refreshes one operation tree. Backend failures are logged and leave
    /// the store unchanged.
    pub async fn fetch_one(&self, id: OperationId) -> Result<(), TrackerError> {
        self.call(|resp| Command::FetchOne { id, resp }).await
    }

    /// Like [`TrackerHandle::fetch_one`] but returns the stored record with
    /// its descendants attached and surfaces backend failures.
    pub async fn refresh(&self, id: OperationId) -> Result<OperationRecord, TrackerError> {
        self.call(|resp| Command::Refresh { id, resp }).await?
    }

    /// Deletes every finished top-level operation on the device.
    pub async fn clear_finished(&self) -> Result<ClearReport, TrackerError> {
        self.call(|resp| Command::ClearFinished { resp }).await
    }

    pub async fn get(&self, id: OperationId) -> Result<Option<OperationRecord>, TrackerError> {
        self.call(|resp| Command::Get { id, resp }).await
    }

    /// Stored record with its descendants attached.
    pub async fn tree(&self, id: OperationId) -> Result<Option<OperationRecord>, TrackerError> {
        self.call(|resp| Command::Tree { id, resp }).await
    }

    pub async fn main_ids(&self) -> Result<Vec<OperationId>, TrackerError> {
        self.call(|resp| Command::MainIds { resp }).await
    }

    pub async fn snapshot(&self) -> Result<StoreSnapshot, TrackerError> {
        self.call(|resp| Command::Snapshot { resp }).await
    }

    /// Sets the fetching flag. After clearing it, no further poll fetch is
    /// issued unless a [`PollLease`] is held.
    pub async fn set_fetching(&self, on: bool) -> Result<(), TrackerError> {
        self.call(|resp| Command::SetFetching { on, resp }).await
    }

    pub async fn is_polling(&self) -> Result<bool, TrackerError> {
        self.call(|resp| Command::IsPolling { resp }).await
    }

    /// Activates background polling for the lifetime of the returned lease.
    pub fn start_polling(&self) -> PollLease {
        let _ = self.lease_tx.send(LeaseMsg::Acquire);
        PollLease {
            lease_tx: self.lease_tx.clone(),
            cmd_tx: self.cmd_tx.clone(),
            released: false,
        }
    }

    pub async fn shutdown(&self) -> Result<(), TrackerError> {
        self.call(|resp| Command::Shutdown { resp }).await
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TrackerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }
}

async fn handle_command(
    cmd: Command,
    store: &mut OperationStore,
    poller: &mut Poller,
    backend: &dyn DeviceBackend,
    events_tx: &broadcast::Sender<TrackerEvent>,
) -> bool {
    match cmd {
        Command::FetchAll { resp } => {
            let _ = fetch_all_into(store, backend, events_tx).await;
            let _ = resp.send(());
        }
        Command::FetchOne { id, resp } => {
            let _ = fetch_one_into(store, backend, events_tx, id).await;
            let _ = resp.send(());
        }
        Command::Refresh { id, resp } => {
            let out = fetch_one_into(store, backend, events_tx, id)
                .await
                .map_err(TrackerError::from);
            let _ = resp.send(out);
        }
        Command::ClearFinished { resp } => {
            let report = clear_finished_in(store, backend, events_tx).await;
            let _ = resp.send(report);
        }
        Command::Get { id, resp } => {
            let _ = resp.send(store.get_cloned(id));
        }
        Command::Tree { id, resp } => {
            let _ = resp.send(store.tree(id));
        }
        Command::MainIds { resp } => {
            let _ = resp.send(store.main_ids().to_vec());
        }
        Command::Snapshot { resp } => {
            let _ = resp.send(store.snapshot());
        }
        Command::SetFetching { on, resp } => {
            poller.fetching = on;
            poller.sync(events_tx);
            let _ = resp.send(());
        }
        Command::IsPolling { resp } => {
            let _ = resp.send(poller.is_active());
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}

async fn fetch_all_into(
    store: &mut OperationStore,
    backend: &dyn DeviceBackend,
    events_tx: &broadcast::Sender<TrackerEvent>,
) -> Result<(), BackendError> {
    let records = backend
        .list_operations()
        .await
        .inspect_err(|err| report_fetch_failure(events_tx, None, err))?;

    let main_ids: Vec<OperationId> = records.iter().map(|r| r.id).collect();
    for record in records {
        let changes = store.register(record);
        publish_changes(store, &changes, events_tx);
    }
    if store.set_main_ids(main_ids) {
        let _ = events_tx.send(TrackerEvent::MainListChanged {
            count: store.main_ids().len(),
        });
    }
    Ok(())
}

async fn fetch_one_into(
    store: &mut OperationStore,
    backend: &dyn DeviceBackend,
    events_tx: &broadcast::Sender<TrackerEvent>,
    id: OperationId,
) -> Result<OperationRecord, BackendError> {
    let record = backend
        .get_operation(id)
        .await
        .inspect_err(|err| report_fetch_failure(events_tx, Some(id), err))?;

    let changes = store.register(record.clone());
    publish_changes(store, &changes, events_tx);
    Ok(store.tree(id).unwrap_or(record))
}

async fn clear_finished_in(
    store: &mut OperationStore,
    backend: &dyn DeviceBackend,
    events_tx: &broadcast::Sender<TrackerEvent>,
) -> ClearReport {
    let finished = store.finished_main_ids();
    let results = join_all(finished.iter().map(|id| backend.delete_operation(*id))).await;

    let mut report = ClearReport::default();
    for (id, result) in finished.into_iter().zip(results) {
        match result {
            Ok(()) => {
                let _ = store.remove_tree(id);
                let _ = events_tx.send(TrackerEvent::Removed { id });
                report.cleared.push(id);
            }
            Err(err) => {
                tracing::warn!(operation_id = id, error = %err, "failed to delete finished operation");
                report.failed.push(id);
            }
        }
    }
    report
}

fn publish_changes(
    store: &OperationStore,
    changes: &[Registered],
    events_tx: &broadcast::Sender<TrackerEvent>,
) {
    for change in changes {
        let id = match change {
            Registered::Inserted(id) | Registered::Updated(id) => *id,
            Registered::RegressionIgnored(_) => continue,
        };
        if let Some(status) = store.status(id) {
            let _ = events_tx.send(TrackerEvent::Updated { id, status });
        }
    }
}

fn report_fetch_failure(
    events_tx: &broadcast::Sender<TrackerEvent>,
    id: Option<OperationId>,
    err: &BackendError,
) {
    match id {
        Some(id) => tracing::warn!(operation_id = id, error = %err, "failed to fetch operation"),
        None => tracing::warn!(error = %err, "failed to fetch operations"),
    }
    let _ = events_tx.send(TrackerEvent::FetchFailed {
        message: err.to_string(),
    });
}
