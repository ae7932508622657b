//! Replication of the local journal to the remote document.
//!
//! State machine:
//!
//! ```text
//! Idle | SyncFailed --mutation--> Dirty --timer / hidden / manual--> Syncing
//! Syncing --ok--> Idle (or Dirty if edits landed meanwhile)
//! Syncing --error / conflict--> SyncFailed
//! ```
//!
//! Mutations bump a revision counter. A sync captures the revision it
//! started from, so edits made while a request is in flight keep the state
//! dirty instead of being marked as confirmed.
//!
//! A startup reconciliation that fails is retried by the next sync, so a
//! replica that booted offline merges instead of overwriting the remote.

use crate::codec;
use crate::errors::RemoteError;
use crate::merge::{self, Reconciliation};
use crate::models::{RemoteDocument, Snapshot, SyncMeta};
use crate::remote::RemoteStore;
use crate::state::Journal;
use crate::storage::LocalStore;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);
const STATUS_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Dirty,
    Syncing,
    SyncFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No remote is connected.
    NotConfigured,
    /// Flush requested but nothing was dirty.
    NothingPending,
    /// Another sync is already running.
    InFlight,
    /// Remote already equals local; nothing written.
    UpToDate,
    Pushed,
    AdoptedRemote,
    MergedAndPushed,
    Failed(String),
}

impl SyncOutcome {
    fn wrote(&self) -> bool {
        matches!(self, SyncOutcome::Pushed | SyncOutcome::MergedAndPushed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub dirty: bool,
    pub connected: bool,
    pub last_sync: Option<i64>,
    pub message: Option<String>,
}

struct StatusMessage {
    text: String,
    at: Instant,
}

struct SyncState {
    phase: SyncPhase,
    revision: u64,
    confirmed: u64,
    remote: Option<Arc<dyn RemoteStore>>,
    last_sync: Option<i64>,
    pending: Option<JoinHandle<()>>,
    timer_seq: u64,
    message: Option<StatusMessage>,
    reconcile_pending: bool,
}

impl SyncState {
    fn cancel_timer(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    fn set_message(&mut self, text: impl Into<String>) {
        self.message = Some(StatusMessage {
            text: text.into(),
            at: Instant::now(),
        });
    }
}

#[derive(Clone)]
pub struct SyncCoordinator {
    journal: Arc<Mutex<Journal>>,
    local: LocalStore,
    state: Arc<Mutex<SyncState>>,
    debounce: Duration,
}

impl SyncCoordinator {
    pub fn new(
        journal: Arc<Mutex<Journal>>,
        local: LocalStore,
        remote: Option<Arc<dyn RemoteStore>>,
        meta: SyncMeta,
        debounce: Duration,
    ) -> Self {
        let state = SyncState {
            phase: SyncPhase::Idle,
            revision: 0,
            confirmed: 0,
            remote,
            last_sync: meta.last_sync,
            pending: None,
            timer_seq: 0,
            message: None,
            reconcile_pending: false,
        };
        Self {
            journal,
            local,
            state: Arc::new(Mutex::new(state)),
            debounce,
        }
    }

    /// Swaps the remote. Dropping it cancels any scheduled sync; connecting
    /// one while dirty schedules a sync.
    pub async fn set_remote(&self, remote: Option<Arc<dyn RemoteStore>>) {
        let mut state = self.state.lock().await;
        state.cancel_timer();
        state.remote = remote;
        if state.remote.is_some() {
            state.set_message("Connected");
            if state.phase == SyncPhase::Dirty {
                self.schedule(&mut state);
            }
        } else {
            state.set_message("Disconnected");
        }
    }

    /// Records a local mutation and restarts the debounce timer.
    pub async fn mark_dirty(&self) {
        let mut state = self.state.lock().await;
        state.revision += 1;
        if matches!(state.phase, SyncPhase::Idle | SyncPhase::SyncFailed) {
            debug!(revision = state.revision, "local state dirty");
            state.phase = SyncPhase::Dirty;
        }
        if state.remote.is_some() {
            self.schedule(&mut state);
        }
    }

    /// Sets a transient status message for the UI.
    pub async fn notify(&self, text: impl Into<String>) {
        self.state.lock().await.set_message(text);
    }

    pub async fn status(&self) -> SyncStatus {
        let mut state = self.state.lock().await;
        if state
            .message
            .as_ref()
            .is_some_and(|message| message.at.elapsed() > STATUS_TTL)
        {
            state.message = None;
        }
        SyncStatus {
            phase: state.phase,
            dirty: state.revision != state.confirmed,
            connected: state.remote.is_some(),
            last_sync: state.last_sync,
            message: state.message.as_ref().map(|message| message.text.clone()),
        }
    }

    /// Syncs now if there is something pending. Used for the debounce timer
    /// and when the app goes to the background.
    pub async fn flush(&self) -> SyncOutcome {
        self.run(true).await
    }

    /// Manual sync: runs from any state except an in-flight sync.
    pub async fn sync_now(&self) -> SyncOutcome {
        self.run(false).await
    }

    /// Hiding the app skips the rest of the debounce window.
    pub async fn on_visibility_change(&self, hidden: bool) -> SyncOutcome {
        if !hidden {
            return SyncOutcome::NothingPending;
        }
        info!("app hidden; flushing pending changes");
        self.flush().await
    }

    /// Startup merge of local and remote. If local holds anything the remote
    /// lacks, the union (local wins) is written back; otherwise the remote
    /// replaces local state.
    pub async fn reconcile_on_startup(&self) -> SyncOutcome {
        let Some(attempt) = self.begin(false, true).await else {
            return self.skipped(false).await;
        };
        info!("startup reconciliation started");
        let result = self.reconcile(attempt.remote.as_ref()).await;
        self.finish(attempt, result).await
    }

    /// Changes recorded remotely since local midnight, or `None` without a remote.
    pub async fn commits_today(&self) -> Result<Option<u64>, RemoteError> {
        let remote = self.state.lock().await.remote.clone();
        let Some(remote) = remote else {
            return Ok(None);
        };
        remote.commits_since(start_of_today()).await.map(Some)
    }

    fn schedule(&self, state: &mut SyncState) {
        state.cancel_timer();
        state.timer_seq += 1;
        let seq = state.timer_seq;
        let delay = self.debounce;
        let this = self.clone();
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.timer_fired(seq).await;
        }));
    }

    async fn timer_fired(&self, seq: u64) {
        {
            let mut state = self.state.lock().await;
            if state.timer_seq != seq {
                return;
            }
            // From here on the sync is no longer cancellable.
            state.pending = None;
        }
        let outcome = self.flush().await;
        debug!(?outcome, "debounced sync finished");
    }

    async fn run(&self, require_dirty: bool) -> SyncOutcome {
        let Some(attempt) = self.begin(require_dirty, false).await else {
            return self.skipped(require_dirty).await;
        };
        let result = if attempt.reconcile {
            info!(revision = attempt.revision, "retrying startup reconciliation");
            self.reconcile(attempt.remote.as_ref()).await
        } else {
            info!(revision = attempt.revision, "sync started");
            self.push(attempt.remote.as_ref()).await
        };
        self.finish(attempt, result).await
    }

    /// Moves to `Syncing` and captures what this attempt will do.
    async fn begin(&self, require_dirty: bool, reconcile: bool) -> Option<Attempt> {
        let mut state = self.state.lock().await;
        if state.phase == SyncPhase::Syncing {
            return None;
        }
        if require_dirty && state.phase != SyncPhase::Dirty {
            return None;
        }
        let remote = state.remote.clone()?;
        state.cancel_timer();
        state.phase = SyncPhase::Syncing;
        Some(Attempt {
            remote,
            revision: state.revision,
            reconcile: reconcile || state.reconcile_pending,
        })
    }

    async fn skipped(&self, require_dirty: bool) -> SyncOutcome {
        let state = self.state.lock().await;
        if state.phase == SyncPhase::Syncing {
            SyncOutcome::InFlight
        } else if require_dirty && state.phase != SyncPhase::Dirty {
            SyncOutcome::NothingPending
        } else {
            SyncOutcome::NotConfigured
        }
    }

    async fn push(&self, remote: &dyn RemoteStore) -> Result<SyncOutcome, RemoteError> {
        let (remote_snapshot, version) = split_document(remote.fetch().await?);
        // Read local state only now, so edits made while the timer ran are included.
        let local = self.journal.lock().await.snapshot();
        if codec::to_canonical_json(&local)? == codec::to_canonical_json(&remote_snapshot)? {
            debug!("remote already matches local state");
            return Ok(SyncOutcome::UpToDate);
        }
        remote.store(&local, version.as_deref()).await?;
        Ok(SyncOutcome::Pushed)
    }

    async fn reconcile(&self, remote: &dyn RemoteStore) -> Result<SyncOutcome, RemoteError> {
        let (remote_snapshot, version) = split_document(remote.fetch().await?);
        let mut journal = self.journal.lock().await;
        let local = journal.snapshot();

        match merge::reconcile(&local, &remote_snapshot) {
            Reconciliation::AdoptRemote => {
                if local == remote_snapshot {
                    return Ok(SyncOutcome::UpToDate);
                }
                info!(
                    entries = remote_snapshot.entries.len(),
                    phases = remote_snapshot.phases.len(),
                    "adopting remote snapshot"
                );
                *journal = Journal::from_snapshot(remote_snapshot);
                self.persist(&journal.snapshot()).await;
                Ok(SyncOutcome::AdoptedRemote)
            }
            Reconciliation::PushMerged(merged) => {
                *journal = Journal::from_snapshot(merged);
                let merged = journal.snapshot();
                info!(
                    entries = merged.entries.len(),
                    phases = merged.phases.len(),
                    "local changes missing remotely; pushing merged snapshot"
                );
                self.persist(&merged).await;
                drop(journal);
                remote.store(&merged, version.as_deref()).await?;
                Ok(SyncOutcome::MergedAndPushed)
            }
        }
    }

    async fn persist(&self, snapshot: &Snapshot) {
        if let Err(err) = self.local.save_snapshot(snapshot).await {
            error!("failed to persist reconciled snapshot: {err}");
        }
    }

    async fn finish(
        &self,
        attempt: Attempt,
        result: Result<SyncOutcome, RemoteError>,
    ) -> SyncOutcome {
        let revision = attempt.revision;
        let mut state = self.state.lock().await;
        if attempt.reconcile {
            state.reconcile_pending = result.is_err();
        }
        let outcome = match result {
            Ok(outcome) => {
                state.confirmed = state.confirmed.max(revision);
                if outcome.wrote() {
                    state.last_sync = Some(Utc::now().timestamp_millis());
                    state.set_message("Synced");
                }
                info!(?outcome, "sync finished");
                outcome
            }
            Err(err) => {
                if err.is_conflict() {
                    warn!("sync rejected: remote changed since it was read");
                } else {
                    warn!("sync failed: {err}");
                }
                state.set_message(format!("Sync failed: {err}"));
                SyncOutcome::Failed(err.to_string())
            }
        };

        let edited_meanwhile = state.revision != revision;
        state.phase = match (&outcome, edited_meanwhile) {
            (_, true) => SyncPhase::Dirty,
            (SyncOutcome::Failed(_), false) => SyncPhase::SyncFailed,
            (_, false) => SyncPhase::Idle,
        };
        if state.phase == SyncPhase::Dirty && state.pending.is_none() && state.remote.is_some() {
            self.schedule(&mut state);
        }

        let meta = SyncMeta {
            last_sync: state.last_sync,
        };
        drop(state);

        if outcome.wrote() {
            if let Err(err) = self.local.save_sync_meta(&meta).await {
                error!("failed to persist sync metadata: {err}");
            }
        }
        outcome
    }
}

struct Attempt {
    remote: Arc<dyn RemoteStore>,
    revision: u64,
    reconcile: bool,
}

fn split_document(document: Option<RemoteDocument>) -> (Snapshot, Option<String>) {
    match document {
        Some(document) => (document.snapshot, document.version),
        None => (Snapshot::default(), None),
    }
}

pub fn start_of_today() -> DateTime<Utc> {
    Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
