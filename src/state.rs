use crate::analytics::{self, MetricSummary, PhaseStats, RollingPoint, StatsRange, StreakPoint};
use crate::config::Config;
use crate::errors::{ConnectError, RemoteError, StorageError, ValidationError};
use crate::models::{Credentials, FlagKey, MetricEntry, MetricKey, Phase, Snapshot, SyncMeta};
use crate::phases::PhaseTracker;
use crate::records::RecordStore;
use crate::remote::{GithubStore, RemoteStore};
use crate::storage::LocalStore;
use crate::sync::SyncCoordinator;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Authoritative in-memory state: the daily log plus the phase list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    pub records: RecordStore,
    pub phases: PhaseTracker,
}

impl Journal {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            records: RecordStore::from_entries(snapshot.entries),
            phases: PhaseTracker::from_phases(snapshot.phases),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.records.entries().clone(),
            phases: self.phases.phases().to_vec(),
        }
    }
}

/// The single owner of session state. Every read and write from the UI goes
/// through here; writes persist locally before returning and then mark the
/// sync coordinator dirty.
#[derive(Clone)]
pub struct AppState {
    pub local: LocalStore,
    pub journal: Arc<Mutex<Journal>>,
    pub sync: SyncCoordinator,
    remote_api_url: String,
    remote_data_path: String,
    load_issues: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(
        local: LocalStore,
        journal: Journal,
        remote: Option<Arc<dyn RemoteStore>>,
        meta: SyncMeta,
        config: &Config,
    ) -> Self {
        let journal = Arc::new(Mutex::new(journal));
        let sync = SyncCoordinator::new(
            Arc::clone(&journal),
            local.clone(),
            remote,
            meta,
            config.sync_debounce,
        );
        Self {
            local,
            journal,
            sync,
            remote_api_url: config.remote_api_url.clone(),
            remote_data_path: config.remote_data_path.clone(),
            load_issues: Arc::new(Vec::new()),
        }
    }

    /// Loads everything from the local store. Unreadable blobs do not stop
    /// startup; they are listed in [`AppState::load_issues`].
    pub async fn open(config: &Config) -> Result<Self, StorageError> {
        let local = LocalStore::new(&config.data_dir);
        local.ensure_dir().await?;

        let loaded = local.load_journal().await;
        let meta = local.load_sync_meta().await;
        let remote = match local.load_credentials().await {
            Ok(Some(credentials)) if credentials.connected => {
                match Self::build_remote(config, &credentials) {
                    Ok(remote) => Some(remote),
                    Err(err) => {
                        warn!("remote unavailable: {err}");
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(err) => {
                warn!("ignoring stored credentials: {err}");
                None
            }
        };

        let journal = Journal::from_snapshot(loaded.snapshot);
        info!(
            entries = journal.records.len(),
            phases = journal.phases.phases().len(),
            connected = remote.is_some(),
            "local state loaded"
        );

        let mut state = Self::new(local, journal, remote, meta, config);
        state.load_issues = Arc::new(loaded.issues.iter().map(ToString::to_string).collect());
        Ok(state)
    }

    fn build_remote(
        config: &Config,
        credentials: &Credentials,
    ) -> Result<Arc<dyn RemoteStore>, RemoteError> {
        let store = GithubStore::new(
            config.remote_api_url.as_str(),
            config.remote_data_path.as_str(),
            credentials,
        )?;
        Ok(Arc::new(store))
    }

    pub fn load_issues(&self) -> &[String] {
        &self.load_issues
    }

    pub async fn entry(&self, date: &str) -> Option<MetricEntry> {
        self.journal.lock().await.records.get(date).cloned()
    }

    pub async fn entries(&self) -> BTreeMap<String, MetricEntry> {
        self.journal.lock().await.records.entries().clone()
    }

    pub async fn dates(&self) -> Vec<String> {
        let journal = self.journal.lock().await;
        journal.records.all_dates().map(str::to_string).collect()
    }

    /// Replaces the entry for `date`. Never fails on storage problems; those
    /// are logged and shown as a status message.
    pub async fn put_entry(&self, date: &str, entry: MetricEntry) -> Result<(), ValidationError> {
        validate_date(date)?;
        validate_entry(&entry)?;

        let changed = {
            let mut journal = self.journal.lock().await;
            let changed = journal.records.put(date, entry);
            if changed {
                self.persist_entries(&journal).await;
            }
            changed
        };
        if changed {
            self.sync.mark_dirty().await;
        }
        Ok(())
    }

    pub async fn remove_entry(&self, date: &str) -> bool {
        let removed = {
            let mut journal = self.journal.lock().await;
            let removed = journal.records.remove(date).is_some();
            if removed {
                self.persist_entries(&journal).await;
            }
            removed
        };
        if removed {
            self.sync.mark_dirty().await;
        }
        removed
    }

    pub async fn phases(&self) -> Vec<Phase> {
        self.journal.lock().await.phases.phases().to_vec()
    }

    pub async fn phase(&self, id: i64) -> Option<Phase> {
        self.journal.lock().await.phases.get(id).cloned()
    }

    pub async fn current_phase(&self) -> Option<Phase> {
        self.journal.lock().await.phases.current_phase().cloned()
    }

    pub async fn add_phase(
        &self,
        name: &str,
        start: &str,
        goals: BTreeMap<String, String>,
    ) -> Result<Phase, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyPhaseName);
        }
        validate_date(start)?;
        if let Some(unknown) = goals.keys().find(|key| MetricKey::parse(key).is_none()) {
            return Err(ValidationError::UnknownMetric(unknown.clone()));
        }
        let goals = goals
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();

        let phase = {
            let mut journal = self.journal.lock().await;
            let phase = journal
                .phases
                .add_phase(Utc::now().timestamp_millis(), name, start, goals);
            self.persist_phases(&journal).await;
            phase
        };
        info!(id = phase.id, name = %phase.name, start = %phase.start, "phase started");
        self.sync.mark_dirty().await;
        Ok(phase)
    }

    pub async fn end_phase(&self, id: i64, end: &str) -> Result<bool, ValidationError> {
        validate_date(end)?;
        let ended = {
            let mut journal = self.journal.lock().await;
            let ended = journal.phases.end_phase(id, end);
            if ended {
                self.persist_phases(&journal).await;
            }
            ended
        };
        if ended {
            info!(id, end, "phase ended");
            self.sync.mark_dirty().await;
        }
        Ok(ended)
    }

    pub async fn delete_phase(&self, id: i64) -> bool {
        let deleted = {
            let mut journal = self.journal.lock().await;
            let deleted = journal.phases.delete_phase(id);
            if deleted {
                self.persist_phases(&journal).await;
            }
            deleted
        };
        if deleted {
            info!(id, "phase deleted");
            self.sync.mark_dirty().await;
        }
        deleted
    }

    pub async fn rolling_average(
        &self,
        metric: MetricKey,
        window: usize,
        range: StatsRange,
    ) -> Vec<RollingPoint> {
        let journal = self.journal.lock().await;
        let dates = analytics::dates_in_range(&journal.records, range);
        analytics::rolling_average(&journal.records, &dates, metric, window)
    }

    pub async fn metric_summary(&self, metric: MetricKey, range: StatsRange) -> MetricSummary {
        let journal = self.journal.lock().await;
        let dates = analytics::dates_in_range(&journal.records, range);
        analytics::metric_summary(&journal.records, &dates, metric)
    }

    pub async fn phase_stats(&self, id: i64) -> Option<PhaseStats> {
        let journal = self.journal.lock().await;
        let phase = journal.phases.get(id)?;
        Some(analytics::phase_stats(&journal.records, phase))
    }

    pub async fn streaks(&self) -> Vec<StreakPoint> {
        analytics::streaks(&self.journal.lock().await.records)
    }

    /// Stores credentials and starts replicating to the remote they name.
    pub async fn connect_remote(&self, mut credentials: Credentials) -> Result<(), ConnectError> {
        credentials.connected = true;
        let config = Config {
            remote_api_url: self.remote_api_url.clone(),
            remote_data_path: self.remote_data_path.clone(),
            ..Config::default()
        };
        let remote = Self::build_remote(&config, &credentials)?;
        self.local.save_credentials(&credentials).await?;
        info!(owner = %credentials.owner, repo = %credentials.repo, "remote connected");
        self.sync.set_remote(Some(remote)).await;
        Ok(())
    }

    pub async fn disconnect_remote(&self) -> Result<(), StorageError> {
        self.local.clear_credentials().await?;
        self.sync.set_remote(None).await;
        info!("remote disconnected");
        Ok(())
    }

    async fn persist_entries(&self, journal: &Journal) {
        if let Err(err) = self.local.save_entries(journal.records.entries()).await {
            error!("failed to persist entries: {err}");
            self.sync.notify(format!("Could not save locally: {err}")).await;
        }
    }

    async fn persist_phases(&self, journal: &Journal) {
        if let Err(err) = self.local.save_phases(journal.phases.phases()).await {
            error!("failed to persist phases: {err}");
            self.sync.notify(format!("Could not save locally: {err}")).await;
        }
    }
}

pub fn validate_date(raw: &str) -> Result<(), ValidationError> {
    // Fixed width keeps lexicographic order equal to date order.
    if raw.len() == 10 && analytics::parse_date(raw).is_some() {
        Ok(())
    } else {
        Err(ValidationError::InvalidDate(raw.to_string()))
    }
}

fn validate_entry(entry: &MetricEntry) -> Result<(), ValidationError> {
    if let Some(unknown) = entry.values.keys().find(|key| MetricKey::parse(key).is_none()) {
        return Err(ValidationError::UnknownMetric(unknown.clone()));
    }
    if let Some(unknown) = entry.flags.keys().find(|key| FlagKey::parse(key).is_none()) {
        return Err(ValidationError::UnknownFlag(unknown.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_must_be_zero_padded_iso() {
        assert!(validate_date("2024-01-05").is_ok());
        assert!(validate_date("2024-1-5").is_err());
        assert!(validate_date("2024-02-30").is_err());
        assert!(validate_date("").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected_on_write() {
        let mut entry = MetricEntry::default();
        entry.values.insert("mood".to_string(), "good".to_string());
        assert_eq!(
            validate_entry(&entry),
            Err(ValidationError::UnknownMetric("mood".to_string()))
        );

        let mut entry = MetricEntry::default();
        entry.flags.insert("sauna".to_string(), true);
        assert_eq!(
            validate_entry(&entry),
            Err(ValidationError::UnknownFlag("sauna".to_string()))
        );
    }

    #[test]
    fn journal_snapshot_round_trips() {
        let mut journal = Journal::default();
        journal
            .records
            .put("2024-01-01", MetricEntry::default().with_value(MetricKey::Weight, "80"));
        journal.phases.add_phase(1, "Cut", "2024-01-01", BTreeMap::new());

        let rebuilt = Journal::from_snapshot(journal.snapshot());
        assert_eq!(rebuilt, journal);
    }

    #[tokio::test]
    async fn connecting_saves_credentials_and_marks_sync_connected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let state = AppState::open(&config).await.unwrap();
        assert!(!state.sync.status().await.connected);

        let credentials = Credentials {
            token: "t".to_string(),
            owner: "octo".to_string(),
            repo: "health".to_string(),
            connected: false,
        };
        state.connect_remote(credentials).await.unwrap();

        assert!(state.sync.status().await.connected);
        let saved = state.local.load_credentials().await.unwrap().unwrap();
        assert!(saved.connected);

        state.disconnect_remote().await.unwrap();
        assert!(!state.sync.status().await.connected);
    }
}
