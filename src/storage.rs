use crate::errors::StorageError;
use crate::models::{Credentials, MetricEntry, Phase, Snapshot, SyncMeta};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, warn};

pub const ENTRIES_KEY: &str = "entries";
pub const PHASES_KEY: &str = "phases";
pub const SYNC_META_KEY: &str = "sync_meta";
pub const CREDENTIALS_KEY: &str = "credentials";

/// Local key-value store: one JSON file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

/// Result of loading the journal. Unreadable blobs are reported in `issues`
/// and replaced by empty data; the bad file is moved aside first.
#[derive(Debug, Default)]
pub struct LoadedJournal {
    pub snapshot: Snapshot,
    pub issues: Vec<StorageError>,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await.map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    /// Writes through a temp file and rename so a crash never leaves a
    /// half-written blob behind.
    pub async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value)
            .await
            .map_err(|source| StorageError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| StorageError::Io { path, source })
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    pub async fn load_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let Some(text) = self.read(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StorageError::Malformed {
                key: key.to_string(),
                source,
            })
    }

    pub async fn save_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let payload =
            serde_json::to_string_pretty(value).map_err(|source| StorageError::Encode {
                key: key.to_string(),
                source,
            })?;
        self.write(key, &payload).await
    }

    /// Moves an unreadable blob to `<key>.corrupt.json`.
    async fn quarantine(&self, key: &str) {
        let from = self.path_for(key);
        let to = self.dir.join(format!("{key}.corrupt.json"));
        match fs::rename(&from, &to).await {
            Ok(()) => warn!(key, backup = %to.display(), "moved unreadable blob aside"),
            Err(err) => error!(key, "failed to move unreadable blob aside: {err}"),
        }
    }

    async fn load_or_quarantine<T: DeserializeOwned + Default>(
        &self,
        key: &str,
        issues: &mut Vec<StorageError>,
    ) -> T {
        match self.load_json(key).await {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                error!("failed to load {key}: {err}");
                if matches!(err, StorageError::Malformed { .. }) {
                    self.quarantine(key).await;
                }
                issues.push(err);
                T::default()
            }
        }
    }

    pub async fn load_journal(&self) -> LoadedJournal {
        let mut issues = Vec::new();
        let entries: BTreeMap<String, MetricEntry> =
            self.load_or_quarantine(ENTRIES_KEY, &mut issues).await;
        let phases: Vec<Phase> = self.load_or_quarantine(PHASES_KEY, &mut issues).await;
        LoadedJournal {
            snapshot: Snapshot { entries, phases },
            issues,
        }
    }

    pub async fn save_entries(
        &self,
        entries: &BTreeMap<String, MetricEntry>,
    ) -> Result<(), StorageError> {
        self.save_json(ENTRIES_KEY, entries).await
    }

    pub async fn save_phases(&self, phases: &[Phase]) -> Result<(), StorageError> {
        self.save_json(PHASES_KEY, phases).await
    }

    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        self.save_entries(&snapshot.entries).await?;
        self.save_phases(&snapshot.phases).await
    }

    pub async fn load_sync_meta(&self) -> SyncMeta {
        match self.load_json(SYNC_META_KEY).await {
            Ok(meta) => meta.unwrap_or_default(),
            Err(err) => {
                warn!("ignoring sync metadata: {err}");
                SyncMeta::default()
            }
        }
    }

    pub async fn save_sync_meta(&self, meta: &SyncMeta) -> Result<(), StorageError> {
        self.save_json(SYNC_META_KEY, meta).await
    }

    pub async fn load_credentials(&self) -> Result<Option<Credentials>, StorageError> {
        self.load_json(CREDENTIALS_KEY).await
    }

    pub async fn save_credentials(&self, credentials: &Credentials) -> Result<(), StorageError> {
        self.save_json(CREDENTIALS_KEY, credentials).await
    }

    pub async fn clear_credentials(&self) -> Result<(), StorageError> {
        self.remove(CREDENTIALS_KEY).await
    }
}
