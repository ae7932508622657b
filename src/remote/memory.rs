use super::RemoteStore;
use crate::errors::RemoteError;
use crate::models::{RemoteDocument, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Stored {
    snapshot: Option<Snapshot>,
    version: u64,
    commits: Vec<DateTime<Utc>>,
}

/// In-process remote with the same version-token rules as the file API.
/// Writes against a stale token, or without a token once the document
/// exists, are rejected as conflicts.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    stored: Mutex<Stored>,
    offline: AtomicBool,
    reject_next_write: AtomicBool,
    writes: AtomicU32,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the remote document as if another device had written it.
    pub fn with_snapshot(self, snapshot: Snapshot) -> Self {
        self.replace(snapshot);
        self
    }

    /// Overwrites the document out of band and bumps the version.
    pub fn replace(&self, snapshot: Snapshot) {
        let mut stored = self.lock();
        stored.version += 1;
        stored.snapshot = Some(snapshot);
        stored.commits.push(Utc::now());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next write fail with a conflict, as if another device wrote
    /// between our read and our write.
    pub fn reject_next_write(&self) {
        self.reject_next_write.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.lock().snapshot.clone()
    }

    pub fn version(&self) -> Option<String> {
        let stored = self.lock();
        stored.snapshot.as_ref().map(|_| version_token(stored.version))
    }

    /// Number of accepted writes.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Stored> {
        self.stored.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("memory remote is offline".to_string()));
        }
        Ok(())
    }
}

fn version_token(version: u64) -> String {
    format!("v{version}")
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(&self) -> Result<Option<RemoteDocument>, RemoteError> {
        self.check_online()?;
        let stored = self.lock();
        Ok(stored.snapshot.as_ref().map(|snapshot| RemoteDocument {
            snapshot: snapshot.clone(),
            version: Some(version_token(stored.version)),
        }))
    }

    async fn store(
        &self,
        snapshot: &Snapshot,
        version: Option<&str>,
    ) -> Result<Option<String>, RemoteError> {
        self.check_online()?;
        if self.reject_next_write.swap(false, Ordering::SeqCst) {
            return Err(RemoteError::Conflict);
        }
        let mut stored = self.lock();
        if stored.snapshot.is_some() {
            let current = version_token(stored.version);
            if version != Some(current.as_str()) {
                return Err(RemoteError::Conflict);
            }
        }
        stored.version += 1;
        stored.snapshot = Some(snapshot.clone());
        stored.commits.push(Utc::now());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(version_token(stored.version)))
    }

    async fn commits_since(&self, since: DateTime<Utc>) -> Result<u64, RemoteError> {
        self.check_online()?;
        Ok(self.lock().commits.iter().filter(|at| **at >= since).count() as u64)
    }
}
