//! Remote replica of the snapshot.
//!
//! The remote is a single document behind a content-addressed file API: a
//! read returns the document and a version token, a write must present the
//! token it read so a concurrent writer is detected instead of overwritten.

mod github;
mod memory;

pub use github::{GithubStore, DEFAULT_API_URL, DEFAULT_DATA_PATH};
pub use memory::MemoryRemote;

use crate::errors::RemoteError;
use crate::models::{RemoteDocument, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` when the document does not exist yet.
    async fn fetch(&self) -> Result<Option<RemoteDocument>, RemoteError>;

    /// Writes `snapshot`. `version` is the token from the last read, if any.
    /// Returns the new version token when the store reports one.
    async fn store(
        &self,
        snapshot: &Snapshot,
        version: Option<&str>,
    ) -> Result<Option<String>, RemoteError>;

    /// Number of changes recorded since `since`.
    async fn commits_since(&self, since: DateTime<Utc>) -> Result<u64, RemoteError>;
}
