mod github;
mod mirror;

pub use github::{DEFAULT_GITHUB_API_URL, GithubContentsRemote, SYNC_COMMIT_MESSAGE};
pub use mirror::{CacheMirror, backup_path};

use crate::models::CoreError;

pub type BackupResult<T> = Result<T, CoreError>;

/// Remote copy of the cache file together with its version token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteBlob {
    pub content: Vec<u8>,
    pub sha: String,
}

/// A single remote object holding the whole cache file.
pub trait BackupRemote: Send + Sync {
    fn fetch(&self) -> BackupResult<Option<RemoteBlob>>;

    fn current_sha(&self) -> BackupResult<Option<String>> {
        Ok(self.fetch()?.map(|blob| blob.sha))
    }

    /// `previous_sha` is `None` when the object does not exist yet.
    fn put(&self, content: &[u8], previous_sha: Option<&str>) -> BackupResult<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum RestoreOutcome {
    NoRemoteCopy,
    Restored { bytes: u64 },
    /// The remote object was empty; the local file was left as it was.
    RejectedEmptyBlob,
    /// The downloaded file failed the integrity probe and the previous
    /// local file was put back.
    RevertedToBackup { reason: String },
    /// The downloaded file failed the probe and there was nothing to put
    /// back; the corrupt file was removed.
    DiscardedCorrupt { reason: String },
    Unavailable(CoreError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    Missing,
    IntegrityCheckFailed { reason: String },
    TooSmall { bytes: u64, minimum: u64 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum PersistOutcome {
    Disabled,
    Uploaded { bytes: u64, created: bool },
    Skipped(SkipReason),
    Failed(CoreError),
}

impl PersistOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }
}

/// Best-effort push of the cache file after a mutation. Never fails the
/// caller; the outcome is informational.
pub trait CacheBackup: Send + Sync {
    fn persist(&self) -> PersistOutcome;
}

/// Used when no remote backup is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBackup;

impl CacheBackup for NoopBackup {
    fn persist(&self) -> PersistOutcome {
        PersistOutcome::Disabled
    }
}
