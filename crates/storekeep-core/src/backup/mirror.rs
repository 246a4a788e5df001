use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backup::{BackupRemote, CacheBackup, PersistOutcome, RestoreOutcome, SkipReason};
use crate::models::{CoreError, CoreErrorKind, SyncScope};
use crate::sqlite::probe_database;

/// Sibling file holding the last known-good local cache during a restore.
pub fn backup_path(local_path: &Path) -> PathBuf {
    let mut raw = local_path.as_os_str().to_os_string();
    raw.push(".backup");
    PathBuf::from(raw)
}

/// Keeps one local cache file and one remote object in step.
pub struct CacheMirror {
    local_path: PathBuf,
    remote: Arc<dyn BackupRemote>,
    min_backup_bytes: u64,
}

impl CacheMirror {
    pub fn new(
        local_path: impl Into<PathBuf>,
        remote: Arc<dyn BackupRemote>,
        min_backup_bytes: u64,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            remote,
            min_backup_bytes,
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Replaces the local cache with the remote copy, unless the remote
    /// copy is empty or fails the integrity probe.
    pub fn restore(&self) -> RestoreOutcome {
        let blob = match self.remote.fetch() {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                tracing::info!(path = %self.local_path.display(), "no remote cache copy to restore");
                return RestoreOutcome::NoRemoteCopy;
            }
            Err(error) => {
                tracing::warn!(error = %error, "remote cache copy could not be fetched");
                return RestoreOutcome::Unavailable(error.with_scope(SyncScope::Backup));
            }
        };

        if blob.content.is_empty() {
            tracing::warn!(sha = %blob.sha, "remote cache copy is empty; keeping local file");
            return RestoreOutcome::RejectedEmptyBlob;
        }

        let backup = backup_path(&self.local_path);
        let backed_up = if self.local_path.exists() {
            if let Err(error) = fs::copy(&self.local_path, &backup) {
                let error = io_error("copy local cache to backup", &error);
                tracing::warn!(error = %error, "not restoring without a backup of the local cache");
                return RestoreOutcome::Unavailable(error);
            }
            true
        } else {
            // A backup left by an earlier run does not describe this cache.
            remove_if_present(&backup);
            false
        };

        let written = fs::write(&self.local_path, &blob.content)
            .map_err(|error| io_error("write restored cache", &error));
        let verdict = written.and_then(|()| probe_database(&self.local_path));

        match verdict {
            Ok(()) => {
                let bytes = blob.content.len() as u64;
                tracing::info!(bytes, sha = %blob.sha, "restored cache from remote copy");
                RestoreOutcome::Restored { bytes }
            }
            Err(error) if backed_up => self.roll_back(&backup, error.message),
            Err(error) => self.discard(error.message),
        }
    }

    fn roll_back(&self, backup: &Path, reason: String) -> RestoreOutcome {
        if let Err(error) = probe_database(backup) {
            tracing::warn!(error = %error, "backup of the local cache is not usable either");
            return self.discard(reason);
        }
        match fs::copy(backup, &self.local_path) {
            Ok(_) => {
                tracing::warn!(reason = %reason, "restored cache was corrupt; reverted to backup");
                RestoreOutcome::RevertedToBackup { reason }
            }
            Err(error) => {
                let error = io_error("revert cache from backup", &error);
                tracing::error!(error = %error, "could not revert corrupt cache");
                RestoreOutcome::Unavailable(error)
            }
        }
    }

    fn discard(&self, reason: String) -> RestoreOutcome {
        remove_if_present(&self.local_path);
        tracing::warn!(reason = %reason, "restored cache was corrupt and no usable backup exists; discarded it");
        RestoreOutcome::DiscardedCorrupt { reason }
    }

    fn try_persist(&self) -> Result<PersistOutcome, CoreError> {
        let metadata = match fs::metadata(&self.local_path) {
            Ok(metadata) => metadata,
            Err(_) => return Ok(PersistOutcome::Skipped(SkipReason::Missing)),
        };

        if let Err(error) = probe_database(&self.local_path) {
            return Ok(PersistOutcome::Skipped(SkipReason::IntegrityCheckFailed {
                reason: error.message,
            }));
        }

        let bytes = metadata.len();
        if bytes < self.min_backup_bytes {
            return Ok(PersistOutcome::Skipped(SkipReason::TooSmall {
                bytes,
                minimum: self.min_backup_bytes,
            }));
        }

        let content =
            fs::read(&self.local_path).map_err(|error| io_error("read local cache", &error))?;
        let sha = self.remote.current_sha()?;
        self.remote.put(&content, sha.as_deref())?;

        Ok(PersistOutcome::Uploaded {
            bytes: content.len() as u64,
            created: sha.is_none(),
        })
    }
}

impl CacheBackup for CacheMirror {
    fn persist(&self) -> PersistOutcome {
        match self.try_persist() {
            Ok(PersistOutcome::Uploaded { bytes, created }) => {
                tracing::info!(bytes, created, "cache backup uploaded");
                PersistOutcome::Uploaded { bytes, created }
            }
            Ok(PersistOutcome::Skipped(reason)) => {
                tracing::warn!(reason = ?reason, "cache backup skipped");
                PersistOutcome::Skipped(reason)
            }
            Ok(outcome) => outcome,
            Err(error) => {
                let error = error.with_scope(SyncScope::Backup);
                tracing::warn!(error = %error, "cache backup failed");
                PersistOutcome::Failed(error)
            }
        }
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "could not remove file");
        }
    }
}

fn io_error(action: &str, error: &std::io::Error) -> CoreError {
    CoreError::new(CoreErrorKind::BackupSync, format!("{action}: {error}"))
        .with_scope(SyncScope::Backup)
}
