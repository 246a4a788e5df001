use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::StoreId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    AuthFailure,
    RemoteUnavailable,
    RemoteRejected,
    PartialBatchFailure,
    CacheIntegrity,
    BackupSync,
    StorageFailure,
    InvalidInput,
    ParseFailure,
    NotFound,
    Internal,
}

/// The slice of cached state an operation was working on when it failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SyncScope {
    AppListing,
    AppInfo,
    Versions,
    Screenshots,
    Patch,
    Upload,
    Cache,
    Backup,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreError {
    pub store: Option<StoreId>,
    pub app: Option<String>,
    pub scope: Option<SyncScope>,
    pub kind: CoreErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            store: None,
            app: None,
            scope: None,
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_store(mut self, store: StoreId) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_app(mut self, app_id: &str) -> Self {
        self.app = Some(app_id.to_string());
        self
    }

    pub fn with_scope(mut self, scope: SyncScope) -> Self {
        self.scope.get_or_insert(scope);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Operator-facing wording; keeps "unreachable" and "rejected" apart.
    pub fn user_message(&self) -> String {
        match self.kind {
            CoreErrorKind::AuthFailure => {
                format!("Store credentials were not accepted: {}", self.message)
            }
            CoreErrorKind::RemoteUnavailable => {
                format!("Could not reach the app store service: {}", self.message)
            }
            CoreErrorKind::RemoteRejected => {
                format!("The app store service rejected the request: {}", self.message)
            }
            CoreErrorKind::PartialBatchFailure => {
                format!("Some items were not saved: {}", self.message)
            }
            CoreErrorKind::CacheIntegrity => {
                format!("The local cache file is damaged: {}", self.message)
            }
            CoreErrorKind::BackupSync => {
                format!("The cache backup could not be synced: {}", self.message)
            }
            _ => self.message.clone(),
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for CoreError {}
