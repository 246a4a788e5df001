mod engine;
mod screenshots;

use std::fmt::{Display, Formatter};

pub use engine::SyncEngine;

use crate::backup::PersistOutcome;
use crate::models::{
    App, Attribute, AttributeChanges, CoreError, CoreErrorKind, Platform, StoreId,
};

pub type SyncResult<T> = Result<T, CoreError>;

/// What a single-attribute refresh reconciles: the scope owning one
/// attribute, or the screenshot scope.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SyncTarget {
    Attribute(Attribute),
    Screenshots,
}

impl Display for SyncTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attribute(attribute) => f.write_str(attribute.as_str()),
            Self::Screenshots => f.write_str("screenshots"),
        }
    }
}

impl std::str::FromStr for SyncTarget {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "screenshots" {
            return Ok(Self::Screenshots);
        }
        value.parse::<Attribute>().map(Self::Attribute)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppFailure {
    pub app_id: String,
    pub error: CoreError,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncReport {
    pub store_id: StoreId,
    pub apps_listed: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<AppFailure>,
    pub orphans_removed: usize,
    pub warnings: Vec<String>,
    pub backup: PersistOutcome,
}

impl SyncReport {
    /// A full refresh counts as successful when at least one app made it.
    pub fn is_success(&self) -> bool {
        !self.succeeded.is_empty()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RowCounts {
    pub info_localizations: usize,
    pub versions: usize,
    pub version_localizations: usize,
    pub screenshots: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppSyncOutcome {
    pub app: App,
    pub rows: RowCounts,
    pub warnings: Vec<String>,
    pub backup: PersistOutcome,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScopeRefresh {
    pub rows: RowCounts,
    pub warnings: Vec<String>,
    pub backup: PersistOutcome,
}

/// A remote edit of one localization. `platform` narrows the refresh of a
/// version-scoped edit; when absent it is looked up in the cache.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchRequest {
    pub app_id: String,
    pub localization_id: String,
    pub changes: AttributeChanges,
    pub platform: Option<Platform>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOutcome {
    Reconciled { backup: PersistOutcome },
    /// The remote accepted the edit but re-reading it failed; the cache
    /// still shows the previous value.
    SavedStale { refresh_error: CoreError },
}

impl WriteOutcome {
    pub fn user_message(&self) -> String {
        match self {
            Self::Reconciled { .. } => "Saved.".to_string(),
            Self::SavedStale { refresh_error } => format!(
                "Saved remotely, but the local cache could not be refreshed ({}); refresh manually to see the current state.",
                refresh_error.message
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalizedEdit {
    pub localization_id: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TranslationRequest {
    pub attribute: Attribute,
    pub app_id: String,
    pub platform: Option<Platform>,
    /// Receives `source_text` verbatim instead of a translation.
    pub source_locale: Option<String>,
    pub source_text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScreenshotUpload {
    pub localization_id: String,
    pub display_type: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Text translation helper; the engine only needs `text, locale -> text`.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, target_locale: &str) -> Result<String, CoreError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ItemFailure {
    /// Localization id for text edits, file name for uploads.
    pub item: String,
    pub locale: Option<String>,
    pub error: CoreError,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<ItemFailure>,
    pub refresh_error: Option<CoreError>,
    pub backup: PersistOutcome,
}

impl BatchReport {
    fn new(attempted: usize) -> Self {
        Self {
            attempted,
            succeeded: Vec::new(),
            failed: Vec::new(),
            refresh_error: None,
            backup: PersistOutcome::Disabled,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.refresh_error.is_none()
    }

    /// `None` when every item went through. A mix of successes and
    /// failures is a `PartialBatchFailure` naming each failed item.
    pub fn error(&self) -> Option<CoreError> {
        if self.failed.is_empty() {
            return None;
        }
        if self.succeeded.is_empty() && self.failed.len() == 1 {
            return Some(self.failed[0].error.clone());
        }
        let items: Vec<String> = self
            .failed
            .iter()
            .map(|failure| match &failure.locale {
                Some(locale) => format!("{locale} ({}): {}", failure.item, failure.error.message),
                None => format!("{}: {}", failure.item, failure.error.message),
            })
            .collect();
        let kind = if self.succeeded.is_empty() {
            self.failed[0].error.kind
        } else {
            CoreErrorKind::PartialBatchFailure
        };
        Some(CoreError::new(
            kind,
            format!(
                "{} of {} failed: {}",
                self.failed.len(),
                self.attempted,
                items.join("; ")
            ),
        ))
    }
}
