use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::api::{ConnectClientConfig, DEFAULT_API_BASE_URL};
use crate::models::{CoreError, CoreErrorKind};

pub const DEFAULT_DATABASE_PATH: &str = "app_store_data.db";
pub const DEFAULT_SCREENSHOT_WORKERS: usize = 6;
pub const DEFAULT_MIN_BACKUP_BYTES: u64 = 1024;

/// Everything the engine and its adapters need, passed explicitly to
/// constructors.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub database_path: PathBuf,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub screenshot_workers: usize,
    pub min_backup_bytes: u64,
    pub github: Option<GithubBackupConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
            upload_timeout_secs: 60,
            connect_timeout_secs: 10,
            screenshot_workers: DEFAULT_SCREENSHOT_WORKERS,
            min_backup_bytes: DEFAULT_MIN_BACKUP_BYTES,
            github: None,
        }
    }
}

#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct GithubBackupConfig {
    pub token: String,
    pub repo: String,
    #[serde(default = "default_github_path")]
    pub path: String,
    #[serde(default = "default_github_branch")]
    pub branch: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl Debug for GithubBackupConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubBackupConfig")
            .field("token", &"<redacted>")
            .field("repo", &self.repo)
            .field("path", &self.path)
            .field("branch", &self.branch)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

fn default_github_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

fn default_github_branch() -> String {
    "main".to_string()
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        Self::default().with_overrides(lookup)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let raw = fs::read_to_string(path).map_err(|error| {
            invalid_config(format!("could not read '{}': {error}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|error| {
            invalid_config(format!("could not parse '{}': {error}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `STOREKEEP_*` values on top of `self`. Unset keys keep the
    /// current value.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CoreError> {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = value("STOREKEEP_DB_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(url) = value("STOREKEEP_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(raw) = value("STOREKEEP_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("STOREKEEP_REQUEST_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = value("STOREKEEP_UPLOAD_TIMEOUT_SECS") {
            self.upload_timeout_secs = parse_number("STOREKEEP_UPLOAD_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = value("STOREKEEP_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = parse_number("STOREKEEP_CONNECT_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = value("STOREKEEP_SCREENSHOT_WORKERS") {
            self.screenshot_workers = parse_number("STOREKEEP_SCREENSHOT_WORKERS", &raw)?;
        }
        if let Some(raw) = value("STOREKEEP_MIN_BACKUP_BYTES") {
            self.min_backup_bytes = parse_number("STOREKEEP_MIN_BACKUP_BYTES", &raw)?;
        }

        if let (Some(token), Some(repo)) =
            (value("STOREKEEP_GITHUB_TOKEN"), value("STOREKEEP_GITHUB_REPO"))
        {
            let previous = self.github.take();
            self.github = Some(GithubBackupConfig {
                token,
                repo,
                path: value("STOREKEEP_GITHUB_PATH")
                    .or_else(|| previous.as_ref().map(|github| github.path.clone()))
                    .unwrap_or_else(default_github_path),
                branch: value("STOREKEEP_GITHUB_BRANCH")
                    .or_else(|| previous.as_ref().map(|github| github.branch.clone()))
                    .unwrap_or_else(default_github_branch),
                api_base_url: value("STOREKEEP_GITHUB_API_URL")
                    .or_else(|| previous.and_then(|github| github.api_base_url)),
            });
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.screenshot_workers == 0 {
            return Err(invalid_config("screenshot_workers must be at least 1"));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(invalid_config("database_path must not be empty"));
        }
        if let Some(github) = &self.github {
            if github.token.trim().is_empty() || github.repo.trim().is_empty() {
                return Err(invalid_config("github backup needs both a token and a repo"));
            }
        }
        Ok(())
    }

    pub fn client_config(&self) -> ConnectClientConfig {
        ConnectClientConfig {
            base_url: self.api_base_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            upload_timeout: Duration::from_secs(self.upload_timeout_secs),
        }
    }

    pub fn backup_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| invalid_config(format!("{key} must be a non-negative integer, got '{raw}'")))
}

fn invalid_config(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}
