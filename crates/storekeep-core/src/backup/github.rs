use std::io::Read;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;

use crate::api::HttpError;
use crate::backup::{BackupRemote, BackupResult, RemoteBlob};
use crate::config::GithubBackupConfig;
use crate::models::{CoreError, CoreErrorKind, SyncScope};

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const SYNC_COMMIT_MESSAGE: &str = "Auto-sync: DB update (safe)";

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

/// One file in a GitHub repository, accessed through the contents API.
pub struct GithubContentsRemote {
    config: GithubBackupConfig,
    agent: ureq::Agent,
}

impl GithubContentsRemote {
    pub fn new(config: GithubBackupConfig, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(timeout)
            .build();
        Self { config, agent }
    }

    fn contents_url(&self) -> String {
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_GITHUB_API_URL)
            .trim_end_matches('/');
        format!(
            "{base}/repos/{}/contents/{}",
            self.config.repo.trim_matches('/'),
            self.config.path.trim_start_matches('/')
        )
    }

    fn authorization(&self) -> String {
        format!("token {}", self.config.token)
    }

    fn fetch_contents(&self) -> BackupResult<Option<ContentsResponse>> {
        let url = self.contents_url();
        tracing::debug!(url = %url, branch = %self.config.branch, "GET");
        let response = self
            .agent
            .get(&url)
            .set("Authorization", &self.authorization())
            .set("Accept", "application/vnd.github.v3+json")
            .query("ref", &self.config.branch)
            .call();

        match response {
            Ok(response) => response
                .into_json::<ContentsResponse>()
                .map(Some)
                .map_err(|error| backup_error(HttpError::from(error))),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(error) => Err(backup_error(HttpError::from(error))),
        }
    }

    fn download(&self, url: &str) -> BackupResult<Vec<u8>> {
        tracing::debug!(url = %url, "GET raw");
        let response = self
            .agent
            .get(url)
            .set("Authorization", &self.authorization())
            .call()
            .map_err(|error| backup_error(HttpError::from(error)))?;
        let mut content = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut content)
            .map_err(|error| backup_error(HttpError::from(error)))?;
        Ok(content)
    }
}

impl BackupRemote for GithubContentsRemote {
    fn fetch(&self) -> BackupResult<Option<RemoteBlob>> {
        let Some(contents) = self.fetch_contents()? else {
            return Ok(None);
        };

        let content = match contents.download_url.as_deref() {
            Some(url) => self.download(url)?,
            None => decode_content(contents.content.as_deref().unwrap_or_default())?,
        };

        Ok(Some(RemoteBlob {
            content,
            sha: contents.sha,
        }))
    }

    fn current_sha(&self) -> BackupResult<Option<String>> {
        Ok(self.fetch_contents()?.map(|contents| contents.sha))
    }

    fn put(&self, content: &[u8], previous_sha: Option<&str>) -> BackupResult<()> {
        let mut body = json!({
            "message": SYNC_COMMIT_MESSAGE,
            "content": STANDARD.encode(content),
            "branch": self.config.branch,
        });
        if let Some(sha) = previous_sha {
            body["sha"] = json!(sha);
        }

        let url = self.contents_url();
        tracing::debug!(url = %url, bytes = content.len(), update = previous_sha.is_some(), "PUT");
        self.agent
            .put(&url)
            .set("Authorization", &self.authorization())
            .set("Accept", "application/vnd.github.v3+json")
            .send_json(body)
            .map_err(|error| backup_error(HttpError::from(error)))?;
        Ok(())
    }
}

/// The contents API wraps base64 output at 60 columns.
fn decode_content(encoded: &str) -> BackupResult<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|error| {
        CoreError::new(
            CoreErrorKind::BackupSync,
            format!("remote cache copy is not valid base64: {error}"),
        )
        .with_scope(SyncScope::Backup)
    })
}

fn backup_error(error: HttpError) -> CoreError {
    let status = error.status_code();
    let mut error = CoreError::new(CoreErrorKind::BackupSync, error.to_string())
        .with_scope(SyncScope::Backup);
    error.status = status;
    error
}
