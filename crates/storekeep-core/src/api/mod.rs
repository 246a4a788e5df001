mod auth;
mod client;
mod http;
pub mod payload;

use std::ops::Range;

pub use auth::{BearerToken, TOKEN_AUDIENCE, TOKEN_LIFETIME_SECS, issue_token, issue_token_at};
pub use client::{ConnectClient, ConnectClientConfig, DEFAULT_API_BASE_URL};
pub use http::{HttpError, classify_status, vendor_error_detail};

use crate::models::{AttributeChanges, CoreError, CoreErrorKind, Platform, StoreCredentials};

pub type ApiResult<T> = Result<T, CoreError>;

/// The only lifecycle state this tool reads or mutates.
pub const EDITABLE_STATE: &str = "PREPARE_FOR_SUBMISSION";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteApp {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteAppInfo {
    pub id: String,
    pub state: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteInfoLocalization {
    pub id: String,
    pub locale: String,
    pub name: Option<String>,
    pub subtitle: Option<String>,
    pub privacy_policy_url: Option<String>,
    pub privacy_choices_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteVersion {
    pub id: String,
    pub platform: Platform,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteVersionLocalization {
    pub id: String,
    pub locale: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub marketing_url: Option<String>,
    pub promotional_text: Option<String>,
    pub support_url: Option<String>,
    pub whats_new: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteScreenshotSet {
    pub id: String,
    pub display_type: String,
}

/// `url` is already rendered from the vendor's template.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteScreenshot {
    pub id: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadOperation {
    pub method: String,
    pub url: String,
    pub request_headers: Vec<(String, String)>,
    pub offset: u64,
    pub length: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScreenshotReservation {
    pub id: String,
    pub upload_operations: Vec<UploadOperation>,
}

/// Typed view of the vendor's metadata REST API. Every call is a single
/// attempt; retries are left to the caller.
pub trait MetadataApi: Send + Sync {
    fn authenticate(&self, credentials: &StoreCredentials) -> ApiResult<BearerToken>;

    fn list_apps(&self, token: &BearerToken) -> ApiResult<Vec<RemoteApp>>;

    fn get_app_infos(&self, token: &BearerToken, app_id: &str) -> ApiResult<Vec<RemoteAppInfo>>;

    fn get_app_info_localizations(
        &self,
        token: &BearerToken,
        app_info_id: &str,
    ) -> ApiResult<Vec<RemoteInfoLocalization>>;

    /// Only versions in the editable state; `platform` narrows server-side.
    fn get_app_store_versions(
        &self,
        token: &BearerToken,
        app_id: &str,
        platform: Option<Platform>,
    ) -> ApiResult<Vec<RemoteVersion>>;

    fn get_version_localizations(
        &self,
        token: &BearerToken,
        version_id: &str,
    ) -> ApiResult<Vec<RemoteVersionLocalization>>;

    fn patch_info_localization(
        &self,
        token: &BearerToken,
        localization_id: &str,
        changes: &AttributeChanges,
    ) -> ApiResult<()>;

    fn patch_version_localization(
        &self,
        token: &BearerToken,
        localization_id: &str,
        changes: &AttributeChanges,
    ) -> ApiResult<()>;

    fn get_screenshot_sets(
        &self,
        token: &BearerToken,
        localization_id: &str,
    ) -> ApiResult<Vec<RemoteScreenshotSet>>;

    fn get_screenshots(
        &self,
        token: &BearerToken,
        set_id: &str,
    ) -> ApiResult<Vec<RemoteScreenshot>>;

    fn create_screenshot(
        &self,
        token: &BearerToken,
        set_id: &str,
        file_name: &str,
        file_size: u64,
    ) -> ApiResult<ScreenshotReservation>;

    fn perform_upload_operation(&self, operation: &UploadOperation, bytes: &[u8])
    -> ApiResult<()>;

    fn commit_screenshot(
        &self,
        token: &BearerToken,
        screenshot_id: &str,
        checksum: &str,
    ) -> ApiResult<()>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AppInfoSelection {
    pub app_info: Option<RemoteAppInfo>,
    /// Number of app-info resources in the editable state.
    pub candidates: usize,
}

impl AppInfoSelection {
    pub fn is_ambiguous(&self) -> bool {
        self.candidates > 1
    }
}

/// Picks the app-info resource in the editable state. Position in the
/// vendor's listing is never used to decide; several editable resources
/// yield the first one and are reported as ambiguous.
pub fn select_editable_app_info(app_infos: &[RemoteAppInfo]) -> AppInfoSelection {
    let editable: Vec<&RemoteAppInfo> = app_infos
        .iter()
        .filter(|info| info.state.as_deref() == Some(EDITABLE_STATE))
        .collect();
    AppInfoSelection {
        app_info: editable.first().map(|info| (*info).clone()),
        candidates: editable.len(),
    }
}

/// Renders the vendor's `{w}x{h}bb.{f}` style image template.
pub fn render_template_url(template: &str, width: u32, height: u32, format: &str) -> String {
    template
        .replace("{w}", &width.to_string())
        .replace("{h}", &height.to_string())
        .replace("{f}", format)
}

/// Byte range an upload operation covers. An operation without an explicit
/// length covers the rest of the file.
pub fn upload_slice(operation: &UploadOperation, total_len: usize) -> ApiResult<Range<usize>> {
    let start = usize::try_from(operation.offset).unwrap_or(usize::MAX);
    let length = if operation.length == 0 {
        total_len.saturating_sub(start)
    } else {
        usize::try_from(operation.length).unwrap_or(usize::MAX)
    };
    let end = start.checked_add(length).unwrap_or(usize::MAX);

    if start > total_len || end > total_len {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            format!(
                "upload operation range {}..{} exceeds file size {total_len}",
                operation.offset,
                operation.offset.saturating_add(operation.length)
            ),
        ));
    }
    Ok(start..end)
}
