use std::collections::HashSet;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::json;

use crate::api::http::HttpError;
use crate::api::payload::{
    AppAttributes, AppInfoAttributes, Document, InfoLocalizationAttributes, ReservationAttributes,
    Resource, ScreenshotAttributes, ScreenshotSetAttributes, VersionAttributes,
    VersionLocalizationAttributes,
};
use crate::api::{
    ApiResult, BearerToken, EDITABLE_STATE, MetadataApi, RemoteApp, RemoteAppInfo,
    RemoteInfoLocalization, RemoteScreenshot, RemoteScreenshotSet, RemoteVersion,
    RemoteVersionLocalization, ScreenshotReservation, UploadOperation, issue_token,
    render_template_url, upload_slice,
};
use crate::models::{AttributeChanges, Platform, StoreCredentials, SyncScope};

pub const DEFAULT_API_BASE_URL: &str = "https://api.appstoreconnect.apple.com/v1";

const PAGE_LIMIT: u32 = 200;
const SCREENSHOT_FORMAT: &str = "jpg";

#[derive(Clone, Debug)]
pub struct ConnectClientConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub upload_timeout: Duration,
}

impl Default for ConnectClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(60),
        }
    }
}

/// Blocking client for the vendor metadata API.
pub struct ConnectClient {
    config: ConnectClientConfig,
    agent: ureq::Agent,
}

impl ConnectClient {
    pub fn new(config: ConnectClientConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .build();
        Self { config, agent }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &BearerToken,
        scope: SyncScope,
    ) -> ApiResult<T> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .agent
            .get(url)
            .set("Authorization", &bearer(token))
            .timeout(self.config.request_timeout)
            .call()
            .map_err(|error| HttpError::from(error).into_core_error(scope))?;
        response
            .into_json::<T>()
            .map_err(|error| HttpError::from(error).into_core_error(scope))
    }

    /// Follows `links.next` until the listing is exhausted. A link back to
    /// any page already read ends the listing.
    fn get_all<A>(
        &self,
        first_url: String,
        token: &BearerToken,
        scope: SyncScope,
    ) -> ApiResult<Vec<Resource<A>>>
    where
        A: DeserializeOwned + Default,
    {
        let mut resources = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(first_url);
        while let Some(url) = next.take() {
            let page: Document<Vec<Resource<A>>> = self.get_json(&url, token, scope)?;
            resources.extend(page.data);
            visited.insert(url);
            next = page.links.next.filter(|candidate| !visited.contains(candidate));
        }
        Ok(resources)
    }

    fn patch_localization(
        &self,
        token: &BearerToken,
        path: &str,
        resource_type: &str,
        localization_id: &str,
        changes: &AttributeChanges,
    ) -> ApiResult<()> {
        let url = self.url(&format!("{path}/{localization_id}"));
        let body = json!({
            "data": {
                "type": resource_type,
                "id": localization_id,
                "attributes": changes.vendor_attributes(),
            }
        });
        tracing::debug!(url = %url, "PATCH");
        self.agent
            .request("PATCH", &url)
            .set("Authorization", &bearer(token))
            .timeout(self.config.request_timeout)
            .send_json(body)
            .map_err(|error| HttpError::from(error).into_core_error(SyncScope::Patch))?;
        Ok(())
    }
}

impl MetadataApi for ConnectClient {
    fn authenticate(&self, credentials: &StoreCredentials) -> ApiResult<BearerToken> {
        issue_token(credentials)
    }

    fn list_apps(&self, token: &BearerToken) -> ApiResult<Vec<RemoteApp>> {
        let url = self.url(&format!("/apps?limit={PAGE_LIMIT}"));
        let resources: Vec<Resource<AppAttributes>> =
            self.get_all(url, token, SyncScope::AppListing)?;
        Ok(resources
            .into_iter()
            .map(|resource| RemoteApp {
                id: resource.id,
                name: resource.attributes.name,
            })
            .collect())
    }

    fn get_app_infos(&self, token: &BearerToken, app_id: &str) -> ApiResult<Vec<RemoteAppInfo>> {
        let url = self.url(&format!("/apps/{app_id}/appInfos"));
        let resources: Vec<Resource<AppInfoAttributes>> =
            self.get_all(url, token, SyncScope::AppInfo)?;
        Ok(resources
            .into_iter()
            .map(|resource| RemoteAppInfo {
                id: resource.id,
                state: resource
                    .attributes
                    .app_store_state
                    .or(resource.attributes.state),
            })
            .collect())
    }

    fn get_app_info_localizations(
        &self,
        token: &BearerToken,
        app_info_id: &str,
    ) -> ApiResult<Vec<RemoteInfoLocalization>> {
        let url = self.url(&format!(
            "/appInfos/{app_info_id}/appInfoLocalizations?limit={PAGE_LIMIT}"
        ));
        let resources: Vec<Resource<InfoLocalizationAttributes>> =
            self.get_all(url, token, SyncScope::AppInfo)?;
        Ok(resources
            .into_iter()
            .map(|resource| RemoteInfoLocalization {
                id: resource.id,
                locale: resource.attributes.locale.unwrap_or_default(),
                name: resource.attributes.name,
                subtitle: resource.attributes.subtitle,
                privacy_policy_url: resource.attributes.privacy_policy_url,
                privacy_choices_url: resource.attributes.privacy_choices_url,
            })
            .collect())
    }

    fn get_app_store_versions(
        &self,
        token: &BearerToken,
        app_id: &str,
        platform: Option<Platform>,
    ) -> ApiResult<Vec<RemoteVersion>> {
        let mut path =
            format!("/apps/{app_id}/appStoreVersions?filter[appStoreState]={EDITABLE_STATE}");
        if let Some(platform) = platform {
            path.push_str(&format!("&filter[platform]={platform}"));
        }
        let resources: Vec<Resource<VersionAttributes>> =
            self.get_all(self.url(&path), token, SyncScope::Versions)?;

        Ok(resources
            .into_iter()
            .filter(|resource| {
                resource
                    .attributes
                    .app_store_state
                    .as_deref()
                    .is_none_or(|state| state == EDITABLE_STATE)
            })
            .filter_map(|resource| {
                let raw = resource.attributes.platform.as_deref().unwrap_or_default();
                match raw.parse::<Platform>() {
                    Ok(platform) => Some(RemoteVersion {
                        id: resource.id,
                        platform,
                    }),
                    Err(()) => {
                        tracing::debug!(
                            version_id = %resource.id,
                            platform = raw,
                            "skipping version on untracked platform"
                        );
                        None
                    }
                }
            })
            .collect())
    }

    fn get_version_localizations(
        &self,
        token: &BearerToken,
        version_id: &str,
    ) -> ApiResult<Vec<RemoteVersionLocalization>> {
        let url = self.url(&format!(
            "/appStoreVersions/{version_id}/appStoreVersionLocalizations?limit={PAGE_LIMIT}"
        ));
        let resources: Vec<Resource<VersionLocalizationAttributes>> =
            self.get_all(url, token, SyncScope::Versions)?;
        Ok(resources
            .into_iter()
            .map(|resource| {
                let attributes = resource.attributes;
                RemoteVersionLocalization {
                    id: resource.id,
                    locale: attributes.locale.unwrap_or_default(),
                    description: attributes.description,
                    keywords: attributes.keywords,
                    marketing_url: attributes.marketing_url,
                    promotional_text: attributes.promotional_text,
                    support_url: attributes.support_url,
                    whats_new: attributes.whats_new,
                }
            })
            .collect())
    }

    fn patch_info_localization(
        &self,
        token: &BearerToken,
        localization_id: &str,
        changes: &AttributeChanges,
    ) -> ApiResult<()> {
        self.patch_localization(
            token,
            "/appInfoLocalizations",
            "appInfoLocalizations",
            localization_id,
            changes,
        )
    }

    fn patch_version_localization(
        &self,
        token: &BearerToken,
        localization_id: &str,
        changes: &AttributeChanges,
    ) -> ApiResult<()> {
        self.patch_localization(
            token,
            "/appStoreVersionLocalizations",
            "appStoreVersionLocalizations",
            localization_id,
            changes,
        )
    }

    fn get_screenshot_sets(
        &self,
        token: &BearerToken,
        localization_id: &str,
    ) -> ApiResult<Vec<RemoteScreenshotSet>> {
        let url = self.url(&format!(
            "/appStoreVersionLocalizations/{localization_id}/appScreenshotSets"
        ));
        let resources: Vec<Resource<ScreenshotSetAttributes>> =
            self.get_all(url, token, SyncScope::Screenshots)?;
        Ok(resources
            .into_iter()
            .map(|resource| RemoteScreenshotSet {
                id: resource.id,
                display_type: resource
                    .attributes
                    .screenshot_display_type
                    .unwrap_or_default(),
            })
            .collect())
    }

    fn get_screenshots(
        &self,
        token: &BearerToken,
        set_id: &str,
    ) -> ApiResult<Vec<RemoteScreenshot>> {
        let url = self.url(&format!("/appScreenshotSets/{set_id}/appScreenshots"));
        let resources: Vec<Resource<ScreenshotAttributes>> =
            self.get_all(url, token, SyncScope::Screenshots)?;
        Ok(resources
            .into_iter()
            .filter_map(|resource| {
                // Assets still being processed have no image yet.
                let asset = resource.attributes.image_asset?;
                Some(RemoteScreenshot {
                    url: render_template_url(
                        &asset.template_url,
                        asset.width,
                        asset.height,
                        SCREENSHOT_FORMAT,
                    ),
                    id: resource.id,
                    width: asset.width,
                    height: asset.height,
                })
            })
            .collect())
    }

    fn create_screenshot(
        &self,
        token: &BearerToken,
        set_id: &str,
        file_name: &str,
        file_size: u64,
    ) -> ApiResult<ScreenshotReservation> {
        let url = self.url("/appScreenshots");
        let body = json!({
            "data": {
                "type": "appScreenshots",
                "attributes": {"fileName": file_name, "fileSize": file_size},
                "relationships": {
                    "appScreenshotSet": {"data": {"type": "appScreenshotSets", "id": set_id}}
                }
            }
        });
        tracing::debug!(url = %url, set_id, file_name, file_size, "POST");
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &bearer(token))
            .timeout(self.config.request_timeout)
            .send_json(body)
            .map_err(|error| HttpError::from(error).into_core_error(SyncScope::Upload))?;
        let document: Document<Resource<ReservationAttributes>> = response
            .into_json()
            .map_err(|error| HttpError::from(error).into_core_error(SyncScope::Upload))?;

        Ok(ScreenshotReservation {
            id: document.data.id,
            upload_operations: document
                .data
                .attributes
                .upload_operations
                .into_iter()
                .map(|operation| UploadOperation {
                    method: operation.method,
                    url: operation.url,
                    request_headers: operation
                        .request_headers
                        .into_iter()
                        .map(|header| (header.name, header.value))
                        .collect(),
                    offset: operation.offset.unwrap_or(0),
                    length: operation.length.unwrap_or(0),
                })
                .collect(),
        })
    }

    fn perform_upload_operation(
        &self,
        operation: &UploadOperation,
        bytes: &[u8],
    ) -> ApiResult<()> {
        let range = upload_slice(operation, bytes.len())?;
        tracing::debug!(
            url = %operation.url,
            method = %operation.method,
            len = range.len(),
            "upload operation"
        );

        let mut request = self
            .agent
            .request(&operation.method, &operation.url)
            .timeout(self.config.upload_timeout);
        for (name, value) in &operation.request_headers {
            request = request.set(name, value);
        }
        request
            .send_bytes(&bytes[range])
            .map_err(|error| HttpError::from(error).into_core_error(SyncScope::Upload))?;
        Ok(())
    }

    fn commit_screenshot(
        &self,
        token: &BearerToken,
        screenshot_id: &str,
        checksum: &str,
    ) -> ApiResult<()> {
        let url = self.url(&format!("/appScreenshots/{screenshot_id}"));
        let body = json!({
            "data": {
                "type": "appScreenshots",
                "id": screenshot_id,
                "attributes": {"uploaded": true, "sourceFileChecksum": checksum}
            }
        });
        tracing::debug!(url = %url, "PATCH");
        self.agent
            .request("PATCH", &url)
            .set("Authorization", &bearer(token))
            .timeout(self.config.request_timeout)
            .send_json(body)
            .map_err(|error| HttpError::from(error).into_core_error(SyncScope::Upload))?;
        Ok(())
    }
}

fn bearer(token: &BearerToken) -> String {
    format!("Bearer {}", token.as_str())
}
