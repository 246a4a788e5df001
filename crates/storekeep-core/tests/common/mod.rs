#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use storekeep_core::api::{
    ApiResult, BearerToken, MetadataApi, RemoteApp, RemoteAppInfo, RemoteInfoLocalization,
    RemoteScreenshot, RemoteScreenshotSet, RemoteVersion, RemoteVersionLocalization,
    ScreenshotReservation, UploadOperation,
};
use storekeep_core::backup::{BackupRemote, BackupResult, CacheBackup, PersistOutcome, RemoteBlob};
use storekeep_core::models::{
    Attribute, AttributeChanges, CoreError, CoreErrorKind, NewStore, Platform, Store,
    StoreCredentials,
};
use storekeep_core::persistence::StoreRegistry;
use storekeep_core::sqlite::SqliteStore;
use storekeep_core::sync::SyncEngine;
use tokio::runtime::Runtime;

pub fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("storekeep-{test_name}-{nanos}.sqlite3"))
}

pub fn rejected(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::RemoteRejected, message).with_status(409)
}

pub fn unavailable(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::RemoteUnavailable, message).with_status(503)
}

/// Remote catalog as the fake vendor API sees it. Patches mutate it, so a
/// refresh after a write reads the new value back.
#[derive(Default)]
pub struct RemoteState {
    pub apps: Vec<RemoteApp>,
    pub app_infos: HashMap<String, Vec<RemoteAppInfo>>,
    pub info_localizations: HashMap<String, Vec<RemoteInfoLocalization>>,
    pub versions: HashMap<String, Vec<RemoteVersion>>,
    pub version_localizations: HashMap<String, Vec<RemoteVersionLocalization>>,
    pub screenshot_sets: HashMap<String, Vec<RemoteScreenshotSet>>,
    pub screenshots: HashMap<String, Vec<RemoteScreenshot>>,

    pub rejected_patches: HashMap<String, CoreError>,
    pub failing_version_reads: HashSet<String>,
    pub failing_app_info_reads: HashSet<String>,
    pub fail_listing: bool,

    pub patch_calls: usize,
    pub reservations: usize,
    pub uploaded: Vec<(String, Vec<u8>)>,
    pub commits: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeMetadataApi {
    state: Mutex<RemoteState>,
}

impl FakeMetadataApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }

    pub fn add_app(&self, app_id: &str, name: Option<&str>) {
        self.state().apps.push(RemoteApp {
            id: app_id.to_string(),
            name: name.map(str::to_string),
        });
    }

    pub fn remove_app(&self, app_id: &str) {
        self.state().apps.retain(|app| app.id != app_id);
    }

    pub fn add_app_info(&self, app_id: &str, app_info_id: &str, state: &str) {
        self.state()
            .app_infos
            .entry(app_id.to_string())
            .or_default()
            .push(RemoteAppInfo {
                id: app_info_id.to_string(),
                state: Some(state.to_string()),
            });
    }

    pub fn add_info_localization(
        &self,
        app_info_id: &str,
        localization_id: &str,
        locale: &str,
        name: &str,
        subtitle: &str,
    ) {
        self.state()
            .info_localizations
            .entry(app_info_id.to_string())
            .or_default()
            .push(RemoteInfoLocalization {
                id: localization_id.to_string(),
                locale: locale.to_string(),
                name: Some(name.to_string()),
                subtitle: Some(subtitle.to_string()),
                ..RemoteInfoLocalization::default()
            });
    }

    pub fn add_version(&self, app_id: &str, version_id: &str, platform: Platform) {
        self.state()
            .versions
            .entry(app_id.to_string())
            .or_default()
            .push(RemoteVersion {
                id: version_id.to_string(),
                platform,
            });
    }

    pub fn add_version_localization(
        &self,
        version_id: &str,
        localization_id: &str,
        locale: &str,
        whats_new: &str,
    ) {
        self.state()
            .version_localizations
            .entry(version_id.to_string())
            .or_default()
            .push(RemoteVersionLocalization {
                id: localization_id.to_string(),
                locale: locale.to_string(),
                description: Some(format!("{locale} description")),
                whats_new: Some(whats_new.to_string()),
                ..RemoteVersionLocalization::default()
            });
    }

    pub fn add_screenshot_set(&self, localization_id: &str, set_id: &str, display_type: &str) {
        self.state()
            .screenshot_sets
            .entry(localization_id.to_string())
            .or_default()
            .push(RemoteScreenshotSet {
                id: set_id.to_string(),
                display_type: display_type.to_string(),
            });
    }

    pub fn add_screenshot(&self, set_id: &str, screenshot_id: &str) {
        self.state()
            .screenshots
            .entry(set_id.to_string())
            .or_default()
            .push(RemoteScreenshot {
                id: screenshot_id.to_string(),
                url: format!("https://cdn.example.com/{screenshot_id}/1290x2796bb.png"),
                width: 1290,
                height: 2796,
            });
    }

    pub fn reject_patch(&self, localization_id: &str, error: CoreError) {
        self.state()
            .rejected_patches
            .insert(localization_id.to_string(), error);
    }

    pub fn fail_version_reads(&self, app_id: &str) {
        self.state().failing_version_reads.insert(app_id.to_string());
    }

    pub fn fail_app_info_reads(&self, app_id: &str) {
        self.state().failing_app_info_reads.insert(app_id.to_string());
    }

    pub fn info_value(&self, localization_id: &str) -> Option<RemoteInfoLocalization> {
        self.state()
            .info_localizations
            .values()
            .flatten()
            .find(|row| row.id == localization_id)
            .cloned()
    }
}

fn apply_info_changes(row: &mut RemoteInfoLocalization, changes: &AttributeChanges) {
    for (attribute, value) in changes.iter() {
        let value = value.map(str::to_string);
        match attribute {
            Attribute::Name => row.name = value,
            Attribute::Subtitle => row.subtitle = value,
            Attribute::PrivacyPolicyUrl => row.privacy_policy_url = value,
            Attribute::PrivacyChoicesUrl => row.privacy_choices_url = value,
            _ => {}
        }
    }
}

fn apply_version_changes(row: &mut RemoteVersionLocalization, changes: &AttributeChanges) {
    for (attribute, value) in changes.iter() {
        let value = value.map(str::to_string);
        match attribute {
            Attribute::Description => row.description = value,
            Attribute::Keywords => row.keywords = value,
            Attribute::MarketingUrl => row.marketing_url = value,
            Attribute::PromotionalText => row.promotional_text = value,
            Attribute::SupportUrl => row.support_url = value,
            Attribute::WhatsNew => row.whats_new = value,
            _ => {}
        }
    }
}

fn not_found(what: &str) -> CoreError {
    CoreError::new(CoreErrorKind::RemoteRejected, format!("{what} not found")).with_status(404)
}

impl MetadataApi for FakeMetadataApi {
    fn authenticate(&self, credentials: &StoreCredentials) -> ApiResult<BearerToken> {
        if credentials.key_id == "revoked" {
            return Err(CoreError::new(CoreErrorKind::AuthFailure, "key revoked").with_status(401));
        }
        Ok(BearerToken::new(format!("token-for-{}", credentials.issuer_id)))
    }

    fn list_apps(&self, _token: &BearerToken) -> ApiResult<Vec<RemoteApp>> {
        let state = self.state();
        if state.fail_listing {
            return Err(unavailable("listing timed out"));
        }
        Ok(state.apps.clone())
    }

    fn get_app_infos(&self, _token: &BearerToken, app_id: &str) -> ApiResult<Vec<RemoteAppInfo>> {
        let state = self.state();
        if state.failing_app_info_reads.contains(app_id) {
            return Err(unavailable("app info read timed out"));
        }
        Ok(state.app_infos.get(app_id).cloned().unwrap_or_default())
    }

    fn get_app_info_localizations(
        &self,
        _token: &BearerToken,
        app_info_id: &str,
    ) -> ApiResult<Vec<RemoteInfoLocalization>> {
        Ok(self
            .state()
            .info_localizations
            .get(app_info_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_app_store_versions(
        &self,
        _token: &BearerToken,
        app_id: &str,
        platform: Option<Platform>,
    ) -> ApiResult<Vec<RemoteVersion>> {
        let state = self.state();
        if state.failing_version_reads.contains(app_id) {
            return Err(unavailable("version read timed out"));
        }
        Ok(state
            .versions
            .get(app_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|version| platform.is_none_or(|platform| version.platform == platform))
            .collect())
    }

    fn get_version_localizations(
        &self,
        _token: &BearerToken,
        version_id: &str,
    ) -> ApiResult<Vec<RemoteVersionLocalization>> {
        Ok(self
            .state()
            .version_localizations
            .get(version_id)
            .cloned()
            .unwrap_or_default())
    }

    fn patch_info_localization(
        &self,
        _token: &BearerToken,
        localization_id: &str,
        changes: &AttributeChanges,
    ) -> ApiResult<()> {
        let mut state = self.state();
        state.patch_calls += 1;
        if let Some(error) = state.rejected_patches.get(localization_id) {
            return Err(error.clone());
        }
        let row = state
            .info_localizations
            .values_mut()
            .flatten()
            .find(|row| row.id == localization_id)
            .ok_or_else(|| not_found(localization_id))?;
        apply_info_changes(row, changes);
        Ok(())
    }

    fn patch_version_localization(
        &self,
        _token: &BearerToken,
        localization_id: &str,
        changes: &AttributeChanges,
    ) -> ApiResult<()> {
        let mut state = self.state();
        state.patch_calls += 1;
        if let Some(error) = state.rejected_patches.get(localization_id) {
            return Err(error.clone());
        }
        let row = state
            .version_localizations
            .values_mut()
            .flatten()
            .find(|row| row.id == localization_id)
            .ok_or_else(|| not_found(localization_id))?;
        apply_version_changes(row, changes);
        Ok(())
    }

    fn get_screenshot_sets(
        &self,
        _token: &BearerToken,
        localization_id: &str,
    ) -> ApiResult<Vec<RemoteScreenshotSet>> {
        Ok(self
            .state()
            .screenshot_sets
            .get(localization_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_screenshots(
        &self,
        _token: &BearerToken,
        set_id: &str,
    ) -> ApiResult<Vec<RemoteScreenshot>> {
        Ok(self
            .state()
            .screenshots
            .get(set_id)
            .cloned()
            .unwrap_or_default())
    }

    fn create_screenshot(
        &self,
        _token: &BearerToken,
        set_id: &str,
        file_name: &str,
        file_size: u64,
    ) -> ApiResult<ScreenshotReservation> {
        let mut state = self.state();
        state.reservations += 1;
        let id = format!("shot-{}", state.reservations);
        state
            .screenshots
            .entry(set_id.to_string())
            .or_default()
            .push(RemoteScreenshot {
                id: id.clone(),
                url: format!("https://cdn.example.com/{file_name}"),
                width: 1290,
                height: 2796,
            });

        let half = file_size / 2;
        Ok(ScreenshotReservation {
            id: id.clone(),
            upload_operations: vec![
                UploadOperation {
                    method: "PUT".to_string(),
                    url: format!("https://upload.example.com/{id}/0"),
                    request_headers: vec![("Content-Type".to_string(), "image/png".to_string())],
                    offset: 0,
                    length: half,
                },
                UploadOperation {
                    method: "PUT".to_string(),
                    url: format!("https://upload.example.com/{id}/1"),
                    request_headers: Vec::new(),
                    offset: half,
                    length: 0,
                },
            ],
        })
    }

    fn perform_upload_operation(
        &self,
        operation: &UploadOperation,
        bytes: &[u8],
    ) -> ApiResult<()> {
        let range = storekeep_core::api::upload_slice(operation, bytes.len())?;
        self.state()
            .uploaded
            .push((operation.url.clone(), bytes[range].to_vec()));
        Ok(())
    }

    fn commit_screenshot(
        &self,
        _token: &BearerToken,
        screenshot_id: &str,
        checksum: &str,
    ) -> ApiResult<()> {
        self.state()
            .commits
            .push((screenshot_id.to_string(), checksum.to_string()));
        Ok(())
    }
}

/// Counts persist calls instead of uploading anything.
#[derive(Default)]
pub struct CountingBackup {
    calls: AtomicUsize,
}

impl CountingBackup {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CacheBackup for CountingBackup {
    fn persist(&self) -> PersistOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        PersistOutcome::Disabled
    }
}

/// One remote object held in memory; every put gets a fresh sha.
#[derive(Default)]
pub struct MemoryRemote {
    pub blob: Mutex<Option<RemoteBlob>>,
    pub puts: Mutex<Vec<Option<String>>>,
    pub fail_fetch: bool,
}

impl MemoryRemote {
    pub fn holding(content: &[u8]) -> Self {
        Self {
            blob: Mutex::new(Some(RemoteBlob {
                content: content.to_vec(),
                sha: "sha-0".to_string(),
            })),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_fetch: true,
            ..Self::default()
        }
    }

    pub fn content(&self) -> Option<Vec<u8>> {
        self.blob
            .lock()
            .unwrap()
            .as_ref()
            .map(|blob| blob.content.clone())
    }
}

impl BackupRemote for MemoryRemote {
    fn fetch(&self) -> BackupResult<Option<RemoteBlob>> {
        if self.fail_fetch {
            return Err(CoreError::new(CoreErrorKind::BackupSync, "remote unreachable"));
        }
        Ok(self.blob.lock().unwrap().clone())
    }

    fn put(&self, content: &[u8], previous_sha: Option<&str>) -> BackupResult<()> {
        let mut puts = self.puts.lock().unwrap();
        puts.push(previous_sha.map(str::to_string));
        *self.blob.lock().unwrap() = Some(RemoteBlob {
            content: content.to_vec(),
            sha: format!("sha-{}", puts.len()),
        });
        Ok(())
    }
}

/// Engine wired to a fake remote, a fresh sqlite cache and a counting
/// backup. Engine calls block on `runtime` from the test thread.
pub struct Harness {
    pub runtime: Runtime,
    pub api: Arc<FakeMetadataApi>,
    pub cache: Arc<SqliteStore>,
    pub backup: Arc<CountingBackup>,
    pub engine: SyncEngine,
    pub store: Store,
    pub db_path: PathBuf,
}

impl Harness {
    pub fn new(test_name: &str) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let db_path = test_db_path(test_name);
        let cache = Arc::new(SqliteStore::new(&db_path));
        cache.migrate_to_latest().unwrap();

        let store_id = cache
            .add_store(&NewStore {
                name: "Acme".to_string(),
                credentials: StoreCredentials {
                    issuer_id: "issuer-1".to_string(),
                    key_id: "key-1".to_string(),
                    private_key: "unused by the fake".to_string(),
                },
            })
            .unwrap();
        let store = cache.store(store_id).unwrap().unwrap();

        let api = Arc::new(FakeMetadataApi::new());
        let backup = Arc::new(CountingBackup::default());
        let engine = SyncEngine::new(
            api.clone(),
            cache.clone(),
            backup.clone(),
            runtime.handle().clone(),
        )
        .with_screenshot_workers(3);

        Self {
            runtime,
            api,
            cache,
            backup,
            engine,
            store,
            db_path,
        }
    }

    /// "Widget" with one editable app info (en-US, fr-FR) and an iOS
    /// version carrying two localizations and screenshots for en-US.
    pub fn seed_widget(&self, app_id: &str) {
        let info_id = format!("{app_id}-info");
        let version_id = format!("{app_id}-ios");
        self.api.add_app(app_id, Some("Widget"));
        self.api.add_app_info(app_id, &format!("{app_id}-live"), "READY_FOR_DISTRIBUTION");
        self.api.add_app_info(app_id, &info_id, "PREPARE_FOR_SUBMISSION");
        self.api.add_info_localization(
            &info_id,
            &format!("{app_id}-info-en"),
            "en-US",
            "Widget",
            "Best widget",
        );
        self.api.add_info_localization(
            &info_id,
            &format!("{app_id}-info-fr"),
            "fr-FR",
            "Widget",
            "Meilleur widget",
        );
        self.api.add_version(app_id, &version_id, Platform::Ios);
        self.api.add_version_localization(
            &version_id,
            &format!("{app_id}-ios-en"),
            "en-US",
            "Bug fixes",
        );
        self.api.add_version_localization(
            &version_id,
            &format!("{app_id}-ios-de"),
            "de-DE",
            "Fehlerbehebungen",
        );
        let set_id = format!("{app_id}-ios-en-set");
        self.api
            .add_screenshot_set(&format!("{app_id}-ios-en"), &set_id, "APP_IPHONE_67");
        self.api.add_screenshot(&set_id, "s1");
        self.api.add_screenshot(&set_id, "s2");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}
