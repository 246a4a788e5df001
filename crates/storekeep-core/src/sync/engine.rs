use std::collections::HashMap;
use std::sync::Arc;

use md5::{Digest, Md5};
use tokio::runtime::Handle;

use crate::api::{BearerToken, MetadataApi, select_editable_app_info};
use crate::backup::{CacheBackup, PersistOutcome};
use crate::config::DEFAULT_SCREENSHOT_WORKERS;
use crate::models::{
    App, AppInfoLocalization, AppSnapshot, AppVersion, AppVersionLocalization, Attribute,
    AttributeChanges, AttributeScope, CoreError, CoreErrorKind, Platform, Store, StoreId,
    SyncScope,
};
use crate::persistence::CacheStore;
use crate::sync::screenshots::fetch_screenshots;
use crate::sync::{
    AppFailure, AppSyncOutcome, BatchReport, ItemFailure, LocalizedEdit, PatchRequest, RowCounts,
    ScopeRefresh, ScreenshotUpload, SyncReport, SyncResult, SyncTarget, TranslationRequest,
    Translator, WriteOutcome,
};

/// Name the vendor reports for apps whose listing is incomplete.
const UNKNOWN_APP_NAME: &str = "Unknown";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ReconcileScope {
    AppInfo,
    Versions(Option<Platform>),
    Screenshots(Option<Platform>),
}

impl ReconcileScope {
    fn for_attribute(attribute: Attribute, platform: Option<Platform>) -> Self {
        match attribute.scope() {
            AttributeScope::AppInfo => Self::AppInfo,
            AttributeScope::Version => Self::Versions(platform),
        }
    }
}

#[derive(Debug, Default)]
struct Fetched<T> {
    rows: T,
    warnings: Vec<String>,
}

/// Keeps the local cache a reflection of successful remote reads. Remote
/// writes go out first and the affected scope is read back afterwards; a
/// user's edit is never written into the cache directly.
///
/// Methods block. Call them from a thread that is not a worker of the
/// runtime behind `runtime`.
pub struct SyncEngine {
    api: Arc<dyn MetadataApi>,
    cache: Arc<dyn CacheStore>,
    backup: Arc<dyn CacheBackup>,
    runtime: Handle,
    screenshot_workers: usize,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn MetadataApi>,
        cache: Arc<dyn CacheStore>,
        backup: Arc<dyn CacheBackup>,
        runtime: Handle,
    ) -> Self {
        Self {
            api,
            cache,
            backup,
            runtime,
            screenshot_workers: DEFAULT_SCREENSHOT_WORKERS,
        }
    }

    pub fn with_screenshot_workers(mut self, workers: usize) -> Self {
        self.screenshot_workers = workers.max(1);
        self
    }

    /// Full-store refresh. Every listed app is refreshed independently;
    /// rows of apps no longer listed are removed once all apps are done.
    pub fn sync_all_apps(&self, store: &Store) -> SyncResult<SyncReport> {
        tracing::info!(store_id = %store.id, store = %store.name, "full store refresh started");
        let token = self.authenticate(store)?;
        let remote_apps = self
            .api
            .list_apps(&token)
            .map_err(|error| error.with_store(store.id).with_scope(SyncScope::AppListing))?;

        let mut report = SyncReport {
            store_id: store.id,
            apps_listed: remote_apps.len(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            orphans_removed: 0,
            warnings: Vec::new(),
            backup: PersistOutcome::Disabled,
        };
        if remote_apps.is_empty() {
            // An empty listing never clears the cache.
            tracing::warn!(store_id = %store.id, "vendor listed no apps; cache left unchanged");
            report
                .warnings
                .push("no apps listed; cached apps were kept".to_string());
            return Ok(report);
        }
        let live_app_ids: Vec<String> = remote_apps.iter().map(|app| app.id.clone()).collect();

        for remote in remote_apps {
            let name = match remote.name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() && name != UNKNOWN_APP_NAME => name.to_string(),
                _ => {
                    tracing::warn!(
                        store_id = %store.id,
                        app_id = %remote.id,
                        "skipping app without a name"
                    );
                    report.failed.push(AppFailure {
                        error: CoreError::new(CoreErrorKind::InvalidInput, "app has no usable name")
                            .with_store(store.id)
                            .with_app(&remote.id)
                            .with_scope(SyncScope::AppListing),
                        app_id: remote.id,
                    });
                    continue;
                }
            };

            let app = App {
                app_id: remote.id,
                store_id: store.id,
                name,
            };
            match self.refresh_app(&token, &app) {
                Ok(refreshed) => {
                    report.warnings.extend(refreshed.warnings);
                    report.succeeded.push(app.app_id);
                }
                Err(error) => {
                    tracing::error!(
                        store_id = %store.id,
                        app_id = %app.app_id,
                        error = %error,
                        "app refresh failed"
                    );
                    report.failed.push(AppFailure {
                        app_id: app.app_id,
                        error,
                    });
                }
            }
        }

        match self.cache.delete_orphans(store.id, &live_app_ids) {
            Ok(removed) => {
                report.orphans_removed = removed;
                if removed > 0 {
                    tracing::info!(
                        store_id = %store.id,
                        removed,
                        "removed rows of apps no longer listed"
                    );
                }
            }
            Err(error) => {
                tracing::error!(store_id = %store.id, error = %error, "tombstone cleanup failed");
                report
                    .warnings
                    .push(format!("cleanup of removed apps failed: {}", error.message));
            }
        }

        report.backup = self.backup.persist();
        tracing::info!(
            store_id = %store.id,
            listed = report.apps_listed,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "full store refresh finished"
        );
        Ok(report)
    }

    /// Refreshes one app without tombstone cleanup.
    pub fn sync_one_app(&self, store: &Store, app_id: &str) -> SyncResult<AppSyncOutcome> {
        tracing::info!(store_id = %store.id, app_id, "app refresh started");
        let token = self.authenticate(store)?;
        let app = self.resolve_app(&token, store.id, app_id)?;
        let refreshed = self.refresh_app(&token, &app)?;

        Ok(AppSyncOutcome {
            app,
            rows: refreshed.rows,
            warnings: refreshed.warnings,
            backup: self.backup.persist(),
        })
    }

    /// Narrow refresh of the scope owning `target`. Version attributes and
    /// screenshots are limited to `platform` when one is given.
    pub fn sync_attribute(
        &self,
        store: &Store,
        target: SyncTarget,
        app_id: &str,
        platform: Option<Platform>,
    ) -> SyncResult<ScopeRefresh> {
        tracing::info!(store_id = %store.id, app_id, target = %target, "scope refresh started");
        let token = self.authenticate(store)?;
        if self.cache.app(store.id, app_id)?.is_none() {
            // Scope rows always hang off a cached app row.
            let app = self.resolve_app(&token, store.id, app_id)?;
            self.cache.upsert_app(&app)?;
        }
        let scope = match target {
            SyncTarget::Attribute(attribute) => ReconcileScope::for_attribute(attribute, platform),
            SyncTarget::Screenshots => ReconcileScope::Screenshots(platform),
        };
        let refreshed = self.reconcile(&token, store.id, app_id, scope)?;

        Ok(ScopeRefresh {
            rows: refreshed.rows,
            warnings: refreshed.warnings,
            backup: self.backup.persist(),
        })
    }

    /// Sends the edit to the remote and, only once it is accepted, reads
    /// the affected scope back into the cache.
    pub fn patch_and_refresh(
        &self,
        store: &Store,
        request: &PatchRequest,
    ) -> SyncResult<WriteOutcome> {
        let attribute_scope = request.changes.scope()?;
        let token = self.authenticate(store)?;

        self.send_patch(&token, attribute_scope, &request.localization_id, &request.changes)
            .map_err(|error| {
                tracing::warn!(
                    store_id = %store.id,
                    app_id = %request.app_id,
                    localization_id = %request.localization_id,
                    error = %error,
                    "remote patch failed; cache left untouched"
                );
                error.with_store(store.id).with_app(&request.app_id)
            })?;
        tracing::info!(
            store_id = %store.id,
            app_id = %request.app_id,
            localization_id = %request.localization_id,
            "remote patch accepted"
        );

        let scope = match attribute_scope {
            AttributeScope::AppInfo => ReconcileScope::AppInfo,
            AttributeScope::Version => ReconcileScope::Versions(self.version_platform(
                store.id,
                &request.localization_id,
                request.platform,
            )),
        };

        Ok(self.reconcile_after_write(&token, store.id, &request.app_id, scope))
    }

    /// Patches one attribute for several localizations independently and
    /// refreshes the scope once if any patch went through.
    pub fn save_attribute_batch(
        &self,
        store: &Store,
        attribute: Attribute,
        app_id: &str,
        platform: Option<Platform>,
        edits: &[LocalizedEdit],
    ) -> SyncResult<BatchReport> {
        let token = self.authenticate(store)?;
        let locales = self.cached_locales(store.id, attribute, app_id, platform);
        let mut report = BatchReport::new(edits.len());
        self.apply_edits(&token, store.id, attribute, app_id, edits, &locales, &mut report);
        self.finish_batch(
            &token,
            store.id,
            app_id,
            ReconcileScope::for_attribute(attribute, platform),
            &mut report,
        );
        Ok(report)
    }

    /// Translates `source_text` into every cached locale of the attribute's
    /// scope and saves the results through the batch path.
    pub fn translate_and_save(
        &self,
        store: &Store,
        request: &TranslationRequest,
        translator: &dyn Translator,
    ) -> SyncResult<BatchReport> {
        let rows = self.cache.attribute_values(
            request.attribute,
            store.id,
            &request.app_id,
            request.platform,
        )?;
        if rows.is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::NotFound,
                format!(
                    "no cached localizations for '{}' of app '{}'; refresh the app first",
                    request.attribute, request.app_id
                ),
            )
            .with_store(store.id)
            .with_app(&request.app_id));
        }

        let token = self.authenticate(store)?;
        let locales: HashMap<String, String> = rows
            .iter()
            .map(|row| (row.localization_id.clone(), row.locale.clone()))
            .collect();
        let mut report = BatchReport::new(rows.len());
        let mut edits = Vec::with_capacity(rows.len());

        for row in &rows {
            if request.source_locale.as_deref() == Some(row.locale.as_str()) {
                edits.push(LocalizedEdit {
                    localization_id: row.localization_id.clone(),
                    value: Some(request.source_text.clone()),
                });
                continue;
            }
            match translator.translate(&request.source_text, &row.locale) {
                Ok(text) => edits.push(LocalizedEdit {
                    localization_id: row.localization_id.clone(),
                    value: Some(text),
                }),
                Err(error) => {
                    tracing::warn!(locale = %row.locale, error = %error, "translation failed");
                    report.failed.push(ItemFailure {
                        item: row.localization_id.clone(),
                        locale: Some(row.locale.clone()),
                        error,
                    });
                }
            }
        }

        self.apply_edits(
            &token,
            store.id,
            request.attribute,
            &request.app_id,
            &edits,
            &locales,
            &mut report,
        );
        self.finish_batch(
            &token,
            store.id,
            &request.app_id,
            ReconcileScope::for_attribute(request.attribute, request.platform),
            &mut report,
        );
        Ok(report)
    }

    /// Runs the three-phase upload for each file, then refreshes the
    /// platform's screenshot scope if any upload completed.
    pub fn upload_screenshots(
        &self,
        store: &Store,
        app_id: &str,
        platform: Platform,
        uploads: &[ScreenshotUpload],
    ) -> SyncResult<BatchReport> {
        let token = self.authenticate(store)?;
        let mut report = BatchReport::new(uploads.len());

        for upload in uploads {
            match self.upload_one(&token, upload) {
                Ok(()) => {
                    tracing::info!(
                        store_id = %store.id,
                        app_id,
                        file = %upload.file_name,
                        "screenshot uploaded"
                    );
                    report.succeeded.push(upload.file_name.clone());
                }
                Err(error) => {
                    tracing::warn!(
                        store_id = %store.id,
                        app_id,
                        file = %upload.file_name,
                        error = %error,
                        "screenshot upload failed"
                    );
                    report.failed.push(ItemFailure {
                        item: upload.file_name.clone(),
                        locale: None,
                        error: error.with_store(store.id).with_app(app_id),
                    });
                }
            }
        }

        self.finish_batch(
            &token,
            store.id,
            app_id,
            ReconcileScope::Screenshots(Some(platform)),
            &mut report,
        );
        Ok(report)
    }

    fn authenticate(&self, store: &Store) -> SyncResult<BearerToken> {
        self.api
            .authenticate(&store.credentials)
            .map_err(|error| error.with_store(store.id))
    }

    /// Uses the cached name when there is one; otherwise asks the remote
    /// listing.
    fn resolve_app(&self, token: &BearerToken, store_id: StoreId, app_id: &str) -> SyncResult<App> {
        if let Some(app) = self.cache.app(store_id, app_id)? {
            return Ok(app);
        }

        let listed = self
            .api
            .list_apps(token)
            .map_err(|error| error.with_store(store_id).with_scope(SyncScope::AppListing))?
            .into_iter()
            .find(|remote| remote.id == app_id);
        match listed.and_then(|remote| remote.name) {
            Some(name) if name.trim() != UNKNOWN_APP_NAME && !name.trim().is_empty() => Ok(App {
                app_id: app_id.to_string(),
                store_id,
                name,
            }),
            _ => Err(CoreError::new(
                CoreErrorKind::NotFound,
                format!("app '{app_id}' is not listed for this store"),
            )
            .with_store(store_id)
            .with_app(app_id)
            .with_scope(SyncScope::AppListing)),
        }
    }

    /// Per-app pipeline: everything is fetched before the app's rows are
    /// replaced in one transaction.
    fn refresh_app(&self, token: &BearerToken, app: &App) -> SyncResult<Fetched<RowCounts>> {
        let annotate =
            |error: CoreError| error.with_store(app.store_id).with_app(&app.app_id);

        let info = self
            .fetch_app_info_scope(token, app.store_id, &app.app_id)
            .map_err(annotate)?;
        let versions = self
            .fetch_version_scope(token, app.store_id, &app.app_id, None)
            .map_err(annotate)?;
        let screenshots = fetch_screenshots(
            &self.runtime,
            self.screenshot_workers,
            Arc::clone(&self.api),
            token,
            app.store_id,
            &app.app_id,
            &versions.rows.1,
        )
        .map_err(annotate)?;

        let (version_rows, localization_rows) = versions.rows;
        let rows = RowCounts {
            info_localizations: info.rows.len(),
            versions: version_rows.len(),
            version_localizations: localization_rows.len(),
            screenshots: screenshots.len(),
        };
        let snapshot = AppSnapshot {
            app: app.clone(),
            info_localizations: info.rows,
            versions: version_rows,
            version_localizations: localization_rows,
            screenshots,
        };
        self.cache.replace_app_snapshot(&snapshot).map_err(annotate)?;

        tracing::info!(
            store_id = %app.store_id,
            app_id = %app.app_id,
            info_localizations = rows.info_localizations,
            versions = rows.versions,
            version_localizations = rows.version_localizations,
            screenshots = rows.screenshots,
            "app refreshed"
        );

        let mut warnings = info.warnings;
        warnings.extend(versions.warnings);
        Ok(Fetched { rows, warnings })
    }

    fn reconcile(
        &self,
        token: &BearerToken,
        store_id: StoreId,
        app_id: &str,
        scope: ReconcileScope,
    ) -> SyncResult<Fetched<RowCounts>> {
        let annotate = |error: CoreError| error.with_store(store_id).with_app(app_id);

        match scope {
            ReconcileScope::AppInfo => {
                let info = self
                    .fetch_app_info_scope(token, store_id, app_id)
                    .map_err(annotate)?;
                self.cache
                    .replace_app_info_localizations(store_id, app_id, &info.rows)
                    .map_err(annotate)?;
                Ok(Fetched {
                    rows: RowCounts {
                        info_localizations: info.rows.len(),
                        ..RowCounts::default()
                    },
                    warnings: info.warnings,
                })
            }
            ReconcileScope::Versions(platform) => {
                let fetched = self
                    .fetch_version_scope(token, store_id, app_id, platform)
                    .map_err(annotate)?;
                let (versions, localizations) = fetched.rows;
                self.cache
                    .replace_versions(store_id, app_id, platform, &versions, &localizations)
                    .map_err(annotate)?;
                Ok(Fetched {
                    rows: RowCounts {
                        versions: versions.len(),
                        version_localizations: localizations.len(),
                        ..RowCounts::default()
                    },
                    warnings: fetched.warnings,
                })
            }
            ReconcileScope::Screenshots(platform) => {
                let fetched = self
                    .fetch_version_scope(token, store_id, app_id, platform)
                    .map_err(annotate)?;
                let screenshots = fetch_screenshots(
                    &self.runtime,
                    self.screenshot_workers,
                    Arc::clone(&self.api),
                    token,
                    store_id,
                    app_id,
                    &fetched.rows.1,
                )
                .map_err(annotate)?;
                self.cache
                    .replace_screenshots(store_id, app_id, platform, &screenshots)
                    .map_err(annotate)?;
                Ok(Fetched {
                    rows: RowCounts {
                        screenshots: screenshots.len(),
                        ..RowCounts::default()
                    },
                    warnings: fetched.warnings,
                })
            }
        }
    }

    fn reconcile_after_write(
        &self,
        token: &BearerToken,
        store_id: StoreId,
        app_id: &str,
        scope: ReconcileScope,
    ) -> WriteOutcome {
        match self.reconcile(token, store_id, app_id, scope) {
            Ok(_) => WriteOutcome::Reconciled {
                backup: self.backup.persist(),
            },
            Err(error) => {
                tracing::warn!(
                    store_id = %store_id,
                    app_id,
                    error = %error,
                    "remote write succeeded but refreshing the cache failed"
                );
                WriteOutcome::SavedStale {
                    refresh_error: error,
                }
            }
        }
    }

    fn fetch_app_info_scope(
        &self,
        token: &BearerToken,
        store_id: StoreId,
        app_id: &str,
    ) -> SyncResult<Fetched<Vec<AppInfoLocalization>>> {
        let app_infos = self
            .api
            .get_app_infos(token, app_id)
            .map_err(|error| error.with_scope(SyncScope::AppInfo))?;
        let selection = select_editable_app_info(&app_infos);
        let mut warnings = Vec::new();

        let Some(app_info) = selection.app_info.clone() else {
            tracing::warn!(store_id = %store_id, app_id, "no app info in the editable state");
            warnings.push(format!("app '{app_id}' has no editable app info"));
            return Ok(Fetched {
                rows: Vec::new(),
                warnings,
            });
        };
        if selection.is_ambiguous() {
            tracing::warn!(
                store_id = %store_id,
                app_id,
                candidates = selection.candidates,
                chosen = %app_info.id,
                "several editable app infos; using the first"
            );
            warnings.push(format!(
                "app '{app_id}' has {} editable app infos; used '{}'",
                selection.candidates, app_info.id
            ));
        }

        let rows = self
            .api
            .get_app_info_localizations(token, &app_info.id)
            .map_err(|error| error.with_scope(SyncScope::AppInfo))?
            .into_iter()
            .map(|remote| AppInfoLocalization {
                localization_id: remote.id,
                app_id: app_id.to_string(),
                store_id,
                locale: remote.locale,
                name: remote.name,
                subtitle: remote.subtitle,
                privacy_policy_url: remote.privacy_policy_url,
                privacy_choices_url: remote.privacy_choices_url,
            })
            .collect();
        Ok(Fetched { rows, warnings })
    }

    fn fetch_version_scope(
        &self,
        token: &BearerToken,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
    ) -> SyncResult<Fetched<(Vec<AppVersion>, Vec<AppVersionLocalization>)>> {
        let remote_versions = self
            .api
            .get_app_store_versions(token, app_id, platform)
            .map_err(|error| error.with_scope(SyncScope::Versions))?;

        let mut warnings = Vec::new();
        let mut seen_platforms: HashMap<Platform, usize> = HashMap::new();
        let mut versions = Vec::new();
        let mut localizations = Vec::new();

        for remote in remote_versions {
            if platform.is_some_and(|platform| platform != remote.platform) {
                continue;
            }
            *seen_platforms.entry(remote.platform).or_default() += 1;

            for localization in self
                .api
                .get_version_localizations(token, &remote.id)
                .map_err(|error| error.with_scope(SyncScope::Versions))?
            {
                localizations.push(AppVersionLocalization {
                    localization_id: localization.id,
                    version_id: remote.id.clone(),
                    app_id: app_id.to_string(),
                    store_id,
                    locale: localization.locale,
                    description: localization.description,
                    keywords: localization.keywords,
                    marketing_url: localization.marketing_url,
                    promotional_text: localization.promotional_text,
                    support_url: localization.support_url,
                    whats_new: localization.whats_new,
                    platform: remote.platform,
                });
            }
            versions.push(AppVersion {
                version_id: remote.id,
                app_id: app_id.to_string(),
                store_id,
                platform: remote.platform,
            });
        }

        let mut crowded: Vec<(Platform, usize)> = seen_platforms
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .collect();
        crowded.sort();
        for (platform, count) in crowded {
            tracing::warn!(
                store_id = %store_id,
                app_id,
                platform = %platform,
                count,
                "several editable versions on one platform"
            );
            warnings.push(format!(
                "app '{app_id}' has {count} editable {platform} versions"
            ));
        }

        Ok(Fetched {
            rows: (versions, localizations),
            warnings,
        })
    }

    fn send_patch(
        &self,
        token: &BearerToken,
        scope: AttributeScope,
        localization_id: &str,
        changes: &AttributeChanges,
    ) -> SyncResult<()> {
        let result = match scope {
            AttributeScope::AppInfo => {
                self.api
                    .patch_info_localization(token, localization_id, changes)
            }
            AttributeScope::Version => {
                self.api
                    .patch_version_localization(token, localization_id, changes)
            }
        };
        result.map_err(|error| error.with_scope(SyncScope::Patch))
    }

    /// Platform of a cached version localization. `None` refreshes every
    /// platform, which is what happens when the row is not cached.
    fn version_platform(
        &self,
        store_id: StoreId,
        localization_id: &str,
        requested: Option<Platform>,
    ) -> Option<Platform> {
        if requested.is_some() {
            return requested;
        }
        match self.cache.version_localization(store_id, localization_id) {
            Ok(row) => row.map(|row| row.platform),
            Err(error) => {
                tracing::warn!(
                    store_id = %store_id,
                    localization_id,
                    error = %error,
                    "could not look up cached platform"
                );
                None
            }
        }
    }

    fn cached_locales(
        &self,
        store_id: StoreId,
        attribute: Attribute,
        app_id: &str,
        platform: Option<Platform>,
    ) -> HashMap<String, String> {
        match self
            .cache
            .attribute_values(attribute, store_id, app_id, platform)
        {
            Ok(rows) => rows
                .into_iter()
                .map(|row| (row.localization_id, row.locale))
                .collect(),
            Err(error) => {
                tracing::warn!(
                    store_id = %store_id,
                    app_id,
                    error = %error,
                    "could not read cached locales"
                );
                HashMap::new()
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_edits(
        &self,
        token: &BearerToken,
        store_id: StoreId,
        attribute: Attribute,
        app_id: &str,
        edits: &[LocalizedEdit],
        locales: &HashMap<String, String>,
        report: &mut BatchReport,
    ) {
        let scope = attribute.scope();
        for edit in edits {
            let changes = AttributeChanges::single(attribute, edit.value.clone());
            match self.send_patch(token, scope, &edit.localization_id, &changes) {
                Ok(()) => report.succeeded.push(edit.localization_id.clone()),
                Err(error) => {
                    let locale = locales.get(&edit.localization_id).cloned();
                    tracing::warn!(
                        store_id = %store_id,
                        app_id,
                        localization_id = %edit.localization_id,
                        locale = locale.as_deref().unwrap_or("unknown"),
                        error = %error,
                        "localized patch failed"
                    );
                    report.failed.push(ItemFailure {
                        item: edit.localization_id.clone(),
                        locale,
                        error: error.with_store(store_id).with_app(app_id),
                    });
                }
            }
        }
    }

    fn finish_batch(
        &self,
        token: &BearerToken,
        store_id: StoreId,
        app_id: &str,
        scope: ReconcileScope,
        report: &mut BatchReport,
    ) {
        if report.succeeded.is_empty() {
            return;
        }
        match self.reconcile_after_write(token, store_id, app_id, scope) {
            WriteOutcome::Reconciled { backup } => report.backup = backup,
            WriteOutcome::SavedStale { refresh_error } => {
                report.refresh_error = Some(refresh_error)
            }
        }
    }

    fn upload_one(&self, token: &BearerToken, upload: &ScreenshotUpload) -> SyncResult<()> {
        if upload.bytes.is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("'{}' is empty", upload.file_name),
            )
            .with_scope(SyncScope::Upload));
        }

        let sets = self
            .api
            .get_screenshot_sets(token, &upload.localization_id)
            .map_err(|error| error.with_scope(SyncScope::Upload))?;
        let Some(set) = sets
            .into_iter()
            .find(|set| set.display_type == upload.display_type)
        else {
            return Err(CoreError::new(
                CoreErrorKind::NotFound,
                format!(
                    "localization '{}' has no {} screenshot set",
                    upload.localization_id, upload.display_type
                ),
            )
            .with_scope(SyncScope::Upload));
        };

        let reservation = self
            .api
            .create_screenshot(token, &set.id, &upload.file_name, upload.bytes.len() as u64)
            .map_err(|error| error.with_scope(SyncScope::Upload))?;
        for operation in &reservation.upload_operations {
            self.api
                .perform_upload_operation(operation, &upload.bytes)
                .map_err(|error| error.with_scope(SyncScope::Upload))?;
        }

        let checksum = format!("{:x}", Md5::digest(&upload.bytes));
        self.api
            .commit_screenshot(token, &reservation.id, &checksum)
            .map_err(|error| error.with_scope(SyncScope::Upload))
    }
}
