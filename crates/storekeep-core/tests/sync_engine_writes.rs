mod common;

use common::{Harness, rejected};
use storekeep_core::models::{
    Attribute, AttributeChanges, CoreError, CoreErrorKind, Platform, SyncScope,
};
use storekeep_core::persistence::CatalogStore;
use storekeep_core::sync::{
    LocalizedEdit, PatchRequest, ScreenshotUpload, TranslationRequest, Translator, WriteOutcome,
};

fn synced_widget(test_name: &str) -> Harness {
    let harness = Harness::new(test_name);
    harness.seed_widget("app_42");
    harness.engine.sync_one_app(&harness.store, "app_42").unwrap();
    harness
}

fn cached(harness: &Harness, attribute: Attribute, locale: &str) -> Option<String> {
    harness
        .cache
        .attribute_values(attribute, harness.store.id, "app_42", None)
        .unwrap()
        .into_iter()
        .find(|row| row.locale == locale)
        .and_then(|row| row.value)
}

fn subtitle_patch(localization_id: &str, value: &str) -> PatchRequest {
    PatchRequest {
        app_id: "app_42".to_string(),
        localization_id: localization_id.to_string(),
        changes: AttributeChanges::single(Attribute::Subtitle, Some(value.to_string())),
        platform: None,
    }
}

struct TaggingTranslator {
    failing_locale: Option<&'static str>,
}

impl Translator for TaggingTranslator {
    fn translate(&self, text: &str, target_locale: &str) -> Result<String, CoreError> {
        if self.failing_locale == Some(target_locale) {
            return Err(CoreError::new(
                CoreErrorKind::RemoteUnavailable,
                "translation service timed out",
            ));
        }
        Ok(format!("[{target_locale}] {text}"))
    }
}

#[test]
fn accepted_patch_is_read_back_into_the_cache() {
    let harness = synced_widget("patch-reconciles");
    let persists_before = harness.backup.calls();

    let outcome = harness
        .engine
        .patch_and_refresh(&harness.store, &subtitle_patch("app_42-info-en", "Best widget ever"))
        .unwrap();

    assert!(matches!(outcome, WriteOutcome::Reconciled { .. }));
    assert_eq!(outcome.user_message(), "Saved.");
    assert_eq!(
        cached(&harness, Attribute::Subtitle, "en-US").as_deref(),
        Some("Best widget ever")
    );
    assert_eq!(cached(&harness, Attribute::Name, "en-US").as_deref(), Some("Widget"));
    assert_eq!(harness.backup.calls(), persists_before + 1);
}

#[test]
fn rejected_patch_leaves_the_cache_untouched() {
    let harness = synced_widget("patch-rejected");
    harness.api.reject_patch(
        "app_42-info-en",
        rejected("HTTP 409: An attribute value is invalid.: The subtitle is too long."),
    );
    let persists_before = harness.backup.calls();

    let error = harness
        .engine
        .patch_and_refresh(&harness.store, &subtitle_patch("app_42-info-en", "x".repeat(40).as_str()))
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::RemoteRejected);
    assert_eq!(error.status, Some(409));
    assert_eq!(error.scope, Some(SyncScope::Patch));
    assert_eq!(error.app.as_deref(), Some("app_42"));
    assert!(error.user_message().contains("rejected"));
    assert_eq!(
        cached(&harness, Attribute::Subtitle, "en-US").as_deref(),
        Some("Best widget")
    );
    assert_eq!(harness.backup.calls(), persists_before);
}

#[test]
fn mixed_scope_changes_are_rejected_before_any_remote_call() {
    let harness = synced_widget("patch-mixed-scope");
    let request = PatchRequest {
        changes: AttributeChanges::new()
            .set(Attribute::Subtitle, Some("a".to_string()))
            .set(Attribute::WhatsNew, Some("b".to_string())),
        ..subtitle_patch("app_42-info-en", "unused")
    };

    let error = harness
        .engine
        .patch_and_refresh(&harness.store, &request)
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    assert_eq!(harness.api.state().patch_calls, 0);
}

#[test]
fn failed_refresh_after_accepted_patch_is_saved_stale() {
    let harness = synced_widget("patch-saved-stale");
    harness.api.fail_app_info_reads("app_42");
    let persists_before = harness.backup.calls();

    let outcome = harness
        .engine
        .patch_and_refresh(&harness.store, &subtitle_patch("app_42-info-en", "Best widget ever"))
        .unwrap();

    let WriteOutcome::SavedStale { refresh_error } = &outcome else {
        panic!("expected a stale outcome, got {outcome:?}");
    };
    assert_eq!(refresh_error.kind, CoreErrorKind::RemoteUnavailable);
    assert!(outcome.user_message().contains("refresh manually"));

    assert_eq!(
        harness.api.info_value("app_42-info-en").unwrap().subtitle.as_deref(),
        Some("Best widget ever")
    );
    assert_eq!(
        cached(&harness, Attribute::Subtitle, "en-US").as_deref(),
        Some("Best widget")
    );
    assert_eq!(harness.backup.calls(), persists_before);
}

#[test]
fn version_patch_refreshes_the_cached_platform() {
    let harness = Harness::new("version-patch");
    harness.seed_widget("app_42");
    harness.api.add_version("app_42", "app_42-mac", Platform::MacOs);
    harness
        .api
        .add_version_localization("app_42-mac", "mac-en", "en-US", "Mac fixes");
    harness.engine.sync_one_app(&harness.store, "app_42").unwrap();

    let request = PatchRequest {
        app_id: "app_42".to_string(),
        localization_id: "mac-en".to_string(),
        changes: AttributeChanges::single(Attribute::WhatsNew, Some("Faster sync".to_string())),
        platform: None,
    };
    let outcome = harness
        .engine
        .patch_and_refresh(&harness.store, &request)
        .unwrap();
    assert!(matches!(outcome, WriteOutcome::Reconciled { .. }));

    let mac = harness
        .cache
        .attribute_values(
            Attribute::WhatsNew,
            harness.store.id,
            "app_42",
            Some(Platform::MacOs),
        )
        .unwrap();
    assert_eq!(mac[0].value.as_deref(), Some("Faster sync"));

    let ios = harness
        .cache
        .attribute_values(Attribute::WhatsNew, harness.store.id, "app_42", Some(Platform::Ios))
        .unwrap();
    assert_eq!(ios.len(), 2);
    assert_eq!(
        harness
            .cache
            .screenshots(harness.store.id, "app_42", Some(Platform::Ios))
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn batch_save_reports_each_failed_locale() {
    let harness = synced_widget("batch-partial");
    harness
        .api
        .reject_patch("app_42-info-fr", rejected("The subtitle is too long."));

    let report = harness
        .engine
        .save_attribute_batch(
            &harness.store,
            Attribute::Subtitle,
            "app_42",
            None,
            &[
                LocalizedEdit {
                    localization_id: "app_42-info-en".to_string(),
                    value: Some("Best widget ever".to_string()),
                },
                LocalizedEdit {
                    localization_id: "app_42-info-fr".to_string(),
                    value: Some("Le meilleur widget de tous les temps, vraiment".to_string()),
                },
            ],
        )
        .unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, vec!["app_42-info-en".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].locale.as_deref(), Some("fr-FR"));
    assert!(!report.is_complete());

    let error = report.error().unwrap();
    assert_eq!(error.kind, CoreErrorKind::PartialBatchFailure);
    assert!(error.message.contains("fr-FR (app_42-info-fr)"));

    assert_eq!(
        cached(&harness, Attribute::Subtitle, "en-US").as_deref(),
        Some("Best widget ever")
    );
    assert_eq!(
        cached(&harness, Attribute::Subtitle, "fr-FR").as_deref(),
        Some("Meilleur widget")
    );
}

#[test]
fn batch_with_no_accepted_edit_skips_the_refresh() {
    let harness = synced_widget("batch-all-failed");
    harness
        .api
        .reject_patch("app_42-info-en", rejected("The subtitle is too long."));
    let persists_before = harness.backup.calls();

    let report = harness
        .engine
        .save_attribute_batch(
            &harness.store,
            Attribute::Subtitle,
            "app_42",
            None,
            &[LocalizedEdit {
                localization_id: "app_42-info-en".to_string(),
                value: Some("x".repeat(40)),
            }],
        )
        .unwrap();

    assert!(report.succeeded.is_empty());
    assert_eq!(report.error().unwrap().kind, CoreErrorKind::RemoteRejected);
    assert_eq!(harness.backup.calls(), persists_before);
}

#[test]
fn translation_fills_every_cached_locale() {
    let harness = synced_widget("translate");
    let request = TranslationRequest {
        attribute: Attribute::WhatsNew,
        app_id: "app_42".to_string(),
        platform: Some(Platform::Ios),
        source_locale: Some("en-US".to_string()),
        source_text: "Faster sync".to_string(),
    };

    let report = harness
        .engine
        .translate_and_save(&harness.store, &request, &TaggingTranslator { failing_locale: None })
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.attempted, 2);
    assert_eq!(
        cached(&harness, Attribute::WhatsNew, "en-US").as_deref(),
        Some("Faster sync")
    );
    assert_eq!(
        cached(&harness, Attribute::WhatsNew, "de-DE").as_deref(),
        Some("[de-DE] Faster sync")
    );
}

#[test]
fn failed_translation_is_reported_per_locale() {
    let harness = synced_widget("translate-partial");
    let request = TranslationRequest {
        attribute: Attribute::WhatsNew,
        app_id: "app_42".to_string(),
        platform: None,
        source_locale: Some("en-US".to_string()),
        source_text: "Faster sync".to_string(),
    };

    let report = harness
        .engine
        .translate_and_save(
            &harness.store,
            &request,
            &TaggingTranslator {
                failing_locale: Some("de-DE"),
            },
        )
        .unwrap();

    assert_eq!(report.succeeded, vec!["app_42-ios-en".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].locale.as_deref(), Some("de-DE"));
    assert_eq!(
        report.error().unwrap().kind,
        CoreErrorKind::PartialBatchFailure
    );
    assert_eq!(
        cached(&harness, Attribute::WhatsNew, "de-DE").as_deref(),
        Some("Fehlerbehebungen")
    );
}

#[test]
fn translation_needs_a_cached_app() {
    let harness = Harness::new("translate-uncached");
    let request = TranslationRequest {
        attribute: Attribute::Subtitle,
        app_id: "app_42".to_string(),
        platform: None,
        source_locale: None,
        source_text: "Hello".to_string(),
    };

    let error = harness
        .engine
        .translate_and_save(&harness.store, &request, &TaggingTranslator { failing_locale: None })
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::NotFound);
}

#[test]
fn screenshot_upload_runs_every_operation_and_commits_the_checksum() {
    let harness = synced_widget("upload");

    let report = harness
        .engine
        .upload_screenshots(
            &harness.store,
            "app_42",
            Platform::Ios,
            &[ScreenshotUpload {
                localization_id: "app_42-ios-en".to_string(),
                display_type: "APP_IPHONE_67".to_string(),
                file_name: "home.png".to_string(),
                bytes: b"hello world".to_vec(),
            }],
        )
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.succeeded, vec!["home.png".to_string()]);

    {
        let state = harness.api.state();
        let uploaded: Vec<u8> = state
            .uploaded
            .iter()
            .flat_map(|(_, chunk)| chunk.clone())
            .collect();
        assert_eq!(uploaded, b"hello world".to_vec());
        assert_eq!(
            state.commits,
            vec![(
                "shot-1".to_string(),
                "5eb63bbbe01eeed093cb22bb8f5acdc3".to_string()
            )]
        );
    }

    let ids: Vec<String> = harness
        .cache
        .screenshots(harness.store.id, "app_42", Some(Platform::Ios))
        .unwrap()
        .into_iter()
        .map(|shot| shot.id)
        .collect();
    assert!(ids.contains(&"app_42_shot-1".to_string()));
    assert_eq!(ids.len(), 3);
}

#[test]
fn upload_to_a_missing_screenshot_set_fails_that_file_only() {
    let harness = synced_widget("upload-missing-set");

    let report = harness
        .engine
        .upload_screenshots(
            &harness.store,
            "app_42",
            Platform::Ios,
            &[
                ScreenshotUpload {
                    localization_id: "app_42-ios-en".to_string(),
                    display_type: "APP_IPAD_PRO_129".to_string(),
                    file_name: "ipad.png".to_string(),
                    bytes: vec![1, 2, 3],
                },
                ScreenshotUpload {
                    localization_id: "app_42-ios-en".to_string(),
                    display_type: "APP_IPHONE_67".to_string(),
                    file_name: "empty.png".to_string(),
                    bytes: Vec::new(),
                },
            ],
        )
        .unwrap();

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].error.kind, CoreErrorKind::NotFound);
    assert_eq!(report.failed[1].error.kind, CoreErrorKind::InvalidInput);
    assert_eq!(report.failed[0].error.scope, Some(SyncScope::Upload));
    assert_eq!(harness.api.state().reservations, 0);
}
