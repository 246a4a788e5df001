use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::api::{BearerToken, MetadataApi};
use crate::models::{
    AppVersionLocalization, CoreError, CoreErrorKind, Screenshot, StoreId, SyncScope,
};
use crate::sync::SyncResult;

/// Fetches screenshot metadata for every version localization, at most
/// `workers` localizations at a time. All jobs are joined before any result
/// is returned; one failed job fails the whole scope.
///
/// Must be called from a thread that is not driving `runtime`.
pub(crate) fn fetch_screenshots(
    runtime: &Handle,
    workers: usize,
    api: Arc<dyn MetadataApi>,
    token: &BearerToken,
    store_id: StoreId,
    app_id: &str,
    localizations: &[AppVersionLocalization],
) -> SyncResult<Vec<Screenshot>> {
    if localizations.is_empty() {
        return Ok(Vec::new());
    }

    let jobs: Vec<AppVersionLocalization> = localizations.to_vec();
    let token = token.clone();
    let app_id = app_id.to_string();

    runtime.block_on(async move {
        let permits = Arc::new(Semaphore::new(workers.max(1)));
        let mut pending = JoinSet::new();

        for (index, localization) in jobs.into_iter().enumerate() {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|error| fan_out_error(format!("worker pool closed: {error}")))?;
            let api = Arc::clone(&api);
            let token = token.clone();
            let app_id = app_id.clone();

            pending.spawn_blocking(move || {
                let _permit = permit;
                let result = fetch_localization_screenshots(
                    api.as_ref(),
                    &token,
                    store_id,
                    &app_id,
                    &localization,
                );
                (index, result)
            });
        }

        let mut finished = Vec::with_capacity(localizations.len());
        while let Some(joined) = pending.join_next().await {
            let (index, result) = joined
                .map_err(|error| fan_out_error(format!("screenshot job did not finish: {error}")))?;
            finished.push((index, result));
        }
        finished.sort_by_key(|(index, _)| *index);

        let mut screenshots = Vec::new();
        for (_, result) in finished {
            screenshots.extend(result?);
        }
        Ok::<_, CoreError>(screenshots)
    })
}

fn fetch_localization_screenshots(
    api: &dyn MetadataApi,
    token: &BearerToken,
    store_id: StoreId,
    app_id: &str,
    localization: &AppVersionLocalization,
) -> SyncResult<Vec<Screenshot>> {
    let mut rows = Vec::new();
    for set in api.get_screenshot_sets(token, &localization.localization_id)? {
        for shot in api.get_screenshots(token, &set.id)? {
            rows.push(Screenshot {
                id: Screenshot::cache_id(app_id, &shot.id),
                app_id: app_id.to_string(),
                store_id,
                localization_id: localization.localization_id.clone(),
                locale: localization.locale.clone(),
                display_type: set.display_type.clone(),
                url: shot.url,
                width: shot.width,
                height: shot.height,
                platform: localization.platform,
            });
        }
    }
    Ok(rows)
}

fn fan_out_error(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::Internal, message).with_scope(SyncScope::Screenshots)
}
