use serde::Serialize;

use crate::models::{Platform, StoreId};

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct App {
    pub app_id: String,
    pub store_id: StoreId,
    pub name: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AppInfoLocalization {
    pub localization_id: String,
    pub app_id: String,
    pub store_id: StoreId,
    pub locale: String,
    pub name: Option<String>,
    pub subtitle: Option<String>,
    pub privacy_policy_url: Option<String>,
    pub privacy_choices_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AppVersion {
    pub version_id: String,
    pub app_id: String,
    pub store_id: StoreId,
    pub platform: Platform,
}

/// `platform` is a copy of the owning version's platform; the sqlite store
/// rejects writes where the two disagree.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AppVersionLocalization {
    pub localization_id: String,
    pub version_id: String,
    pub app_id: String,
    pub store_id: StoreId,
    pub locale: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub marketing_url: Option<String>,
    pub promotional_text: Option<String>,
    pub support_url: Option<String>,
    pub whats_new: Option<String>,
    pub platform: Platform,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Screenshot {
    pub id: String,
    pub app_id: String,
    pub store_id: StoreId,
    pub localization_id: String,
    pub locale: String,
    pub display_type: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub platform: Platform,
}

impl Screenshot {
    pub fn cache_id(app_id: &str, remote_screenshot_id: &str) -> String {
        format!("{app_id}_{remote_screenshot_id}")
    }
}

/// Everything cached for one app, fetched before any row is written.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AppSnapshot {
    pub app: App,
    pub info_localizations: Vec<AppInfoLocalization>,
    pub versions: Vec<AppVersion>,
    pub version_localizations: Vec<AppVersionLocalization>,
    pub screenshots: Vec<Screenshot>,
}
