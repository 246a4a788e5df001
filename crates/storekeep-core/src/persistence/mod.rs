use crate::models::{
    App, AppInfoLocalization, AppSnapshot, AppVersion, AppVersionLocalization, Attribute,
    AttributeValue, CoreError, NewStore, Platform, Screenshot, Store, StoreCredentials, StoreId, User, UserId,
};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

pub trait StoreRegistry: Send + Sync {
    fn add_store(&self, store: &NewStore) -> PersistenceResult<StoreId>;

    /// Removes the store, its grants and every cached row scoped to it.
    fn delete_store(&self, store_id: StoreId) -> PersistenceResult<bool>;

    fn list_stores(&self) -> PersistenceResult<Vec<Store>>;

    fn store(&self, store_id: StoreId) -> PersistenceResult<Option<Store>>;

    fn store_credentials(&self, store_id: StoreId)
    -> PersistenceResult<Option<StoreCredentials>>;
}

/// Mirror of remote catalog entities. Every `replace_*` call deletes the
/// whole scope and inserts the given rows inside one transaction.
pub trait CatalogStore: Send + Sync {
    fn upsert_app(&self, app: &App) -> PersistenceResult<()>;

    fn replace_app_snapshot(&self, snapshot: &AppSnapshot) -> PersistenceResult<()>;

    fn replace_app_info_localizations(
        &self,
        store_id: StoreId,
        app_id: &str,
        rows: &[AppInfoLocalization],
    ) -> PersistenceResult<()>;

    fn replace_versions(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
        versions: &[AppVersion],
        localizations: &[AppVersionLocalization],
    ) -> PersistenceResult<()>;

    fn replace_screenshots(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
        rows: &[Screenshot],
    ) -> PersistenceResult<()>;

    /// Clears every app-scoped table for the app, keeping the `apps` row.
    fn delete_app_rows(&self, store_id: StoreId, app_id: &str) -> PersistenceResult<()>;

    /// Tombstone cleanup: drops every app-scoped row of the store whose
    /// `app_id` is not in `live_app_ids`. Returns the number of rows removed.
    fn delete_orphans(&self, store_id: StoreId, live_app_ids: &[String])
    -> PersistenceResult<usize>;

    fn list_apps(&self, store_id: StoreId) -> PersistenceResult<Vec<App>>;

    fn app(&self, store_id: StoreId, app_id: &str) -> PersistenceResult<Option<App>>;

    fn app_info_localizations(
        &self,
        store_id: StoreId,
        app_id: &str,
    ) -> PersistenceResult<Vec<AppInfoLocalization>>;

    fn versions(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
    ) -> PersistenceResult<Vec<AppVersion>>;

    fn version_localizations(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
    ) -> PersistenceResult<Vec<AppVersionLocalization>>;

    fn version_localization(
        &self,
        store_id: StoreId,
        localization_id: &str,
    ) -> PersistenceResult<Option<AppVersionLocalization>>;

    fn screenshots(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
    ) -> PersistenceResult<Vec<Screenshot>>;

    /// `platform` only narrows version attributes; app-info attributes ignore it.
    fn attribute_values(
        &self,
        attribute: Attribute,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
    ) -> PersistenceResult<Vec<AttributeValue>>;

    fn locales(&self, store_id: StoreId, app_id: &str) -> PersistenceResult<Vec<String>>;
}

pub trait UserStore: Send + Sync {
    fn add_user(&self, username: &str, password: &str, is_admin: bool)
    -> PersistenceResult<UserId>;

    fn verify_credentials(&self, username: &str, password: &str)
    -> PersistenceResult<Option<User>>;

    /// Admin accounts are never deleted.
    fn delete_user(&self, user_id: UserId) -> PersistenceResult<bool>;

    fn grant_store(&self, user_id: UserId, store_id: StoreId) -> PersistenceResult<()>;

    fn revoke_store(&self, user_id: UserId, store_id: StoreId) -> PersistenceResult<bool>;

    /// Admins see every store; other users only their granted ones.
    fn stores_for_user(&self, user_id: UserId) -> PersistenceResult<Vec<Store>>;
}

/// What the synchronization engine needs from the local cache.
pub trait CacheStore: StoreRegistry + CatalogStore {}

impl<T: StoreRegistry + CatalogStore> CacheStore for T {}
