use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, Row, Transaction, params};
use sha2::{Digest, Sha256};

use crate::models::{
    App, AppInfoLocalization, AppSnapshot, AppVersion, AppVersionLocalization, Attribute,
    AttributeScope, AttributeValue, CoreError, CoreErrorKind, NewStore, Platform, Screenshot,
    Store, StoreCredentials, StoreId, SyncScope, User, UserId,
};
use crate::persistence::{
    CatalogStore, MigrationStore, PersistenceResult, StoreRegistry, UserStore,
};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "storekeep_schema_migrations";

/// Tables holding rows scoped by `(store_id, app_id)`, children first.
const APP_SCOPED_TABLES: [&str; 4] = [
    "app_screenshots",
    "app_version_localizations",
    "app_versions",
    "app_info_localizations",
];

const INFO_LOCALIZATION_COLUMNS: &str = "localization_id, app_id, store_id, locale, name, subtitle, privacy_policy_url, privacy_choices_url";

const VERSION_LOCALIZATION_COLUMNS: &str = "localization_id, version_id, app_id, store_id, locale, description, keywords, marketing_url, promotional_text, support_url, whats_new, platform";

const SCREENSHOT_COLUMNS: &str =
    "id, app_id, store_id, localization_id, locale, display_type, url, width, height, platform";

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // A restored cache file may record the version while missing
                // tables; all DDL is IF NOT EXISTS so re-running is safe.
                for version in 1..=target_version {
                    execute_batch_tolerant(connection, defined_migration(version)?.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl StoreRegistry for SqliteStore {
    fn add_store(&self, store: &NewStore) -> PersistenceResult<StoreId> {
        if store.name.trim().is_empty() {
            return Err(invalid_input("store name must not be empty"));
        }

        self.with_connection("add_store", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO stores (name, issuer_id, key_id, private_key)
VALUES (?1, ?2, ?3, ?4)
",
                params![
                    store.name.trim(),
                    store.credentials.issuer_id.as_str(),
                    store.credentials.key_id.as_str(),
                    store.credentials.private_key.as_str(),
                ],
            )?;
            Ok(StoreId(connection.last_insert_rowid()))
        })
    }

    fn delete_store(&self, store_id: StoreId) -> PersistenceResult<bool> {
        self.with_connection("delete_store", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            for table in APP_SCOPED_TABLES.iter().chain(["apps"].iter()) {
                transaction.execute(
                    &format!("DELETE FROM {table} WHERE store_id = ?1"),
                    [store_id.0],
                )?;
            }
            transaction.execute("DELETE FROM user_stores WHERE store_id = ?1", [store_id.0])?;
            let deleted =
                transaction.execute("DELETE FROM stores WHERE store_id = ?1", [store_id.0])?;
            transaction.commit()?;
            Ok(deleted > 0)
        })
    }

    fn list_stores(&self) -> PersistenceResult<Vec<Store>> {
        self.with_connection("list_stores", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT store_id, name, issuer_id, key_id, private_key
FROM stores
ORDER BY name, store_id
",
            )?;
            let rows = statement.query_map([], read_store)?;
            rows.collect()
        })
    }

    fn store(&self, store_id: StoreId) -> PersistenceResult<Option<Store>> {
        self.with_connection("store", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT store_id, name, issuer_id, key_id, private_key
FROM stores
WHERE store_id = ?1
",
            )?;
            let mut rows = statement.query([store_id.0])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            Ok(Some(read_store(row)?))
        })
    }

    fn store_credentials(
        &self,
        store_id: StoreId,
    ) -> PersistenceResult<Option<StoreCredentials>> {
        Ok(self.store(store_id)?.map(|store| store.credentials))
    }
}

impl CatalogStore for SqliteStore {
    fn delete_app_rows(&self, store_id: StoreId, app_id: &str) -> PersistenceResult<()> {
        self.with_connection("delete_app_rows", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            for table in APP_SCOPED_TABLES {
                transaction.execute(
                    &format!("DELETE FROM {table} WHERE store_id = ?1 AND app_id = ?2"),
                    params![store_id.0, app_id],
                )?;
            }
            transaction.commit()?;
            Ok(())
        })
    }

    fn upsert_app(&self, app: &App) -> PersistenceResult<()> {
        self.with_connection("upsert_app", |connection| {
            ensure_schema_ready(connection)?;
            upsert_app_row(connection, app)
        })
    }

    fn replace_app_snapshot(&self, snapshot: &AppSnapshot) -> PersistenceResult<()> {
        let app = &snapshot.app;
        validate_info_scope(app.store_id, &app.app_id, &snapshot.info_localizations)?;
        validate_version_scope(
            app.store_id,
            &app.app_id,
            None,
            &snapshot.versions,
            &snapshot.version_localizations,
        )?;
        validate_screenshot_scope(app.store_id, &app.app_id, None, &snapshot.screenshots)?;

        self.with_connection("replace_app_snapshot", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            upsert_app_row(&transaction, app)?;
            for table in APP_SCOPED_TABLES {
                transaction.execute(
                    &format!("DELETE FROM {table} WHERE store_id = ?1 AND app_id = ?2"),
                    params![app.store_id.0, app.app_id.as_str()],
                )?;
            }
            insert_info_localizations(&transaction, &snapshot.info_localizations)?;
            insert_versions(&transaction, &snapshot.versions)?;
            insert_version_localizations(&transaction, &snapshot.version_localizations)?;
            insert_screenshots(&transaction, &snapshot.screenshots)?;
            transaction.commit()?;
            Ok(())
        })
    }

    fn replace_app_info_localizations(
        &self,
        store_id: StoreId,
        app_id: &str,
        rows: &[AppInfoLocalization],
    ) -> PersistenceResult<()> {
        validate_info_scope(store_id, app_id, rows)?;

        self.with_connection("replace_app_info_localizations", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            transaction.execute(
                "DELETE FROM app_info_localizations WHERE store_id = ?1 AND app_id = ?2",
                params![store_id.0, app_id],
            )?;
            insert_info_localizations(&transaction, rows)?;
            transaction.commit()?;
            Ok(())
        })
    }

    fn replace_versions(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
        versions: &[AppVersion],
        localizations: &[AppVersionLocalization],
    ) -> PersistenceResult<()> {
        validate_version_scope(store_id, app_id, platform, versions, localizations)?;

        self.with_connection("replace_versions", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            let platform = platform.map(Platform::as_str);
            transaction.execute(
                "
DELETE FROM app_version_localizations
WHERE store_id = ?1 AND app_id = ?2 AND (?3 IS NULL OR platform = ?3)
",
                params![store_id.0, app_id, platform],
            )?;
            transaction.execute(
                "
DELETE FROM app_versions
WHERE store_id = ?1 AND app_id = ?2 AND (?3 IS NULL OR platform = ?3)
",
                params![store_id.0, app_id, platform],
            )?;
            insert_versions(&transaction, versions)?;
            insert_version_localizations(&transaction, localizations)?;
            transaction.commit()?;
            Ok(())
        })
    }

    fn replace_screenshots(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
        rows: &[Screenshot],
    ) -> PersistenceResult<()> {
        validate_screenshot_scope(store_id, app_id, platform, rows)?;

        self.with_connection("replace_screenshots", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            transaction.execute(
                "
DELETE FROM app_screenshots
WHERE store_id = ?1 AND app_id = ?2 AND (?3 IS NULL OR platform = ?3)
",
                params![store_id.0, app_id, platform.map(Platform::as_str)],
            )?;
            insert_screenshots(&transaction, rows)?;
            transaction.commit()?;
            Ok(())
        })
    }

    fn delete_orphans(
        &self,
        store_id: StoreId,
        live_app_ids: &[String],
    ) -> PersistenceResult<usize> {
        self.with_connection("delete_orphans", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            transaction.execute_batch(
                "
CREATE TEMP TABLE IF NOT EXISTS live_app_ids (app_id TEXT PRIMARY KEY);
DELETE FROM live_app_ids;
",
            )?;
            {
                let mut statement =
                    transaction.prepare("INSERT OR IGNORE INTO live_app_ids (app_id) VALUES (?1)")?;
                for app_id in live_app_ids {
                    statement.execute([app_id.as_str()])?;
                }
            }

            let mut removed = 0;
            for table in APP_SCOPED_TABLES.iter().chain(["apps"].iter()) {
                removed += transaction.execute(
                    &format!(
                        "DELETE FROM {table}
                         WHERE store_id = ?1
                           AND app_id NOT IN (SELECT app_id FROM live_app_ids)"
                    ),
                    [store_id.0],
                )?;
            }
            transaction.execute_batch("DROP TABLE temp.live_app_ids;")?;
            transaction.commit()?;
            Ok(removed)
        })
    }

    fn list_apps(&self, store_id: StoreId) -> PersistenceResult<Vec<App>> {
        self.with_connection("list_apps", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT app_id, store_id, name
FROM apps
WHERE store_id = ?1
ORDER BY name, app_id
",
            )?;
            let rows = statement.query_map([store_id.0], read_app)?;
            rows.collect()
        })
    }

    fn app(&self, store_id: StoreId, app_id: &str) -> PersistenceResult<Option<App>> {
        self.with_connection("app", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "SELECT app_id, store_id, name FROM apps WHERE store_id = ?1 AND app_id = ?2",
            )?;
            let mut rows = statement.query(params![store_id.0, app_id])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            Ok(Some(read_app(row)?))
        })
    }

    fn app_info_localizations(
        &self,
        store_id: StoreId,
        app_id: &str,
    ) -> PersistenceResult<Vec<AppInfoLocalization>> {
        self.with_connection("app_info_localizations", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "SELECT {INFO_LOCALIZATION_COLUMNS}
                 FROM app_info_localizations
                 WHERE store_id = ?1 AND app_id = ?2
                 ORDER BY locale, localization_id"
            ))?;
            let rows = statement.query_map(params![store_id.0, app_id], read_info_localization)?;
            rows.collect()
        })
    }

    fn versions(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
    ) -> PersistenceResult<Vec<AppVersion>> {
        self.with_connection("versions", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT version_id, app_id, store_id, platform
FROM app_versions
WHERE store_id = ?1 AND app_id = ?2 AND (?3 IS NULL OR platform = ?3)
ORDER BY platform, version_id
",
            )?;
            let rows = statement.query_map(
                params![store_id.0, app_id, platform.map(Platform::as_str)],
                |row| {
                    let platform_raw: String = row.get(3)?;
                    Ok(AppVersion {
                        version_id: row.get(0)?,
                        app_id: row.get(1)?,
                        store_id: StoreId(row.get(2)?),
                        platform: parse_platform(&platform_raw)?,
                    })
                },
            )?;
            rows.collect()
        })
    }

    fn version_localizations(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
    ) -> PersistenceResult<Vec<AppVersionLocalization>> {
        self.with_connection("version_localizations", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "SELECT {VERSION_LOCALIZATION_COLUMNS}
                 FROM app_version_localizations
                 WHERE store_id = ?1 AND app_id = ?2 AND (?3 IS NULL OR platform = ?3)
                 ORDER BY platform, locale, localization_id"
            ))?;
            let rows = statement.query_map(
                params![store_id.0, app_id, platform.map(Platform::as_str)],
                read_version_localization,
            )?;
            rows.collect()
        })
    }

    fn version_localization(
        &self,
        store_id: StoreId,
        localization_id: &str,
    ) -> PersistenceResult<Option<AppVersionLocalization>> {
        self.with_connection("version_localization", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "SELECT {VERSION_LOCALIZATION_COLUMNS}
                 FROM app_version_localizations
                 WHERE store_id = ?1 AND localization_id = ?2"
            ))?;
            let mut rows = statement.query(params![store_id.0, localization_id])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            Ok(Some(read_version_localization(row)?))
        })
    }

    fn screenshots(
        &self,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
    ) -> PersistenceResult<Vec<Screenshot>> {
        self.with_connection("screenshots", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(&format!(
                "SELECT {SCREENSHOT_COLUMNS}
                 FROM app_screenshots
                 WHERE store_id = ?1 AND app_id = ?2 AND (?3 IS NULL OR platform = ?3)
                 ORDER BY locale, display_type, id"
            ))?;
            let rows = statement.query_map(
                params![store_id.0, app_id, platform.map(Platform::as_str)],
                read_screenshot,
            )?;
            rows.collect()
        })
    }

    fn attribute_values(
        &self,
        attribute: Attribute,
        store_id: StoreId,
        app_id: &str,
        platform: Option<Platform>,
    ) -> PersistenceResult<Vec<AttributeValue>> {
        self.with_connection("attribute_values", |connection| {
            ensure_schema_ready(connection)?;
            // Column names come from the closed `Attribute` enum only.
            let column = attribute.as_str();

            match attribute.scope() {
                AttributeScope::AppInfo => {
                    let mut statement = connection.prepare(&format!(
                        "SELECT localization_id, locale, {column}
                         FROM app_info_localizations
                         WHERE store_id = ?1 AND app_id = ?2
                         ORDER BY locale, localization_id"
                    ))?;
                    let rows =
                        statement.query_map(params![store_id.0, app_id], read_attribute_value)?;
                    rows.collect()
                }
                AttributeScope::Version => {
                    let mut statement = connection.prepare(&format!(
                        "SELECT localization_id, locale, {column}
                         FROM app_version_localizations
                         WHERE store_id = ?1 AND app_id = ?2 AND (?3 IS NULL OR platform = ?3)
                         ORDER BY locale, localization_id"
                    ))?;
                    let rows = statement.query_map(
                        params![store_id.0, app_id, platform.map(Platform::as_str)],
                        read_attribute_value,
                    )?;
                    rows.collect()
                }
            }
        })
    }

    fn locales(&self, store_id: StoreId, app_id: &str) -> PersistenceResult<Vec<String>> {
        self.with_connection("locales", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT locale FROM app_info_localizations WHERE store_id = ?1 AND app_id = ?2
UNION
SELECT locale FROM app_version_localizations WHERE store_id = ?1 AND app_id = ?2
ORDER BY locale
",
            )?;
            let rows = statement.query_map(params![store_id.0, app_id], |row| row.get(0))?;
            rows.collect()
        })
    }
}

impl UserStore for SqliteStore {
    fn add_user(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> PersistenceResult<UserId> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(invalid_input("username and password must not be empty"));
        }

        self.with_connection("add_user", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "INSERT INTO users (username, password_hash, is_admin) VALUES (?1, ?2, ?3)",
                params![username.trim(), hash_password(password), bool_to_sqlite(is_admin)],
            )?;
            Ok(UserId(connection.last_insert_rowid()))
        })
    }

    fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> PersistenceResult<Option<User>> {
        self.with_connection("verify_credentials", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT id, username, is_admin
FROM users
WHERE username = ?1 AND password_hash = ?2
",
            )?;
            let mut rows = statement.query(params![username.trim(), hash_password(password)])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let is_admin: i64 = row.get(2)?;
            Ok(Some(User {
                id: UserId(row.get(0)?),
                username: row.get(1)?,
                is_admin: sqlite_to_bool(is_admin),
            }))
        })
    }

    fn delete_user(&self, user_id: UserId) -> PersistenceResult<bool> {
        self.with_connection("delete_user", |connection| {
            ensure_schema_ready(connection)?;
            let transaction = connection.transaction()?;
            let deleted = transaction.execute(
                "DELETE FROM users WHERE id = ?1 AND is_admin = 0",
                [user_id.0],
            )?;
            if deleted > 0 {
                transaction.execute("DELETE FROM user_stores WHERE user_id = ?1", [user_id.0])?;
            }
            transaction.commit()?;
            Ok(deleted > 0)
        })
    }

    fn grant_store(&self, user_id: UserId, store_id: StoreId) -> PersistenceResult<()> {
        self.with_connection("grant_store", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "INSERT OR IGNORE INTO user_stores (user_id, store_id) VALUES (?1, ?2)",
                params![user_id.0, store_id.0],
            )?;
            Ok(())
        })
    }

    fn revoke_store(&self, user_id: UserId, store_id: StoreId) -> PersistenceResult<bool> {
        self.with_connection("revoke_store", |connection| {
            ensure_schema_ready(connection)?;
            let removed = connection.execute(
                "DELETE FROM user_stores WHERE user_id = ?1 AND store_id = ?2",
                params![user_id.0, store_id.0],
            )?;
            Ok(removed > 0)
        })
    }

    fn stores_for_user(&self, user_id: UserId) -> PersistenceResult<Vec<Store>> {
        self.with_connection("stores_for_user", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT s.store_id, s.name, s.issuer_id, s.key_id, s.private_key
FROM stores s
JOIN users u ON u.id = ?1
WHERE u.is_admin = 1
   OR EXISTS (
        SELECT 1 FROM user_stores us
        WHERE us.user_id = u.id AND us.store_id = s.store_id
   )
ORDER BY s.name, s.store_id
",
            )?;
            let rows = statement.query_map([user_id.0], read_store)?;
            rows.collect()
        })
    }
}

fn upsert_app_row(connection: &Connection, app: &App) -> rusqlite::Result<()> {
    connection.execute(
        "
INSERT INTO apps (app_id, store_id, name)
VALUES (?1, ?2, ?3)
ON CONFLICT(app_id, store_id) DO UPDATE SET
    name = excluded.name
",
        params![app.app_id.as_str(), app.store_id.0, app.name.as_str()],
    )?;
    Ok(())
}

fn insert_info_localizations(
    transaction: &Transaction<'_>,
    rows: &[AppInfoLocalization],
) -> rusqlite::Result<()> {
    let mut statement = transaction.prepare(&format!(
        "INSERT OR REPLACE INTO app_info_localizations ({INFO_LOCALIZATION_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    ))?;
    for row in rows {
        statement.execute(params![
            row.localization_id.as_str(),
            row.app_id.as_str(),
            row.store_id.0,
            row.locale.as_str(),
            row.name.as_deref(),
            row.subtitle.as_deref(),
            row.privacy_policy_url.as_deref(),
            row.privacy_choices_url.as_deref(),
        ])?;
    }
    Ok(())
}

fn insert_versions(transaction: &Transaction<'_>, rows: &[AppVersion]) -> rusqlite::Result<()> {
    let mut statement = transaction.prepare(
        "
INSERT OR REPLACE INTO app_versions (version_id, app_id, store_id, platform)
VALUES (?1, ?2, ?3, ?4)
",
    )?;
    for row in rows {
        statement.execute(params![
            row.version_id.as_str(),
            row.app_id.as_str(),
            row.store_id.0,
            row.platform.as_str(),
        ])?;
    }
    Ok(())
}

fn insert_version_localizations(
    transaction: &Transaction<'_>,
    rows: &[AppVersionLocalization],
) -> rusqlite::Result<()> {
    let mut statement = transaction.prepare(&format!(
        "INSERT OR REPLACE INTO app_version_localizations ({VERSION_LOCALIZATION_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
    ))?;
    for row in rows {
        statement.execute(params![
            row.localization_id.as_str(),
            row.version_id.as_str(),
            row.app_id.as_str(),
            row.store_id.0,
            row.locale.as_str(),
            row.description.as_deref(),
            row.keywords.as_deref(),
            row.marketing_url.as_deref(),
            row.promotional_text.as_deref(),
            row.support_url.as_deref(),
            row.whats_new.as_deref(),
            row.platform.as_str(),
        ])?;
    }
    Ok(())
}

fn insert_screenshots(transaction: &Transaction<'_>, rows: &[Screenshot]) -> rusqlite::Result<()> {
    let mut statement = transaction.prepare(&format!(
        "INSERT OR REPLACE INTO app_screenshots ({SCREENSHOT_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    ))?;
    for row in rows {
        statement.execute(params![
            row.id.as_str(),
            row.app_id.as_str(),
            row.store_id.0,
            row.localization_id.as_str(),
            row.locale.as_str(),
            row.display_type.as_str(),
            row.url.as_str(),
            row.width,
            row.height,
            row.platform.as_str(),
        ])?;
    }
    Ok(())
}

fn validate_info_scope(
    store_id: StoreId,
    app_id: &str,
    rows: &[AppInfoLocalization],
) -> PersistenceResult<()> {
    if let Some(row) = rows
        .iter()
        .find(|row| row.store_id != store_id || row.app_id != app_id)
    {
        return Err(invalid_input(format!(
            "app info localization '{}' does not belong to app '{app_id}' in store {store_id}",
            row.localization_id
        )));
    }
    Ok(())
}

fn validate_version_scope(
    store_id: StoreId,
    app_id: &str,
    platform: Option<Platform>,
    versions: &[AppVersion],
    localizations: &[AppVersionLocalization],
) -> PersistenceResult<()> {
    let mut version_platforms = HashMap::new();
    for version in versions {
        if version.store_id != store_id || version.app_id != app_id {
            return Err(invalid_input(format!(
                "version '{}' does not belong to app '{app_id}' in store {store_id}",
                version.version_id
            )));
        }
        if platform.is_some_and(|platform| platform != version.platform) {
            return Err(invalid_input(format!(
                "version '{}' is outside the {} scope being replaced",
                version.version_id,
                platform.map(Platform::as_str).unwrap_or_default()
            )));
        }
        version_platforms.insert(version.version_id.as_str(), version.platform);
    }

    for localization in localizations {
        if localization.store_id != store_id || localization.app_id != app_id {
            return Err(invalid_input(format!(
                "version localization '{}' does not belong to app '{app_id}' in store {store_id}",
                localization.localization_id
            )));
        }
        match version_platforms.get(localization.version_id.as_str()) {
            Some(version_platform) if *version_platform == localization.platform => {}
            Some(version_platform) => {
                return Err(invalid_input(format!(
                    "version localization '{}' has platform {} but its version has {}",
                    localization.localization_id, localization.platform, version_platform
                )));
            }
            None => {
                return Err(invalid_input(format!(
                    "version localization '{}' references version '{}' which is not being written",
                    localization.localization_id, localization.version_id
                )));
            }
        }
    }
    Ok(())
}

fn validate_screenshot_scope(
    store_id: StoreId,
    app_id: &str,
    platform: Option<Platform>,
    rows: &[Screenshot],
) -> PersistenceResult<()> {
    if let Some(row) = rows.iter().find(|row| {
        row.store_id != store_id
            || row.app_id != app_id
            || platform.is_some_and(|platform| platform != row.platform)
    }) {
        return Err(invalid_input(format!(
            "screenshot '{}' is outside the scope being replaced for app '{app_id}'",
            row.id
        )));
    }
    Ok(())
}

fn read_store(row: &Row<'_>) -> rusqlite::Result<Store> {
    Ok(Store {
        id: StoreId(row.get(0)?),
        name: row.get(1)?,
        credentials: StoreCredentials {
            issuer_id: row.get(2)?,
            key_id: row.get(3)?,
            private_key: row.get(4)?,
        },
    })
}

fn read_app(row: &Row<'_>) -> rusqlite::Result<App> {
    Ok(App {
        app_id: row.get(0)?,
        store_id: StoreId(row.get(1)?),
        name: row.get(2)?,
    })
}

fn read_info_localization(row: &Row<'_>) -> rusqlite::Result<AppInfoLocalization> {
    Ok(AppInfoLocalization {
        localization_id: row.get(0)?,
        app_id: row.get(1)?,
        store_id: StoreId(row.get(2)?),
        locale: row.get(3)?,
        name: row.get(4)?,
        subtitle: row.get(5)?,
        privacy_policy_url: row.get(6)?,
        privacy_choices_url: row.get(7)?,
    })
}

fn read_version_localization(row: &Row<'_>) -> rusqlite::Result<AppVersionLocalization> {
    let platform_raw: String = row.get(11)?;
    Ok(AppVersionLocalization {
        localization_id: row.get(0)?,
        version_id: row.get(1)?,
        app_id: row.get(2)?,
        store_id: StoreId(row.get(3)?),
        locale: row.get(4)?,
        description: row.get(5)?,
        keywords: row.get(6)?,
        marketing_url: row.get(7)?,
        promotional_text: row.get(8)?,
        support_url: row.get(9)?,
        whats_new: row.get(10)?,
        platform: parse_platform(&platform_raw)?,
    })
}

fn read_attribute_value(row: &Row<'_>) -> rusqlite::Result<AttributeValue> {
    Ok(AttributeValue {
        localization_id: row.get(0)?,
        locale: row.get(1)?,
        value: row.get(2)?,
    })
}

fn read_screenshot(row: &Row<'_>) -> rusqlite::Result<Screenshot> {
    let platform_raw: String = row.get(9)?;
    Ok(Screenshot {
        id: row.get(0)?,
        app_id: row.get(1)?,
        store_id: StoreId(row.get(2)?),
        localization_id: row.get(3)?,
        locale: row.get(4)?,
        display_type: row.get(5)?,
        url: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        platform: parse_platform(&platform_raw)?,
    })
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    connection.busy_timeout(std::time::Duration::from_secs(30))?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))?;
    Ok(())
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before catalog operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    execute_batch_tolerant(&transaction, migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()?;
    Ok(())
}

/// Execute a SQL batch, tolerating "duplicate column name" errors from
/// `ALTER TABLE ADD COLUMN` which is not idempotent in SQLite.
fn execute_batch_tolerant(connection: &Connection, sql: &str) -> rusqlite::Result<()> {
    match connection.execute_batch(sql) {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("duplicate column name") => Ok(()),
        Err(e) => Err(e),
    }
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()?;
    Ok(())
}

fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

fn parse_platform(raw: &str) -> rusqlite::Result<Platform> {
    raw.parse::<Platform>().map_err(|_| {
        storage_error_sqlite(&format!(
            "unknown platform '{raw}' found in persisted sqlite record"
        ))
    })
}

fn bool_to_sqlite(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

fn sqlite_to_bool(value: i64) -> bool {
    value != 0
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
    .with_scope(SyncScope::Cache)
}

fn invalid_input(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message).with_scope(SyncScope::Cache)
}
