#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_catalog_schema",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS stores (
    store_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    issuer_id TEXT NOT NULL,
    key_id TEXT NOT NULL,
    private_key TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS apps (
    app_id TEXT NOT NULL,
    store_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (app_id, store_id),
    FOREIGN KEY (store_id) REFERENCES stores (store_id)
);

CREATE TABLE IF NOT EXISTS app_info_localizations (
    localization_id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    store_id INTEGER NOT NULL,
    locale TEXT NOT NULL,
    name TEXT,
    subtitle TEXT,
    privacy_policy_url TEXT,
    privacy_choices_url TEXT,
    FOREIGN KEY (app_id, store_id) REFERENCES apps (app_id, store_id)
);

CREATE TABLE IF NOT EXISTS app_versions (
    version_id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    store_id INTEGER NOT NULL,
    platform TEXT NOT NULL,
    FOREIGN KEY (app_id, store_id) REFERENCES apps (app_id, store_id)
);

CREATE TABLE IF NOT EXISTS app_version_localizations (
    localization_id TEXT PRIMARY KEY,
    version_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    store_id INTEGER NOT NULL,
    locale TEXT NOT NULL,
    description TEXT,
    keywords TEXT,
    marketing_url TEXT,
    promotional_text TEXT,
    support_url TEXT,
    whats_new TEXT,
    platform TEXT NOT NULL,
    FOREIGN KEY (version_id) REFERENCES app_versions (version_id),
    FOREIGN KEY (app_id, store_id) REFERENCES apps (app_id, store_id)
);

CREATE TABLE IF NOT EXISTS app_screenshots (
    id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    store_id INTEGER NOT NULL,
    localization_id TEXT NOT NULL,
    locale TEXT NOT NULL,
    display_type TEXT NOT NULL,
    url TEXT NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    platform TEXT NOT NULL,
    FOREIGN KEY (app_id, store_id) REFERENCES apps (app_id, store_id)
);

CREATE INDEX IF NOT EXISTS idx_app_info_localizations_scope
    ON app_info_localizations (store_id, app_id);

CREATE INDEX IF NOT EXISTS idx_app_versions_scope
    ON app_versions (store_id, app_id, platform);

CREATE INDEX IF NOT EXISTS idx_app_version_localizations_scope
    ON app_version_localizations (store_id, app_id, platform);

CREATE INDEX IF NOT EXISTS idx_app_screenshots_scope
    ON app_screenshots (store_id, app_id, platform);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_app_screenshots_scope;
DROP INDEX IF EXISTS idx_app_version_localizations_scope;
DROP INDEX IF EXISTS idx_app_versions_scope;
DROP INDEX IF EXISTS idx_app_info_localizations_scope;
DROP TABLE IF EXISTS app_screenshots;
DROP TABLE IF EXISTS app_version_localizations;
DROP TABLE IF EXISTS app_versions;
DROP TABLE IF EXISTS app_info_localizations;
DROP TABLE IF EXISTS apps;
DROP TABLE IF EXISTS stores;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_users_and_store_grants",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS user_stores (
    user_id INTEGER NOT NULL,
    store_id INTEGER NOT NULL,
    PRIMARY KEY (user_id, store_id),
    FOREIGN KEY (user_id) REFERENCES users (id),
    FOREIGN KEY (store_id) REFERENCES stores (store_id)
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS user_stores;
DROP TABLE IF EXISTS users;
"#,
};

const MIGRATIONS: [SqliteMigration; 2] = [MIGRATION_0001, MIGRATION_0002];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
