pub mod migrations;
pub mod probe;
pub mod store;

pub use migrations::{SqliteMigration, current_schema_version, migration, migrations};
pub use probe::probe_database;
pub use store::SqliteStore;
