use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::models::{CoreError, CoreErrorKind, SyncScope};

/// Opens the file read-only, runs `PRAGMA quick_check` and reads the schema
/// table. A file that is not a database, a truncated or damaged one, or a
/// database without any schema objects fails the probe.
pub fn probe_database(path: &Path) -> Result<(), CoreError> {
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|error| integrity_error(path, error.to_string()))?;

    let problems: Vec<String> = connection
        .prepare("PRAGMA quick_check")
        .and_then(|mut statement| {
            let rows = statement
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>();
            rows
        })
        .map_err(|error| integrity_error(path, error.to_string()))?;
    if problems.first().map(String::as_str) != Some("ok") {
        return Err(integrity_error(path, problems.join("; ")));
    }

    let objects: i64 = connection
        .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
        .map_err(|error| integrity_error(path, error.to_string()))?;

    if objects == 0 {
        return Err(integrity_error(path, "database has no schema objects"));
    }
    Ok(())
}

fn integrity_error(path: &Path, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::CacheIntegrity,
        format!(
            "integrity probe of '{}' failed: {}",
            path.display(),
            message.as_ref()
        ),
    )
    .with_scope(SyncScope::Cache)
}
