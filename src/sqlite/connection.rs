// ABOUTME: Opens the lightningd SQLite wallet used as the migration source
// ABOUTME: Provides catalog queries over sqlite_master and per-table row counts

use crate::error::MigrationError;
use crate::utils::{quote_ident, validate_sqlite_path};
use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Open an existing wallet file.
///
/// Never creates the file: a typo in the path must not silently produce an
/// empty database that then passes for a source.
pub fn open_source(path: &Path) -> Result<Connection> {
    validate_sqlite_path(path)?;

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open SQLite wallet '{}'", path.display()))?;

    // Any live lightningd holding the file must not be racing us
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .context("Failed to set SQLite busy timeout")?;

    tracing::debug!("Opened SQLite wallet {}", path.display());
    Ok(conn)
}

/// Count user tables, ignoring the listed bookkeeping tables.
pub fn count_user_tables(conn: &Connection, ignored: &[String]) -> crate::error::Result<i64> {
    let list_err = |e| MigrationError::source("listing tables in sqlite_master", e);

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .map_err(list_err)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(list_err)?;

    let mut count = 0;
    for name in names {
        let name = name.map_err(list_err)?;
        if !ignored.iter().any(|i| i == &name) {
            count += 1;
        }
    }
    Ok(count)
}

pub fn count_rows(conn: &Connection, table: &str) -> crate::error::Result<i64> {
    conn.query_row(
        &format!("SELECT count(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )
    .map_err(|e| MigrationError::source(format!("counting rows in '{}'", table), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_source_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("lightningd.sqlite3");
        assert!(open_source(&missing).is_err());
        assert!(!missing.exists());

        Connection::open(&missing)
            .unwrap()
            .execute_batch("CREATE TABLE version (version INTEGER);")
            .unwrap();
        let conn = open_source(&missing).unwrap();
        assert_eq!(count_rows(&conn, "version").unwrap(), 0);
    }

    #[test]
    fn test_count_user_tables_skips_ignored() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE peers (id INTEGER PRIMARY KEY AUTOINCREMENT, address TEXT);
             CREATE TABLE android_metadata (locale TEXT);
             INSERT INTO peers (address) VALUES ('a');",
        )
        .unwrap();

        // AUTOINCREMENT creates sqlite_sequence
        let ignored = vec!["android_metadata".to_string(), "sqlite_sequence".to_string()];
        assert_eq!(count_user_tables(&conn, &ignored).unwrap(), 1);
        assert_eq!(count_user_tables(&conn, &[]).unwrap(), 3);
    }

    #[test]
    fn test_count_rows_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(count_rows(&conn, "htlc_sigs").is_err());
    }
}
