// ABOUTME: Idempotent source-side data repairs run before any table is copied
// ABOUTME: Normalizes legacy anomalies in the SQLite wallet that PostgreSQL would reject

use crate::error::{MigrationError, Result};
use rusqlite::Connection;
use serde::Serialize;

/// A single normalizing UPDATE against the source store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceRepair {
    pub name: &'static str,
    pub table: &'static str,
    pub sql: &'static str,
}

/// Zero-length `invoices.features` blobs were written inconsistently by
/// older lightningd versions; rewrite them to the canonical empty value.
pub const INVOICE_EMPTY_FEATURES: SourceRepair = SourceRepair {
    name: "invoice_empty_features",
    table: "invoices",
    sql: "UPDATE invoices SET features = '' WHERE length(features) = 0 AND features IS NOT ''",
};

pub const LIGHTNINGD_REPAIRS: &[SourceRepair] = &[INVOICE_EMPTY_FEATURES];

/// Outcome of one repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairStats {
    pub name: String,
    pub rows_changed: usize,
}

/// Apply one repair, returning how many rows it changed.
///
/// Running a repair twice changes nothing the second time.
pub fn apply_repair(source: &Connection, repair: &SourceRepair) -> Result<RepairStats> {
    let rows_changed = source
        .execute(repair.sql, [])
        .map_err(|e| MigrationError::source(format!("repair '{}'", repair.name), e))?;

    if rows_changed > 0 {
        tracing::info!(
            "  Repaired {} row(s) in '{}' ({})",
            rows_changed,
            repair.table,
            repair.name
        );
    }

    Ok(RepairStats {
        name: repair.name.to_string(),
        rows_changed,
    })
}

pub fn apply_repairs(source: &Connection, repairs: &[SourceRepair]) -> Result<Vec<RepairStats>> {
    repairs
        .iter()
        .map(|repair| apply_repair(source, repair))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoices_fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE invoices (id INTEGER PRIMARY KEY, features BLOB);
             INSERT INTO invoices VALUES (1, x'');
             INSERT INTO invoices VALUES (2, x'0200');
             INSERT INTO invoices VALUES (3, NULL);
             INSERT INTO invoices VALUES (4, '');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_invoice_features_repair_is_idempotent() {
        let conn = invoices_fixture();

        let first = apply_repair(&conn, &INVOICE_EMPTY_FEATURES).unwrap();
        assert_eq!(first.rows_changed, 1);

        let second = apply_repair(&conn, &INVOICE_EMPTY_FEATURES).unwrap();
        assert_eq!(second.rows_changed, 0);

        let kinds: Vec<(i64, String)> = conn
            .prepare("SELECT id, typeof(features) FROM invoices ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        assert_eq!(
            kinds,
            vec![
                (1, "text".to_string()),
                (2, "blob".to_string()),
                (3, "null".to_string()),
                (4, "text".to_string()),
            ]
        );
    }

    #[test]
    fn test_repair_on_missing_table_fails() {
        let conn = Connection::open_in_memory().unwrap();
        let err = apply_repairs(&conn, LIGHTNINGD_REPAIRS).unwrap_err();
        assert!(matches!(err, MigrationError::Source { .. }));
    }
}
