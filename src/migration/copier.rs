// ABOUTME: Generic descriptor-driven row copier from SQLite into a PostgreSQL transaction
// ABOUTME: Streams a full table scan and applies conflict-safe single-row inserts

use super::descriptor::TableDescriptor;
use super::row::RowInstance;
use crate::error::{DecodeError, MigrationError, Result};
use rusqlite::Connection;
use serde::Serialize;
use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

/// Outcome of copying one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyStats {
    pub table: String,
    /// Rows read from the source
    pub scanned: u64,
    /// Rows the target actually inserted or updated
    pub inserted: u64,
    /// Rows dropped by `ON CONFLICT DO NOTHING`
    pub skipped: u64,
}

/// Copy every row of `descriptor.name` from the source into the target
/// transaction.
///
/// The source scan is `SELECT *`, decoded positionally; the column names
/// the source reports must equal the descriptor's fields in order. The
/// first decode or insert failure aborts the copy. Nothing here commits,
/// so a failure leaves the caller's transaction to be rolled back.
///
/// # Errors
///
/// - `Source` if the scan can't be prepared or stepped
/// - `Decode` on a column mismatch or an uninterpretable value
/// - `Encode`/`Insert` when the target rejects a row
pub async fn copy_table(
    source: &Connection,
    target: &Transaction<'_>,
    descriptor: &TableDescriptor,
) -> Result<CopyStats> {
    tracing::debug!("Copying table '{}'", descriptor.name);

    let select = descriptor.select_sql();
    let mut stmt = source
        .prepare(&select)
        .map_err(|e| MigrationError::source(format!("preparing scan of {}", descriptor.name), e))?;

    check_columns(descriptor, &stmt.column_names())?;

    let insert_sql = descriptor.insert_sql();
    let insert = target
        .prepare(&insert_sql)
        .await
        .map_err(|source| MigrationError::Insert {
            table: descriptor.name.to_string(),
            source,
        })?;

    let mut stats = CopyStats {
        table: descriptor.name.to_string(),
        ..CopyStats::default()
    };

    let mut rows = stmt
        .query([])
        .map_err(|e| MigrationError::source(format!("scanning {}", descriptor.name), e))?;

    while let Some(row) = rows
        .next()
        .map_err(|e| MigrationError::source(format!("scanning {}", descriptor.name), e))?
    {
        stats.scanned += 1;

        let instance = RowInstance::decode(descriptor, row, stats.scanned)?;

        let params = instance.encode(insert.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_sql()).collect();

        let affected = target
            .execute(&insert, &refs)
            .await
            .map_err(|source| {
                tracing::error!(
                    "Insert into '{}' failed at row {}: {:?}",
                    descriptor.name,
                    stats.scanned,
                    instance
                );
                MigrationError::Insert {
                    table: descriptor.name.to_string(),
                    source,
                }
            })?;

        if affected == 0 {
            stats.skipped += 1;
        } else {
            stats.inserted += affected;
        }
    }

    tracing::debug!(
        "Copied '{}': {} scanned, {} inserted, {} skipped",
        descriptor.name,
        stats.scanned,
        stats.inserted,
        stats.skipped
    );

    Ok(stats)
}

/// Enforce the positional contract between the source table and the
/// descriptor.
pub fn check_columns(descriptor: &TableDescriptor, found: &[&str]) -> Result<()> {
    let matches = found.len() == descriptor.fields.len()
        && found
            .iter()
            .zip(descriptor.fields)
            .all(|(name, field)| name.eq_ignore_ascii_case(field.column));

    if matches {
        return Ok(());
    }

    Err(MigrationError::Decode {
        table: descriptor.name.to_string(),
        column: "*".to_string(),
        row: 0,
        source: DecodeError::ColumnMismatch {
            expected: descriptor.column_names().join(", "),
            found: found.join(", "),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::descriptor::{blob, int, text};

    const PEERS: TableDescriptor =
        TableDescriptor::new("peers", &[int("id"), blob("node_id"), text("address")])
            .conflict_key(&["id"]);

    #[test]
    fn test_check_columns_accepts_exact_order() {
        check_columns(&PEERS, &["id", "node_id", "address"]).unwrap();
    }

    #[test]
    fn test_check_columns_rejects_reordered_or_extra() {
        let err = check_columns(&PEERS, &["id", "address", "node_id"]).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Decode {
                source: DecodeError::ColumnMismatch { .. },
                ..
            }
        ));

        assert!(check_columns(&PEERS, &["id", "node_id", "address", "extra"]).is_err());
        assert!(check_columns(&PEERS, &["id", "node_id"]).is_err());
    }

    #[test]
    fn test_check_columns_against_sqlite_statement() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE peers (id INTEGER, node_id BLOB, address TEXT);")
            .unwrap();
        let stmt = conn.prepare(&PEERS.select_sql()).unwrap();
        check_columns(&PEERS, &stmt.column_names()).unwrap();
        drop(stmt);

        conn.execute_batch("ALTER TABLE peers ADD COLUMN added INTEGER;")
            .unwrap();
        let stmt = conn.prepare(&PEERS.select_sql()).unwrap();
        assert!(check_columns(&PEERS, &stmt.column_names()).is_err());
    }
}
