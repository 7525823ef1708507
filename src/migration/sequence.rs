// ABOUTME: Resynchronizes PostgreSQL serial sequences after the table copy
// ABOUTME: Uses the source's max(column) as the authoritative high-water mark

use crate::error::{MigrationError, Result};
use crate::utils::quote_ident;
use rusqlite::Connection;
use serde::Serialize;
use tokio_postgres::Transaction;

/// A serial sequence declared as an explicit (table, column) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceSpec {
    pub table: String,
    pub column: String,
}

impl SequenceSpec {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        SequenceSpec {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Parse a `<table>_<column>_seq` identifier.
    ///
    /// The column is the second-to-last segment, so a column name
    /// containing `_` can't be expressed this way; declare those pairs
    /// with [`SequenceSpec::new`] instead.
    pub fn parse(sequence_id: &str) -> Result<Self> {
        let malformed =
            || MigrationError::sequence(sequence_id, "expected <table>_<column>_seq");

        let rest = sequence_id.strip_suffix("_seq").ok_or_else(malformed)?;
        let (table, column) = rest.rsplit_once('_').ok_or_else(malformed)?;
        if table.is_empty() || column.is_empty() {
            return Err(malformed());
        }

        Ok(SequenceSpec::new(table, column))
    }

    /// Name PostgreSQL gives the sequence behind a SERIAL/BIGSERIAL column.
    pub fn sequence_name(&self) -> String {
        format!("{}_{}_seq", self.table, self.column)
    }
}

impl std::fmt::Display for SequenceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sequence_name())
    }
}

/// What happened to one sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SequenceOutcome {
    /// Source column empty or all NULL; the target default is left alone
    Unchanged,
    /// Sequence set so the next value is `next_value`
    Reset { max_value: i64, next_value: i64 },
}

/// `coalesce(max(column), 0)` over the source table.
///
/// The column is looked up in the table's schema first: SQLite reads an
/// unknown double-quoted identifier as a string literal, which would turn
/// a missing column into a silent zero.
pub fn source_max(source: &Connection, spec: &SequenceSpec) -> Result<i64> {
    let present: i64 = source
        .query_row(
            "SELECT count(*) FROM pragma_table_info(?1) WHERE name = ?2",
            [&spec.table, &spec.column],
            |row| row.get(0),
        )
        .map_err(|e| {
            MigrationError::sequence(
                spec.sequence_name(),
                format!("failed to inspect {}: {}", spec.table, e),
            )
        })?;
    if present == 0 {
        return Err(MigrationError::sequence(
            spec.sequence_name(),
            format!("column {} not found in source table {}", spec.column, spec.table),
        ));
    }

    let sql = format!(
        "SELECT coalesce(max({}), 0) FROM {}",
        quote_ident(&spec.column),
        quote_ident(&spec.table)
    );

    source
        .query_row(&sql, [], |row| row.get::<_, i64>(0))
        .map_err(|e| {
            MigrationError::sequence(
                spec.sequence_name(),
                format!("failed to read max({}) from {}: {}", spec.column, spec.table, e),
            )
        })
}

/// Reset the target sequence for `spec` from the source's high-water mark.
///
/// `setval(seq, max, true)` makes the next `nextval` return `max + 1`.
/// A zero maximum is a no-op so an empty table keeps the target's default
/// counter state.
pub async fn sync_sequence(
    source: &Connection,
    target: &Transaction<'_>,
    spec: &SequenceSpec,
) -> Result<SequenceOutcome> {
    let sequence = spec.sequence_name();
    let max_value = source_max(source, spec)?;

    if max_value == 0 {
        tracing::debug!("Sequence '{}' left untouched (no rows)", sequence);
        return Ok(SequenceOutcome::Unchanged);
    }

    target
        .query_one(
            "SELECT setval($1::text::regclass, $2, true)",
            &[&sequence, &max_value],
        )
        .await
        .map_err(|e| MigrationError::sequence(&sequence, format!("setval failed: {}", e)))?;

    let next_value = max_value + 1;
    tracing::debug!("Sequence '{}' reset, next value {}", sequence, next_value);

    Ok(SequenceOutcome::Reset {
        max_value,
        next_value,
    })
}

/// Convention-based entry point taking a raw sequence identifier.
pub async fn sync_sequence_by_id(
    source: &Connection,
    target: &Transaction<'_>,
    sequence_id: &str,
) -> Result<SequenceOutcome> {
    let spec = SequenceSpec::parse(sequence_id)?;
    sync_sequence(source, target, &spec).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sequence_id() {
        assert_eq!(
            SequenceSpec::parse("invoices_id_seq").unwrap(),
            SequenceSpec::new("invoices", "id")
        );
        assert_eq!(
            SequenceSpec::parse("channel_htlcs_id_seq").unwrap(),
            SequenceSpec::new("channel_htlcs", "id")
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["invoices", "invoices_id", "id_seq", "_id_seq", "invoices__seq", ""] {
            let err = SequenceSpec::parse(bad).unwrap_err();
            assert!(
                matches!(err, MigrationError::Sequence { .. }),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_sequence_name_round_trip() {
        let spec = SequenceSpec::new("channel_configs", "id");
        assert_eq!(spec.sequence_name(), "channel_configs_id_seq");
        assert_eq!(SequenceSpec::parse(&spec.sequence_name()).unwrap(), spec);
    }

    #[test]
    fn test_source_max() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE invoices (id INTEGER PRIMARY KEY, label TEXT);
             INSERT INTO invoices VALUES (3, 'a'), (7, 'b'), (42, 'c');
             CREATE TABLE peers (id INTEGER PRIMARY KEY);",
        )
        .unwrap();

        assert_eq!(source_max(&conn, &SequenceSpec::new("invoices", "id")).unwrap(), 42);
        assert_eq!(source_max(&conn, &SequenceSpec::new("peers", "id")).unwrap(), 0);
    }

    #[test]
    fn test_source_max_missing_column_is_sequence_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE peers (id INTEGER PRIMARY KEY);")
            .unwrap();

        let err = source_max(&conn, &SequenceSpec::new("peers", "nope")).unwrap_err();
        assert!(matches!(err, MigrationError::Sequence { ref sequence, .. } if sequence == "peers_nope_seq"));
        assert!(source_max(&conn, &SequenceSpec::new("missing", "id")).is_err());
    }

    #[test]
    fn test_source_max_missing_column_on_populated_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE invoices (id INTEGER PRIMARY KEY);
             INSERT INTO invoices VALUES (5);",
        )
        .unwrap();

        let err = source_max(&conn, &SequenceSpec::new("invoices", "nope")).unwrap_err();
        assert_eq!(err.exit_code(), 14);
        assert_eq!(source_max(&conn, &SequenceSpec::new("invoices", "id")).unwrap(), 5);
    }
}
