// ABOUTME: Post-migration row-count comparison between the wallet and the target
// ABOUTME: Used by the verify command to confirm every plan table arrived intact

use super::plan::MigrationPlan;
use crate::error::{MigrationError, Result, Store};
use crate::sqlite::count_rows;
use crate::utils::quote_ident;
use serde::Serialize;
use tokio_postgres::GenericClient;

/// Row counts of one table on both stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowCountResult {
    pub table: String,
    pub source_rows: i64,
    pub target_rows: i64,
}

impl RowCountResult {
    /// Returns true if the target holds exactly the source's rows
    pub fn is_valid(&self) -> bool {
        self.source_rows == self.target_rows
    }

    /// Rows the target holds beyond (positive) or short of (negative) the source
    pub fn difference(&self) -> i64 {
        self.target_rows - self.source_rows
    }
}

pub async fn count_target_rows<C: GenericClient>(client: &C, table: &str) -> Result<i64> {
    let row = client
        .query_one(format!("SELECT count(*) FROM {}", quote_ident(table)).as_str(), &[])
        .await
        .map_err(|e| {
            MigrationError::connection(
                Store::Target,
                format!("counting rows in '{}': {}", table, e),
            )
        })?;
    Ok(row.get(0))
}

/// Compare row counts for every table in `plan`, in plan order.
pub async fn compare_row_counts<C: GenericClient>(
    source: &rusqlite::Connection,
    target: &C,
    plan: &MigrationPlan,
) -> Result<Vec<RowCountResult>> {
    let mut results = Vec::with_capacity(plan.tables().len());

    for table in plan.tables() {
        tracing::debug!("Counting rows in {}", table.name);
        let source_rows = count_rows(source, table.name)?;
        let target_rows = count_target_rows(target, table.name).await?;
        results.push(RowCountResult {
            table: table.name.to_string(),
            source_rows,
            target_rows,
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_count_result_validity() {
        let same = RowCountResult {
            table: "peers".into(),
            source_rows: 4,
            target_rows: 4,
        };
        assert!(same.is_valid());
        assert_eq!(same.difference(), 0);

        let short = RowCountResult {
            table: "invoices".into(),
            source_rows: 3,
            target_rows: 1,
        };
        assert!(!short.is_valid());
        assert_eq!(short.difference(), -2);
    }

    #[tokio::test]
    #[ignore]
    async fn test_compare_row_counts_against_target() {
        let url = std::env::var("TEST_TARGET_URL")
            .expect("TEST_TARGET_URL must be set for integration tests");
        let client = crate::postgres::connect(&url).await.unwrap();
        client
            .batch_execute(
                "DROP TABLE IF EXISTS rowcount_sample;
                 CREATE TABLE rowcount_sample (id BIGINT PRIMARY KEY);
                 INSERT INTO rowcount_sample VALUES (1), (2);",
            )
            .await
            .unwrap();

        let source = rusqlite::Connection::open_in_memory().unwrap();
        source
            .execute_batch(
                "CREATE TABLE rowcount_sample (id INTEGER PRIMARY KEY);
                 INSERT INTO rowcount_sample VALUES (1), (2), (3);",
            )
            .unwrap();

        const SAMPLE: crate::migration::descriptor::TableDescriptor =
            crate::migration::descriptor::TableDescriptor::new(
                "rowcount_sample",
                &[crate::migration::descriptor::int("id")],
            );
        let plan = MigrationPlan::new(vec![SAMPLE], vec![]).unwrap();

        let results = compare_row_counts(&source, &client, &plan).await.unwrap();
        client
            .batch_execute("DROP TABLE rowcount_sample")
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_rows, 3);
        assert_eq!(results[0].target_rows, 2);
        assert!(!results[0].is_valid());
    }
}
