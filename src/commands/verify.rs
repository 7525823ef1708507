// ABOUTME: Verify command implementation - Validate data integrity
// ABOUTME: Compares per-table row counts between the wallet and the migrated target

use crate::error::{MigrationError, Store};
use crate::migration::{compare_row_counts, MigrationPlan};
use crate::postgres::connect;
use crate::sqlite::open_source;
use anyhow::{Context, Result};
use std::path::Path;

/// Verify every plan table holds the same number of rows on both stores
///
/// Run after `migrate` and before pointing lightningd at the new wallet.
///
/// # Errors
///
/// This function will return an error if:
/// - Either store can't be opened
/// - A table is missing on either side
/// - Any table's row counts differ
pub async fn verify(sqlite_path: &Path, postgres_url: &str) -> Result<()> {
    tracing::info!("Starting data integrity verification...");
    tracing::info!("");

    let source = open_source(sqlite_path)
        .map_err(|e| MigrationError::connection(Store::Source, format!("{:#}", e)))?;
    let target = connect(postgres_url)
        .await
        .map_err(|e| MigrationError::connection(Store::Target, format!("{:#}", e)))?;

    let plan = MigrationPlan::lightningd().context("Built-in migration plan is invalid")?;
    tracing::info!("Verifying {} tables", plan.tables().len());

    let results = compare_row_counts(&source, &target, &plan)
        .await
        .context("Failed to count rows")?;

    let mut mismatches = 0;
    for result in &results {
        if result.is_valid() {
            tracing::info!("  ✓ {}: {} rows", result.table, result.source_rows);
        } else {
            tracing::error!(
                "  ✗ {}: MISMATCH: source={}, target={}",
                result.table,
                result.source_rows,
                result.target_rows
            );
            mismatches += 1;
        }
    }

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Verification Summary");
    tracing::info!("========================================");
    tracing::info!("Total tables: {}", results.len());
    tracing::info!("✓ Matches: {}", results.len() - mismatches);
    tracing::info!("✗ Mismatches: {}", mismatches);
    tracing::info!("========================================");

    if mismatches > 0 {
        tracing::info!("Possible causes:");
        tracing::info!("  - lightningd was started against the target after migrating");
        tracing::info!("  - The wallet changed after the migration ran");
        anyhow::bail!("{} table(s) failed verification", mismatches);
    }

    tracing::info!("✓ ALL TABLES VERIFIED SUCCESSFULLY!");
    Ok(())
}
