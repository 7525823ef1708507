// ABOUTME: Pre-flight validation command for migration readiness
// ABOUTME: Checks connectivity, target schema shape, htlc_sigs emptiness and schema versions

use crate::config::MigratorConfig;
use crate::error::{MigrationError, Store};
use crate::postgres;
use crate::preflight::{evaluate, gather};
use crate::sqlite::open_source;
use crate::utils::validate_connection_string;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub async fn validate(sqlite_path: &Path, postgres_url: &str, config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting validation...");

    validate_connection_string(postgres_url)
        .map_err(|e| MigrationError::Config(format!("{:#}", e)))
        .context("Invalid --postgres connection string")?;
    let config = MigratorConfig::load(config_path.as_deref())?;

    // Step 1: Open source
    tracing::info!("Opening source wallet...");
    let source = open_source(sqlite_path)
        .map_err(|e| MigrationError::connection(Store::Source, format!("{:#}", e)))?;
    tracing::info!("✓ Source wallet opened");

    // Step 2: Connect to target
    tracing::info!("Connecting to target database...");
    let target = postgres::connect(postgres_url)
        .await
        .map_err(|e| MigrationError::connection(Store::Target, format!("{:#}", e)))?;
    tracing::info!("✓ Connected to target");

    // Step 3: Gather and judge
    let facts = gather(&source, &target, &config).await?;
    tracing::info!(
        "  Tables: source {}, target {} (minimum {})",
        facts.source_tables,
        facts.target_tables,
        config.min_table_count
    );
    tracing::info!(
        "  Schema version: source {:?}, target {:?} (expected {})",
        facts.source_version,
        facts.target_version,
        config.expected_version
    );

    let report = evaluate(facts, &config);
    for failure in &report.failures {
        tracing::error!("  ✗ {}", failure);
    }
    if report.facts.target_tables == 0 {
        tracing::info!("Target has no tables yet; 'migrate' will start lightningd to create them");
    }

    report.into_result()?;
    tracing::info!("✅ Validation complete - ready for migration");
    Ok(())
}
