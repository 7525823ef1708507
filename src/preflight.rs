// ABOUTME: Pre-migration checks that gate the orchestrator
// ABOUTME: Compares table counts, transient table emptiness and schema versions of both stores

use crate::config::MigratorConfig;
use crate::error::{MigrationError, Result, Store};
use crate::postgres::count_public_tables;
use crate::sqlite::{count_rows, count_user_tables};
use rusqlite::OptionalExtension;
use serde::Serialize;
use tokio_postgres::GenericClient;

/// Raw observations from both stores.
///
/// `None` means the value could not be read at all, which counts as a
/// mismatch rather than a hard error: a wallet without a `version` table
/// is simply not the wallet this tool migrates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightFacts {
    pub source_tables: i64,
    pub target_tables: i64,
    pub transient_rows: Option<i64>,
    pub source_version: Option<i64>,
    pub target_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightReport {
    pub facts: PreflightFacts,
    pub failures: Vec<String>,
}

impl PreflightReport {
    pub fn is_ready(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn a failed report into the error that stops the run.
    pub fn into_result(self) -> Result<PreflightReport> {
        if self.is_ready() {
            Ok(self)
        } else {
            Err(MigrationError::PreconditionMismatch(self.failures.join("; ")))
        }
    }
}

/// Judge `facts` against the configured expectations.
pub fn evaluate(facts: PreflightFacts, config: &MigratorConfig) -> PreflightReport {
    let mut failures = Vec::new();

    if facts.target_tables != facts.source_tables || facts.target_tables < config.min_table_count {
        failures.push(format!(
            "target schema has {} tables, expected {} (at least {})",
            facts.target_tables, facts.source_tables, config.min_table_count
        ));
    }

    match facts.transient_rows {
        Some(0) => {}
        Some(n) => failures.push(format!(
            "{} is not empty ({} rows)",
            config.transient_table, n
        )),
        None => failures.push(format!(
            "{} could not be read on the source",
            config.transient_table
        )),
    }

    let versions_ok = facts.source_version == Some(config.expected_version)
        && facts.target_version == Some(config.expected_version);
    if !versions_ok {
        failures.push(format!(
            "schema version mismatch: expected {}, got source {}, target {}",
            config.expected_version,
            describe_version(facts.source_version),
            describe_version(facts.target_version)
        ));
    }

    PreflightReport { facts, failures }
}

fn describe_version(version: Option<i64>) -> String {
    version.map_or_else(|| "unreadable".to_string(), |v| v.to_string())
}

fn source_version(source: &rusqlite::Connection) -> Option<i64> {
    match source
        .query_row("SELECT version FROM version", [], |row| row.get::<_, i64>(0))
        .optional()
    {
        Ok(version) => version,
        Err(e) => {
            tracing::debug!("Source version unreadable: {}", e);
            None
        }
    }
}

async fn target_version<C: GenericClient>(target: &C) -> Option<i64> {
    match target.query_opt("SELECT version FROM version", &[]).await {
        // lightningd declares the column INTEGER, but accept BIGINT too
        Ok(Some(row)) => row
            .try_get::<_, i32>(0)
            .map(i64::from)
            .or_else(|_| row.try_get::<_, i64>(0))
            .ok(),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("Target version unreadable: {}", e);
            None
        }
    }
}

/// Read everything the checks need from both stores.
pub async fn gather<C: GenericClient>(
    source: &rusqlite::Connection,
    target: &C,
    config: &MigratorConfig,
) -> Result<PreflightFacts> {
    let source_tables = count_user_tables(source, &config.ignored_source_tables)?;
    let target_tables = count_public_tables(target)
        .await
        .map_err(|e| MigrationError::connection(Store::Target, format!("{:#}", e)))?;

    let transient_rows = match count_rows(source, &config.transient_table) {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::debug!("{}", e);
            None
        }
    };

    Ok(PreflightFacts {
        source_tables,
        target_tables,
        transient_rows,
        source_version: source_version(source),
        target_version: target_version(target).await,
    })
}

/// Gather and evaluate; any failed check is a `PreconditionMismatch`.
pub async fn check_preconditions<C: GenericClient>(
    source: &rusqlite::Connection,
    target: &C,
    config: &MigratorConfig,
) -> Result<PreflightReport> {
    let facts = gather(source, target, config).await?;
    evaluate(facts, config).into_result()
}
