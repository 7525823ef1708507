// ABOUTME: Detects which PostgreSQL-compatible engine the target is
// ABOUTME: CockroachDB lacks explicit sequence assignment so resync is skipped there

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_postgres::GenericClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDialect {
    Postgres,
    CockroachDb,
}

impl TargetDialect {
    /// Classify a `SELECT version()` string.
    pub fn from_version_string(version: &str) -> Self {
        if version.contains("CockroachDB") {
            TargetDialect::CockroachDb
        } else {
            TargetDialect::Postgres
        }
    }

    pub fn supports_sequence_reset(&self) -> bool {
        matches!(self, TargetDialect::Postgres)
    }
}

impl std::fmt::Display for TargetDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetDialect::Postgres => write!(f, "PostgreSQL"),
            TargetDialect::CockroachDb => write!(f, "CockroachDB"),
        }
    }
}

pub async fn detect_dialect<C: GenericClient>(client: &C) -> Result<TargetDialect> {
    let row = client
        .query_one("SELECT version()", &[])
        .await
        .context("Failed to query target server version")?;
    let version: String = row.get(0);
    tracing::debug!("Target server version: {}", version);
    Ok(TargetDialect::from_version_string(&version))
}
