// ABOUTME: Migration settings loaded from an optional TOML file
// ABOUTME: Defaults reproduce the gates of lightningd wallet schema version 162

use crate::error::MigrationError;
use crate::migration::tables::SCHEMA_VERSION;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for the schema-bootstrap step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Bitcoin network lightningd is started on; irrelevant to the schema
    pub network: String,
    /// Upper bound on how long lightningd may take to create the schema
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    /// Lightning dir for the throwaway lightningd; a temp dir when unset
    pub lightning_dir: Option<PathBuf>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            network: "regtest".to_string(),
            timeout_secs: 35,
            poll_interval_secs: 2,
            lightning_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigratorConfig {
    /// `version.version` both stores must report
    pub expected_version: i64,
    /// Minimum number of tables the target must hold
    pub min_table_count: i64,
    /// Source table that must be empty before migrating
    pub transient_table: String,
    /// SQLite bookkeeping tables excluded from the table count
    pub ignored_source_tables: Vec<String>,
    /// Commit the source repair pass instead of rolling it back
    pub persist_source_repair: bool,
    pub bootstrap: BootstrapConfig,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        MigratorConfig {
            expected_version: SCHEMA_VERSION,
            min_table_count: 18,
            transient_table: "htlc_sigs".to_string(),
            ignored_source_tables: vec![
                "android_metadata".to_string(),
                "sqlite_sequence".to_string(),
            ],
            persist_source_repair: false,
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl MigratorConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MigratorConfig = toml::from_str(content)
            .map_err(|e| MigrationError::Config(e.to_string()))
            .context("Failed to parse migrator config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(MigratorConfig::default());
        };

        let content = std::fs::read_to_string(path)
            .map_err(MigrationError::from)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), MigrationError> {
        if self.expected_version <= 0 {
            return Err(MigrationError::Config(
                "expected_version must be positive".into(),
            ));
        }
        if self.min_table_count <= 0 {
            return Err(MigrationError::Config(
                "min_table_count must be positive".into(),
            ));
        }
        if self.transient_table.trim().is_empty() {
            return Err(MigrationError::Config(
                "transient_table cannot be empty".into(),
            ));
        }
        if self.bootstrap.poll_interval_secs == 0 {
            return Err(MigrationError::Config(
                "bootstrap.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.bootstrap.poll_interval_secs > self.bootstrap.timeout_secs {
            return Err(MigrationError::Config(
                "bootstrap.poll_interval_secs exceeds bootstrap.timeout_secs".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::exit_code_for;

    #[test]
    fn test_defaults_match_wallet_version() {
        let config = MigratorConfig::default();
        assert_eq!(config.expected_version, 162);
        assert_eq!(config.min_table_count, 18);
        assert_eq!(config.transient_table, "htlc_sigs");
        assert!(!config.persist_source_repair);
        assert_eq!(config.bootstrap.timeout_secs, 35);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MigratorConfig::from_toml_str(
            r#"
            expected_version = 170
            persist_source_repair = true

            [bootstrap]
            timeout_secs = 90
            lightning_dir = "/tmp/ln"
            "#,
        )
        .unwrap();

        assert_eq!(config.expected_version, 170);
        assert!(config.persist_source_repair);
        assert_eq!(config.min_table_count, 18);
        assert_eq!(config.bootstrap.timeout_secs, 90);
        assert_eq!(config.bootstrap.poll_interval_secs, 2);
        assert_eq!(
            config.bootstrap.lightning_dir,
            Some(PathBuf::from("/tmp/ln"))
        );
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = MigratorConfig::from_toml_str("expected_versoin = 1").unwrap_err();
        assert_eq!(exit_code_for(&err), 16);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = MigratorConfig::from_toml_str("min_table_count = 0").unwrap_err();
        assert!(format!("{:#}", err).contains("min_table_count"));

        let bad_poll = MigratorConfig::from_toml_str(
            "[bootstrap]\ntimeout_secs = 5\npoll_interval_secs = 10",
        );
        assert!(bad_poll.is_err());
    }

    #[test]
    fn test_load_without_path_is_default() {
        assert_eq!(MigratorConfig::load(None).unwrap(), MigratorConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrator.toml");
        std::fs::write(&path, "transient_table = \"htlc_sigs\"\n").unwrap();
        assert_eq!(
            MigratorConfig::load(Some(&path)).unwrap(),
            MigratorConfig::default()
        );
    }
}
