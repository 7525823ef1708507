// ABOUTME: Declarative table and field descriptors driving the generic row copier
// ABOUTME: Builds the scan and conflict-safe insert statements for one table

use crate::error::{MigrationError, Result};
use crate::utils::quote_ident;
use serde::Serialize;
use std::collections::HashSet;

/// Semantic type of a column, independent of either driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Text,
    Binary,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Text => "text",
            FieldKind::Binary => "binary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub column: &'static str,
    pub kind: FieldKind,
    /// Binary fields always tolerate NULL (decoded as unset); for them
    /// this flag only documents the target column.
    pub nullable: bool,
}

pub const fn int(column: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        column,
        kind: FieldKind::Integer,
        nullable: false,
    }
}

pub const fn opt_int(column: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        column,
        kind: FieldKind::Integer,
        nullable: true,
    }
}

pub const fn text(column: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        column,
        kind: FieldKind::Text,
        nullable: false,
    }
}

pub const fn opt_text(column: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        column,
        kind: FieldKind::Text,
        nullable: true,
    }
}

pub const fn blob(column: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        column,
        kind: FieldKind::Binary,
        nullable: true,
    }
}

/// What an insert does when it hits the conflict key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    /// `DO NOTHING`: re-running the copy is idempotent
    Skip,
    /// `DO UPDATE` of every non-key column
    Update,
}

/// Per-row normalization applied between decode and insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RowRule {
    /// Set `column` to NULL on rows whose text `when_column` equals `equals`
    ClearWhen {
        column: &'static str,
        when_column: &'static str,
        equals: &'static str,
    },
}

/// Static description of one migrated table.
///
/// `fields` must list columns in the source table's positional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
    pub conflict_key: &'static [&'static str],
    pub on_conflict: ConflictAction,
    /// Auto-increment column backed by a `<table>_<column>_seq` sequence
    pub serial: Option<&'static str>,
    /// Tables referenced by foreign key, which must be copied first
    pub depends_on: &'static [&'static str],
    pub rules: &'static [RowRule],
}

impl TableDescriptor {
    pub const fn new(name: &'static str, fields: &'static [FieldDescriptor]) -> Self {
        TableDescriptor {
            name,
            fields,
            conflict_key: &[],
            on_conflict: ConflictAction::Skip,
            serial: None,
            depends_on: &[],
            rules: &[],
        }
    }

    pub const fn conflict_key(mut self, key: &'static [&'static str]) -> Self {
        self.conflict_key = key;
        self
    }

    pub const fn upsert(mut self) -> Self {
        self.on_conflict = ConflictAction::Update;
        self
    }

    pub const fn serial(mut self, column: &'static str) -> Self {
        self.serial = Some(column);
        self
    }

    pub const fn depends_on(mut self, tables: &'static [&'static str]) -> Self {
        self.depends_on = tables;
        self
    }

    pub const fn rules(mut self, rules: &'static [RowRule]) -> Self {
        self.rules = rules;
        self
    }

    pub fn field(&self, column: &str) -> Option<(usize, &FieldDescriptor)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.column == column)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.column).collect()
    }

    /// Unordered full scan of the source table.
    pub fn select_sql(&self) -> String {
        format!("SELECT * FROM {}", quote_ident(self.name))
    }

    /// Single-row parameterized insert listing columns in field order.
    pub fn insert_sql(&self) -> String {
        let columns: Vec<String> = self.fields.iter().map(|f| quote_ident(f.column)).collect();
        let placeholders: Vec<String> = (1..=self.fields.len()).map(|i| format!("${}", i)).collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(self.name),
            columns.join(", "),
            placeholders.join(", ")
        );

        if self.conflict_key.is_empty() {
            return sql;
        }

        let keys: Vec<String> = self.conflict_key.iter().map(|k| quote_ident(k)).collect();
        let updates: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !self.conflict_key.contains(&f.column))
            .map(|f| {
                let quoted = quote_ident(f.column);
                format!("{} = EXCLUDED.{}", quoted, quoted)
            })
            .collect();

        match self.on_conflict {
            ConflictAction::Update if !updates.is_empty() => {
                sql.push_str(&format!(
                    " ON CONFLICT ({}) DO UPDATE SET {}",
                    keys.join(", "),
                    updates.join(", ")
                ));
            }
            _ => {
                sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", keys.join(", ")));
            }
        }

        sql
    }

    /// Check the descriptor is internally consistent.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MigrationError::Plan(format!("{}: {}", self.name, msg)));

        if self.name.is_empty() {
            return Err(MigrationError::Plan("table name cannot be empty".into()));
        }
        if self.fields.is_empty() {
            return invalid("no fields declared".into());
        }

        let mut seen = HashSet::new();
        for field in self.fields {
            if !seen.insert(field.column) {
                return invalid(format!("column '{}' declared twice", field.column));
            }
        }

        for key in self.conflict_key {
            if !seen.contains(key) {
                return invalid(format!("conflict key column '{}' is not a field", key));
            }
        }

        if self.on_conflict == ConflictAction::Update && self.conflict_key.is_empty() {
            return invalid("upsert requires a conflict key".into());
        }

        if let Some(serial) = self.serial {
            match self.field(serial) {
                Some((_, f)) if f.kind == FieldKind::Integer => {}
                Some(_) => return invalid(format!("serial column '{}' is not an integer", serial)),
                None => return invalid(format!("serial column '{}' is not a field", serial)),
            }
        }

        if self.depends_on.contains(&self.name) {
            return invalid("table depends on itself".into());
        }

        for rule in self.rules {
            match rule {
                RowRule::ClearWhen {
                    column,
                    when_column,
                    ..
                } => {
                    match self.field(column) {
                        Some((_, f)) if f.nullable => {}
                        _ => {
                            return invalid(format!(
                                "rule clears '{}' which is not a nullable field",
                                column
                            ))
                        }
                    }
                    match self.field(when_column) {
                        Some((_, f)) if f.kind == FieldKind::Text => {}
                        _ => {
                            return invalid(format!(
                                "rule condition '{}' is not a text field",
                                when_column
                            ))
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEERS: TableDescriptor =
        TableDescriptor::new("peers", &[int("id"), blob("node_id"), text("address")])
            .conflict_key(&["id"])
            .serial("id");

    const LOG: TableDescriptor =
        TableDescriptor::new("channel_state_changes", &[int("channel_id"), text("message")]);

    const VARS: TableDescriptor = TableDescriptor::new(
        "vars",
        &[text("name"), opt_text("val"), opt_int("intval"), blob("blobval")],
    )
    .conflict_key(&["name"])
    .upsert();

    #[test]
    fn test_insert_sql_skips_on_conflict() {
        assert_eq!(
            PEERS.insert_sql(),
            "INSERT INTO \"peers\" (\"id\", \"node_id\", \"address\") VALUES ($1, $2, $3) \
             ON CONFLICT (\"id\") DO NOTHING"
        );
    }

    #[test]
    fn test_insert_sql_without_key_is_unconditional() {
        assert_eq!(
            LOG.insert_sql(),
            "INSERT INTO \"channel_state_changes\" (\"channel_id\", \"message\") VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_insert_sql_upsert_updates_non_key_columns() {
        let sql = VARS.insert_sql();
        assert!(sql.ends_with(
            "ON CONFLICT (\"name\") DO UPDATE SET \"val\" = EXCLUDED.\"val\", \
             \"intval\" = EXCLUDED.\"intval\", \"blobval\" = EXCLUDED.\"blobval\""
        ));
    }

    #[test]
    fn test_select_sql() {
        assert_eq!(PEERS.select_sql(), "SELECT * FROM \"peers\"");
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        PEERS.validate().unwrap();
        LOG.validate().unwrap();
        VARS.validate().unwrap();
    }

    const UNKNOWN_KEY: TableDescriptor =
        TableDescriptor::new("peers", &[int("id")]).conflict_key(&["node_id"]);
    const DUPLICATE_COLUMN: TableDescriptor = TableDescriptor::new("t", &[int("id"), opt_int("id")]);
    const TEXT_SERIAL: TableDescriptor = TableDescriptor::new("t", &[text("id")]).serial("id");
    const UPSERT_NO_KEY: TableDescriptor = TableDescriptor::new("t", &[int("id")]).upsert();
    const NON_NULLABLE_CLEAR: TableDescriptor =
        TableDescriptor::new("vars", &[text("name"), text("val")]).rules(&[RowRule::ClearWhen {
            column: "val",
            when_column: "name",
            equals: "genesis_hash",
        }]);

    #[test]
    fn test_validate_rejects_unknown_conflict_column() {
        let err = UNKNOWN_KEY.validate().unwrap_err().to_string();
        assert!(err.contains("conflict key column 'node_id'"));
    }

    #[test]
    fn test_validate_rejects_duplicate_and_bad_serial() {
        assert!(DUPLICATE_COLUMN.validate().is_err());
        assert!(TEXT_SERIAL.validate().is_err());
        assert!(UPSERT_NO_KEY.validate().is_err());
    }

    #[test]
    fn test_validate_checks_row_rules() {
        assert!(NON_NULLABLE_CLEAR.validate().is_err());
    }

    #[test]
    fn test_field_lookup() {
        let (idx, field) = PEERS.field("address").unwrap();
        assert_eq!(idx, 2);
        assert_eq!(field.kind, FieldKind::Text);
        assert!(PEERS.field("missing").is_none());
    }
}
