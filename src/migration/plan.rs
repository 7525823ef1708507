// ABOUTME: Ordered migration plan of table descriptors, source repairs and sequences
// ABOUTME: Validates foreign-key ordering so no table is copied before its parents

use super::descriptor::TableDescriptor;
use super::repair::{SourceRepair, LIGHTNINGD_REPAIRS};
use super::sequence::SequenceSpec;
use super::tables::LIGHTNINGD_TABLES;
use crate::error::{MigrationError, Result};
use std::collections::HashMap;

/// The dependency-ordered list of work for one run.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    tables: Vec<TableDescriptor>,
    repairs: Vec<SourceRepair>,
}

impl MigrationPlan {
    /// Build and validate a plan.
    ///
    /// A dependency on a table outside the plan is accepted (that table is
    /// assumed to already hold its rows on the target); a dependency on a
    /// table that appears later in the plan is rejected.
    pub fn new(tables: Vec<TableDescriptor>, repairs: Vec<SourceRepair>) -> Result<Self> {
        let plan = MigrationPlan { tables, repairs };
        plan.validate()?;
        Ok(plan)
    }

    /// The full lightningd wallet plan.
    pub fn lightningd() -> Result<Self> {
        Self::new(LIGHTNINGD_TABLES.to_vec(), LIGHTNINGD_REPAIRS.to_vec())
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn repairs(&self) -> &[SourceRepair] {
        &self.repairs
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Sequences to resynchronize, in plan order.
    pub fn sequences(&self) -> Vec<SequenceSpec> {
        self.tables
            .iter()
            .filter_map(|t| t.serial.map(|column| SequenceSpec::new(t.name, column)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(MigrationError::Plan("plan contains no tables".into()));
        }

        let mut position = HashMap::new();
        for (idx, table) in self.tables.iter().enumerate() {
            table.validate()?;
            if position.insert(table.name, idx).is_some() {
                return Err(MigrationError::Plan(format!(
                    "table '{}' appears twice in the plan",
                    table.name
                )));
            }
        }

        for (idx, table) in self.tables.iter().enumerate() {
            for parent in table.depends_on {
                if let Some(&parent_idx) = position.get(parent) {
                    if parent_idx > idx {
                        return Err(MigrationError::Plan(format!(
                            "'{}' is copied before '{}', which it references",
                            table.name, parent
                        )));
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
    use crate::migration::descriptor::{blob, int, text};

    const PARENT: TableDescriptor = TableDescriptor::new("peers", &[int("id"), blob("node_id")])
        .conflict_key(&["id"])
        .serial("id");
    const CHILD: TableDescriptor =
        TableDescriptor::new("channels", &[int("id"), int("peer_id"), text("scid")])
            .conflict_key(&["id"])
            .serial("id")
            .depends_on(&["peers"]);

    #[test]
    fn test_lightningd_plan_is_valid() {
        let plan = MigrationPlan::lightningd().unwrap();
        assert_eq!(plan.tables().len(), 21);
        assert_eq!(plan.tables()[0].name, "vars");
        assert_eq!(plan.repairs().len(), 1);

        let sequences: Vec<String> = plan.sequences().iter().map(|s| s.sequence_name()).collect();
        assert!(sequences.contains(&"invoices_id_seq".to_string()));
        assert!(sequences.contains(&"shachains_id_seq".to_string()));
        assert_eq!(sequences.len(), 8);
    }

    #[test]
    fn test_offers_precede_their_referrers() {
        let plan = MigrationPlan::lightningd().unwrap();
        let idx = |name: &str| plan.tables().iter().position(|t| t.name == name).unwrap();
        assert!(idx("offers") < idx("invoices"));
        assert!(idx("offers") < idx("payments"));
        assert!(idx("peers") < idx("channels"));
        assert!(idx("channels") < idx("channel_htlcs"));
        assert!(idx("transactions") < idx("channeltxs"));
    }

    #[test]
    fn test_rejects_child_before_parent() {
        let err = MigrationPlan::new(vec![CHILD, PARENT], vec![]).unwrap_err();
        assert!(err.to_string().contains("'channels' is copied before 'peers'"));

        MigrationPlan::new(vec![PARENT, CHILD], vec![]).unwrap();
    }

    #[test]
    fn test_allows_dependency_outside_plan() {
        let plan = MigrationPlan::new(vec![CHILD], vec![]).unwrap();
        assert!(plan.table("channels").is_some());
        assert!(plan.table("peers").is_none());
    }

    #[test]
    fn test_rejects_empty_and_duplicate() {
        assert!(MigrationPlan::new(vec![], vec![]).is_err());
        assert!(MigrationPlan::new(vec![PARENT, PARENT], vec![]).is_err());
    }
}
