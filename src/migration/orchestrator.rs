// ABOUTME: Runs a migration plan inside one all-or-nothing PostgreSQL transaction
// ABOUTME: Sequences source repair, table copies, sequence resync and the final commit

use super::copier::{copy_table, CopyStats};
use super::descriptor::ConflictAction;
use super::plan::MigrationPlan;
use super::repair::{apply_repairs, RepairStats};
use super::sequence::{source_max, sync_sequence, SequenceOutcome};
use crate::config::MigratorConfig;
use crate::error::{MigrationError, Result, Store};
use crate::postgres::{detect_dialect, TargetDialect};
use crate::preflight::check_preconditions;
use crate::sqlite::count_rows;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tokio_postgres::{Client, Transaction};

/// Lifecycle of one run. Any state can fall to `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationState {
    NotStarted,
    PreconditionsVerified,
    DataRepaired,
    TablesCopied,
    SequencesSynced,
    Committed,
    Aborted,
}

/// Handles threaded through every step of a run.
pub struct MigrationContext<'s, 't, 'c> {
    pub source: &'s Connection,
    pub target: &'t Transaction<'c>,
    pub dialect: TargetDialect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceReport {
    pub sequence: String,
    #[serde(flatten)]
    pub outcome: SequenceOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub state: MigrationState,
    pub dialect: TargetDialect,
    pub repairs: Vec<RepairStats>,
    pub tables: Vec<CopyStats>,
    pub sequences: Vec<SequenceReport>,
    /// True when the target dialect can't assign sequences
    pub sequences_skipped: bool,
    pub source_repair_persisted: bool,
}

impl MigrationReport {
    pub fn rows_inserted(&self) -> u64 {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn rows_skipped(&self) -> u64 {
        self.tables.iter().map(|t| t.skipped).sum()
    }
}

/// One step a run would perform, as reported by a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    Repair {
        name: String,
        table: String,
    },
    Copy {
        table: String,
        columns: usize,
        conflict_key: Vec<String>,
        on_conflict: Option<ConflictAction>,
        source_rows: i64,
    },
    SyncSequence {
        sequence: String,
        /// `None` when the source column is empty and nothing would change
        next_value: Option<i64>,
    },
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlannedAction::Repair { name, table } => {
                write!(f, "repair   {} ({})", table, name)
            }
            PlannedAction::Copy {
                table,
                columns,
                conflict_key,
                on_conflict,
                source_rows,
            } => {
                let policy = match on_conflict {
                    None => "append".to_string(),
                    Some(ConflictAction::Skip) => {
                        format!("skip on ({})", conflict_key.join(", "))
                    }
                    Some(ConflictAction::Update) => {
                        format!("update on ({})", conflict_key.join(", "))
                    }
                };
                write!(
                    f,
                    "copy     {} ({} columns, {} rows, {})",
                    table, columns, source_rows, policy
                )
            }
            PlannedAction::SyncSequence {
                sequence,
                next_value,
            } => match next_value {
                Some(next) => write!(f, "sequence {} -> next value {}", sequence, next),
                None => write!(f, "sequence {} unchanged (no rows)", sequence),
            },
        }
    }
}

pub struct Orchestrator {
    plan: MigrationPlan,
    persist_source_repair: bool,
    show_progress: bool,
    preconditions: Option<MigratorConfig>,
    state: MigrationState,
}

impl Orchestrator {
    pub fn new(plan: MigrationPlan) -> Self {
        Orchestrator {
            plan,
            persist_source_repair: false,
            show_progress: false,
            preconditions: None,
            state: MigrationState::NotStarted,
        }
    }

    /// Commit the source-side repair pass instead of rolling it back.
    pub fn with_persisted_source_repair(mut self, persist: bool) -> Self {
        self.persist_source_repair = persist;
        self
    }

    /// Re-run the preflight gate inside the source snapshot, so the checks
    /// see exactly the rows that are about to be copied.
    pub fn with_preconditions(mut self, config: MigratorConfig) -> Self {
        self.preconditions = Some(config);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn plan(&self) -> &MigrationPlan {
        &self.plan
    }

    /// Describe the run without writing to either store.
    pub fn plan_actions(&self, source: &Connection) -> Result<Vec<PlannedAction>> {
        let mut actions = Vec::new();

        for repair in self.plan.repairs() {
            actions.push(PlannedAction::Repair {
                name: repair.name.to_string(),
                table: repair.table.to_string(),
            });
        }

        for table in self.plan.tables() {
            actions.push(PlannedAction::Copy {
                table: table.name.to_string(),
                columns: table.fields.len(),
                conflict_key: table.conflict_key.iter().map(|k| k.to_string()).collect(),
                on_conflict: (!table.conflict_key.is_empty()).then_some(table.on_conflict),
                source_rows: count_rows(source, table.name)?,
            });
        }

        for spec in self.plan.sequences() {
            let max = source_max(source, &spec)?;
            actions.push(PlannedAction::SyncSequence {
                sequence: spec.sequence_name(),
                next_value: (max != 0).then_some(max + 1),
            });
        }

        Ok(actions)
    }

    /// Execute the plan.
    ///
    /// The source is read through one SQLite transaction that also carries
    /// the preflight gate (when configured) and the repair pass. Every
    /// target write happens in one PostgreSQL transaction that is committed
    /// only after all tables and sequences succeed.
    pub async fn run(&mut self, source: &Connection, target: &mut Client) -> Result<MigrationReport> {
        if self.state != MigrationState::NotStarted {
            return Err(MigrationError::Plan(format!(
                "orchestrator already ran (state {:?})",
                self.state
            )));
        }
        match self.execute(source, target).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!("✗ Migration aborted in state {:?}: {}", self.state, e);
                self.state = MigrationState::Aborted;
                Err(e)
            }
        }
    }

    async fn execute(&mut self, source: &Connection, target: &mut Client) -> Result<MigrationReport> {
        // IMMEDIATE takes the write lock up front: nothing can change the
        // wallet between the gate, the repair pass and the copy.
        let snapshot = rusqlite::Transaction::new_unchecked(source, TransactionBehavior::Immediate)
            .map_err(|e| MigrationError::source("opening source snapshot", e))?;

        if let Some(config) = &self.preconditions {
            check_preconditions(&snapshot, &*target, config).await?;
            tracing::info!("✓ Preconditions verified inside the source snapshot");
        }
        self.state = MigrationState::PreconditionsVerified;

        tracing::info!("Applying source data repairs...");
        let repairs = apply_repairs(&snapshot, self.plan.repairs())?;
        self.state = MigrationState::DataRepaired;

        let txn = target.transaction().await.map_err(|e| {
            MigrationError::connection(Store::Target, format!("failed to begin transaction: {}", e))
        })?;
        let dialect = detect_dialect(&txn)
            .await
            .map_err(|e| MigrationError::connection(Store::Target, format!("{:#}", e)))?;
        tracing::info!("Target dialect: {}", dialect);

        let ctx = MigrationContext {
            source: &snapshot,
            target: &txn,
            dialect,
        };

        let (tables, sequences) = match self.copy_and_sync(&ctx).await {
            Ok(done) => done,
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!("Rollback of target transaction failed: {}", rollback);
                }
                return Err(e);
            }
        };

        txn.commit().await.map_err(MigrationError::Commit)?;
        self.state = MigrationState::Committed;
        tracing::info!("✓ Target transaction committed");

        let source_repair_persisted = if self.persist_source_repair {
            match snapshot.commit() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("⚠ Target committed but source repair could not be saved: {}", e);
                    false
                }
            }
        } else {
            if let Err(e) = snapshot.rollback() {
                tracing::warn!("⚠ Failed to release source snapshot: {}", e);
            }
            false
        };

        Ok(MigrationReport {
            state: self.state,
            dialect,
            repairs,
            tables,
            sequences_skipped: sequences.is_none(),
            sequences: sequences.unwrap_or_default(),
            source_repair_persisted,
        })
    }

    async fn copy_and_sync(
        &mut self,
        ctx: &MigrationContext<'_, '_, '_>,
    ) -> Result<(Vec<CopyStats>, Option<Vec<SequenceReport>>)> {
        let tables = self.plan.tables();
        tracing::info!("Copying {} tables...", tables.len());

        let progress = if self.show_progress {
            let pb = ProgressBar::new(tables.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut copied = Vec::with_capacity(tables.len());
        for table in tables {
            progress.set_message(table.name);
            let stats = copy_table(ctx.source, ctx.target, table).await?;
            progress.inc(1);
            progress.suspend(|| {
                tracing::info!(
                    "  ✓ {}: {} copied, {} already present",
                    table.name,
                    stats.inserted,
                    stats.skipped
                )
            });
            copied.push(stats);
        }
        progress.finish_and_clear();
        self.state = MigrationState::TablesCopied;

        if !ctx.dialect.supports_sequence_reset() {
            tracing::info!("Skipping sequence resync on {}", ctx.dialect);
            self.state = MigrationState::SequencesSynced;
            return Ok((copied, None));
        }

        tracing::info!("Resynchronizing sequences...");
        let mut sequences = Vec::new();
        for spec in self.plan.sequences() {
            let outcome = sync_sequence(ctx.source, ctx.target, &spec).await?;
            if let SequenceOutcome::Reset { next_value, .. } = &outcome {
                tracing::info!("  ✓ {}: next value {}", spec, next_value);
            }
            sequences.push(SequenceReport {
                sequence: spec.sequence_name(),
                outcome,
            });
        }
        self.state = MigrationState::SequencesSynced;

        Ok((copied, Some(sequences)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::descriptor::{blob, int, opt_text, text, TableDescriptor};
    use crate::migration::repair::INVOICE_EMPTY_FEATURES;

    const PEERS: TableDescriptor =
        TableDescriptor::new("peers", &[int("id"), blob("node_id"), text("address")])
            .conflict_key(&["id"])
            .serial("id");
    const INVOICES: TableDescriptor =
        TableDescriptor::new("invoices", &[int("id"), opt_text("label"), blob("features")])
            .conflict_key(&["id"])
            .serial("id");
    const LOG: TableDescriptor = TableDescriptor::new("log", &[int("at"), text("message")]);

    fn source_fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE peers (id INTEGER PRIMARY KEY, node_id BLOB, address TEXT);
             INSERT INTO peers VALUES (1, x'dead', '10.0.0.1:9735');
             CREATE TABLE invoices (id INTEGER PRIMARY KEY, label TEXT, features BLOB);
             INSERT INTO invoices VALUES (3, 'a', x''), (7, 'b', x''), (42, NULL, x'01');
             CREATE TABLE log (at INTEGER, message TEXT);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_plan_actions_dry_run() {
        let conn = source_fixture();
        let plan = MigrationPlan::new(vec![PEERS, INVOICES, LOG], vec![INVOICE_EMPTY_FEATURES])
            .unwrap();
        let orchestrator = Orchestrator::new(plan);

        let actions = orchestrator.plan_actions(&conn).unwrap();
        assert_eq!(actions.len(), 1 + 3 + 2);
        assert_eq!(
            actions[0],
            PlannedAction::Repair {
                name: "invoice_empty_features".into(),
                table: "invoices".into()
            }
        );
        assert_eq!(
            actions[3],
            PlannedAction::Copy {
                table: "log".into(),
                columns: 2,
                conflict_key: vec![],
                on_conflict: None,
                source_rows: 0,
            }
        );
        assert_eq!(
            actions[4],
            PlannedAction::SyncSequence {
                sequence: "peers_id_seq".into(),
                next_value: Some(2)
            }
        );
        assert_eq!(
            actions[5],
            PlannedAction::SyncSequence {
                sequence: "invoices_id_seq".into(),
                next_value: Some(43)
            }
        );

        // dry run must not touch the source
        let empty_blobs: i64 = conn
            .query_row(
                "SELECT count(*) FROM invoices WHERE typeof(features) = 'blob' AND length(features) = 0",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(empty_blobs, 2);
        assert_eq!(orchestrator.state(), MigrationState::NotStarted);
    }

    #[test]
    fn test_planned_action_display() {
        let copy = PlannedAction::Copy {
            table: "peers".into(),
            columns: 3,
            conflict_key: vec!["id".into()],
            on_conflict: Some(ConflictAction::Skip),
            source_rows: 1,
        };
        assert_eq!(
            copy.to_string(),
            "copy     peers (3 columns, 1 rows, skip on (id))"
        );

        let seq = PlannedAction::SyncSequence {
            sequence: "peers_id_seq".into(),
            next_value: None,
        };
        assert_eq!(seq.to_string(), "sequence peers_id_seq unchanged (no rows)");
    }

    #[test]
    fn test_planned_actions_serialize_tagged() {
        let action = PlannedAction::SyncSequence {
            sequence: "invoices_id_seq".into(),
            next_value: Some(43),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "sync_sequence");
        assert_eq!(json["next_value"], 43);
    }

    #[test]
    fn test_plan_actions_missing_source_table() {
        let conn = Connection::open_in_memory().unwrap();
        let plan = MigrationPlan::new(vec![PEERS], vec![]).unwrap();
        let err = Orchestrator::new(plan).plan_actions(&conn).unwrap_err();
        assert!(matches!(err, MigrationError::Source { .. }));
    }
}
