// ABOUTME: Migration engine module
// ABOUTME: Table descriptors, row copy, sequence resync, source repair and orchestration

pub mod blob;
pub mod copier;
pub mod descriptor;
pub mod orchestrator;
pub mod plan;
pub mod repair;
pub mod row;
pub mod rowcount;
pub mod sequence;
pub mod tables;

pub use blob::BinaryValue;
pub use copier::{copy_table, CopyStats};
pub use descriptor::{ConflictAction, FieldDescriptor, FieldKind, RowRule, TableDescriptor};
pub use orchestrator::{
    MigrationContext, MigrationReport, MigrationState, Orchestrator, PlannedAction,
    SequenceReport,
};
pub use plan::MigrationPlan;
pub use repair::{apply_repairs, RepairStats, SourceRepair};
pub use row::{FieldValue, RowInstance};
pub use rowcount::{compare_row_counts, RowCountResult};
pub use sequence::{sync_sequence, sync_sequence_by_id, SequenceOutcome, SequenceSpec};
