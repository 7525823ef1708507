// ABOUTME: Command implementations for each CLI subcommand
// ABOUTME: Exports migrate, validate, and verify commands

pub mod migrate;
pub mod validate;
pub mod verify;

pub use migrate::{migrate, MigrateOptions};
pub use validate::validate;
pub use verify::verify;
