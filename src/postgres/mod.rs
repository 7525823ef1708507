// ABOUTME: PostgreSQL target utilities module
// ABOUTME: Exports connection management and target dialect detection

pub mod connection;
pub mod dialect;

pub use connection::{connect, connect_with_retry, count_public_tables};
pub use dialect::{detect_dialect, TargetDialect};
