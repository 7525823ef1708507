// ABOUTME: SQLite source store utilities module
// ABOUTME: Exports wallet file opening and catalog introspection

pub mod connection;

pub use connection::{count_rows, count_user_tables, open_source};
