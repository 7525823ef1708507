// ABOUTME: Library module for lightningd-pg-migrator
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod error;
pub mod migration;
pub mod postgres;
pub mod preflight;
pub mod sqlite;
pub mod utils;
