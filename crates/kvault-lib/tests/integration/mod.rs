//! Integration tests for kvault
//!
//! These tests drive the public API the way the command-line tool does:
//! resolve a manifest, back up into a store file, restore into a fresh
//! directory.

pub mod backup_restore_test;
pub mod cli_commands_test;
pub mod selector_test;
