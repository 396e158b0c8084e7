//! CLI command implementations for slymetrics.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Configuration, snapshot and options file validation
//! - `config`: Configuration file generation
//! - `test`: One-off metrics rendering
//! - `tokens`: Show or regenerate the access secrets
//! - `rotate-key`: Encryption key rotation
//! - `generate-snapshot`: Sample site snapshot generation

pub mod check;
pub mod config;
pub mod generate;
pub mod test;
pub mod tokens;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_snapshot;
pub use test::command_test;
pub use tokens::{command_rotate_key, command_tokens};
