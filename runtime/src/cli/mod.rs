//! CLI subcommand implementations for the Cloakscope binary.

pub mod output;
pub mod progress;
pub mod scan_cmd;
pub mod score_cmd;
