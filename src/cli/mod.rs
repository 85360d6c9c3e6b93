//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup pipeline.

pub mod backup;
pub mod settings;

pub use backup::{build_pipeline, handle_daemon, handle_list, handle_prune, handle_run};
pub use settings::{handle_config_command, handle_init, ConfigCommands, InitArgs};
