//! CLI module for livedoc
//!
//! Provides command-line interface for:
//! - watch-doc: Watch a document through a fixture's scripted writes
//! - watch-query: Watch a query through a fixture's scripted writes
//! - check-config: Validate a configuration file

mod args;
mod commands;
mod errors;
mod fixture;
mod io;

pub use args::{Cli, Command};
pub use commands::{build_query, check_config, run, run_command, watch_document, watch_query};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use fixture::{Fixture, ScriptedWrite};
pub use io::{write_error, write_line, write_lines};
