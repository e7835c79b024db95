//! CLI module
//!
//! Command-line interface over a project file.
//!
//! # Commands
//!
//! - `list` - Registered connector types
//! - `status` - Health checks of one connector
//! - `query` - Fetch (a slice of) a data source
//! - `explain` - Execution plan of a data source query
//! - `validate` - Load the project and validate every data source

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::{parse_param, Runner};
