//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tabular connector kit CLI
#[derive(Parser, Debug)]
#[command(name = "tabular-cdk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project file (YAML or JSON)
    #[arg(short, long, global = true, default_value = "project.yaml")]
    pub project: PathBuf,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered connector types
    List,

    /// Check the health of a connector
    Status {
        /// Connector name
        #[arg(short, long)]
        connector: String,
    },

    /// Fetch a data source
    Query {
        /// Data source domain
        #[arg(short, long)]
        source: String,

        /// Rows to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum rows to return
        #[arg(long)]
        limit: Option<usize>,

        /// Row filter, e.g. "country == '{{ country }}'"
        #[arg(long)]
        permissions: Option<String>,

        /// Parameter override as KEY=VALUE (VALUE parsed as JSON when possible)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Write the rows to a Parquet file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the execution plan of a data source query
    Explain {
        /// Data source domain
        #[arg(short, long)]
        source: String,

        /// Row filter
        #[arg(long)]
        permissions: Option<String>,

        /// Parameter override as KEY=VALUE
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Validate the project file
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
