//! tabular-cdk CLI
//!
//! Command-line interface over a project file

use anyhow::Context;
use clap::Parser;
use tabular_cdk::cli::{Cli, Runner};

fn run(cli: Cli) -> anyhow::Result<()> {
    let project = cli.project.display().to_string();
    let runner = Runner::new(cli)?;
    runner
        .run()
        .with_context(|| format!("project '{project}'"))
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // Initialize logging; stdout is reserved for messages
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
