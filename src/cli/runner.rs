//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::Project;
use crate::connector::ConnectorRegistry;
use crate::error::{Error, Result};
use crate::table::write_parquet;
use crate::types::{JsonValue, Parameters};
use serde_json::json;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Parse a `KEY=VALUE` parameter override.
///
/// The value is read as JSON when it parses (`3`, `true`, `["a","b"]`) and
/// kept as a plain string otherwise.
pub fn parse_param(raw: &str) -> Result<(String, JsonValue)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| Error::config(format!("Invalid parameter '{raw}', expected KEY=VALUE")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::config(format!("Invalid parameter '{raw}', empty key")));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_params(raw: &[String]) -> Result<Parameters> {
    let mut params = Parameters::new();
    for param in raw {
        let (key, value) = parse_param(param)?;
        params.insert(key, value);
    }
    Ok(params)
}

/// CLI runner
pub struct Runner {
    cli: Cli,
    registry: ConnectorRegistry,
}

impl Runner {
    /// Create a runner over the built-in connectors
    pub fn new(cli: Cli) -> Result<Self> {
        Ok(Self {
            cli,
            registry: ConnectorRegistry::with_builtin()?,
        })
    }

    /// Run the CLI command, writing messages to stdout
    pub fn run(&self) -> Result<()> {
        let stdout = io::stdout();
        self.execute(&mut stdout.lock())
    }

    /// Run the CLI command, writing messages to `out`
    pub fn execute(&self, out: &mut impl Write) -> Result<()> {
        match &self.cli.command {
            Commands::List => self.list(out),
            Commands::Status { connector } => self.status(out, connector),
            Commands::Query {
                source,
                offset,
                limit,
                permissions,
                params,
                output,
            } => self.query(
                out,
                source,
                *offset,
                *limit,
                permissions.as_deref(),
                params,
                output.as_deref(),
            ),
            Commands::Explain {
                source,
                permissions,
                params,
            } => self.explain(out, source, permissions.as_deref(), params),
            Commands::Validate => self.validate(out),
        }
    }

    fn load_project(&self) -> Result<Project> {
        Project::load(&self.cli.project, &self.registry)
    }

    /// List registered connector types
    fn list(&self, out: &mut impl Write) -> Result<()> {
        let connectors: Vec<JsonValue> = self
            .registry
            .types()
            .into_iter()
            .map(|connector_type| {
                json!({
                    "type": connector_type,
                    "data_source_model": self.registry.model_name(connector_type),
                })
            })
            .collect();

        self.emit(
            out,
            &json!({
                "type": "CONNECTORS",
                "connectors": connectors
            }),
        )
    }

    /// Run the status checks of one connector
    fn status(&self, out: &mut impl Write, name: &str) -> Result<()> {
        let project = self.load_project()?;
        let connector = project.connector(name)?;
        let status = connector.get_status();
        info!(connector = name, status = ?status.status, "Status checked");

        self.emit(
            out,
            &json!({
                "type": "STATUS",
                "connector": name,
                "connector_type": connector.connector_type(),
                "status": status
            }),
        )
    }

    /// Fetch a data source
    #[allow(clippy::too_many_arguments)]
    fn query(
        &self,
        out: &mut impl Write,
        domain: &str,
        offset: usize,
        limit: Option<usize>,
        permissions: Option<&str>,
        params: &[String],
        output: Option<&Path>,
    ) -> Result<()> {
        let project = self.load_project()?;
        let (connector, entry) = project.source(domain)?;
        let descriptor = entry.descriptor_with(&parse_params(params)?);
        let slice = connector.get_slice(descriptor, permissions, offset, limit)?;

        if let Some(path) = output {
            let rows = write_parquet(&slice.table, path)?;
            info!(domain, rows, path = %path.display(), "Wrote Parquet file");
            return self.emit(
                out,
                &json!({
                    "type": "OUTPUT",
                    "domain": domain,
                    "path": path.display().to_string(),
                    "rows": rows,
                    "total_count": slice.total_count
                }),
            );
        }

        self.emit(
            out,
            &json!({
                "type": "RECORDS",
                "domain": domain,
                "columns": slice.table.columns(),
                "total_count": slice.total_count,
                "records": slice.table.rows()
            }),
        )
    }

    /// Show a query plan
    fn explain(
        &self,
        out: &mut impl Write,
        domain: &str,
        permissions: Option<&str>,
        params: &[String],
    ) -> Result<()> {
        let project = self.load_project()?;
        let (connector, entry) = project.source(domain)?;
        let descriptor = entry.descriptor_with(&parse_params(params)?);
        let plan = connector.explain(descriptor, permissions)?;

        self.emit(
            out,
            &json!({
                "type": "EXPLAIN",
                "domain": domain,
                "plan": plan
            }),
        )
    }

    /// Validate the project file
    fn validate(&self, out: &mut impl Write) -> Result<()> {
        let project = self.load_project()?;

        self.emit(
            out,
            &json!({
                "type": "LOG",
                "log": {
                    "level": "INFO",
                    "message": format!(
                        "Project '{}' is valid with {} connectors and {} data sources",
                        self.cli.project.display(),
                        project.connectors().count(),
                        project.sources().count()
                    )
                }
            }),
        )
    }

    /// Output a message
    fn emit(&self, out: &mut impl Write, msg: &JsonValue) -> Result<()> {
        let line = match self.cli.format {
            OutputFormat::Json => serde_json::to_string(msg)?,
            OutputFormat::Pretty => serde_json::to_string_pretty(msg)?,
        };
        writeln!(out, "{line}")?;
        Ok(())
    }
}
