//! DuckDB SQL connector
//!
//! Runs a templated SQL query against a DuckDB database file (or an in-memory
//! database seeded by `init_sql`). Placeholders are bound as positional
//! parameters, never interpolated into the SQL text.

use crate::connector::{Connector, ConnectorConfig, ConnectorStatus, DataSlice, StatusChecks};
use crate::error::{Error, FailureKind, Result};
use crate::query::bind_sql_parameters;
use crate::source::{DataSource, SourceModel};
use crate::table::Table;
use crate::types::JsonValue;
use base64::Engine as _;
use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::{AccessMode, Config, Connection};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

const IN_MEMORY: &str = ":memory:";

static MISSING_TABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Table with name (\S+) does not exist").unwrap()
});

// ============================================================================
// Descriptor
// ============================================================================

/// A SQL query, optionally carrying `%(name)s` placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DuckDbSource {
    pub query: String,
}

impl SourceModel for DuckDbSource {
    const MODEL_NAME: &'static str = "DuckDbSource";

    fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::validation(Self::MODEL_NAME, "query must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Connection parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DuckDbParams {
    /// Database file, or `:memory:`
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub threads: Option<u32>,
    /// Statements run right after every connection is opened
    #[serde(default)]
    pub init_sql: Option<String>,
}

fn default_database() -> String {
    IN_MEMORY.to_string()
}

/// Connector over a DuckDB database
#[derive(Debug)]
pub struct DuckDbConnector {
    config: ConnectorConfig,
    params: DuckDbParams,
}

impl DuckDbConnector {
    /// DuckDB configuration built from the parameters that are set
    fn connection_config(&self) -> Result<Config> {
        let mut config = Config::default();
        if self.params.read_only {
            config = config.access_mode(AccessMode::ReadOnly)?;
        }
        if let Some(threads) = self.params.threads {
            config = config.threads(i64::from(threads))?;
        }
        Ok(config)
    }

    /// Open a fresh connection; it is closed when dropped
    fn connect(&self) -> Result<Connection> {
        let config = self.connection_config()?;
        let conn = if self.params.database == IN_MEMORY {
            Connection::open_in_memory_with_flags(config)
        } else {
            Connection::open_with_flags(&self.params.database, config)
        }
        .map_err(|e| Error::connection(&self.params.database, e.to_string()))?;

        if let Some(init_sql) = &self.params.init_sql {
            conn.execute_batch(init_sql)
                .map_err(|e| Error::query(self.name(), format!("init_sql failed: {e}")))?;
        }
        Ok(conn)
    }

    /// Execute `sql` with positional parameters and collect the result
    fn run_query(&self, conn: &Connection, sql: &str, values: &[JsonValue]) -> Result<Table> {
        debug!(connector = self.name(), sql, "Executing query");

        let mut stmt = conn.prepare(sql).map_err(|e| self.query_error(e))?;
        let mut rows = stmt
            .query(duckdb::params_from_iter(values.iter().map(json_to_duckdb)))
            .map_err(|e| self.query_error(e))?;

        let columns: Vec<String> = rows
            .as_ref()
            .map(duckdb::Statement::column_names)
            .unwrap_or_default();

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value: DuckValue = row.get(i)?;
                record.push(duckdb_value_to_json(value));
            }
            records.push(record);
        }
        Table::from_rows(columns, records)
    }

    fn query_error(&self, error: duckdb::Error) -> Error {
        let message = error.to_string();
        match MISSING_TABLE_REGEX.captures(&message) {
            Some(cap) => Error::not_found("Table", cap[1].trim_matches('"')),
            None => Error::query(self.name(), message),
        }
    }

    fn bound_query(source: &DataSource<DuckDbSource>) -> Result<(String, Vec<JsonValue>)> {
        let sql = source.extension().query.trim().trim_end_matches(';');
        bind_sql_parameters(sql, source.parameters())
    }

    fn count_rows(&self, conn: &Connection, sql: &str, values: &[JsonValue]) -> Result<usize> {
        let counted = self.run_query(conn, &format!("SELECT COUNT(*) FROM ({sql}) AS q"), values)?;
        counted
            .rows()
            .first()
            .and_then(|row| row.values().next())
            .and_then(JsonValue::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| Error::decode("COUNT(*) returned no value"))
    }
}

impl Connector for DuckDbConnector {
    type Source = DuckDbSource;
    type Params = DuckDbParams;
    const TYPE_NAME: &'static str = "DuckDB";
    const RETRY_ON: &'static [FailureKind] = &[FailureKind::Connection];

    fn build(config: ConnectorConfig, params: DuckDbParams) -> Result<Self> {
        if params.database.trim().is_empty() {
            return Err(Error::missing_field("database"));
        }
        if params.read_only && params.database == IN_MEMORY {
            return Err(Error::validation(
                Self::TYPE_NAME,
                "an in-memory database cannot be opened read-only",
            ));
        }
        if params.threads == Some(0) {
            return Err(Error::validation(Self::TYPE_NAME, "threads must be at least 1"));
        }
        Ok(Self { config, params })
    }

    fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    fn retrieve_data(&self, source: &DataSource<DuckDbSource>) -> Result<Table> {
        let (sql, values) = Self::bound_query(source)?;
        let conn = self.connect()?;
        self.run_query(&conn, &sql, &values)
    }

    /// Pushes `LIMIT`/`OFFSET` down to DuckDB when no permission filter applies
    fn get_slice(
        &self,
        source: &DataSource<DuckDbSource>,
        permissions: Option<&str>,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<DataSlice> {
        if permissions.is_some() {
            let table = self.get_df(source, permissions)?;
            return Ok(DataSlice {
                total_count: table.len(),
                table: table.slice(offset, limit),
            });
        }

        let (sql, values) = Self::bound_query(source)?;
        let mut window = format!("SELECT * FROM ({sql}) AS q");
        if let Some(limit) = limit {
            window.push_str(&format!(" LIMIT {limit}"));
        }
        if offset > 0 {
            window.push_str(&format!(" OFFSET {offset}"));
        }

        self.with_retry(|| {
            let conn = self.connect()?;
            let table = self.run_query(&conn, &window, &values)?;
            let total_count = self.count_rows(&conn, &sql, &values)?;
            Ok(DataSlice { table, total_count })
        })
    }

    fn explain(
        &self,
        source: &DataSource<DuckDbSource>,
        _permissions: Option<&str>,
    ) -> Result<Option<JsonValue>> {
        let (sql, values) = Self::bound_query(source)?;
        let plan = self.with_retry(|| {
            let conn = self.connect()?;
            self.run_query(&conn, &format!("EXPLAIN {sql}"), &values)
        })?;
        Ok(Some(JsonValue::Array(plan.into_records())))
    }

    fn get_status(&self) -> ConnectorStatus {
        let mut conn = None;
        StatusChecks::new()
            .check("Database opened", || {
                conn = Some(self.connect()?);
                Ok(())
            })
            .check("Query executed", || match &conn {
                Some(conn) => conn
                    .execute_batch("SELECT 1")
                    .map_err(|e| Error::query(self.name(), e.to_string())),
                None => Err(Error::connection(&self.params.database, "not connected")),
            })
            .finish()
    }
}

// ============================================================================
// Value conversion
// ============================================================================

fn json_to_duckdb(value: &JsonValue) -> DuckValue {
    match value {
        JsonValue::Null => DuckValue::Null,
        JsonValue::Bool(b) => DuckValue::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => DuckValue::BigInt(i),
            None => DuckValue::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => DuckValue::Text(s.clone()),
        other => DuckValue::Text(other.to_string()),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// Convert a DuckDB value to JSON; temporal values become ISO-8601 strings
pub fn duckdb_value_to_json(value: DuckValue) -> JsonValue {
    match value {
        DuckValue::Null => JsonValue::Null,
        DuckValue::Boolean(b) => JsonValue::Bool(b),
        DuckValue::TinyInt(i) => i.into(),
        DuckValue::SmallInt(i) => i.into(),
        DuckValue::Int(i) => i.into(),
        DuckValue::BigInt(i) => i.into(),
        DuckValue::UTinyInt(i) => i.into(),
        DuckValue::USmallInt(i) => i.into(),
        DuckValue::UInt(i) => i.into(),
        DuckValue::UBigInt(i) => i.into(),
        DuckValue::HugeInt(i) => JsonValue::String(i.to_string()),
        DuckValue::Float(f) => {
            serde_json::Number::from_f64(f64::from(f)).map_or(JsonValue::Null, JsonValue::Number)
        }
        DuckValue::Double(f) => {
            serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
        }
        DuckValue::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| JsonValue::String(d.to_string()), JsonValue::Number),
        DuckValue::Text(s) => JsonValue::String(s),
        DuckValue::Blob(b) => {
            JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
        DuckValue::Timestamp(unit, i) => {
            let micros = to_micros(unit, i);
            chrono::DateTime::from_timestamp_micros(micros)
                .map(|dt| JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()))
                .unwrap_or_else(|| micros.into())
        }
        DuckValue::Date32(i32::MAX) => JsonValue::String("infinity".to_string()),
        DuckValue::Date32(d) if d == -i32::MAX => JsonValue::String("-infinity".to_string()),
        DuckValue::Date32(d) => {
            // Days since 1970-01-01; 719163 days separate it from 0001-01-01
            d.checked_add(719_163)
                .and_then(chrono::NaiveDate::from_num_days_from_ce_opt)
                .map(|date| JsonValue::String(date.format("%Y-%m-%d").to_string()))
                .unwrap_or_else(|| d.into())
        }
        DuckValue::Time64(unit, t) => {
            let micros = to_micros(unit, t);
            let secs = micros / 1_000_000;
            JsonValue::String(format!(
                "{:02}:{:02}:{:02}.{:06}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60,
                micros % 1_000_000
            ))
        }
        DuckValue::List(items) | DuckValue::Array(items) => {
            JsonValue::Array(items.into_iter().map(duckdb_value_to_json).collect())
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}
