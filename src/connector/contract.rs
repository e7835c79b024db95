//! The `Connector` trait and its shared configuration

use super::status::ConnectorStatus;
use crate::error::{Error, FailureKind, Result};
use crate::retry::{RetryPolicy, Retrying};
use crate::source::{DataSource, SourceModel};
use crate::table::Table;
use crate::template::render_raw_permissions;
use crate::types::{split_object, JsonObject, JsonValue, Parameters};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// Shared configuration
// ============================================================================

/// Fields every connector configuration carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Connector name, referenced by data sources
    pub name: String,

    /// Retry policy applied around `retrieve_data`
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Connector type, as registered
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub connector_type: Option<String>,
}

/// Keys owned by [`ConnectorConfig`]
const CONFIG_KEYS: &[&str] = &["name", "retry_policy", "type"];

impl ConnectorConfig {
    /// Create a config with no retry
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retry_policy: RetryPolicy::default(),
            connector_type: None,
        }
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Check shared invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::missing_field("name"));
        }
        self.retry_policy.validate()
    }

    /// Split the shared fields out of a connector mapping.
    ///
    /// Returns the parsed config and the remaining connector-specific keys.
    pub fn split(object: JsonObject) -> Result<(Self, JsonObject)> {
        let (common, rest) = split_object(object, CONFIG_KEYS);
        let config: Self = serde_json::from_value(JsonValue::Object(common))
            .map_err(|e| Error::config(format!("invalid connector configuration: {e}")))?;
        config.validate()?;
        Ok((config, rest))
    }
}

// ============================================================================
// Results
// ============================================================================

/// A bounded window of rows plus the unsliced row count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSlice {
    pub table: Table,
    pub total_count: usize,
}

// ============================================================================
// Connector trait
// ============================================================================

/// Contract implemented by every connector.
///
/// A connector is built once from its configuration and reused for many
/// fetches. Each call is blocking and runs on the caller's thread.
pub trait Connector: Send + Sync + Sized {
    /// Descriptor extension this connector accepts
    type Source: SourceModel;

    /// Connector-specific connection parameters (closed schema)
    type Params: DeserializeOwned;

    /// Registered type name
    const TYPE_NAME: &'static str;

    /// Failure kinds worth retrying
    const RETRY_ON: &'static [FailureKind] = &[];

    /// Build from validated shared config and connection parameters
    fn build(config: ConnectorConfig, params: Self::Params) -> Result<Self>;

    /// Shared configuration
    fn config(&self) -> &ConnectorConfig;

    /// Fetch the raw data described by `source`
    fn retrieve_data(&self, source: &DataSource<Self::Source>) -> Result<Table>;

    /// Build from a single mapping holding shared and specific keys
    fn from_value(value: JsonValue) -> Result<Self> {
        let JsonValue::Object(object) = value else {
            return Err(Error::config(format!(
                "{} configuration must be a mapping",
                Self::TYPE_NAME
            )));
        };
        let (config, rest) = ConnectorConfig::split(object)?;
        if let Some(declared) = config.connector_type.as_deref() {
            if declared != Self::TYPE_NAME {
                return Err(Error::config(format!(
                    "connector '{}' declares type '{declared}', expected '{}'",
                    config.name,
                    Self::TYPE_NAME
                )));
            }
        }
        let params: Self::Params = serde_json::from_value(JsonValue::Object(rest))
            .map_err(|e| Error::validation(Self::TYPE_NAME, e.to_string()))?;
        Self::build(config, params)
    }

    /// Connector name
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Compile the retry policy with this connector's retryable kinds
    fn retrying(&self) -> Option<Retrying> {
        self.config()
            .retry_policy
            .compile(Self::RETRY_ON, Some(Self::TYPE_NAME))
    }

    /// Run `op` under the retry policy, or once when no policy is configured
    fn with_retry<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        match self.retrying() {
            Some(retrying) => retrying.call(op),
            None => op(),
        }
    }

    /// Run `retrieve_data` under the retry policy
    fn fetch(&self, source: &DataSource<Self::Source>) -> Result<Table> {
        self.with_retry(|| self.retrieve_data(source))
    }

    /// Fetch the whole result, filtered by `permissions` when given
    fn get_df(
        &self,
        source: &DataSource<Self::Source>,
        permissions: Option<&str>,
    ) -> Result<Table> {
        let table = self.fetch(source)?;
        debug!(
            connector = self.name(),
            domain = source.domain(),
            rows = table.len(),
            "Retrieved data"
        );
        match permissions {
            Some(permissions) => apply_permissions(table, permissions, source.parameters()),
            None => Ok(table),
        }
    }

    /// Rows `[offset, offset + limit)` and the full filtered row count
    fn get_slice(
        &self,
        source: &DataSource<Self::Source>,
        permissions: Option<&str>,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<DataSlice> {
        let table = self.get_df(source, permissions)?;
        Ok(DataSlice {
            total_count: table.len(),
            table: table.slice(offset, limit),
        })
    }

    /// Execution plan of the query, if the datastore exposes one
    fn explain(
        &self,
        _source: &DataSource<Self::Source>,
        _permissions: Option<&str>,
    ) -> Result<Option<JsonValue>> {
        Ok(None)
    }

    /// Health of the underlying datastore
    fn get_status(&self) -> ConnectorStatus {
        ConnectorStatus::default()
    }
}

/// Render `permissions` against the descriptor parameters and filter rows
pub fn apply_permissions(
    table: Table,
    permissions: &str,
    parameters: Option<&Parameters>,
) -> Result<Table> {
    let rendered = render_raw_permissions(permissions, parameters)?;
    debug!(permissions = %rendered, "Applying permissions");
    table.query(&rendered)
}
