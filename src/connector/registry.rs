//! Connector registry and type-erased connectors

use super::contract::{Connector, DataSlice};
use super::status::ConnectorStatus;
use crate::error::{Error, Result};
use crate::source::{DataSource, SourceModel};
use crate::table::Table;
use crate::types::{short_type_name, JsonValue};
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// Type erasure
// ============================================================================

/// Object-safe view of a [`Connector`]; descriptors are passed as JSON and
/// validated against the connector's source model on every call.
pub trait DynConnector: Send + Sync {
    fn name(&self) -> &str;

    fn connector_type(&self) -> &'static str;

    /// Validate a descriptor without fetching anything
    fn validate_source(&self, source: JsonValue) -> Result<()>;

    fn get_df(&self, source: JsonValue, permissions: Option<&str>) -> Result<Table>;

    fn get_slice(
        &self,
        source: JsonValue,
        permissions: Option<&str>,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<DataSlice>;

    fn explain(&self, source: JsonValue, permissions: Option<&str>) -> Result<Option<JsonValue>>;

    fn get_status(&self) -> ConnectorStatus;
}

struct Erased<C>(C);

impl<C: Connector> Erased<C> {
    fn source(source: JsonValue) -> Result<DataSource<C::Source>> {
        DataSource::from_value(source)
    }
}

impl<C: Connector> DynConnector for Erased<C> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn connector_type(&self) -> &'static str {
        C::TYPE_NAME
    }

    fn validate_source(&self, source: JsonValue) -> Result<()> {
        Self::source(source).map(|_| ())
    }

    fn get_df(&self, source: JsonValue, permissions: Option<&str>) -> Result<Table> {
        self.0.get_df(&Self::source(source)?, permissions)
    }

    fn get_slice(
        &self,
        source: JsonValue,
        permissions: Option<&str>,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<DataSlice> {
        self.0
            .get_slice(&Self::source(source)?, permissions, offset, limit)
    }

    fn explain(&self, source: JsonValue, permissions: Option<&str>) -> Result<Option<JsonValue>> {
        self.0.explain(&Self::source(source)?, permissions)
    }

    fn get_status(&self) -> ConnectorStatus {
        self.0.get_status()
    }
}

// ============================================================================
// Registry
// ============================================================================

type Factory = Box<dyn Fn(JsonValue) -> Result<Box<dyn DynConnector>> + Send + Sync>;

struct Registration {
    model_name: &'static str,
    factory: Factory,
}

/// Connector types available for construction from configuration
#[derive(Default)]
pub struct ConnectorRegistry {
    entries: BTreeMap<&'static str, Registration>,
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl ConnectorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every connector shipped with the crate
    pub fn with_builtin() -> Result<Self> {
        use crate::connectors::{DuckDbConnector, GraphQlConnector, MongoConnector};

        let mut registry = Self::new();
        registry
            .register::<MongoConnector>()?
            .register::<DuckDbConnector>()?
            .register::<GraphQlConnector>()?;
        Ok(registry)
    }

    /// Register a connector type.
    ///
    /// Fails when the connector declares no type name or its source model
    /// declares no name.
    pub fn register<C: Connector + 'static>(&mut self) -> Result<&mut Self> {
        if C::TYPE_NAME.trim().is_empty() {
            return Err(Error::MissingDeclaration {
                connector: short_type_name::<C>().to_string(),
                attribute: "type name".to_string(),
            });
        }
        let model_name = <C::Source as SourceModel>::MODEL_NAME;
        if model_name.trim().is_empty() {
            return Err(Error::MissingDeclaration {
                connector: short_type_name::<C>().to_string(),
                attribute: "data source model".to_string(),
            });
        }

        let factory: Factory = Box::new(|value| {
            let connector = C::from_value(value)?;
            Ok(Box::new(Erased(connector)) as Box<dyn DynConnector>)
        });
        self.entries.insert(
            C::TYPE_NAME,
            Registration {
                model_name,
                factory,
            },
        );
        debug!(connector_type = C::TYPE_NAME, model = model_name, "Registered connector");
        Ok(self)
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Source model name of a registered type
    pub fn model_name(&self, connector_type: &str) -> Option<&'static str> {
        self.entries.get(connector_type).map(|r| r.model_name)
    }

    /// Build a connector from a mapping holding a `type` key
    pub fn build(&self, config: JsonValue) -> Result<Box<dyn DynConnector>> {
        let connector_type = config
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Error::missing_field("type"))?;
        let registration =
            self.entries
                .get(connector_type)
                .ok_or_else(|| Error::UnknownConnectorType {
                    connector_type: connector_type.to_string(),
                })?;
        (registration.factory)(config)
    }
}
