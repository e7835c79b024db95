//! Data source descriptors
//!
//! A [`DataSource`] describes *what* to fetch: a domain, bound parameters and a
//! connector-specific extension (usually a templated query). Descriptors are
//! closed: unknown keys are rejected in the common part and, through
//! `#[serde(deny_unknown_fields)]` on the extension, in the connector part too.
//!
//! ```text
//! domain: paris_sales          ─┐
//! name: my_mongo                │ common fields
//! parameters: {city: Paris}    ─┘
//! collection: sales            ─┐ extension (MongoSource)
//! query: {city: "%(city)s"}    ─┘
//! ```

use crate::error::{Error, Result};
use crate::types::{split_object, JsonObject, JsonValue, Parameters};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Debug;

/// Connector-specific part of a descriptor
pub trait SourceModel: DeserializeOwned + Serialize + Clone + Debug + Send + Sync + 'static {
    /// Model name used in validation messages and registry checks
    const MODEL_NAME: &'static str;

    /// Extension-level invariants, checked after every mutation
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Keys owned by the common part of every descriptor
const COMMON_KEYS: &[&str] = &[
    "domain",
    "name",
    "type",
    "load",
    "live_data",
    "validation",
    "parameters",
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CommonFields {
    domain: String,
    name: String,
    #[serde(rename = "type", default)]
    source_type: Option<String>,
    #[serde(default = "default_load")]
    load: bool,
    #[serde(default)]
    live_data: bool,
    #[serde(default)]
    validation: Option<Vec<JsonValue>>,
    #[serde(default)]
    parameters: Option<Parameters>,
}

fn default_load() -> bool {
    true
}

/// Validated description of the data to fetch
#[derive(Debug, Clone)]
pub struct DataSource<E> {
    domain: String,
    name: String,
    source_type: Option<String>,
    load: bool,
    live_data: bool,
    validation: Option<Vec<JsonValue>>,
    parameters: Option<Parameters>,
    extension: E,
}

impl<E: SourceModel> DataSource<E> {
    /// Create a descriptor with default common fields
    pub fn new(domain: impl Into<String>, name: impl Into<String>, extension: E) -> Result<Self> {
        let source = Self {
            domain: domain.into(),
            name: name.into(),
            source_type: None,
            load: true,
            live_data: false,
            validation: None,
            parameters: None,
            extension,
        };
        source.validate()?;
        Ok(source)
    }

    /// Build a descriptor from a JSON mapping holding common and extension keys
    pub fn from_value(value: JsonValue) -> Result<Self> {
        let JsonValue::Object(object) = value else {
            return Err(Error::validation(
                E::MODEL_NAME,
                format!("expected a mapping, got {value}"),
            ));
        };

        let (common, rest) = split_object(object, COMMON_KEYS);
        let common: CommonFields = serde_json::from_value(JsonValue::Object(common))
            .map_err(|e| Error::validation(E::MODEL_NAME, e.to_string()))?;
        let extension: E = serde_json::from_value(JsonValue::Object(rest))
            .map_err(|e| Error::validation(E::MODEL_NAME, e.to_string()))?;

        let source = Self {
            domain: common.domain,
            name: common.name,
            source_type: common.source_type,
            load: common.load,
            live_data: common.live_data,
            validation: common.validation,
            parameters: common.parameters,
            extension,
        };
        source.validate()?;
        Ok(source)
    }

    /// Serialize back to the mapping accepted by [`DataSource::from_value`]
    pub fn to_value(&self) -> Result<JsonValue> {
        let mut object = JsonObject::new();
        object.insert("domain".into(), self.domain.clone().into());
        object.insert("name".into(), self.name.clone().into());
        if let Some(source_type) = &self.source_type {
            object.insert("type".into(), source_type.clone().into());
        }
        object.insert("load".into(), self.load.into());
        object.insert("live_data".into(), self.live_data.into());
        if let Some(validation) = &self.validation {
            object.insert("validation".into(), validation.clone().into());
        }
        if let Some(parameters) = &self.parameters {
            object.insert("parameters".into(), JsonValue::Object(parameters.clone()));
        }

        match serde_json::to_value(&self.extension)? {
            JsonValue::Object(extension) => object.extend(extension),
            other => {
                return Err(Error::validation(
                    E::MODEL_NAME,
                    format!("extension must serialize to a mapping, got {other}"),
                ))
            }
        }
        Ok(JsonValue::Object(object))
    }

    fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::validation(E::MODEL_NAME, "domain must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation(E::MODEL_NAME, "name must not be empty"));
        }
        if let Some(rules) = &self.validation {
            if let Some(i) = rules.iter().position(|r| !r.is_object()) {
                return Err(Error::validation(
                    E::MODEL_NAME,
                    format!("validation rule {i} must be a mapping"),
                ));
            }
        }
        self.extension.validate()
    }

    /// Apply `change`, keeping the previous state if the result is invalid
    fn mutate(&mut self, change: impl FnOnce(&mut Self)) -> Result<()> {
        let previous = self.clone();
        change(self);
        if let Err(e) = self.validate() {
            *self = previous;
            return Err(e);
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_type(&self) -> Option<&str> {
        self.source_type.as_deref()
    }

    pub fn load(&self) -> bool {
        self.load
    }

    pub fn live_data(&self) -> bool {
        self.live_data
    }

    pub fn validation(&self) -> Option<&[JsonValue]> {
        self.validation.as_deref()
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        self.parameters.as_ref()
    }

    /// Connector-specific part
    pub fn extension(&self) -> &E {
        &self.extension
    }

    // ========================================================================
    // Setters (re-validated)
    // ========================================================================

    pub fn set_domain(&mut self, domain: impl Into<String>) -> Result<()> {
        let domain = domain.into();
        self.mutate(|s| s.domain = domain)
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.mutate(|s| s.name = name)
    }

    pub fn set_source_type(&mut self, source_type: Option<String>) -> Result<()> {
        self.mutate(|s| s.source_type = source_type)
    }

    pub fn set_load(&mut self, load: bool) -> Result<()> {
        self.mutate(|s| s.load = load)
    }

    pub fn set_live_data(&mut self, live_data: bool) -> Result<()> {
        self.mutate(|s| s.live_data = live_data)
    }

    pub fn set_validation(&mut self, validation: Option<Vec<JsonValue>>) -> Result<()> {
        self.mutate(|s| s.validation = validation)
    }

    pub fn set_parameters(&mut self, parameters: Option<Parameters>) -> Result<()> {
        self.mutate(|s| s.parameters = parameters)
    }

    /// Modify the extension in place; rejected changes are rolled back
    pub fn update_extension(&mut self, change: impl FnOnce(&mut E)) -> Result<()> {
        self.mutate(|s| change(&mut s.extension))
    }

    /// Builder-style [`DataSource::set_parameters`]
    pub fn with_parameters(mut self, parameters: Parameters) -> Result<Self> {
        self.set_parameters(Some(parameters))?;
        Ok(self)
    }
}

impl<'de, E: SourceModel> Deserialize<'de> for DataSource<E> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl<E: SourceModel> Serialize for DataSource<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}
