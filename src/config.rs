//! Project files
//!
//! A project declares connectors and the data sources served through them:
//!
//! ```yaml
//! connectors:
//!   - type: DuckDB
//!     name: warehouse
//!     database: ./warehouse.duckdb
//!     read_only: true
//!     retry_policy:
//!       max_attempts: 3
//!
//! data_sources:
//!   - domain: sales_by_city
//!     name: warehouse          # connector name
//!     parameters:
//!       city: Paris
//!     query: SELECT * FROM sales WHERE city = %(city)s
//! ```
//!
//! Connectors are built through a [`ConnectorRegistry`] and every data source
//! is validated against its connector's source model at load time.

use crate::connector::{ConnectorRegistry, DynConnector};
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, Parameters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

// ============================================================================
// File format
// ============================================================================

/// Raw project file, before connectors are built
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    #[serde(default)]
    pub connectors: Vec<JsonValue>,
    #[serde(default)]
    pub data_sources: Vec<JsonValue>,
}

impl ProjectFile {
    /// Parse YAML (a superset of JSON)
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse project file: {e}")))
    }

    /// Parse JSON
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse project file: {e}")))
    }

    /// Read a project file, picking the parser from the extension
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read project file '{}': {e}",
                    path.display()
                ))
            }
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }
}

// ============================================================================
// Loaded project
// ============================================================================

/// A data source entry: its descriptor as declared in the project file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    pub domain: String,
    pub connector: String,
    pub descriptor: JsonValue,
}

impl SourceEntry {
    /// Descriptor with `overrides` merged over its declared parameters
    pub fn descriptor_with(&self, overrides: &Parameters) -> JsonValue {
        let mut descriptor = self.descriptor.clone();
        if overrides.is_empty() {
            return descriptor;
        }
        if let Some(object) = descriptor.as_object_mut() {
            let parameters = object
                .entry("parameters")
                .or_insert_with(|| JsonValue::Object(JsonObject::new()));
            if !parameters.is_object() {
                *parameters = JsonValue::Object(JsonObject::new());
            }
            if let Some(parameters) = parameters.as_object_mut() {
                for (key, value) in overrides {
                    parameters.insert(key.clone(), value.clone());
                }
            }
        }
        descriptor
    }
}

/// Connectors built from a project file, with their validated data sources
pub struct Project {
    connectors: BTreeMap<String, Box<dyn DynConnector>>,
    sources: BTreeMap<String, SourceEntry>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("connectors", &self.connectors.keys().collect::<Vec<_>>())
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Project {
    /// Load and validate a project file
    pub fn load(path: impl AsRef<Path>, registry: &ConnectorRegistry) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading project");
        Self::from_file(ProjectFile::read(path)?, registry)
    }

    /// Build connectors and validate data sources
    pub fn from_file(file: ProjectFile, registry: &ConnectorRegistry) -> Result<Self> {
        let mut connectors = BTreeMap::new();
        for config in file.connectors {
            let connector = registry.build(config)?;
            let name = connector.name().to_string();
            if connectors.contains_key(&name) {
                return Err(Error::config(format!("Duplicate connector name '{name}'")));
            }
            connectors.insert(name, connector);
        }

        let mut sources = BTreeMap::new();
        for (i, descriptor) in file.data_sources.into_iter().enumerate() {
            let field = |key: &str| {
                descriptor
                    .get(key)
                    .and_then(JsonValue::as_str)
                    .map(ToString::to_string)
                    .ok_or_else(|| Error::missing_field(format!("data_sources[{i}].{key}")))
            };
            let domain = field("domain")?;
            let connector_name = field("name")?;

            let connector: &dyn DynConnector = connectors
                .get(&connector_name)
                .map(|c| &**c)
                .ok_or_else(|| Error::not_found("Connector", &connector_name))?;
            connector.validate_source(descriptor.clone())?;

            if sources.contains_key(&domain) {
                return Err(Error::config(format!("Duplicate data source domain '{domain}'")));
            }
            sources.insert(
                domain.clone(),
                SourceEntry {
                    domain,
                    connector: connector_name,
                    descriptor,
                },
            );
        }

        debug!(
            connectors = connectors.len(),
            data_sources = sources.len(),
            "Project loaded"
        );
        Ok(Self {
            connectors,
            sources,
        })
    }

    /// Connector by name
    pub fn connector(&self, name: &str) -> Result<&dyn DynConnector> {
        self.connectors
            .get(name)
            .map(|c| &**c)
            .ok_or_else(|| Error::not_found("Connector", name))
    }

    /// Data source by domain, with the connector serving it
    pub fn source(&self, domain: &str) -> Result<(&dyn DynConnector, &SourceEntry)> {
        let entry = self
            .sources
            .get(domain)
            .ok_or_else(|| Error::not_found("Data source", domain))?;
        Ok((self.connector(&entry.connector)?, entry))
    }

    /// Connectors, sorted by name
    pub fn connectors(&self) -> impl Iterator<Item = &dyn DynConnector> {
        self.connectors.values().map(|c| &**c)
    }

    /// Data sources, sorted by domain
    pub fn sources(&self) -> impl Iterator<Item = &SourceEntry> {
        self.sources.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    const PROJECT: &str = r"
connectors:
  - type: DuckDB
    name: warehouse
    init_sql: CREATE TABLE cities AS SELECT * FROM (VALUES ('Paris', 'FR'), ('Berlin', 'DE')) t(city, country)

data_sources:
  - domain: cities
    name: warehouse
    parameters:
      country: FR
    query: SELECT * FROM cities WHERE country = %(country)s
";

    fn registry() -> ConnectorRegistry {
        ConnectorRegistry::with_builtin().unwrap()
    }

    #[test]
    fn test_load_yaml_project() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(PROJECT.as_bytes()).unwrap();

        let project = Project::load(file.path(), &registry()).unwrap();
        let names: Vec<_> = project.connectors().map(|c| c.name()).collect();
        assert_eq!(names, vec!["warehouse"]);

        let (connector, entry) = project.source("cities").unwrap();
        assert_eq!(connector.connector_type(), "DuckDB");
        assert_eq!(entry.connector, "warehouse");

        let table = connector.get_df(entry.descriptor.clone(), None).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_load_json_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        let content = json!({
            "connectors": [{"type": "DuckDB", "name": "mem"}],
            "data_sources": [{"domain": "one", "name": "mem", "query": "SELECT 1 AS one"}],
        });
        fs::write(&path, content.to_string()).unwrap();

        let project = Project::load(&path, &registry()).unwrap();
        assert_eq!(project.sources().count(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = Project::load("does/not/exist.yaml", &registry()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn test_unknown_connector_reference() {
        let file = ProjectFile {
            connectors: vec![],
            data_sources: vec![json!({"domain": "d", "name": "ghost", "query": "SELECT 1"})],
        };
        let err = Project::from_file(file, &registry()).unwrap_err();
        assert_eq!(err.to_string(), "Connector \"ghost\" doesn't exist");
    }

    #[test]
    fn test_invalid_descriptor_rejected_at_load() {
        let file = ProjectFile {
            connectors: vec![json!({"type": "DuckDB", "name": "mem"})],
            data_sources: vec![json!({"domain": "d", "name": "mem", "query": "SELECT 1", "table": "t"})],
        };
        assert!(Project::from_file(file, &registry()).is_err());
    }

    #[test]
    fn test_duplicates_rejected() {
        let file = ProjectFile {
            connectors: vec![
                json!({"type": "DuckDB", "name": "mem"}),
                json!({"type": "DuckDB", "name": "mem"}),
            ],
            data_sources: vec![],
        };
        assert!(Project::from_file(file, &registry()).is_err());

        let file = ProjectFile {
            connectors: vec![json!({"type": "DuckDB", "name": "mem"})],
            data_sources: vec![
                json!({"domain": "d", "name": "mem", "query": "SELECT 1"}),
                json!({"domain": "d", "name": "mem", "query": "SELECT 2"}),
            ],
        };
        assert!(Project::from_file(file, &registry()).is_err());
    }

    #[test]
    fn test_unknown_top_level_key() {
        assert!(ProjectFile::from_yaml("connectors: []\nstreams: []\n").is_err());
    }

    #[test]
    fn test_descriptor_with_overrides() {
        let entry = SourceEntry {
            domain: "d".to_string(),
            connector: "c".to_string(),
            descriptor: json!({"domain": "d", "name": "c", "parameters": {"a": 1, "b": 2}}),
        };
        let mut overrides = Parameters::new();
        overrides.insert("b".to_string(), json!(3));
        assert_eq!(
            entry.descriptor_with(&overrides)["parameters"],
            json!({"a": 1, "b": 3})
        );
        assert_eq!(entry.descriptor_with(&Parameters::new()), entry.descriptor);
    }
}
