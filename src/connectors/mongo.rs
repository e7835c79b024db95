//! MongoDB connector
//!
//! Runs an aggregation pipeline built from a templated query. Permission
//! filters are translated to `$match` conditions and pushed into the pipeline;
//! slices use a `$facet` so the window and the total count come back in one
//! round trip.

use crate::connector::{
    check_hostname, check_port, Connector, ConnectorConfig, ConnectorStatus, DataSlice,
    StatusChecks,
};
use crate::error::{Error, FailureKind, Result};
use crate::query::{normalize_query, Pipeline};
use crate::source::{DataSource, SourceModel};
use crate::table::{Expr, Table};
use crate::template::render_raw_permissions;
use crate::types::{JsonObject, JsonValue};
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::sync::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Server selection timeout used by status checks
const STATUS_TIMEOUT_MS: u64 = 500;

// ============================================================================
// Descriptor
// ============================================================================

/// A query over one collection: a `$match` mapping or a list of stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MongoSource {
    pub database: String,
    pub collection: String,
    #[serde(default = "default_query")]
    pub query: JsonValue,
}

fn default_query() -> JsonValue {
    JsonValue::Object(JsonObject::new())
}

impl SourceModel for MongoSource {
    const MODEL_NAME: &'static str = "MongoSource";

    fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(Error::validation(Self::MODEL_NAME, "database must not be empty"));
        }
        if self.collection.trim().is_empty() {
            return Err(Error::validation(
                Self::MODEL_NAME,
                "collection must not be empty",
            ));
        }
        if !(self.query.is_object() || self.query.is_array()) {
            return Err(Error::validation(
                Self::MODEL_NAME,
                "query must be a mapping or a list of stages",
            ));
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
pub struct MongoParams {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssl: bool,
}

/// Connector over a MongoDB deployment
#[derive(Debug)]
pub struct MongoConnector {
    config: ConnectorConfig,
    params: MongoParams,
}

fn quote_plus(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

impl MongoConnector {
    /// Connection string, credentials percent-encoded
    pub fn uri(&self) -> String {
        let mut user_pass = String::new();
        if let Some(username) = &self.params.username {
            user_pass.push_str(&quote_plus(username));
            if let Some(password) = &self.params.password {
                user_pass.push(':');
                user_pass.push_str(&quote_plus(password));
            }
            user_pass.push('@');
        }
        format!("mongodb://{user_pass}{}:{}", self.params.host, self.params.port)
    }

    fn client(&self, server_selection_timeout: Option<u64>) -> Result<Client> {
        let mut options = Vec::new();
        if self.params.ssl {
            options.push("tls=true".to_string());
        }
        if let Some(ms) = server_selection_timeout {
            options.push(format!("serverSelectionTimeoutMS={ms}"));
        }
        let mut uri = self.uri();
        if !options.is_empty() {
            uri.push_str("/?");
            uri.push_str(&options.join("&"));
        }
        Ok(Client::with_uri_str(&uri)?)
    }

    fn validate_target(client: &Client, source: &MongoSource) -> Result<()> {
        let databases = client.list_database_names().run()?;
        if !databases.contains(&source.database) {
            return Err(Error::not_found("Database", &source.database));
        }
        let collections = client.database(&source.database).list_collection_names().run()?;
        if !collections.contains(&source.collection) {
            return Err(Error::not_found("Collection", &source.collection));
        }
        Ok(())
    }

    /// Query with permissions applied, then normalized into a pipeline
    fn pipeline(source: &DataSource<MongoSource>, permissions: Option<&str>) -> Result<Pipeline> {
        let condition = permissions
            .map(|p| permissions_condition(p, source))
            .transpose()?;
        let query = with_permissions(source.extension().query.clone(), condition);
        normalize_query(&query, source.parameters())
    }

    fn aggregate(&self, source: &MongoSource, pipeline: &Pipeline) -> Result<Vec<JsonValue>> {
        debug!(
            connector = self.name(),
            database = %source.database,
            collection = %source.collection,
            stages = pipeline.len(),
            "Running aggregation"
        );
        let client = self.client(None)?;
        Self::validate_target(&client, source)?;

        let stages = to_documents(pipeline)?;
        let cursor = client
            .database(&source.database)
            .collection::<Document>(&source.collection)
            .aggregate(stages)
            .run()?;

        let mut records = Vec::new();
        for document in cursor {
            records.push(Bson::Document(document?).into_relaxed_extjson());
        }
        Ok(records)
    }

    fn ping(&self) -> Result<()> {
        let client = self.client(Some(STATUS_TIMEOUT_MS))?;
        client.database("admin").run_command(doc! {"ping": 1}).run()?;
        Ok(())
    }
}

impl Connector for MongoConnector {
    type Source = MongoSource;
    type Params = MongoParams;
    const TYPE_NAME: &'static str = "MongoDB";
    const RETRY_ON: &'static [FailureKind] = &[FailureKind::Connection, FailureKind::Timeout];

    fn build(config: ConnectorConfig, params: MongoParams) -> Result<Self> {
        if params.password.is_some() && params.username.is_none() {
            return Err(Error::validation(Self::TYPE_NAME, "username must be set"));
        }
        if params.host.trim().is_empty() {
            return Err(Error::missing_field("host"));
        }
        Ok(Self { config, params })
    }

    fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    fn retrieve_data(&self, source: &DataSource<MongoSource>) -> Result<Table> {
        let pipeline = Self::pipeline(source, None)?;
        Table::from_records(self.aggregate(source.extension(), &pipeline)?)
    }

    /// Permissions become a `$match` condition instead of an in-memory filter
    fn get_df(
        &self,
        source: &DataSource<MongoSource>,
        permissions: Option<&str>,
    ) -> Result<Table> {
        if permissions.is_none() {
            return self.fetch(source);
        }
        let pipeline = Self::pipeline(source, permissions)?;
        let records = self.with_retry(|| self.aggregate(source.extension(), &pipeline))?;
        Table::from_records(records)
    }

    fn get_slice(
        &self,
        source: &DataSource<MongoSource>,
        permissions: Option<&str>,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<DataSlice> {
        if offset == 0 && limit.is_none() {
            let table = self.get_df(source, permissions)?;
            return Ok(DataSlice {
                total_count: table.len(),
                table,
            });
        }

        let facet = slice_pipeline(Self::pipeline(source, permissions)?, offset, limit);
        let records = self.with_retry(|| self.aggregate(source.extension(), &facet))?;
        read_facet(records.into_iter().next())
    }

    fn explain(
        &self,
        source: &DataSource<MongoSource>,
        permissions: Option<&str>,
    ) -> Result<Option<JsonValue>> {
        let ext = source.extension();
        let pipeline = Self::pipeline(source, permissions)?;
        let plan = self.with_retry(|| {
            let client = self.client(None)?;
            Self::validate_target(&client, ext)?;
            let command = doc! {
                "aggregate": ext.collection.as_str(),
                "pipeline": to_documents(&pipeline)?,
                "explain": true,
            };
            let result = client.database(&ext.database).run_command(command).run()?;
            Ok(Bson::Document(result).into_relaxed_extjson())
        })?;
        Ok(Some(summarize_explain(plan)))
    }

    fn get_status(&self) -> ConnectorStatus {
        let host = self.params.host.as_str();
        let port = self.params.port;
        let mut auth_failure = None;

        StatusChecks::new()
            .check("Hostname resolved", || check_hostname(host))
            .check("Port opened", || {
                check_port(host, port, Duration::from_millis(STATUS_TIMEOUT_MS))
            })
            .check("Host connection", || match self.ping() {
                Err(e) if is_auth_error(&e) => {
                    auth_failure = Some(e);
                    Ok(())
                }
                other => other,
            })
            .check("Authenticated", || auth_failure.map_or(Ok(()), Err))
            .finish()
    }
}

// ============================================================================
// Pipeline helpers
// ============================================================================

fn is_auth_error(error: &Error) -> bool {
    let Error::Mongo(error) = error else {
        return false;
    };
    match error.kind.as_ref() {
        ErrorKind::Authentication { .. } => true,
        ErrorKind::Command(command) => command.code == 18 || command.code == 13,
        _ => false,
    }
}

fn to_documents(pipeline: &Pipeline) -> Result<Vec<Document>> {
    pipeline
        .iter()
        .map(|stage| {
            mongodb::bson::to_document(stage)
                .map_err(|e| Error::decode(format!("invalid pipeline stage: {e}")))
        })
        .collect()
}

/// Render a permission expression and translate it to a `$match` condition
fn permissions_condition(permissions: &str, source: &DataSource<MongoSource>) -> Result<JsonValue> {
    let rendered = render_raw_permissions(permissions, source.parameters())?;
    Expr::parse(&rendered)?.to_mongo()
}

/// Combine a query with a permission condition.
///
/// A mapping query becomes `{"$and": [query, condition]}`; a pipeline gets a
/// trailing `$match` stage.
pub fn with_permissions(query: JsonValue, condition: Option<JsonValue>) -> JsonValue {
    let Some(condition) = condition else {
        return query;
    };
    match query {
        JsonValue::Object(_) => json!({"$and": [query, condition]}),
        JsonValue::Array(mut stages) => {
            stages.push(json!({"$match": condition}));
            JsonValue::Array(stages)
        }
        other => other,
    }
}

/// Wrap a pipeline in a `$facet` returning the window and the total count
pub fn slice_pipeline(pipeline: Pipeline, offset: usize, limit: Option<usize>) -> Pipeline {
    let stages: Vec<JsonValue> = pipeline.into_iter().map(JsonValue::Object).collect();

    let mut count = stages.clone();
    count.push(json!({"$count": "value"}));

    let mut window = stages;
    if offset > 0 {
        window.push(json!({"$skip": offset}));
    }
    if let Some(limit) = limit {
        window.push(json!({"$limit": limit}));
    }

    let mut facet = JsonObject::new();
    facet.insert(
        "$facet".to_string(),
        json!({"count": count, "df": window}),
    );
    vec![facet]
}

/// Read the single document produced by [`slice_pipeline`]
pub fn read_facet(document: Option<JsonValue>) -> Result<DataSlice> {
    let Some(JsonValue::Object(mut document)) = document else {
        return Err(Error::decode("$facet returned no document"));
    };
    let total_count = document
        .get("count")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("value"))
        .and_then(JsonValue::as_u64)
        .unwrap_or(0) as usize;
    let rows = match document.remove("df") {
        Some(JsonValue::Array(rows)) => rows,
        _ => Vec::new(),
    };
    Ok(DataSlice {
        table: Table::from_records(rows)?,
        total_count,
    })
}

/// `{details, summary}` from a raw aggregate explain
pub fn summarize_explain(plan: JsonValue) -> JsonValue {
    let mut details = plan;
    if let Some(object) = details.as_object_mut() {
        object.remove("serverInfo");
    }
    let summary = match details.get("executionStats") {
        Some(JsonValue::Object(stats)) => {
            let mut stats = stats.clone();
            stats.remove("executionStages");
            stats.remove("allPlansExecution");
            JsonValue::Object(stats)
        }
        _ => JsonValue::Null,
    };
    json!({"details": details, "summary": summary})
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::TcpListener;

    fn connector(params: JsonValue) -> Result<MongoConnector> {
        let mut config = json!({"name": "mongo", "type": "MongoDB"});
        if let (Some(config), JsonValue::Object(params)) = (config.as_object_mut(), params) {
            config.extend(params);
        }
        MongoConnector::from_value(config)
    }

    fn source(query: JsonValue, parameters: JsonValue) -> DataSource<MongoSource> {
        DataSource::from_value(json!({
            "domain": "sales",
            "name": "mongo",
            "database": "db",
            "collection": "sales",
            "query": query,
            "parameters": parameters,
        }))
        .unwrap()
    }

    #[test]
    fn test_password_requires_username() {
        let err = connector(json!({"host": "localhost", "port": 27017, "password": "x"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid MongoDB: username must be set");
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        assert!(connector(json!({"host": "localhost", "port": 27017, "tls": true})).is_err());
    }

    #[test]
    fn test_uri() {
        let plain = connector(json!({"host": "localhost", "port": 27017})).unwrap();
        assert_eq!(plain.uri(), "mongodb://localhost:27017");

        let user = connector(json!({"host": "h", "port": 1, "username": "ann"})).unwrap();
        assert_eq!(user.uri(), "mongodb://ann@h:1");

        let full = connector(json!({
            "host": "h", "port": 1, "username": "a@b", "password": "p ss/w"
        }))
        .unwrap();
        assert_eq!(full.uri(), "mongodb://a%40b:p+ss%2Fw@h:1");
    }

    #[test]
    fn test_source_defaults_and_validation() {
        let source: DataSource<MongoSource> = DataSource::from_value(json!({
            "domain": "d", "name": "n", "database": "db", "collection": "c"
        }))
        .unwrap();
        assert_eq!(source.extension().query, json!({}));

        assert!(DataSource::<MongoSource>::from_value(json!({
            "domain": "d", "name": "n", "database": "db", "collection": "c", "query": "x"
        }))
        .is_err());
    }

    #[test]
    fn test_pipeline_with_permissions_on_mapping() {
        let source = source(json!({"domain": "blah"}), json!({"country": "FR"}));
        let pipeline =
            MongoConnector::pipeline(&source, Some("country == '{{ country }}'")).unwrap();
        assert_eq!(
            JsonValue::Array(pipeline.into_iter().map(JsonValue::Object).collect()),
            json!([{"$match": {"$and": [
                {"domain": "blah"},
                {"country": {"$eq": "FR"}}
            ]}}])
        );
    }

    #[test]
    fn test_pipeline_with_permissions_on_stages() {
        let source = source(
            json!([{"$match": {"city": "%(city)s"}}, {"$sort": [{"a": 1}, {"b": -1}]}]),
            json!({"city": "Paris"}),
        );
        let pipeline = MongoConnector::pipeline(&source, Some("age > 18")).unwrap();
        assert_eq!(
            JsonValue::Array(pipeline.into_iter().map(JsonValue::Object).collect()),
            json!([
                {"$match": {"city": "Paris"}},
                {"$sort": {"a": 1, "b": -1}},
                {"$match": {"age": {"$gt": 18}}}
            ])
        );
    }

    #[test]
    fn test_with_permissions_without_condition() {
        assert_eq!(with_permissions(json!({"a": 1}), None), json!({"a": 1}));
    }

    #[test]
    fn test_slice_pipeline() {
        let pipeline = vec![json!({"$match": {"a": 1}}).as_object().cloned().unwrap()];
        let facet = slice_pipeline(pipeline.clone(), 5, Some(10));
        assert_eq!(
            JsonValue::Object(facet[0].clone()),
            json!({"$facet": {
                "count": [{"$match": {"a": 1}}, {"$count": "value"}],
                "df": [{"$match": {"a": 1}}, {"$skip": 5}, {"$limit": 10}],
            }})
        );

        let facet = slice_pipeline(pipeline, 0, Some(10));
        assert_eq!(
            facet[0]["$facet"]["df"],
            json!([{"$match": {"a": 1}}, {"$limit": 10}])
        );
    }

    #[test]
    fn test_read_facet() {
        let slice = read_facet(Some(json!({
            "count": [{"value": 3}],
            "df": [{"a": 1}],
        })))
        .unwrap();
        assert_eq!(slice.total_count, 3);
        assert_eq!(slice.table.len(), 1);

        let empty = read_facet(Some(json!({"count": [], "df": []}))).unwrap();
        assert_eq!(empty.total_count, 0);
        assert!(empty.table.is_empty());

        assert!(read_facet(None).is_err());
    }

    #[test]
    fn test_summarize_explain() {
        let plan = json!({
            "queryPlanner": {"winningPlan": {}},
            "executionStats": {
                "nReturned": 3,
                "executionStages": {},
                "allPlansExecution": [],
            },
            "serverInfo": {"host": "h"},
        });
        assert_eq!(
            summarize_explain(plan),
            json!({
                "details": {
                    "queryPlanner": {"winningPlan": {}},
                    "executionStats": {
                        "nReturned": 3,
                        "executionStages": {},
                        "allPlansExecution": [],
                    },
                },
                "summary": {"nReturned": 3},
            })
        );
    }

    #[test]
    fn test_status_unresolvable_host() {
        let connector = connector(json!({"host": "no-such-host.invalid", "port": 27017})).unwrap();
        let status = connector.get_status();
        assert_eq!(status.status, Some(false));
        assert_eq!(
            status.details,
            vec![
                ("Hostname resolved".to_string(), Some(false)),
                ("Port opened".to_string(), None),
                ("Host connection".to_string(), None),
                ("Authenticated".to_string(), None),
            ]
        );
        assert!(status.error.is_some());
    }

    #[test]
    fn test_status_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = connector(json!({"host": "127.0.0.1", "port": port})).unwrap();
        let status = connector.get_status();
        assert_eq!(status.details[0], ("Hostname resolved".to_string(), Some(true)));
        assert_eq!(status.details[1], ("Port opened".to_string(), Some(false)));
    }
}
