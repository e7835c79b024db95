//! GraphQL-over-HTTP connector
//!
//! POSTs a templated GraphQL request to an endpoint and turns the records found
//! at `records_path` (a JSON pointer into the response) into a table.

use crate::connector::{
    check_hostname, check_port, Connector, ConnectorConfig, ConnectorStatus, StatusChecks,
};
use crate::error::{Error, FailureKind, Result};
use crate::query::QueryTemplate;
use crate::source::{DataSource, SourceModel};
use crate::table::Table;
use crate::types::{JsonObject, JsonValue};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

fn default_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Descriptor
// ============================================================================

/// A GraphQL request body (`query`, `variables`, `operationName`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphQlSource {
    pub query: JsonObject,
    /// JSON pointer to the records, e.g. `/data/repository/issues/nodes`
    #[serde(default)]
    pub records_path: Option<String>,
}

impl SourceModel for GraphQlSource {
    const MODEL_NAME: &'static str = "GraphQlSource";

    fn validate(&self) -> Result<()> {
        match self.query.get("query") {
            Some(JsonValue::String(q)) if !q.trim().is_empty() => {}
            _ => {
                return Err(Error::validation(
                    Self::MODEL_NAME,
                    "query must hold a non-empty 'query' string",
                ))
            }
        }
        if let Some(path) = &self.records_path {
            if !path.is_empty() && !path.starts_with('/') {
                return Err(Error::validation(
                    Self::MODEL_NAME,
                    format!("records_path must be a JSON pointer starting with '/', got {path:?}"),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Request authentication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum GraphQlAuth {
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// Connection parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphQlParams {
    pub url: String,
    #[serde(default)]
    pub auth: Option<GraphQlAuth>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Connector over a GraphQL endpoint
#[derive(Debug)]
pub struct GraphQlConnector {
    config: ConnectorConfig,
    url: Url,
    auth: Option<GraphQlAuth>,
    timeout: Duration,
    headers: BTreeMap<String, String>,
}

impl GraphQlConnector {
    fn client(&self) -> Result<Client> {
        Ok(Client::builder()
            .timeout(self.timeout)
            .user_agent(format!("tabular-cdk/{}", env!("CARGO_PKG_VERSION")))
            .build()?)
    }

    fn request(&self, client: &Client, body: &JsonValue) -> RequestBuilder {
        let mut req = client.post(self.url.clone()).json(body);
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        match &self.auth {
            Some(GraphQlAuth::Basic { username, password }) => {
                req.basic_auth(username, Some(password))
            }
            Some(GraphQlAuth::Bearer { token }) => req.bearer_auth(token),
            None => req,
        }
    }

    fn send(&self, body: &JsonValue) -> Result<JsonValue> {
        let response = self
            .request(&self.client()?, body)
            .send()
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text()?;

        if !status.is_success() {
            return Err(Error::http_status(status.as_u16(), text));
        }

        serde_json::from_str(&text).map_err(|e| {
            error!(connector = self.name(), body = %text, "Could not decode response");
            Error::decode(format!("could not decode {text:?}: {e}"))
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::timeout(self.url.as_str(), self.timeout)
        } else {
            Error::Http(error)
        }
    }

    /// Request body with bound parameters substituted
    fn request_body(source: &DataSource<GraphQlSource>) -> JsonValue {
        let query = JsonValue::Object(source.extension().query.clone());
        match source.parameters() {
            Some(params) => QueryTemplate::new().apply(&query, params),
            None => query,
        }
    }
}

/// Records found in a GraphQL response.
///
/// Without a path, an array response is used as rows and a mapping as a
/// single row.
pub fn extract_records(payload: JsonValue, records_path: Option<&str>) -> Result<Vec<JsonValue>> {
    if let Some(errors) = payload.get("errors").and_then(JsonValue::as_array) {
        let has_data = payload.get("data").is_some_and(|d| !d.is_null());
        if !errors.is_empty() && !has_data {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(JsonValue::as_str)
                        .map_or_else(|| e.to_string(), ToString::to_string)
                })
                .collect();
            return Err(Error::query("GraphQL", messages.join("; ")));
        }
    }

    let records = match records_path.filter(|p| !p.is_empty()) {
        Some(path) => payload
            .pointer(path)
            .cloned()
            .ok_or_else(|| Error::decode(format!("records_path {path:?} not found in response")))?,
        None => payload,
    };

    match records {
        JsonValue::Array(rows) => Ok(rows),
        JsonValue::Null => Ok(Vec::new()),
        row @ JsonValue::Object(_) => Ok(vec![row]),
        other => Err(Error::decode(format!(
            "expected records to be a list or a mapping, got {other}"
        ))),
    }
}

impl Connector for GraphQlConnector {
    type Source = GraphQlSource;
    type Params = GraphQlParams;
    const TYPE_NAME: &'static str = "GraphQL";
    const RETRY_ON: &'static [FailureKind] =
        &[FailureKind::Timeout, FailureKind::Connection, FailureKind::Http];

    fn build(config: ConnectorConfig, params: GraphQlParams) -> Result<Self> {
        let url = Url::parse(&params.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidConfigValue {
                field: "url".to_string(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if params.timeout_secs == 0 {
            return Err(Error::InvalidConfigValue {
                field: "timeout_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            config,
            url,
            auth: params.auth,
            timeout: Duration::from_secs(params.timeout_secs),
            headers: params.headers,
        })
    }

    fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    fn retrieve_data(&self, source: &DataSource<GraphQlSource>) -> Result<Table> {
        let body = Self::request_body(source);
        debug!(connector = self.name(), url = %self.url, "Sending GraphQL request");
        let payload = self.send(&body)?;
        let records = extract_records(payload, source.extension().records_path.as_deref())?;
        Table::from_records(records)
    }

    fn get_status(&self) -> ConnectorStatus {
        let host = self.url.host_str().unwrap_or_default().to_string();
        let port = self.url.port_or_known_default().unwrap_or(443);
        let mut response_status = None;

        StatusChecks::new()
            .check("Hostname resolved", || check_hostname(&host))
            .check("Port opened", || check_port(&host, port, self.timeout))
            .check("Host connection", || {
                let body = json!({"query": "{ __typename }"});
                let response = self.request(&self.client()?, &body).send()?;
                response_status = Some(response.status());
                Ok(())
            })
            .check("Authenticated", || match response_status {
                Some(status)
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
                {
                    Err(Error::http_status(status.as_u16(), "authentication rejected"))
                }
                _ => Ok(()),
            })
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(server: &MockServer, extra: JsonValue) -> GraphQlConnector {
        let mut config = json!({
            "name": "github",
            "url": format!("{}/graphql", server.uri()),
        });
        if let (Some(config), JsonValue::Object(extra)) = (config.as_object_mut(), extra) {
            config.extend(extra);
        }
        GraphQlConnector::from_value(config).unwrap()
    }

    fn source() -> DataSource<GraphQlSource> {
        DataSource::from_value(json!({
            "domain": "issues",
            "name": "github",
            "parameters": {"owner": "rust-lang", "first": 2},
            "query": {
                "query": "query($owner: String!, $first: Int!) { repository(owner: $owner) { issues(first: $first) { nodes { number title } } } }",
                "variables": {"owner": "%(owner)s", "first": "%(first)s"},
            },
            "records_path": "/data/repository/issues/nodes",
        }))
        .unwrap()
    }

    fn issues() -> JsonValue {
        json!({"data": {"repository": {"issues": {"nodes": [
            {"number": 1, "title": "first"},
            {"number": 2, "title": "second"},
        ]}}}})
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retrieve_records_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({"variables": {"owner": "rust-lang", "first": 2}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(issues()))
            .expect(1)
            .mount(&server)
            .await;

        let connector = connector(&server, json!({"auth": {"type": "bearer", "token": "secret"}}));
        let table = tokio::task::spawn_blocking(move || connector.get_df(&source(), None))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(table.columns(), &["number", "title"]);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_basic_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(issues()))
            .expect(1)
            .mount(&server)
            .await;

        let connector = connector(
            &server,
            json!({"auth": {"type": "basic", "username": "user", "password": "pass"}}),
        );
        let slice = tokio::task::spawn_blocking(move || connector.get_slice(&source(), None, 1, None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(slice.total_count, 2);
        assert_eq!(slice.table.rows()[0]["title"], json!("second"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(issues()))
            .expect(1)
            .mount(&server)
            .await;

        let connector = connector(&server, json!({"retry_policy": {"max_attempts": 3}}));
        let table = tokio::task::spawn_blocking(move || connector.get_df(&source(), None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let connector = connector(&server, json!({}));
        let connector = GraphQlConnector {
            config: connector.config.clone().with_retry_policy(RetryPolicy::attempts(3)),
            ..connector
        };
        let err = tokio::task::spawn_blocking(move || connector.get_df(&source(), None))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 400: bad request");
        assert_eq!(err.kind(), FailureKind::Query);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(issues())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let url = format!("{}/graphql", server.uri());
        let connector = connector(&server, json!({"timeout_secs": 1}));
        let err = tokio::task::spawn_blocking(move || connector.get_df(&source(), None))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(
            err.to_string(),
            format!("Request to '{url}' timed out after 1000ms")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let connector = connector(&server, json!({}));
        let err = tokio::task::spawn_blocking(move || connector.get_df(&source(), None))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Decode);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_reports_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let connector = connector(&server, json!({"auth": {"type": "bearer", "token": "bad"}}));
        let status = tokio::task::spawn_blocking(move || connector.get_status())
            .await
            .unwrap();
        assert_eq!(status.status, Some(false));
        assert_eq!(
            status.details,
            vec![
                ("Hostname resolved".to_string(), Some(true)),
                ("Port opened".to_string(), Some(true)),
                ("Host connection".to_string(), Some(true)),
                ("Authenticated".to_string(), Some(false)),
            ]
        );
    }

    #[test]
    fn test_extract_records() {
        assert_eq!(
            extract_records(issues(), Some("/data/repository/issues/nodes"))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(extract_records(json!([{"a": 1}]), None).unwrap().len(), 1);
        assert_eq!(extract_records(json!({"a": 1}), None).unwrap(), vec![json!({"a": 1})]);
        assert!(extract_records(issues(), Some("/data/missing")).is_err());

        let err = extract_records(
            json!({"data": null, "errors": [{"message": "Bad credentials"}]}),
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Query on 'GraphQL' failed: Bad credentials");
    }

    #[test]
    fn test_build_validation() {
        let build = |params: JsonValue| {
            let mut config = json!({"name": "g"});
            if let (Some(config), JsonValue::Object(params)) = (config.as_object_mut(), params) {
                config.extend(params);
            }
            GraphQlConnector::from_value(config)
        };
        assert!(build(json!({"url": "not a url"})).is_err());
        assert!(build(json!({"url": "ftp://example.com"})).is_err());
        assert!(build(json!({"url": "https://example.com", "timeout_secs": 0})).is_err());
        assert!(build(json!({"url": "https://example.com", "auth": {"type": "digest"}})).is_err());
        assert!(build(json!({"url": "https://example.com"})).is_ok());
    }

    #[test]
    fn test_source_requires_query_string() {
        assert!(DataSource::<GraphQlSource>::from_value(json!({
            "domain": "d", "name": "n", "query": {"variables": {}}
        }))
        .is_err());
        assert!(DataSource::<GraphQlSource>::from_value(json!({
            "domain": "d", "name": "n", "query": {"query": "{ a }"}, "records_path": "data"
        }))
        .is_err());
    }
}
