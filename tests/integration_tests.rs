//! Integration tests
//!
//! Tests the full end-to-end flow: project file → registry → connector →
//! permissions and slicing → table / Parquet output

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs::{self, File};
use tabular_cdk::config::{Project, ProjectFile};
use tabular_cdk::connector::{Connector, ConnectorRegistry};
use tabular_cdk::connectors::{DuckDbConnector, DuckDbSource};
use tabular_cdk::query::{handle_missing_params, normalize_query};
use tabular_cdk::table::{table_to_record_batch, write_parquet};
use tabular_cdk::{DataSource, FailureKind, Parameters};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn params(value: serde_json::Value) -> Parameters {
    value.as_object().cloned().unwrap()
}

// ============================================================================
// Query templates
// ============================================================================

#[test]
fn test_prune_then_substitute() {
    let query = json!({
        "domain": "blah",
        "country": {"$ne": "%(country)s"},
        "city": "%(city)s",
    });
    let city = params(json!({"city": "Paris"}));

    assert_eq!(
        handle_missing_params(&query, &city),
        json!({"domain": "blah", "country": {}, "city": "%(city)s"})
    );

    let pipeline = normalize_query(&query, Some(&city)).unwrap();
    assert_eq!(
        json!(pipeline),
        json!([{"$match": {"domain": "blah", "country": {}, "city": "Paris"}}])
    );
}

// ============================================================================
// DuckDB end to end
// ============================================================================

fn seed_database(dir: &tempfile::TempDir) -> String {
    let database = dir.path().join("warehouse.duckdb");
    let database = database.to_str().unwrap().to_string();

    let seeder = DuckDbConnector::from_value(json!({
        "name": "seeder",
        "database": database,
        "init_sql": "CREATE TABLE sales (city VARCHAR, country VARCHAR, amount DOUBLE); \
            INSERT INTO sales VALUES \
            ('Paris', 'FR', 10.5), ('Lyon', 'FR', 3.0), ('Berlin', 'DE', 7.25), ('Paris', 'FR', 1.0);",
    }))
    .unwrap();
    let probe: DataSource<DuckDbSource> = DataSource::from_value(json!({
        "domain": "probe",
        "name": "seeder",
        "query": "SELECT COUNT(*) AS n FROM sales",
    }))
    .unwrap();
    let table = seeder.get_df(&probe, None).unwrap();
    assert_eq!(table.rows()[0]["n"], json!(4));
    database
}

#[test]
fn test_duckdb_project_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let database = seed_database(&dir);

    let project_path = dir.path().join("project.yaml");
    fs::write(
        &project_path,
        format!(
            r"
connectors:
  - type: DuckDB
    name: warehouse
    database: {database}
    read_only: true
    retry_policy:
      max_attempts: 2

data_sources:
  - domain: sales
    name: warehouse
    parameters:
      country: FR
    query: SELECT city, amount FROM sales WHERE country = %(country)s ORDER BY amount DESC
"
        ),
    )
    .unwrap();

    let registry = ConnectorRegistry::with_builtin().unwrap();
    let project = Project::load(&project_path, &registry).unwrap();
    let (connector, entry) = project.source("sales").unwrap();

    let slice = connector
        .get_slice(entry.descriptor.clone(), Some("city == 'Paris'"), 0, Some(1))
        .unwrap();
    assert_eq!(slice.total_count, 2);
    assert_eq!(slice.table.rows()[0]["amount"], json!(10.5));

    let full = connector.get_df(entry.descriptor.clone(), None).unwrap();
    assert_eq!(full.len(), 3);

    let output = dir.path().join("exports").join("sales.parquet");
    assert_eq!(write_parquet(&full, &output).unwrap(), 3);

    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&output).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let rows: usize = reader.map(|batch| batch.unwrap().num_rows()).sum();
    assert_eq!(rows, 3);

    let batch = table_to_record_batch(&full).unwrap();
    assert_eq!(batch.num_columns(), 2);
}

#[test]
fn test_duckdb_missing_table_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let database = seed_database(&dir);

    let connector = DuckDbConnector::from_value(json!({
        "name": "warehouse",
        "database": database,
        "read_only": true,
        "retry_policy": {"max_attempts": 5},
    }))
    .unwrap();
    let source: DataSource<DuckDbSource> = DataSource::from_value(json!({
        "domain": "missing",
        "name": "warehouse",
        "query": "SELECT * FROM refunds",
    }))
    .unwrap();

    let err = connector.get_df(&source, None).unwrap_err();
    assert_eq!(err.kind(), FailureKind::NotFound);
    assert_eq!(err.to_string(), "Table \"refunds\" doesn't exist");
}

// ============================================================================
// GraphQL end to end
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_graphql_project_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"login": "octo"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {"repositories": {"nodes": [
                {"name": "alpha", "stars": 12, "private": false},
                {"name": "beta", "stars": 3, "private": true},
                {"name": "gamma", "stars": 40, "private": false},
            ]}}}
        })))
        .mount(&server)
        .await;

    let file = ProjectFile {
        connectors: vec![json!({
            "type": "GraphQL",
            "name": "github",
            "url": format!("{}/graphql", server.uri()),
            "auth": {"type": "bearer", "token": "t0k3n"},
        })],
        data_sources: vec![json!({
            "domain": "repos",
            "name": "github",
            "parameters": {"login": "octo"},
            "query": {
                "query": "query($login: String!) { user(login: $login) { repositories { nodes { name stars private } } } }",
                "variables": {"login": "%(login)s"},
            },
            "records_path": "/data/user/repositories/nodes",
        })],
    };

    let slice = tokio::task::spawn_blocking(move || {
        let registry = ConnectorRegistry::with_builtin()?;
        let project = Project::from_file(file, &registry)?;
        let (connector, entry) = project.source("repos")?;
        connector.get_slice(entry.descriptor.clone(), Some("not private"), 1, None)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(slice.total_count, 2);
    assert_eq!(slice.table.len(), 1);
    assert_eq!(slice.table.rows()[0]["name"], json!("gamma"));
}
