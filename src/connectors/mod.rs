//! Built-in connectors
//!
//! | Type      | Datastore                      | Permissions        |
//! |-----------|--------------------------------|--------------------|
//! | `MongoDB` | aggregation pipelines          | pushed as `$match` |
//! | `DuckDB`  | SQL over a file or `:memory:`  | filtered in memory |
//! | `GraphQL` | GraphQL over HTTP              | filtered in memory |

mod duckdb;
mod graphql;
mod mongo;

pub use self::duckdb::{duckdb_value_to_json, DuckDbConnector, DuckDbParams, DuckDbSource};
pub use self::graphql::{extract_records, GraphQlAuth, GraphQlConnector, GraphQlParams, GraphQlSource};
pub use self::mongo::{
    read_facet, slice_pipeline, summarize_explain, with_permissions, MongoConnector, MongoParams,
    MongoSource,
};
