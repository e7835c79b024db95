// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]

//! # Tabular Connector Development Kit
//!
//! A pluggable data-access layer: connectors adapt document databases, SQL
//! engines and GraphQL APIs into one tabular result, behind a shared contract
//! for retries, permission filtering and slicing.
//!
//! ## Features
//!
//! - **Query templates**: `%(name)s` placeholders, with clauses pruned when
//!   their parameter is not bound
//! - **Retry policies**: attempt and time bounds, failure-kind filtering, fixed wait
//! - **Validated descriptors**: closed-schema data source descriptions
//! - **Permissions**: row filter expressions rendered against parameters
//! - **Arrow output**: RecordBatch conversion and Parquet export
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabular_cdk::connector::Connector;
//! use tabular_cdk::connectors::{DuckDbConnector, DuckDbSource};
//! use tabular_cdk::source::DataSource;
//!
//! let connector = DuckDbConnector::from_value(serde_json::json!({
//!     "name": "warehouse",
//!     "database": "warehouse.duckdb",
//!     "retry_policy": {"max_attempts": 3},
//! }))?;
//!
//! let source = DataSource::from_value(serde_json::json!({
//!     "domain": "sales",
//!     "name": "warehouse",
//!     "parameters": {"city": "Paris"},
//!     "query": "SELECT * FROM sales WHERE city = %(city)s",
//! }))?;
//!
//! let slice = connector.get_slice(&source, Some("amount > 10"), 0, Some(50))?;
//! println!("{} of {} rows", slice.table.len(), slice.total_count);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Connector contract                         │
//! │  get_df() → Table   get_slice() → DataSlice   explain/status    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │  Query   │   Retry   │  Descriptor   │  Table    │ Connectors  │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Pipeline │ Attempts  │ Common fields │ Filter    │ MongoDB     │
//! │ SQL bind │ Max delay │ Extension     │ Slice     │ DuckDB      │
//! │ VOID rule│ Retry-on  │ Setters       │ Parquet   │ GraphQL     │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types and failure classification
pub mod error;

/// Common types and type aliases
pub mod types;

/// `{{ }}` template rendering for permissions
pub mod template;

/// Query templates and parameter substitution
pub mod query;

/// Retry policies
pub mod retry;

/// Data source descriptors
pub mod source;

/// Tabular results, row filters and Arrow/Parquet output
pub mod table;

/// Connector contract and registry
pub mod connector;

/// Built-in connectors
pub mod connectors;

/// Project files
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{Connector, ConnectorConfig, ConnectorRegistry, DataSlice, DynConnector};
pub use error::{Error, FailureKind, Result};
pub use retry::RetryPolicy;
pub use source::{DataSource, SourceModel};
pub use table::Table;
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
