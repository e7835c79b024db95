//! Connector contract
//!
//! Defines the lifecycle every connector shares:
//!
//! ```text
//! DataSource ──► get_df ──► [retry] retrieve_data ──► permissions ──► Table
//!                  │
//!                  └──► get_slice ──► DataSlice { table, total_count }
//! ```
//!
//! Concrete connectors only implement [`Connector::build`] and
//! [`Connector::retrieve_data`]; retry, permission filtering and slicing are
//! layered on top. The [`ConnectorRegistry`] builds type-erased connectors
//! from configuration.

mod contract;
mod registry;
mod status;

pub use contract::{apply_permissions, Connector, ConnectorConfig, DataSlice};
pub use registry::{ConnectorRegistry, DynConnector};
pub use status::{check_hostname, check_port, ConnectorStatus, StatusChecks};
