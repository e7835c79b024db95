//! Query template engine
//!
//! Resolves `%(name)s` placeholders in tree-shaped queries (a single filter
//! mapping, or an ordered pipeline of stage mappings).
//!
//! # Overview
//!
//! - [`handle_missing_params`] prunes every clause whose placeholder has no
//!   bound parameter, so incomplete filters relax instead of matching nothing.
//! - [`apply_parameters`] substitutes bound placeholders, keeping the JSON type
//!   of the parameter when the placeholder is the whole string.
//! - [`normalize_query`] does both and turns the result into a pipeline.
//! - [`bind_sql_parameters`] turns placeholders in a SQL string into positional
//!   bind parameters.
//!
//! Clause collapsing for binary operators is pluggable through
//! [`CollapseRule`]; the pipeline dialect installs [`VoidOperandRule`].

mod normalize;
mod params;
mod rules;
mod sql;

pub use normalize::{normalize_query, Pipeline};
pub use params::{
    apply_parameters, handle_missing_params, has_placeholders, nosql_apply_parameters_to_query,
    placeholder_names, QueryTemplate,
};
pub use rules::{CollapseRule, VoidOperandRule, VOID_SENTINEL};
pub use sql::bind_sql_parameters;
