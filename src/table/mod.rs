//! Tabular results
//!
//! Every connector returns a [`Table`]: ordered columns and JSON-valued rows.
//!
//! # Overview
//!
//! This module provides:
//! - `Table` - the uniform result with slicing and row filtering
//! - `Expr` - the boolean row-filter language used for permissions
//! - Arrow RecordBatch conversion and Parquet export

mod record_batch;
mod filter;
mod frame;
mod writer;

pub use record_batch::table_to_record_batch;
pub use filter::{CmpOp, Expr, Operand};
pub use frame::Table;
pub use writer::write_parquet;

#[cfg(test)]
mod tests;
