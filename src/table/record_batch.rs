//! Table to Arrow conversion
//!
//! Column types are inferred from the values they hold. Nested arrays and
//! objects are kept as their JSON text.

use super::frame::Table;
use crate::error::{Error, Result};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, NullArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use serde_json::Value;
use std::sync::Arc;

/// Convert a table to an Arrow RecordBatch, keeping column order
pub fn table_to_record_batch(table: &Table) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns().len());

    for name in table.columns() {
        let values: Vec<Option<&Value>> = table
            .rows()
            .iter()
            .map(|row| row.get(name).filter(|v| !v.is_null()))
            .collect();

        let data_type = values
            .iter()
            .flatten()
            .map(|v| infer_type(v))
            .fold(DataType::Null, |acc, t| merge_types(&acc, &t));

        arrays.push(build_array(&values, &data_type));
        fields.push(Field::new(name, data_type, true));
    }

    // Rows without any column still count
    let options = RecordBatchOptions::new().with_row_count(Some(table.len()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
        .map_err(|e| Error::output(format!("Failed to create RecordBatch: {e}")))
}

fn infer_type(value: &Value) -> DataType {
    match value {
        Value::Null => DataType::Null,
        Value::Bool(_) => DataType::Boolean,
        Value::Number(n) if n.is_i64() => DataType::Int64,
        Value::Number(_) => DataType::Float64,
        Value::String(_) | Value::Array(_) | Value::Object(_) => DataType::Utf8,
    }
}

fn merge_types(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (a, b) if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        _ => DataType::Utf8,
    }
}

fn build_array(values: &[Option<&Value>], data_type: &DataType) -> ArrayRef {
    match data_type {
        DataType::Null => Arc::new(NullArray::new(values.len())),
        DataType::Boolean => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(Value::as_bool))
                .collect::<BooleanArray>(),
        ),
        DataType::Int64 => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(Value::as_i64))
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(Value::as_f64))
                .collect::<Float64Array>(),
        ),
        _ => Arc::new(
            values
                .iter()
                .map(|v| {
                    v.map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                })
                .collect::<StringArray>(),
        ),
    }
}
