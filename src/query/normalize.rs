//! Pipeline normalization

use super::params::nosql_apply_parameters_to_query;
use crate::error::{Error, Result};
use crate::types::{JsonObject, Parameters};
use serde_json::Value;

/// An ordered sequence of stages
pub type Pipeline = Vec<JsonObject>;

/// Resolve parameters and turn a query into a pipeline.
///
/// A single mapping becomes `[{"$match": mapping}]`; a list of stages keeps
/// its order. A `$sort` given as a list of one-key mappings is folded into a
/// single ordered mapping.
pub fn normalize_query(query: &Value, params: Option<&Parameters>) -> Result<Pipeline> {
    let resolved = nosql_apply_parameters_to_query(query, params);

    let mut pipeline = match resolved {
        Value::Object(filter) => {
            let mut stage = JsonObject::new();
            stage.insert("$match".to_string(), Value::Object(filter));
            vec![stage]
        }
        Value::Array(stages) => stages
            .into_iter()
            .enumerate()
            .map(|(i, stage)| match stage {
                Value::Object(stage) => Ok(stage),
                other => Err(Error::validation(
                    "query",
                    format!("stage {i} must be a mapping, got {other}"),
                )),
            })
            .collect::<Result<Pipeline>>()?,
        other => {
            return Err(Error::validation(
                "query",
                format!("expected a mapping or a list of stages, got {other}"),
            ))
        }
    };

    for stage in &mut pipeline {
        if let Some(Value::Array(keys)) = stage.get("$sort") {
            let ordered = fold_sort_keys(keys)?;
            stage.insert("$sort".to_string(), Value::Object(ordered));
        }
    }

    Ok(pipeline)
}

/// `[{"a": 1}, {"b": -1}]` -> `{"a": 1, "b": -1}`
fn fold_sort_keys(keys: &[Value]) -> Result<JsonObject> {
    let mut ordered = JsonObject::new();
    for key in keys {
        let Value::Object(entry) = key else {
            return Err(Error::validation(
                "query",
                format!("$sort entries must be mappings, got {key}"),
            ));
        };
        for (field, direction) in entry {
            ordered.insert(field.clone(), direction.clone());
        }
    }
    Ok(ordered)
}
