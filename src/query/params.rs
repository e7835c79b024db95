//! Placeholder pruning and substitution

use super::rules::{CollapseRule, VoidOperandRule};
use crate::template::value_to_string;
use crate::types::Parameters;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Regex for matching placeholders: %(name)s
pub(crate) static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\(([A-Za-z_][A-Za-z0-9_]*)\)s").unwrap());

/// Regex for a string that is exactly one placeholder
static SOLE_PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%\(([A-Za-z_][A-Za-z0-9_]*)\)s$").unwrap());

/// Names of all placeholders in a string, in order of appearance
pub fn placeholder_names(s: &str) -> Vec<&str> {
    PLACEHOLDER_REGEX
        .captures_iter(s)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Whether any string (key or value) inside `value` carries a placeholder
pub fn has_placeholders(value: &Value) -> bool {
    match value {
        Value::String(s) => PLACEHOLDER_REGEX.is_match(s),
        Value::Array(items) => items.iter().any(has_placeholders),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| PLACEHOLDER_REGEX.is_match(k) || has_placeholders(v)),
        _ => false,
    }
}

fn has_missing_placeholder(s: &str, params: &Parameters) -> bool {
    placeholder_names(s)
        .into_iter()
        .any(|name| !params.contains_key(name))
}

/// Parameter resolution with a configurable set of collapse rules
#[derive(Debug, Default)]
pub struct QueryTemplate {
    rules: Vec<Box<dyn CollapseRule>>,
}

impl QueryTemplate {
    /// Template engine without any collapse rule
    pub fn new() -> Self {
        Self::default()
    }

    /// Template engine for the staged pipeline dialect (`$match`, `$sort`...)
    pub fn pipeline() -> Self {
        Self::new().with_rule(VoidOperandRule)
    }

    /// Add a collapse rule
    #[must_use]
    pub fn with_rule(mut self, rule: impl CollapseRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Drop every clause that references a parameter missing from `params`.
    ///
    /// Returns `Value::Null` if `query` itself is a string with a missing
    /// placeholder. Mappings emptied by pruning are kept in place.
    pub fn handle_missing_params(&self, query: &Value, params: &Parameters) -> Value {
        self.prune(query, params).unwrap_or(Value::Null)
    }

    /// Prune missing parameters, then substitute the bound ones
    pub fn apply(&self, query: &Value, params: &Parameters) -> Value {
        apply_parameters(&self.handle_missing_params(query, params), params)
    }

    fn prune(&self, value: &Value, params: &Parameters) -> Option<Value> {
        match value {
            Value::String(s) => {
                if has_missing_placeholder(s, params) {
                    None
                } else {
                    Some(value.clone())
                }
            }
            Value::Object(map) => {
                let mut pruned = serde_json::Map::with_capacity(map.len());
                for (key, v) in map {
                    if has_missing_placeholder(key, params) {
                        continue;
                    }
                    if self.rules.iter().any(|r| r.collapses(key, v, params)) {
                        continue;
                    }
                    if let Some(v) = self.prune(v, params) {
                        pruned.insert(key.clone(), v);
                    }
                }
                Some(Value::Object(pruned))
            }
            Value::Array(items) => Some(Value::Array(
                items.iter().filter_map(|v| self.prune(v, params)).collect(),
            )),
            _ => Some(value.clone()),
        }
    }
}

/// Drop clauses with unresolved placeholders using the pipeline dialect rules
pub fn handle_missing_params(query: &Value, params: &Parameters) -> Value {
    QueryTemplate::pipeline().handle_missing_params(query, params)
}

/// Substitute bound placeholders.
///
/// A string that is exactly `%(name)s` is replaced by the parameter value
/// itself (numbers stay numbers, lists stay lists). Placeholders embedded in
/// longer strings are rendered as text. Unbound placeholders are left as-is.
pub fn apply_parameters(query: &Value, params: &Parameters) -> Value {
    match query {
        Value::String(s) => {
            if let Some(cap) = SOLE_PLACEHOLDER_REGEX.captures(s) {
                if let Some(value) = params.get(&cap[1]) {
                    return value.clone();
                }
            }
            Value::String(render_placeholders(s, params))
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (render_placeholders(k, params), apply_parameters(v, params)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| apply_parameters(v, params))
                .collect(),
        ),
        _ => query.clone(),
    }
}

/// Prune then substitute, with the pipeline dialect rules
pub fn nosql_apply_parameters_to_query(query: &Value, params: Option<&Parameters>) -> Value {
    let empty = Parameters::new();
    QueryTemplate::pipeline().apply(query, params.unwrap_or(&empty))
}

fn render_placeholders(s: &str, params: &Parameters) -> String {
    PLACEHOLDER_REGEX
        .replace_all(s, |cap: &regex::Captures<'_>| match params.get(&cap[1]) {
            Some(value) => value_to_string(value),
            None => cap[0].to_string(),
        })
        .into_owned()
}
