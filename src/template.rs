//! Template interpolation for permission filters
//!
//! Handles `{{ variable }}` interpolation of raw permission expressions
//! against a data source's parameters, e.g.
//! `country == '{{ user.country }}'` with `{"user": {"country": "France"}}`.

use crate::error::{Error, Result};
use crate::types::Parameters;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}").unwrap()
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Data source parameters
    pub parameters: Value,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from data source parameters
    pub fn with_parameters(parameters: Option<&Parameters>) -> Self {
        Self {
            parameters: parameters.cloned().map_or(Value::Null, Value::Object),
        }
    }

    /// Get a value by dotted path (e.g., "user.country")
    pub fn get(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested_value(&self.parameters, &parts)
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        match current {
            Value::Object(map) => {
                current = map.get(*part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut result = template.to_string();
    let mut errors = Vec::new();

    for cap in TEMPLATE_REGEX.captures_iter(template) {
        let full_match = cap.get(0).unwrap().as_str();
        let var_path = cap.get(1).unwrap().as_str();

        match ctx.get(var_path) {
            Some(value) => {
                let replacement = value_to_string(value);
                result = result.replace(full_match, &replacement);
            }
            None => {
                errors.push(var_path.to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(Error::undefined_var(errors.join(", ")))
    }
}

/// Render raw permissions against data source parameters
pub fn render_raw_permissions(permissions: &str, parameters: Option<&Parameters>) -> Result<String> {
    if !has_templates(permissions) {
        return Ok(permissions.to_string());
    }
    render(permissions, &TemplateContext::with_parameters(parameters))
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Extract all variable names from a template
pub fn extract_variables(template: &str) -> Vec<String> {
    TEMPLATE_REGEX
        .captures_iter(template)
        .map(|cap| cap.get(1).unwrap().as_str().to_string())
        .collect()
}

/// Convert a JSON value to a string for template substitution
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // For complex types, use JSON serialization
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
