//! Placeholder binding for SQL strings

use super::params::{placeholder_names, PLACEHOLDER_REGEX};
use crate::error::{Error, Result};
use crate::types::Parameters;
use serde_json::Value;

/// Replace every `%(name)s` in `sql` with a positional `?` and collect the
/// bound values in order.
///
/// SQL cannot be pruned safely, so an unbound placeholder is an error.
pub fn bind_sql_parameters(sql: &str, params: Option<&Parameters>) -> Result<(String, Vec<Value>)> {
    let names = placeholder_names(sql);
    if names.is_empty() {
        return Ok((sql.to_string(), Vec::new()));
    }

    let mut values = Vec::with_capacity(names.len());
    for name in names {
        let value = params
            .and_then(|p| p.get(name))
            .ok_or_else(|| Error::undefined_var(name))?;
        values.push(value.clone());
    }

    let rewritten = PLACEHOLDER_REGEX.replace_all(sql, "?").into_owned();

    Ok((rewritten, values))
}
