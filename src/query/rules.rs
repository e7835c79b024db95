//! Collapse rules for binary operator expressions

use crate::types::Parameters;
use serde_json::Value;

/// Sentinel marking a deliberately empty operand in the pipeline dialect
pub const VOID_SENTINEL: &str = "__VOID__";

/// Decides whether a whole `key: value` clause should be dropped during pruning.
///
/// Rules are consulted before the value itself is walked, so a rule can remove
/// an expression that would otherwise only lose one of its operands.
pub trait CollapseRule: Send + Sync + std::fmt::Debug {
    /// Return `true` to drop the clause `key: value` entirely
    fn collapses(&self, key: &str, value: &Value, params: &Parameters) -> bool;
}

/// Collapses `$op: [a, b]` when one operand is the [`VOID_SENTINEL`].
///
/// Only operator keys (starting with `$`) holding exactly two elements are
/// affected. Unresolved placeholders are not void: they only lose their own
/// element, so `{"$in": ["France", "%(other)s"]}` keeps `["France"]`.
#[derive(Debug, Clone, Default)]
pub struct VoidOperandRule;

impl CollapseRule for VoidOperandRule {
    fn collapses(&self, key: &str, value: &Value, _params: &Parameters) -> bool {
        if !key.starts_with('$') {
            return false;
        }
        let Value::Array(operands) = value else {
            return false;
        };
        operands.len() == 2 && operands.iter().any(|o| o.as_str() == Some(VOID_SENTINEL))
    }
}
