// Helper functions for extracting values from KDL nodes

use kdl::KdlNode;

use crate::{ConfigError, ConfigResult};

pub(crate) fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

pub(crate) fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

/// First positional string argument, or an error naming `field`.
pub(crate) fn required_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

/// First positional argument as an integer of at least 1.
pub(crate) fn positive_integer(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value = get_first_integer_arg(node)
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?;

    if value < 1 || value > u64::MAX as i128 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be a positive integer, got {}", value),
        });
    }
    Ok(value as u64)
}
