//! Helpers for picking fields out of loosely typed JSON.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::FeedError;

pub(crate) fn read_json(path: &Path) -> Result<Value, FeedError> {
    let raw = fs::read_to_string(path).map_err(|source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// The top-level array of an export.
pub(crate) fn entries<'a>(document: &'a Value, what: &str) -> Result<&'a [Value], FeedError> {
    document
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| FeedError::Shape(format!("{what} document must be a JSON array")))
}

/// A string or number field rendered as a string. Ids are numeric in some
/// exports and strings in others.
pub(crate) fn scalar(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key)?.as_str().map(str::to_string)
}

/// `status == "VALID"` marks an active account.
pub(crate) fn is_valid_status(object: &Map<String, Value>) -> Option<bool> {
    scalar(object, "status").map(|status| status == "VALID")
}

/// Member ids from an array of objects, reading `key` from each.
pub(crate) fn member_ids(object: &Map<String, Value>, field: &str, key: &str) -> Option<Vec<String>> {
    let members = object.get(field)?.as_array()?;
    Some(
        members
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|member| scalar(member, key))
            .collect(),
    )
}
