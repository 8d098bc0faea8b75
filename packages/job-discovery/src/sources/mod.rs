//! Concrete source adapters.
//!
//! Both adapters accept either a bare JSON array of records or an object
//! wrapping the array under one of [`RECORD_KEYS`].

pub mod http;
pub mod json_file;

pub use http::HttpJsonSource;
pub use json_file::JsonFileSource;

use serde_json::Value;

use crate::error::{SourceError, SourceResult};
use crate::types::raw::RawRecord;

/// Envelope keys searched for the record array.
pub const RECORD_KEYS: &[&str] = &["jobs", "results", "data", "items"];

/// Pull the record array out of a payload.
pub fn extract_records(payload: Value) -> SourceResult<Vec<RawRecord>> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => RECORD_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| {
                SourceError::InvalidPayload(format!(
                    "object without a record array under any of {:?}",
                    RECORD_KEYS
                ))
            })?,
        other => {
            return Err(SourceError::InvalidPayload(format!(
                "expected an array of records, got {}",
                kind_of(&other)
            )))
        }
    };

    Ok(items.into_iter().map(RawRecord::from_value).collect())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_array_and_envelope() {
        assert_eq!(extract_records(json!([{"id": 1}, {"id": 2}])).unwrap().len(), 2);
        assert_eq!(extract_records(json!({"results": [{"id": 1}]})).unwrap().len(), 1);
    }

    #[test]
    fn test_non_array_payload_is_rejected() {
        assert!(matches!(
            extract_records(json!({"count": 3})),
            Err(SourceError::InvalidPayload(_))
        ));
        assert!(matches!(
            extract_records(json!("nope")),
            Err(SourceError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_non_object_items_pass_through() {
        // the normalizer reports these as malformed, the adapter does not judge
        let records = extract_records(json!([1, {"id": "a"}])).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].fields().is_none());
    }
}
