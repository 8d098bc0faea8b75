//! Raw records as handed over by source adapters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One untyped record from a source adapter.
///
/// The shape is source-specific; the normalizer looks fields up under
/// several spellings. Non-object payloads are kept so that one bad element
/// only drops itself, not the batch it arrived in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Value);

impl Default for RawRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl RawRecord {
    /// Create an empty object record.
    pub fn new() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Wrap an arbitrary JSON value.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Set a field (builder style). Ignored if the record is not an object.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.0 {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Field map, if this record is an object.
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    /// First value under any of `keys` that is neither null nor a blank string.
    pub fn lookup(&self, keys: &[&str]) -> Option<&Value> {
        let map = self.fields()?;
        keys.iter().filter_map(|k| map.get(*k)).find(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
    }

    /// First non-blank scalar under any of `keys`, rendered as a trimmed string.
    pub fn lookup_text(&self, keys: &[&str]) -> Option<String> {
        let map = self.fields()?;
        keys.iter().filter_map(|k| map.get(*k)).find_map(|v| {
            let text = match v {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            (!text.is_empty()).then_some(text)
        })
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
