use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One copy of a game's authoritative row.
///
/// The contents are opaque to this crate: whatever the realtime feed or the
/// state store hands over is forwarded verbatim to the listener.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameSnapshot(Value);

impl GameSnapshot {
    pub fn new(record: Value) -> Self {
        Self(record)
    }

    /// Borrow the raw record
    pub fn record(&self) -> &Value {
        &self.0
    }

    /// Take the raw record
    pub fn into_record(self) -> Value {
        self.0
    }

    /// Look up a top-level field, rendered as a string for filter matching.
    ///
    /// Strings are returned without quotes; numbers and booleans use their
    /// JSON text. Objects, arrays and null yield `None`.
    pub fn field_as_string(&self, column: &str) -> Option<String> {
        match self.0.get(column)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<Value> for GameSnapshot {
    fn from(record: Value) -> Self {
        Self(record)
    }
}
