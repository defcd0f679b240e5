use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot of a project's stage settings taken once at run start.
///
/// Treated as opaque key/value data except for the `enabled` flag of the
/// sections named by stage `config_key`s.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrozenConfig(Map<String, Value>);

impl FrozenConfig {
    pub fn new(entries: Map<String, Value>) -> Self {
        Self(entries)
    }

    /// Non-object snapshots are treated as empty
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The explicit `enabled` flag of a section, if one was recorded
    pub fn section_enabled(&self, key: &str) -> Option<bool> {
        self.0.get(key)?.get("enabled")?.as_bool()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Value> for FrozenConfig {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}
