use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Dynamic value type for node parameters and port payloads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    /// Build an object payload from key/value pairs
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Json(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Json(j) => j.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Json(j) => j.as_bool(),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a field of an object-shaped value
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(key).cloned(),
            Value::Json(serde_json::Value::Object(map)) => map.get(key).cloned().map(Value::from),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Json(serde_json::Value::Null))
    }

    /// Whether this value may travel along a connector as a port payload.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Json(serde_json::Value::Object(_)))
    }

    /// Convert into plain JSON, dropping the type tags used by serde
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Json(j) => j.clone(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(map: HashMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

/// Plain JSON is mapped structurally, so `{"a": 1}` becomes an `Object`
/// rather than an opaque `Json` blob.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// What a node produced on one output port during one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum PortValue {
    /// The branch was taken and carries a payload downstream.
    Taken(Value),
    /// The branch was not taken; connectors from this port never fire.
    NotTaken,
}

impl PortValue {
    pub fn as_taken(&self) -> Option<&Value> {
        match self {
            PortValue::Taken(value) => Some(value),
            PortValue::NotTaken => None,
        }
    }

    pub fn is_taken(&self) -> bool {
        matches!(self, PortValue::Taken(_))
    }
}

/// Output ports of one node execution, keyed by port name.
///
/// Ports missing from the map are treated exactly like `NotTaken`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutputs {
    pub ports: BTreeMap<String, PortValue>,
}

impl NodeOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `value` on `port`
    pub fn take(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ports.insert(port.into(), PortValue::Taken(value.into()));
        self
    }

    /// Explicitly mark `port` as not taken
    pub fn skip(mut self, port: impl Into<String>) -> Self {
        self.ports.insert(port.into(), PortValue::NotTaken);
        self
    }

    pub fn taken_value(&self, port: &str) -> Option<&Value> {
        self.ports.get(port).and_then(PortValue::as_taken)
    }

    /// Iterate over ports that carry a payload
    pub fn taken(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.ports
            .iter()
            .filter_map(|(port, value)| value.as_taken().map(|v| (port.as_str(), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
