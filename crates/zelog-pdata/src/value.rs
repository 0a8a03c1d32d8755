//! Tagged attribute values and insertion-ordered attribute maps.

use std::fmt;

/// A log attribute or body value.
///
/// Maps may nest arbitrarily; a string body may itself contain a
/// serialized JSON object that callers re-parse on demand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Map(AttributeMap),
    Slice(Vec<Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Str(String::new())
    }
}

impl Value {
    /// Textual form of the value.
    ///
    /// Strings render verbatim, scalars through their display form, and
    /// maps and slices as their JSON serialization.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => format_double(*d),
            Value::Bool(b) => b.to_string(),
            Value::Map(_) | Value::Slice(_) => self.to_json().to_string(),
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&AttributeMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Converts into a `serde_json::Value`.
    ///
    /// Map keys come out sorted: `serde_json::Map` is backed by a BTreeMap,
    /// which is what makes the serialized form canonical for hashing.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Map(m) => m.to_json(),
            Value::Slice(vals) => {
                serde_json::Value::Array(vals.iter().map(Value::to_json).collect())
            }
        }
    }

    /// Builds a `Value` from parsed JSON.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Str(String::new()),
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Double(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(arr) => {
                Value::Slice(arr.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(obj) => {
                let mut map = AttributeMap::new();
                for (k, v) in obj {
                    map.insert(k.clone(), Value::from_json(v));
                }
                Value::Map(map)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

// Doubles keep their shortest round-trip form; integral doubles still get
// a trailing ".0" stripped to match the usual attribute text rendering.
fn format_double(d: f64) -> String {
    let mut s = format!("{d}");
    if s.ends_with(".0") {
        s.truncate(s.len() - 2);
    }
    s
}

/// An insertion-ordered string→`Value` map.
///
/// Attribute maps are small, so lookups are linear scans. Inserting an
/// existing key replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    entries: Vec<(String, Value)>,
}

impl AttributeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Convenience for string attributes.
    pub fn insert_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, Value::Str(value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Canonical (sorted-key) JSON form of the map.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (k, v) in &self.entries {
            obj.insert(k.clone(), v.to_json());
        }
        serde_json::Value::Object(obj)
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Value); N]> for AttributeMap {
    fn from(entries: [(K, Value); N]) -> Self {
        let mut map = AttributeMap::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        map
    }
}
