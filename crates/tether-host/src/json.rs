//! JSON interop for data-only values.

use serde_json::{Map, Number};

use crate::value::{Mapping, Value};

impl Value {
    /// Build a value from JSON. Objects keep their key order as produced by
    /// `serde_json` (sorted unless its `preserve_order` feature is on).
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.as_str(), Value::from_json(v)))
                    .collect::<Mapping>(),
            ),
        }
    }

    /// Convert to JSON. `None` if the value (or anything inside it) has
    /// identity; undefined and non-finite numbers become `null`.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string_lossy()),
            Value::Array(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Option<Vec<_>>>()?,
            ),
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, value) in map.iter() {
                    out.insert(key.to_string_lossy(), value.to_json()?);
                }
                serde_json::Value::Object(out)
            }
            Value::Reference(_) | Value::Symbol(_) | Value::Closure(_) | Value::OnceClosure(_) => {
                return None
            }
        })
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}
