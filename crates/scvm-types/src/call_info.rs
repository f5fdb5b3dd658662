//! Call payloads and their argument values.
//!
//! Arguments are decoded from JSON into a tagged union that keeps the
//! integer/float distinction of the original text. A singleton object
//! `{"_bignum": "<decimal>"}` is an arbitrary-precision integer.

use crate::error::TypesError;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key marking a bignum literal.
pub const BIGNUM_KEY: &str = "_bignum";

/// A script argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    BigNum(String),
}

impl Value {
    /// Converts a parsed JSON value, keeping numeric kinds.
    pub fn from_json(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some((k, serde_json::Value::String(s))) = map.iter().next() {
                        if k.eq_ignore_ascii_case(BIGNUM_KEY) {
                            return Value::BigNum(s.clone());
                        }
                    }
                }
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Null => serializer.serialize_unit(),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
            Value::BigNum(s) => {
                let mut m = serializer.serialize_map(Some(1))?;
                m.serialize_entry(BIGNUM_KEY, s)?;
                m.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

/// Function name plus arguments of a contract call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallInfo {
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
    #[serde(rename = "Args", alias = "args", default, deserialize_with = "nullable_args")]
    pub args: Vec<Value>,
}

fn nullable_args<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Array(items) => Ok(items.into_iter().map(Value::from_json).collect()),
        other => Err(de::Error::custom(format!("args must be an array, got {}", other))),
    }
}

impl CallInfo {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self { name: name.into(), args }
    }

    /// Decodes a call payload. An empty payload is an empty call.
    pub fn from_payload(payload: &[u8]) -> Result<Self, TypesError> {
        if payload.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(payload).map_err(|e| TypesError::InvalidCallInfo(e.to_string()))
    }

    /// JSON array of the arguments as sent to the worker.
    pub fn args_json(&self) -> Result<String, TypesError> {
        Ok(serde_json::to_string(&self.args)?)
    }
}

/// Decodes a JSON argument list. Empty input means no arguments.
pub fn decode_args(json: &[u8]) -> Result<Vec<Value>, TypesError> {
    if json.is_empty() {
        return Ok(Vec::new());
    }
    let parsed: serde_json::Value =
        serde_json::from_slice(json).map_err(|e| TypesError::InvalidCallInfo(e.to_string()))?;
    match Value::from_json(parsed) {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        _ => Err(TypesError::InvalidCallInfo("arguments must be an array".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_keep_kind() {
        let args = decode_args(br#"[1, 2.5, -3, 1e2, 18446744073709551615]"#).unwrap();
        assert_eq!(args[0], Value::Int(1));
        assert_eq!(args[1], Value::Float(2.5));
        assert_eq!(args[2], Value::Int(-3));
        assert_eq!(args[3], Value::Float(100.0));
        assert!(matches!(args[4], Value::Float(_)));
    }

    #[test]
    fn test_bignum_literal() {
        let args = decode_args(br#"[{"_bignum":"123456789012345678901234567890"}, {"_bignum":"1","x":2}]"#).unwrap();
        assert_eq!(args[0], Value::BigNum("123456789012345678901234567890".to_string()));
        assert!(matches!(args[1], Value::Object(_)));
        assert_eq!(
            serde_json::to_string(&args[0]).unwrap(),
            r#"{"_bignum":"123456789012345678901234567890"}"#
        );
    }

    #[test]
    fn test_call_info_payload() {
        let ci = CallInfo::from_payload(br#"{"Name":"add","Args":[1,2]}"#).unwrap();
        assert_eq!(ci.name, "add");
        assert_eq!(ci.args, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(ci.args_json().unwrap(), "[1,2]");

        let lower = CallInfo::from_payload(br#"{"name":"inc","args":null}"#).unwrap();
        assert_eq!(lower.name, "inc");
        assert!(lower.args.is_empty());

        assert_eq!(CallInfo::from_payload(b"").unwrap(), CallInfo::default());
        assert!(CallInfo::from_payload(b"{bad").is_err());
    }

    #[test]
    fn test_decode_args_rejects_object() {
        assert!(decode_args(br#"{"a":1}"#).is_err());
        assert!(decode_args(b"").unwrap().is_empty());
    }

    #[test]
    fn test_object_keys_sorted() {
        let args = decode_args(br#"[{"b":1,"a":true}]"#).unwrap();
        assert_eq!(serde_json::to_string(&args).unwrap(), r#"[{"a":true,"b":1}]"#);
    }
}
