//! Typed access to the raw parameter bag supplied by the host.
//!
//! The bag is a flat JSON object. `RawParams` checks the key set once and
//! then hands out individual values; `null` is treated as absent everywhere.

use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Every key the task accepts.
pub const PARAMETER_NAMES: &[&str] = &[
    "method",
    "url",
    "params",
    "data",
    "json",
    "headers",
    "cookies",
    "files",
    "username",
    "password",
    "timeout",
    "allow_redirects",
    "proxies",
    "verify",
    "stream",
    "cert_key",
    "cert_file",
];

/// A validated view over the host's parameter object.
#[derive(Debug, Clone, Copy)]
pub struct RawParams<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> RawParams<'a> {
    pub fn new(raw: &'a Value) -> Result<Self, ValidationError> {
        let map = raw.as_object().ok_or(ValidationError::NotAnObject)?;
        if let Some(unknown) = map
            .keys()
            .find(|k| !PARAMETER_NAMES.contains(&k.as_str()))
        {
            return Err(ValidationError::UnsupportedParameter(unknown.clone()));
        }
        Ok(Self { map })
    }

    /// The value for `name`, with `null` folded into `None`.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name).filter(|v| !v.is_null())
    }

    pub fn string(&self, name: &'static str) -> Result<Option<&'a str>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(ValidationError::invalid(
                name,
                format!("expected a string, got {}", type_name(other)),
            )),
        }
    }

    /// A boolean flag, accepting the usual YAML-ish spellings in strings.
    pub fn flag(&self, name: &'static str, default: bool) -> Result<bool, ValidationError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => as_flag(v).ok_or_else(|| {
                ValidationError::invalid(name, format!("{v} is not a valid boolean"))
            }),
        }
    }
}

pub(crate) fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "on" | "1" => Some(true),
            "no" | "n" | "false" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Render a scalar the way it would appear in a query string or header.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
