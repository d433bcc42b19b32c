//! Declared handler parameters, query parsing and type coercion.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
    Array,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamKind::Str => "string",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Bool => "bool",
            ParamKind::Array => "array",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<String>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[String]> {
        match self {
            ParamValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Str(s) => Value::from(s.as_str()),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Float(f) => Value::from(*f),
            ParamValue::Bool(b) => Value::from(*b),
            ParamValue::Array(items) => Value::from(items.clone()),
        }
    }
}

/// One parameter a handler declares at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<ParamValue>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, value: ParamValue) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    #[error("missing required parameter `{name}` for `{handler}`")]
    MissingParameter { handler: String, name: String },

    #[error("parameter `{name}` for `{handler}` is not a valid {expected}")]
    InvalidType {
        handler: String,
        name: String,
        expected: ParamKind,
    },
}

/// A raw input value: a single string, or a list from `name[]` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawParam {
    Single(String),
    Many(Vec<String>),
}

/// Percent-decoded query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, RawParam>);

impl QueryParams {
    /// Repeated plain keys keep the last value; `name[]` keys accumulate.
    pub fn parse(query: &str) -> Self {
        let mut params = BTreeMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.strip_suffix("[]") {
                Some(base) => {
                    let entry = params
                        .entry(base.to_string())
                        .or_insert_with(|| RawParam::Many(Vec::new()));
                    if let RawParam::Single(_) = entry {
                        *entry = RawParam::Many(Vec::new());
                    }
                    if let RawParam::Many(items) = entry {
                        items.push(value.into_owned());
                    }
                }
                None => {
                    params.insert(key.into_owned(), RawParam::Single(value.into_owned()));
                }
            }
        }
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&RawParam> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let map = self
            .0
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    RawParam::Single(s) => Value::from(s.as_str()),
                    RawParam::Many(items) => Value::from(items.clone()),
                };
                (k.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Convert a raw value to the declared kind.
///
/// Integers accept any finite numeric string and truncate fractions;
/// booleans accept true/false/yes/no/on/off/1/0, and other numbers read as
/// `false`.
pub fn coerce(kind: ParamKind, raw: &RawParam) -> Option<ParamValue> {
    match (kind, raw) {
        (ParamKind::Array, RawParam::Many(items)) => Some(ParamValue::Array(items.clone())),
        (_, RawParam::Many(_)) | (ParamKind::Array, RawParam::Single(_)) => None,
        (ParamKind::Str, RawParam::Single(s)) => Some(ParamValue::Str(s.clone())),
        (ParamKind::Int, RawParam::Single(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Some(ParamValue::Int(i)),
            Err(_) => parse_number(s).map(|f| ParamValue::Int(f.trunc() as i64)),
        },
        (ParamKind::Float, RawParam::Single(s)) => parse_number(s).map(ParamValue::Float),
        (ParamKind::Bool, RawParam::Single(s)) => {
            let lowered = s.trim().to_ascii_lowercase();
            match lowered.as_str() {
                "1" | "true" | "yes" | "on" => Some(ParamValue::Bool(true)),
                "0" | "false" | "no" | "off" => Some(ParamValue::Bool(false)),
                other => parse_number(other).map(|_| ParamValue::Bool(false)),
            }
        }
    }
}

/// Bind every declared parameter, route parameters first, then query.
pub fn bind(
    handler: &str,
    specs: &[ParamSpec],
    route_params: &BTreeMap<String, String>,
    query: &QueryParams,
) -> Result<BTreeMap<String, ParamValue>, BindingError> {
    let mut bound = BTreeMap::new();

    for spec in specs {
        let raw = route_params
            .get(&spec.name)
            .map(|v| RawParam::Single(v.clone()))
            .or_else(|| query.get(&spec.name).cloned());

        let value = match raw {
            Some(raw) => coerce(spec.kind, &raw).ok_or_else(|| BindingError::InvalidType {
                handler: handler.to_string(),
                name: spec.name.clone(),
                expected: spec.kind,
            })?,
            None if spec.required => {
                return Err(BindingError::MissingParameter {
                    handler: handler.to_string(),
                    name: spec.name.clone(),
                })
            }
            None => match &spec.default {
                Some(default) => default.clone(),
                None => continue,
            },
        };

        bound.insert(spec.name.clone(), value);
    }

    Ok(bound)
}
