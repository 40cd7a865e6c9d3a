//! Attribute value model.
//!
//! # Responsibility
//! - Define the closed set of attribute types a store schema may declare.
//! - Define the canonical in-memory representation for every type.
//!
//! # Invariants
//! - An `AttrValue` variant always matches the `AttrType` it was coerced to.
//! - `Slot = None` is an explicit null and shadows defaults like any value.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::{Display, Formatter};

/// Supported attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    Boolean,
    String,
    Integer,
    /// Long-form string; stored exactly like `String`.
    Text,
    Float,
    DateTime,
}

impl AttrType {
    /// Stable type token used by schema declarations.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Float => "float",
            Self::DateTime => "datetime",
        }
    }

    /// Parses a type token. Returns `None` for unsupported tokens.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Some(Self::Boolean),
            "string" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "text" => Some(Self::Text),
            "float" => Some(Self::Float),
            "datetime" => Some(Self::DateTime),
            _ => None,
        }
    }
}

impl Display for AttrType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Boolean(bool),
    String(String),
    Integer(i64),
    Text(String),
    Float(f64),
    DateTime(DateTime<Utc>),
}

/// One resolved attribute slot. `None` is an explicit null.
pub type Slot = Option<AttrValue>;

impl AttrValue {
    /// Returns the attribute type this value belongs to.
    pub fn attr_type(&self) -> AttrType {
        match self {
            Self::Boolean(_) => AttrType::Boolean,
            Self::String(_) => AttrType::String,
            Self::Integer(_) => AttrType::Integer,
            Self::Text(_) => AttrType::Text,
            Self::Float(_) => AttrType::Float,
            Self::DateTime(_) => AttrType::DateTime,
        }
    }

    /// Truthiness used by the `k?` accessor form.
    ///
    /// - Boolean: the value itself
    /// - Integer/Float: non-zero
    /// - String/Text: non-blank
    /// - DateTime: always true
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Boolean(value) => *value,
            Self::Integer(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::String(value) | Self::Text(value) => !value.trim().is_empty(),
            Self::DateTime(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string payload of `String` and `Text` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) | Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    /// Storage representation inside an encoded blob.
    ///
    /// Datetimes use RFC 3339 with automatic sub-second precision and a `Z`
    /// suffix so formatting a parsed value reproduces the same text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Boolean(value) => serde_json::Value::Bool(*value),
            Self::String(value) | Self::Text(value) => serde_json::Value::String(value.clone()),
            Self::Integer(value) => serde_json::Value::from(*value),
            Self::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::DateTime(value) => {
                serde_json::Value::String(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl From<AttrValue> for serde_json::Value {
    fn from(value: AttrValue) -> Self {
        value.to_json()
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::String(value) | Self::Text(value) => f.write_str(value),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::DateTime(value) => {
                f.write_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}
