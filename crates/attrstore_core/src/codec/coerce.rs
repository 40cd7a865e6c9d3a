//! Raw input coercion into canonical attribute values.
//!
//! # Invariants
//! - `null` coerces to an explicit null for every type.
//! - An empty string is an explicit null for every non-string type.
//! - Coercion never produces a variant that differs from the requested type.

use super::{CoercionError, DisallowedValueError};
use crate::model::value::{AttrType, AttrValue, Slot};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as Json;

const TRUE_TOKENS: &[&str] = &["1", "t", "true", "y", "yes", "on"];
const FALSE_TOKENS: &[&str] = &["0", "f", "false", "n", "no", "off"];
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const MAX_RAW_CHARS: usize = 64;
const RFC3339_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Coerces `raw` into the canonical representation of `attr_type`.
///
/// # Errors
/// - Returns `CoercionError` when `raw` cannot be interpreted as `attr_type`.
pub fn coerce(attribute: &str, raw: &Json, attr_type: AttrType) -> Result<Slot, CoercionError> {
    let fail = || CoercionError {
        attribute: attribute.to_string(),
        attr_type,
        raw: summarize_raw(raw),
    };

    if raw.is_null() {
        return Ok(None);
    }
    if let Json::String(text) = raw {
        if text.is_empty() && !matches!(attr_type, AttrType::String | AttrType::Text) {
            return Ok(None);
        }
    }

    let value = match attr_type {
        AttrType::Boolean => coerce_boolean(raw).map(AttrValue::Boolean),
        AttrType::Integer => coerce_integer(raw).map(AttrValue::Integer),
        AttrType::Float => coerce_float(raw).map(AttrValue::Float),
        AttrType::String => coerce_string(raw).map(AttrValue::String),
        AttrType::Text => coerce_string(raw).map(AttrValue::Text),
        AttrType::DateTime => coerce_datetime(raw).map(AttrValue::DateTime),
    };

    value.map(Some).ok_or_else(fail)
}

/// Checks `value` against an optional allowed set.
///
/// Explicit nulls are never checked.
pub fn validate_allowed(
    attribute: &str,
    value: &Slot,
    allowed: Option<&[AttrValue]>,
) -> Result<(), DisallowedValueError> {
    let (Some(value), Some(allowed)) = (value, allowed) else {
        return Ok(());
    };
    if allowed.contains(value) {
        return Ok(());
    }
    Err(DisallowedValueError {
        attribute: attribute.to_string(),
        value: value.to_string(),
    })
}

fn coerce_boolean(raw: &Json) -> Option<bool> {
    match raw {
        Json::Bool(value) => Some(*value),
        Json::Number(number) => match number.as_f64() {
            Some(value) if value == 1.0 => Some(true),
            Some(value) if value == 0.0 => Some(false),
            _ => None,
        },
        Json::String(text) => {
            let token = text.trim().to_ascii_lowercase();
            if TRUE_TOKENS.contains(&token.as_str()) {
                Some(true)
            } else if FALSE_TOKENS.contains(&token.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn coerce_integer(raw: &Json) -> Option<i64> {
    match raw {
        Json::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(integral_f64)),
        Json::String(text) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral_f64))
        }
        _ => None,
    }
}

fn integral_f64(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn coerce_float(raw: &Json) -> Option<f64> {
    let value = match raw {
        Json::Number(number) => number.as_f64()?,
        Json::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn coerce_string(raw: &Json) -> Option<String> {
    match raw {
        Json::String(text) => Some(text.clone()),
        Json::Number(number) => Some(number.to_string()),
        Json::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

fn coerce_datetime(raw: &Json) -> Option<DateTime<Utc>> {
    let value = match raw {
        Json::Number(number) => number.as_i64().and_then(DateTime::from_timestamp_millis)?,
        Json::String(text) => parse_datetime(text.trim())?,
        _ => return None,
    };
    // RFC 3339 output is only readable back for four-digit years.
    RFC3339_YEARS.contains(&value.year()).then_some(value)
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

fn summarize_raw(raw: &Json) -> String {
    let text = match raw {
        Json::String(value) => value.clone(),
        other => other.to_string(),
    };
    let mut truncated = text.chars().take(MAX_RAW_CHARS).collect::<String>();
    if text.chars().count() > MAX_RAW_CHARS {
        truncated.push_str("...");
    }
    truncated
}
