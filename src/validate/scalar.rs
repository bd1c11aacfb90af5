//! Scalar coercion and constraint checks.
//!
//! Coercion only happens when it is unambiguous (`"12"` → `12`,
//! `"true"` → `true`, `3.0` → `3`). Every violated constraint on one value
//! yields its own issue.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;

use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::warn;

use crate::ir::{Format, Scalar, ScalarType};
use crate::issue::{Issue, IssueCode, PathSegment};

static UUID_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").expect("static regex")
});
static DECIMAL_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("static regex"));
static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$").expect("static regex")
});
static URI_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:[^\s]+$").expect("static regex"));
static HOSTNAME_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$").expect("static regex")
});

/// Declared patterns are compiled once per process.
static PATTERNS: Lazy<Mutex<HashMap<String, Option<Regex>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub fn check(scalar: &Scalar, value: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) -> Option<Value> {
    let coerced = match coerce(scalar.ty, value) {
        Ok(v) => v,
        Err(code) => {
            let detail = match code {
                IssueCode::FormatInvalid => format!("is not a valid {}", scalar.ty),
                _ => format!("expected {}, got {}", scalar.ty, json_kind(value)),
            };
            issues.push(
                Issue::new(code, path.to_vec(), detail).with_meta("expected", scalar.ty.as_str()),
            );
            return None;
        }
    };

    let before = issues.len();
    if scalar.ty.is_length_bounded() {
        check_length(scalar, &coerced, path, issues);
    } else if scalar.ty.is_numeric() {
        check_range(scalar, &coerced, path, issues);
    }
    if let Some(format) = scalar.format {
        check_format(format, &coerced, path, issues);
    }
    if let Some(pattern) = &scalar.pattern {
        check_pattern(pattern, &coerced, path, issues);
    }
    (issues.len() == before).then_some(coerced)
}

pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Convert `value` into the canonical JSON form of `ty`.
pub fn coerce(ty: ScalarType, value: &Value) -> Result<Value, IssueCode> {
    let mismatch = Err(IssueCode::TypeMismatch);
    match ty {
        ScalarType::String => match value {
            Value::String(_) => Ok(value.clone()),
            _ => mismatch,
        },
        ScalarType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(json!(f as i64)),
                _ => mismatch,
            },
            Value::String(s) => s.trim().parse::<i64>().map(|i| json!(i)).or(mismatch),
            _ => mismatch,
        },
        ScalarType::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(json!(f)),
                _ => mismatch,
            },
            _ => mismatch,
        },
        ScalarType::Decimal => match value {
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::String(s) if DECIMAL_RX.is_match(s.trim()) => Ok(Value::String(s.trim().to_owned())),
            _ => mismatch,
        },
        ScalarType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => mismatch,
            },
            _ => mismatch,
        },
        ScalarType::Date => {
            let s = value.as_str().ok_or(IssueCode::TypeMismatch)?;
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| IssueCode::FormatInvalid)
        }
        ScalarType::DateTime => {
            let s = value.as_str().ok_or(IssueCode::TypeMismatch)?;
            DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::String(dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                .map_err(|_| IssueCode::FormatInvalid)
        }
        ScalarType::Time => {
            let s = value.as_str().ok_or(IssueCode::TypeMismatch)?;
            NaiveTime::parse_from_str(s, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                .map(|t| Value::String(t.format("%H:%M:%S").to_string()))
                .map_err(|_| IssueCode::FormatInvalid)
        }
        ScalarType::Uuid => {
            let s = value.as_str().ok_or(IssueCode::TypeMismatch)?;
            if UUID_RX.is_match(s) { Ok(Value::String(s.to_ascii_lowercase())) } else { Err(IssueCode::FormatInvalid) }
        }
        ScalarType::Binary => {
            let s = value.as_str().ok_or(IssueCode::TypeMismatch)?;
            base64::engine::general_purpose::STANDARD
                .decode(s)
                .map(|_| value.clone())
                .map_err(|_| IssueCode::FormatInvalid)
        }
    }
}

fn check_length(scalar: &Scalar, value: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) {
    let Some(s) = value.as_str() else { return };
    let len = s.chars().count() as f64;
    if let Some(min) = scalar.min.filter(|m| len < *m) {
        issues.push(
            Issue::new(IssueCode::LengthTooShort, path.to_vec(), format!("must be at least {min} characters"))
                .with_meta("min", min),
        );
    }
    if let Some(max) = scalar.max.filter(|m| len > *m) {
        issues.push(
            Issue::new(IssueCode::LengthTooLong, path.to_vec(), format!("must be at most {max} characters"))
                .with_meta("max", max),
        );
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn check_range(scalar: &Scalar, value: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) {
    let Some(n) = numeric_value(value) else { return };
    if let Some(min) = scalar.min.filter(|m| n < *m) {
        issues.push(
            Issue::new(IssueCode::ValueTooSmall, path.to_vec(), format!("must be greater than or equal to {min}"))
                .with_meta("min", min),
        );
    }
    if let Some(max) = scalar.max.filter(|m| n > *m) {
        issues.push(
            Issue::new(IssueCode::ValueTooLarge, path.to_vec(), format!("must be less than or equal to {max}"))
                .with_meta("max", max),
        );
    }
}

fn check_format(format: Format, value: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) {
    let ok = match (format, value) {
        (Format::Int32, Value::Number(n)) => n.as_i64().is_some_and(|i| i32::try_from(i).is_ok()),
        (Format::Int64, Value::Number(n)) => n.as_i64().is_some(),
        (Format::Email, Value::String(s)) => EMAIL_RX.is_match(s),
        (Format::Uri, Value::String(s)) => URI_RX.is_match(s),
        (Format::Uuid, Value::String(s)) => UUID_RX.is_match(s),
        (Format::Hostname, Value::String(s)) => s.len() <= 253 && HOSTNAME_RX.is_match(s),
        (Format::Ipv4, Value::String(s)) => s.parse::<Ipv4Addr>().is_ok(),
        (Format::Ipv6, Value::String(s)) => s.parse::<Ipv6Addr>().is_ok(),
        _ => true,
    };
    if !ok {
        issues.push(
            Issue::new(IssueCode::FormatInvalid, path.to_vec(), format!("is not a valid {}", format.as_str()))
                .with_meta("format", format.as_str()),
        );
    }
}

fn check_pattern(pattern: &str, value: &Value, path: &[PathSegment], issues: &mut Vec<Issue>) {
    let Some(s) = value.as_str() else { return };
    let mut cache = match PATTERNS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let rx = cache.entry(pattern.to_owned()).or_insert_with(|| {
        Regex::new(pattern)
            .map_err(|e| warn!(%pattern, error = %e, "ignoring invalid pattern"))
            .ok()
    });
    if let Some(rx) = rx {
        if !rx.is_match(s) {
            issues.push(
                Issue::new(IssueCode::PatternMismatch, path.to_vec(), format!("must match {pattern}"))
                    .with_meta("pattern", pattern),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Param;

    fn run(param: Param, value: Value) -> (Option<Value>, Vec<Issue>) {
        let mut issues = Vec::new();
        let out = check(param.scalar_def().unwrap(), &value, &[], &mut issues);
        (out, issues)
    }

    #[test]
    fn unambiguous_coercions() {
        assert_eq!(coerce(ScalarType::Integer, &json!("42")), Ok(json!(42)));
        assert_eq!(coerce(ScalarType::Integer, &json!(3.0)), Ok(json!(3)));
        assert_eq!(coerce(ScalarType::Integer, &json!(3.5)), Err(IssueCode::TypeMismatch));
        assert_eq!(coerce(ScalarType::Boolean, &json!("false")), Ok(json!(false)));
        assert_eq!(coerce(ScalarType::Float, &json!("2.5")), Ok(json!(2.5)));
        assert_eq!(coerce(ScalarType::Decimal, &json!(10.25)), Ok(json!("10.25")));
        assert_eq!(coerce(ScalarType::String, &json!(5)), Err(IssueCode::TypeMismatch));
    }

    #[test]
    fn temporal_values_are_normalized() {
        assert_eq!(coerce(ScalarType::Date, &json!("2024-02-29")), Ok(json!("2024-02-29")));
        assert_eq!(coerce(ScalarType::Date, &json!("2023-02-29")), Err(IssueCode::FormatInvalid));
        assert_eq!(
            coerce(ScalarType::DateTime, &json!("2024-01-01T12:00:00+02:00")),
            Ok(json!("2024-01-01T10:00:00Z")),
        );
        assert_eq!(coerce(ScalarType::Time, &json!("09:30")), Ok(json!("09:30:00")));
    }

    #[test]
    fn every_violated_constraint_is_reported() {
        let (out, issues) = run(Param::string().min(5.0).format(Format::Email), json!("a@b"));
        assert!(out.is_none());
        let codes: Vec<_> = issues.iter().map(|i| i.code).collect();
        assert_eq!(codes, [IssueCode::LengthTooShort, IssueCode::FormatInvalid]);
    }

    #[test]
    fn int32_format_and_max_both_fire() {
        let (_, issues) = run(Param::integer().max(10.0).format(Format::Int32), json!(5_000_000_000i64));
        let codes: Vec<_> = issues.iter().map(|i| i.code).collect();
        assert_eq!(codes, [IssueCode::ValueTooLarge, IssueCode::FormatInvalid]);
    }

    #[test]
    fn pattern_is_checked() {
        let (out, issues) = run(Param::string().pattern("^[a-z]+$"), json!("abc"));
        assert_eq!(out, Some(json!("abc")));
        assert!(issues.is_empty());
        let (_, issues) = run(Param::string().pattern("^[a-z]+$"), json!("ABC"));
        assert_eq!(issues[0].code, IssueCode::PatternMismatch);
    }

    #[test]
    fn binary_must_be_base64() {
        assert!(coerce(ScalarType::Binary, &json!("aGVsbG8=")).is_ok());
        assert_eq!(coerce(ScalarType::Binary, &json!("not base64!")), Err(IssueCode::FormatInvalid));
    }
}
