//! Path-addressed validation issues and the shared error envelope.
//!
//! Issues are collected, never raised: validation keeps walking after a
//! failure so a client sees every problem in one response.

use std::fmt;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

// ————————————————————————————————————————————————————————————————————————————
// PATHS
// ————————————————————————————————————————————————————————————————————————————

/// One step from the payload root: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            Self::Index(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(k),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self { Self::Key(s.to_owned()) }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self { Self::Key(s) }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self { Self::Index(i) }
}

pub type Path = Vec<PathSegment>;

/// Append one segment to a borrowed path.
pub fn child(path: &[PathSegment], segment: impl Into<PathSegment>) -> Path {
    let mut out = Vec::with_capacity(path.len() + 1);
    out.extend_from_slice(path);
    out.push(segment.into());
    out
}

// ————————————————————————————————————————————————————————————————————————————
// CODES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueCode {
    Required,
    TypeMismatch,
    NullInvalid,
    EnumInvalid,
    LiteralInvalid,
    FormatInvalid,
    PatternMismatch,
    ValueTooSmall,
    ValueTooLarge,
    LengthTooShort,
    LengthTooLong,
    DiscriminatorMissing,
    DiscriminatorInvalid,
    UnionMismatch,
    OperatorInvalid,
    CursorInvalid,
    DepthExceeded,
    ArrayLimitExceeded,
    BodyNotAllowed,
    NotFound,
}

impl IssueCode {
    pub const ALL: [IssueCode; 20] = [
        Self::Required,
        Self::TypeMismatch,
        Self::NullInvalid,
        Self::EnumInvalid,
        Self::LiteralInvalid,
        Self::FormatInvalid,
        Self::PatternMismatch,
        Self::ValueTooSmall,
        Self::ValueTooLarge,
        Self::LengthTooShort,
        Self::LengthTooLong,
        Self::DiscriminatorMissing,
        Self::DiscriminatorInvalid,
        Self::UnionMismatch,
        Self::OperatorInvalid,
        Self::CursorInvalid,
        Self::DepthExceeded,
        Self::ArrayLimitExceeded,
        Self::BodyNotAllowed,
        Self::NotFound,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::TypeMismatch => "type_mismatch",
            Self::NullInvalid => "null_invalid",
            Self::EnumInvalid => "enum_invalid",
            Self::LiteralInvalid => "literal_invalid",
            Self::FormatInvalid => "format_invalid",
            Self::PatternMismatch => "pattern_mismatch",
            Self::ValueTooSmall => "value_too_small",
            Self::ValueTooLarge => "value_too_large",
            Self::LengthTooShort => "length_too_short",
            Self::LengthTooLong => "length_too_long",
            Self::DiscriminatorMissing => "discriminator_missing",
            Self::DiscriminatorInvalid => "discriminator_invalid",
            Self::UnionMismatch => "union_mismatch",
            Self::OperatorInvalid => "operator_invalid",
            Self::CursorInvalid => "cursor_invalid",
            Self::DepthExceeded => "depth_exceeded",
            Self::ArrayLimitExceeded => "array_limit_exceeded",
            Self::BodyNotAllowed => "body_not_allowed",
            Self::NotFound => "not_found",
        }
    }

    /// Issues that only drop the offending clause; the rest of the request
    /// still runs.
    pub fn drops_clause(self) -> bool {
        matches!(self, Self::OperatorInvalid)
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ISSUE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub code: IssueCode,
    pub detail: String,
    pub path: Path,
    pub meta: Map<String, Value>,
}

impl Issue {
    pub fn new(code: IssueCode, path: Path, detail: impl Into<String>) -> Self {
        Self { code, detail: detail.into(), path, meta: Map::new() }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_owned(), value.into());
        self
    }

    /// Last key on the path, or the empty string for root-level issues.
    pub fn field(&self) -> String {
        self.path.iter().rev()
            .find_map(|s| s.as_key())
            .unwrap_or_default()
            .to_owned()
    }

    /// Rewrite key segments, leaving indices alone. Used to report paths in
    /// the wire casing the client sent.
    pub fn map_keys(mut self, f: impl Fn(&str) -> String) -> Self {
        for seg in &mut self.path {
            if let PathSegment::Key(k) = seg {
                *k = f(k);
            }
        }
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(".");
        write!(f, "{} at `{}`: {}", self.code, path, self.detail)
    }
}

impl Serialize for Issue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            code: &'static str,
            detail: &'a str,
            field: String,
            path: Vec<String>,
            #[serde(skip_serializing_if = "Map::is_empty")]
            meta: &'a Map<String, Value>,
        }
        Wire {
            code: self.code.as_str(),
            detail: &self.detail,
            field: self.field(),
            path: self.path.iter().map(|s| s.to_string()).collect(),
            meta: &self.meta,
        }.serialize(serializer)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ERROR ENVELOPE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Http,
    Contract,
    Domain,
}

/// `{ layer, issues }`, shared by transport, contract and domain failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub layer: Layer,
    pub issues: Vec<Issue>,
}

impl ErrorResponse {
    pub fn contract(issues: Vec<Issue>) -> Self {
        Self { layer: Layer::Contract, issues }
    }

    pub fn domain(issues: Vec<Issue>) -> Self {
        Self { layer: Layer::Domain, issues }
    }

    /// Transport-level failure reported by the host (not found, internal).
    pub fn http(code: IssueCode, detail: impl Into<String>) -> Self {
        Self { layer: Layer::Http, issues: vec![Issue::new(code, Vec::new(), detail)] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_is_stable() {
        let issue = Issue::new(
            IssueCode::Required,
            vec!["post".into(), "tags".into(), 2.into(), "name".into()],
            "is required",
        );
        assert_eq!(serde_json::to_value(&issue).unwrap(), json!({
            "code": "required",
            "detail": "is required",
            "field": "name",
            "path": ["post", "tags", "2", "name"],
        }));
    }

    #[test]
    fn meta_is_emitted_only_when_present() {
        let issue = Issue::new(IssueCode::EnumInvalid, vec!["status".into()], "bad")
            .with_meta("allowed", json!(["a", "b"]));
        let v = serde_json::to_value(&issue).unwrap();
        assert_eq!(v["meta"]["allowed"], json!(["a", "b"]));
    }

    #[test]
    fn field_skips_trailing_indices() {
        let issue = Issue::new(IssueCode::TypeMismatch, vec!["ids".into(), 0.into()], "x");
        assert_eq!(issue.field(), "ids");
        let root = Issue::new(IssueCode::TypeMismatch, Vec::new(), "x");
        assert_eq!(root.field(), "");
    }

    #[test]
    fn only_operator_issues_drop_a_clause() {
        let dropping: Vec<_> = IssueCode::ALL.into_iter().filter(|c| c.drops_clause()).collect();
        assert_eq!(dropping, [IssueCode::OperatorInvalid]);
    }

    #[test]
    fn error_envelope_layers() {
        let v = serde_json::to_value(ErrorResponse::contract(Vec::new())).unwrap();
        assert_eq!(v, json!({ "layer": "contract", "issues": [] }));
    }
}
