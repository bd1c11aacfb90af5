//! Key casing between the canonical `snake_case` form every shape is declared
//! in and the casing clients speak on the wire.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::Capability;
use crate::contract::{ActionOn, HttpMethod};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCase {
    Underscore,
    CamelizeLower,
    CamelizeUpper,
    Dasherize,
    #[default]
    None,
}

impl KeyCase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Underscore => "underscore",
            Self::CamelizeLower => "camelize_lower",
            Self::CamelizeUpper => "camelize_upper",
            Self::Dasherize => "dasherize",
            Self::None => "none",
        }
    }

    /// Canonical key → wire key.
    pub fn to_wire(self, key: &str) -> String {
        match self {
            Self::None => key.to_owned(),
            Self::Underscore => underscore(key),
            Self::CamelizeLower => camelize(key, false),
            Self::CamelizeUpper => camelize(key, true),
            Self::Dasherize => underscore(key).replace('_', "-"),
        }
    }

    /// Wire key → canonical key.
    pub fn to_canonical(self, key: &str) -> String {
        match self {
            Self::None => key.to_owned(),
            _ => underscore(key),
        }
    }

    pub fn outbound(self, value: Value) -> Value {
        if self == Self::None { return value; }
        rekey(value, &|k| self.to_wire(k))
    }

    /// Rekey an inbound payload. If two wire keys collapse onto one canonical
    /// key, the later one wins.
    pub fn inbound(self, value: Value) -> Value {
        if self == Self::None { return value; }
        rekey(value, &|k| self.to_canonical(k))
    }
}

fn rekey(value: Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(f(&k), rekey(v, f));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|v| rekey(v, f)).collect()),
        other => other,
    }
}

/// `fooBar`, `FooBar`, `foo-bar` → `foo_bar`. Every uppercase letter after
/// the first word character becomes `_` plus its lowercase form, so `userID`
/// becomes `user_i_d` and `a_B` becomes `a__b`. Leading underscores and
/// underscores before digits pass through untouched.
pub fn underscore(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut leading = true;
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if !leading {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
        leading &= c == '_' || c == '-';
    }
    out
}

/// Inverse of [`underscore`] for canonical keys: only an `_` directly before
/// a lowercase letter is folded into a capital. Every other underscore is
/// kept, so `line_1`, `_id` and `a__b` survive the round trip.
pub fn camelize(key: &str, upper_first: bool) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    let mut leading = true;
    while let Some(c) = chars.next() {
        match c {
            '_' if !leading && chars.peek().is_some_and(|n| n.is_ascii_lowercase()) => {
                if let Some(next) = chars.next() {
                    out.push(next.to_ascii_uppercase());
                }
            }
            '_' => out.push('_'),
            c if leading && upper_first => out.push(c.to_ascii_uppercase()),
            c => out.push(c),
        }
        leading &= c == '_';
    }
    out
}

// ---- capability ----

#[derive(Debug, Clone, Copy)]
pub struct KeyCasing(pub KeyCase);

impl Capability for KeyCasing {
    fn name(&self) -> &'static str { "key_casing" }

    fn applies_to(&self, _method: HttpMethod, _on: ActionOn) -> bool { true }

    fn transform_inbound(&self, value: Value) -> Value { self.0.inbound(value) }

    fn transform_outbound(&self, value: Value) -> Value { self.0.outbound(value) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn strategies() {
        assert_eq!(KeyCase::CamelizeLower.to_wire("created_at"), "createdAt");
        assert_eq!(KeyCase::CamelizeUpper.to_wire("created_at"), "CreatedAt");
        assert_eq!(KeyCase::Dasherize.to_wire("created_at"), "created-at");
        assert_eq!(KeyCase::Underscore.to_wire("created_at"), "created_at");
        assert_eq!(KeyCase::None.to_wire("created_at"), "created_at");
        assert_eq!(KeyCase::CamelizeLower.to_canonical("createdAt"), "created_at");
        assert_eq!(KeyCase::CamelizeUpper.to_canonical("CreatedAt"), "created_at");
        assert_eq!(KeyCase::Dasherize.to_canonical("created-at"), "created_at");
    }

    #[test]
    fn nested_values_are_rekeyed_but_not_rewritten() {
        let v = json!({ "post_tags": [{ "tag_name": "rust_lang" }] });
        assert_eq!(
            KeyCase::CamelizeLower.outbound(v),
            json!({ "postTags": [{ "tagName": "rust_lang" }] })
        );
    }

    #[test]
    fn inbound_collision_keeps_last() {
        let v = json!({ "fooBar": 1, "foo_bar": 2 });
        assert_eq!(KeyCase::CamelizeLower.inbound(v), json!({ "foo_bar": 2 }));
    }

    #[test]
    fn digits_and_odd_underscores_survive() {
        for key in ["line_1", "_id", "a__b", "__private", "v_2_beta", "trailing_", "userid_1a"] {
            for case in [KeyCase::CamelizeLower, KeyCase::CamelizeUpper, KeyCase::Dasherize] {
                assert_eq!(case.to_canonical(&case.to_wire(key)), key, "{case:?} {key}");
            }
        }
        assert_eq!(KeyCase::CamelizeLower.to_wire("line_1"), "line_1");
        assert_eq!(KeyCase::CamelizeLower.to_wire("_id"), "_id");
        assert_eq!(KeyCase::CamelizeUpper.to_wire("_id"), "_Id");
        assert_eq!(KeyCase::CamelizeLower.to_wire("a__b"), "a_B");
        assert_eq!(KeyCase::CamelizeLower.to_canonical("userID"), "user_i_d");
    }

    fn canonical_key() -> impl Strategy<Value = String> {
        "_{0,2}[a-z0-9]{1,6}(_{1,2}[a-z0-9]{1,6}){0,3}_?"
    }

    proptest! {
        #[test]
        fn casing_round_trips(keys in prop::collection::btree_set(canonical_key(), 0..12)) {
            for case in [KeyCase::Underscore, KeyCase::CamelizeLower, KeyCase::CamelizeUpper, KeyCase::Dasherize] {
                let mut map = Map::new();
                for (i, k) in keys.iter().enumerate() {
                    map.insert(k.clone(), json!(i));
                }
                let original = Value::Object(map);
                let back = case.inbound(case.outbound(original.clone()));
                prop_assert_eq!(back, original);
            }
        }

        #[test]
        fn casing_is_idempotent(key in canonical_key()) {
            for case in [KeyCase::Underscore, KeyCase::CamelizeLower, KeyCase::CamelizeUpper, KeyCase::Dasherize] {
                let wire = case.to_wire(&key);
                prop_assert_eq!(case.to_wire(&case.to_canonical(&wire)), wire);
            }
        }
    }
}
