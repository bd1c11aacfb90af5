//! Bracket-notation query strings → nested JSON.
//!
//! `filter[status][in][]=a&filter[status][in][]=b&page[number]=2` becomes
//! `{"filter":{"status":{"in":["a","b"]}},"page":{"number":"2"}}`. Values stay
//! strings; the validator coerces them against the declared params.

use serde_json::{Map, Value};

pub fn parse(query: &str) -> Value {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut root = Map::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let segments = split_key(&key);
        let Some((head, rest)) = segments.split_first() else { continue };
        if head.is_empty() {
            continue;
        }
        insert(&mut root, head, rest, Value::String(value.into_owned()));
    }
    Value::Object(root)
}

/// `a[b][]` → `["a", "b", ""]`. A key with unbalanced brackets is taken whole.
fn split_key(key: &str) -> Vec<&str> {
    let Some(open) = key.find('[') else { return vec![key] };
    let mut segments = vec![&key[..open]];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else { return vec![key] };
        segments.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    if rest.is_empty() { segments } else { vec![key] }
}

fn insert(target: &mut Map<String, Value>, key: &str, rest: &[&str], value: Value) {
    match rest.split_first() {
        None => {
            target.insert(key.to_owned(), value);
        }
        Some((&"", tail)) => {
            let slot = target.entry(key).or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                match tail.split_first() {
                    None => items.push(value),
                    Some((next, tail)) => {
                        let mut obj = Map::new();
                        insert(&mut obj, next, tail, value);
                        items.push(Value::Object(obj));
                    }
                }
            }
        }
        Some((next, tail)) => {
            let slot = target.entry(key).or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(map) = slot {
                insert(map, next, tail, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_brackets_and_arrays() {
        let v = parse("filter[status][in][]=draft&filter[status][in][]=published&page[number]=2&sort[title]=asc");
        assert_eq!(v, json!({
            "filter": { "status": { "in": ["draft", "published"] } },
            "page": { "number": "2" },
            "sort": { "title": "asc" },
        }));
    }

    #[test]
    fn decoding() {
        let v = parse("?filter%5Btitle%5D%5Bcontains%5D=hello+world%21&q=a%26b");
        assert_eq!(v, json!({ "filter": { "title": { "contains": "hello world!" } }, "q": "a&b" }));
    }

    #[test]
    fn array_of_objects_and_malformed_keys() {
        let v = parse("sort[][views]=desc&sort[][title]=asc&odd[key=1");
        assert_eq!(v, json!({ "sort": [{ "views": "desc" }, { "title": "asc" }], "odd[key": "1" }));
    }

    #[test]
    fn empty() {
        assert_eq!(parse(""), json!({}));
    }
}
