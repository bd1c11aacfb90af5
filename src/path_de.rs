use serde::de::DeserializeOwned;

use crate::error::{ConfigError, ConfigResult};

fn located(err: serde_path_to_error::Error<serde_json::Error>) -> ConfigError {
    let path = err.path().to_string();
    ConfigError::Document(format!("at JSON path {path} → {}", err.into_inner()))
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> ConfigResult<T> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(located)
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> ConfigResult<T> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize::<_, T>(de).map_err(located)
}

pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> ConfigResult<T> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(located)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Outer {
        items: Vec<Inner>,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Inner {
        size: u64,
    }

    #[test]
    fn error_names_the_failing_path() {
        let err = from_str_with_path::<Outer>(r#"{ "items": [{ "size": 1 }, { "size": "big" }] }"#).unwrap_err();
        let ConfigError::Document(msg) = err else { panic!("unexpected {err:?}") };
        assert!(msg.starts_with("at JSON path items[1].size"), "{msg}");
    }

    #[test]
    fn value_input() {
        let err = from_value_with_path::<Outer>(serde_json::json!({ "items": 3 })).unwrap_err();
        assert!(err.to_string().contains("items"));
    }
}
