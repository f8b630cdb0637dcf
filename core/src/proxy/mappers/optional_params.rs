//! Parsing of the free-form "optional generation parameters" string

use serde_json::{Map, Number, Value};

/// Keys the server always owns; never taken from the UI string
pub const RESERVED_KEYS: [&str; 2] = ["messages", "stream"];

pub type OptionalParameters = Map<String, Value>;

/// Parse a JSON object or `key=value,key=value` string.
///
/// Never fails: blank or unparseable input yields an empty map, and reserved
/// keys are stripped from whatever did parse.
pub fn parse_optional_params(raw: &str) -> OptionalParameters {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Map::new();
    }

    let mut params = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        _ => parse_key_value_pairs(trimmed).unwrap_or_else(|| {
            tracing::debug!("Ignoring unparseable optional parameters: {:?}", trimmed);
            Map::new()
        }),
    };

    params.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
    params
}

fn parse_key_value_pairs(raw: &str) -> Option<OptionalParameters> {
    let mut params = Map::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        params.insert(key.to_string(), coerce_scalar(value.trim()));
    }

    if params.is_empty() {
        None
    } else {
        Some(params)
    }
}

fn coerce_scalar(value: &str) -> Value {
    match value {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(int) = value.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(number) = value.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_object() {
        let params = parse_optional_params(r#"{"temperature": 0.8, "max_tokens": 100}"#);
        assert_eq!(Value::Object(params), json!({"temperature": 0.8, "max_tokens": 100}));
    }

    #[test]
    fn test_key_value_pairs() {
        let params = parse_optional_params("temperature=0.9,max_tokens=200");
        assert_eq!(Value::Object(params), json!({"temperature": 0.9, "max_tokens": 200}));
    }

    #[test]
    fn test_booleans_and_strings() {
        let params = parse_optional_params("echo=true, safe=false, stop=END");
        assert_eq!(Value::Object(params), json!({"echo": true, "safe": false, "stop": "END"}));
    }

    #[test]
    fn test_reserved_keys_stripped() {
        let params = parse_optional_params("echo=true,stream=false");
        assert_eq!(Value::Object(params), json!({"echo": true}));

        let params = parse_optional_params(r#"{"messages": [], "stream": true, "top_p": 0.5}"#);
        assert_eq!(Value::Object(params), json!({"top_p": 0.5}));
    }

    #[test]
    fn test_blank_and_invalid_input() {
        assert!(parse_optional_params("").is_empty());
        assert!(parse_optional_params("   ").is_empty());
        assert!(parse_optional_params("{invalid json}").is_empty());
        assert!(parse_optional_params("just words").is_empty());
        assert!(parse_optional_params("a=1,=2").is_empty());
        assert!(parse_optional_params("42").is_empty());
    }

    #[test]
    fn test_reparse_of_serialized_output_is_stable() {
        for raw in [
            "temperature=0.9,max_tokens=200,echo=true,stop=END",
            r#"{"top_p": 0.95, "stream": true, "seed": 7}"#,
            "",
        ] {
            let first = parse_optional_params(raw);
            let again = parse_optional_params(&Value::Object(first.clone()).to_string());
            assert_eq!(first, again, "unstable for {:?}", raw);
        }
    }
}
