//! Cache key algorithm: `keyPattern` substitution, or the default
//! `name:k1=v1&k2=v2&...` form, with a SHA-256 fallback for long keys.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const MAX_KEY_LENGTH: usize = 250;

/// Normalizes a single parameter value into its canonical string form:
/// strings trimmed and lowercased, numbers via their canonical textual
/// form, booleans lowercased, arrays/objects rendered as sorted
/// comma-joined tokens, and `null` literally as `"null"`.
#[must_use]
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.trim().to_lowercase(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => {
            let mut tokens: Vec<String> = items.iter().map(normalize_value).collect();
            tokens.sort();
            tokens.join(",")
        }
        Value::Object(map) => {
            let mut tokens: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k}={}", normalize_value(v)))
                .collect();
            tokens.sort();
            tokens.join(",")
        }
    }
}

/// Builds a cache key for `query_name` given an optional pattern and the
/// bound parameter map. Falls back to a SHA-256-hashed suffix when the
/// resulting key would exceed [`MAX_KEY_LENGTH`].
#[must_use]
pub fn build_cache_key(
    query_name: &str,
    key_pattern: Option<&str>,
    params: &BTreeMap<String, Value>,
) -> String {
    let key = match key_pattern {
        Some(pattern) => substitute_pattern(pattern, params),
        None => default_key(query_name, params),
    };

    if key.len() <= MAX_KEY_LENGTH {
        return key;
    }

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let short_hash = hex::encode(digest)[..16].to_string();
    format!("{query_name}:{short_hash}")
}

fn substitute_pattern(pattern: &str, params: &BTreeMap<String, Value>) -> String {
    let mut result = String::with_capacity(pattern.len());
    let mut chars = pattern.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch == '{' {
            if let Some(end) = pattern[start + 1..].find('}') {
                let name = &pattern[start + 1..start + 1 + end];
                match params.get(name) {
                    Some(value) => result.push_str(&normalize_value(value)),
                    None => {
                        tracing::warn!(placeholder = name, "unresolved cache key placeholder");
                        result.push('{');
                        result.push_str(name);
                        result.push('}');
                    }
                }
                for _ in 0..=end {
                    chars.next();
                }
                continue;
            }
        }
        result.push(ch);
    }
    result
}

fn default_key(query_name: &str, params: &BTreeMap<String, Value>) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{k}={}", normalize_value(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{query_name}:{joined}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_key_orders_params_ascending() {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), json!("AAPL"));
        params.insert("limit".to_string(), json!(20));
        let key = build_cache_key("stock-trades", None, &params);
        assert_eq!(key, "stock-trades:limit=20&symbol=aapl");
    }

    #[test]
    fn pattern_substitution() {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), json!("AAPL"));
        params.insert("limit".to_string(), json!(20));
        params.insert("offset".to_string(), json!(0));
        let key = build_cache_key(
            "stock-trades",
            Some("t:{symbol}:{limit}:{offset}"),
            &params,
        );
        assert_eq!(key, "t:aapl:20:0");
    }

    #[test]
    fn long_key_falls_back_to_hash_suffix() {
        let mut params = BTreeMap::new();
        params.insert("blob".to_string(), json!("x".repeat(400)));
        let key = build_cache_key("q", None, &params);
        assert!(key.len() <= MAX_KEY_LENGTH);
        assert!(key.starts_with("q:"));
    }

    #[test]
    fn unresolved_placeholder_left_intact() {
        let params = BTreeMap::new();
        let key = build_cache_key("q", Some("user:{id}:profile"), &params);
        assert_eq!(key, "user:{id}:profile");
    }
}
