//! Hashing System - SHA-256 for Manifests
//!
//! Registry bytes, configuration and generated artifacts are hashed so a
//! run can be reproduced and compared.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&canonicalize(serde_json::to_value(value)?))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Digest of a manifest's canonical JSON.
pub fn compute_manifest_hash<T: Serialize>(manifest: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(manifest)?.as_bytes()))
}

/// `sha256(registry_hash:canonical_config:generator_version)`. Stable across
/// runs over the same registry bytes and configuration.
pub fn compute_run_hash(
    registry_hash: &str,
    config: &impl Serialize,
    generator_version: &str,
) -> Result<String, serde_json::Error> {
    let combined = format!("{}:{}:{}", registry_hash, canonical_json(config)?, generator_version);
    Ok(sha256_hex(combined.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_canonical_json_sorts_nested_objects() {
        let obj = json!({"b": [{"y": 1, "x": 2}], "a": {"d": 0, "c": 0}});
        assert_eq!(canonical_json(&obj).unwrap(), r#"{"a":{"c":0,"d":0},"b":[{"x":2,"y":1}]}"#);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_manifest_hash_ignores_key_order() {
        let a = json!({"api": "gl", "levels": ["A", "B"]});
        let b = json!({"levels": ["A", "B"], "api": "gl"});
        assert_eq!(compute_manifest_hash(&a).unwrap(), compute_manifest_hash(&b).unwrap());
    }

    #[test]
    fn test_run_hash_tracks_config() {
        let config = GeneratorConfig::default();
        let h1 = compute_run_hash("abc", &config, "1.0.0").unwrap();
        assert_eq!(h1, compute_run_hash("abc", &config, "1.0.0").unwrap());

        let filtered = GeneratorConfig { api_level_filter: None, ..config };
        assert_ne!(h1, compute_run_hash("abc", &filtered, "1.0.0").unwrap());
    }
}
