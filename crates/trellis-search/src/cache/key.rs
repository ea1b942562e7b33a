//! Deterministic cache-key derivation.
//!
//! A key is `{prefix}v{version}:{group-segment}:{hash}` where the hash is
//! the SHA-256 of `(version, normalized query, sorted group ids, canonical
//! params)` truncated to 64 bits. The group segment carries a short
//! fingerprint per group so pattern invalidation can target one group
//! without an index of live keys.

use crate::hashing::{group_fingerprint, hash_to_u64};

/// Derives the cache key for a prepared request.
pub fn result_cache_key(
    prefix: &str,
    version: u32,
    query: &str,
    group_ids: &[String],
    params: &serde_json::Value,
) -> String {
    let mut sorted: Vec<&str> = group_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let groups_json = serde_json::to_string(&sorted).unwrap_or_else(|_| "[]".to_string());
    let params_json = canonical_json(params);

    let material = format!("v{version}|{query}|{groups_json}|{params_json}");
    let hash = hash_to_u64(material.as_bytes());

    format!(
        "{prefix}v{version}:{}:{hash:016x}",
        group_segment(&sorted)
    )
}

/// Key pattern matching every entry scoped to `group_id`.
pub fn group_pattern(prefix: &str, group_id: &str) -> String {
    format!("{prefix}*{}*", group_fingerprint(group_id))
}

/// Key pattern matching every entry under `prefix`.
pub fn flush_pattern(prefix: &str) -> String {
    format!("{prefix}*")
}

fn group_segment(sorted_groups: &[&str]) -> String {
    if sorted_groups.is_empty() {
        return "all".to_string();
    }
    sorted_groups
        .iter()
        .map(|g| group_fingerprint(g))
        .collect::<Vec<_>>()
        .join(".")
}

/// JSON rendering with recursively sorted object keys, so semantically
/// equal parameter bags always hash identically.
pub fn canonical_json(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_else(|_| "null".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_deterministic() {
        let params = json!({"limit": 10, "reranker": "rrf"});
        let a = result_cache_key("t:", 1, "foo", &["g1".into(), "g2".into()], &params);
        let b = result_cache_key("t:", 1, "foo", &["g1".into(), "g2".into()], &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_group_order_does_not_matter() {
        let params = json!({});
        let a = result_cache_key("t:", 1, "foo", &["g2".into(), "g1".into()], &params);
        let b = result_cache_key("t:", 1, "foo", &["g1".into(), "g2".into()], &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_param_key_order_does_not_matter() {
        let a = result_cache_key("t:", 1, "foo", &[], &json!({"a": 1, "b": 2}));
        let b = result_cache_key("t:", 1, "foo", &[], &json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_version_changes_key() {
        let params = json!({});
        let a = result_cache_key("t:", 1, "foo", &[], &params);
        let b = result_cache_key("t:", 2, "foo", &[], &params);
        assert_ne!(a, b);
    }

    #[test]
    fn test_query_changes_key() {
        let params = json!({});
        assert_ne!(
            result_cache_key("t:", 1, "foo", &[], &params),
            result_cache_key("t:", 1, "bar", &[], &params)
        );
    }

    #[test]
    fn test_group_pattern_targets_fingerprint() {
        let key = result_cache_key("t:", 1, "foo", &["g1".into()], &serde_json::json!({}));
        let pattern = group_pattern("t:", "g1");
        let needle = pattern.trim_start_matches("t:*").trim_end_matches('*');
        assert!(key.contains(needle));
    }

    #[test]
    fn test_unscoped_key_uses_all_segment() {
        let key = result_cache_key("t:", 1, "foo", &[], &serde_json::json!({}));
        assert!(key.contains(":all:"));
    }

    #[test]
    fn test_canonical_json_sorts_nested_objects() {
        let v = json!({"z": {"b": 1, "a": [ {"y": 2, "x": 1} ]}, "a": null});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":null,"z":{"a":[{"x":1,"y":2}],"b":1}}"#
        );
    }
}
