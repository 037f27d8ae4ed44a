//! Tests for utility functions

use prometheus_jobs::util::{canonical_json, canonicalize, now_ms, to_owned_value};
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
struct Request {
    prompt: String,
    #[serde(rename = "maxTokens")]
    max_tokens: u32,
    #[serde(skip)]
    secret: String,
}

#[test]
fn test_canonical_json_sorts_nested_keys() {
    let value = json!({"b": [{"z": 1, "a": 2}], "a": null});
    assert_eq!(canonical_json(&value), r#"{"a":null,"b":[{"a":2,"z":1}]}"#);
}

#[test]
fn test_to_owned_value_uses_serialize_impl() {
    let request = Request {
        prompt: "hi".to_string(),
        max_tokens: 8,
        secret: "hidden".to_string(),
    };
    let value = to_owned_value(&request).unwrap();
    assert_eq!(value, json!({"prompt": "hi", "maxTokens": 8}));
    assert!(!request.secret.is_empty());
}

#[test]
fn test_canonicalize_non_finite_numbers_as_null() {
    assert_eq!(canonicalize(&vec![1.5, f64::NAN]).unwrap(), "[1.5,null]");
}

#[test]
fn test_now_ms_is_monotonic_enough() {
    let before = now_ms();
    let after = now_ms();
    assert!(after >= before);
    assert!(before > 0);
}
