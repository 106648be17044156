//! Hashing - SHA-256 render fingerprints
//!
//! Equal render inputs give equal fingerprints, whatever the key order.

use serde::Serialize;
use serde_json::{json, to_string, Value};
use sha2::{Digest, Sha256};

use crate::validation::RenderContext;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    let sorted = sort_value(&v);
    to_string(&sorted)
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Everything that determines a rendered artifact, hashed.
pub struct RenderInputs<'a> {
    pub template_id: Option<&'a str>,
    pub template_version: Option<&'a str>,
    pub context: &'a RenderContext,
    pub brand_logo_url: Option<&'a str>,
    pub extra_images: &'a [String],
    pub format: &'a str,
    pub engine_version: &'a str,
}

pub fn compute_render_hash(inputs: &RenderInputs<'_>) -> Result<String, serde_json::Error> {
    let payload = json!({
        "template_id": inputs.template_id,
        "template_version": inputs.template_version,
        "context": inputs.context,
        "brand_logo_url": inputs.brand_logo_url,
        "extra_images": inputs.extra_images,
        "format": inputs.format,
        "engine_version": inputs.engine_version,
    });
    Ok(sha256_hex(canonical_json(&payload)?.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": {"y": 1, "b": 2}});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":{"b":2,"y":1},"z":1}"#);
    }

    #[test]
    fn test_render_hash_stable_and_sensitive() {
        let mut ctx = RenderContext::new();
        ctx.insert("title", json!("Προϊόν #7"));
        let extras = vec!["/static/a.png".to_string()];
        let inputs = RenderInputs {
            template_id: Some("promo"),
            template_version: Some("1.0.0"),
            context: &ctx,
            brand_logo_url: None,
            extra_images: &extras,
            format: "png",
            engine_version: "1.0.0",
        };
        let h1 = compute_render_hash(&inputs).unwrap();
        let h2 = compute_render_hash(&inputs).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);

        let other = RenderInputs { format: "svg", ..inputs };
        assert_ne!(h1, compute_render_hash(&other).unwrap());
    }
}
