//! Validation & Merge - caller fields against the template schema
//!
//! Defaults are seeded, caller values overlaid, then every declared field is
//! checked and coerced by its kind. The schema is the source of truth for
//! validation; slots only describe geometry.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::templates::{FieldDef, FieldKind, TemplateRecord};

/// Reserved context key carrying the requested aspect ratio.
pub const RATIO_KEY: &str = "ratio";

const CURRENCY_SYMBOLS: [char; 3] = ['€', '$', '£'];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid price value for '{field}': {value}")]
    InvalidPrice { field: String, value: String },

    #[error("Field '{field}' must be a valid URL (http(s) or {prefixes})")]
    InvalidUrl { field: String, prefixes: String },

    #[error("Field '{field}' must be a hex color like #22c55e")]
    InvalidColor { field: String },

    #[error("Unsupported ratio '{ratio}' for template '{template}'. Allowed: {allowed:?}")]
    UnsupportedRatio {
        field: String,
        ratio: String,
        template: String,
        allowed: Vec<String>,
    },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field }
            | Self::InvalidPrice { field, .. }
            | Self::InvalidUrl { field, .. }
            | Self::InvalidColor { field }
            | Self::UnsupportedRatio { field, .. } => field,
        }
    }
}

/// Sanitized field values, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderContext(BTreeMap<String, Value>);

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String view of a value: strings as-is, numbers and bools printed, null/absent as `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub context: RenderContext,
    pub warnings: Vec<String>,
}

/// Validator - seeds, merges and coerces field values
#[derive(Debug, Clone)]
pub struct Validator {
    url_prefixes: Vec<String>,
}

impl Validator {
    /// `url_prefixes` are the recognized asset prefixes accepted for image/url fields.
    pub fn new(url_prefixes: Vec<String>) -> Self {
        Self { url_prefixes }
    }

    pub fn validate_and_merge(
        &self,
        record: &TemplateRecord,
        fields: &Map<String, Value>,
        ratio: Option<&str>,
    ) -> Result<ValidationOutcome, ValidationError> {
        let meta = &record.meta;
        let ratio = ratio.map(str::trim).filter(|r| !r.is_empty());

        if let Some(ratio) = ratio {
            if !meta.allows_ratio(ratio) {
                return Err(ValidationError::UnsupportedRatio {
                    field: RATIO_KEY.to_string(),
                    ratio: ratio.to_string(),
                    template: meta.id.clone(),
                    allowed: meta.ratios.clone(),
                });
            }
        }

        let mut context = RenderContext::new();
        for (name, def) in &meta.fields {
            if let Some(default) = &def.default {
                context.insert(name.clone(), default.clone());
            }
        }
        for (name, value) in fields {
            context.insert(name.clone(), value.clone());
        }

        let mut warnings = Vec::new();
        for (name, def) in &meta.fields {
            let present = context.get(name).is_some_and(is_present);
            if !present {
                if def.required {
                    return Err(ValidationError::MissingField { field: name.clone() });
                }
                continue;
            }
            let Some(value) = context.get(name).cloned() else {
                continue;
            };
            let coerced = self.coerce(name, def, value, &mut warnings)?;
            context.insert(name.clone(), coerced);
        }

        if let Some(ratio) = ratio {
            context.insert(RATIO_KEY, Value::String(ratio.to_string()));
        }

        Ok(ValidationOutcome { context, warnings })
    }

    fn coerce(
        &self,
        name: &str,
        def: &FieldDef,
        value: Value,
        warnings: &mut Vec<String>,
    ) -> Result<Value, ValidationError> {
        match def.kind {
            FieldKind::Text => {
                let text = value_to_string(&value);
                match def.max_chars {
                    Some(max) if text.chars().count() > max => {
                        warnings.push(format!("{name} truncated to {max} chars"));
                        Ok(Value::String(text.chars().take(max).collect()))
                    }
                    _ => Ok(Value::String(text)),
                }
            }
            FieldKind::Price => {
                let amount = parse_price(&value).ok_or_else(|| ValidationError::InvalidPrice {
                    field: name.to_string(),
                    value: value_to_string(&value),
                })?;
                Ok(Value::String(format_price(amount, def.format.as_deref())))
            }
            FieldKind::Image | FieldKind::Url => {
                if self.looks_like_url(&value_to_string(&value)) {
                    Ok(value)
                } else {
                    Err(ValidationError::InvalidUrl {
                        field: name.to_string(),
                        prefixes: self.url_prefixes.join(", "),
                    })
                }
            }
            FieldKind::Color => {
                if parse_hex_color(&value_to_string(&value)).is_some() {
                    Ok(value)
                } else {
                    Err(ValidationError::InvalidColor { field: name.to_string() })
                }
            }
        }
    }

    pub fn looks_like_url(&self, raw: &str) -> bool {
        let s = raw.trim().to_ascii_lowercase();
        s.starts_with("http://")
            || s.starts_with("https://")
            || self.url_prefixes.iter().any(|p| s.starts_with(&p.to_ascii_lowercase()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(vec!["/static/".into(), "/assets/".into()])
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numbers, or strings like `"12,5"`, `"€ 19.90"`, `"7.5$"`.
pub fn parse_price(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned = s
                .trim()
                .trim_start_matches(CURRENCY_SYMBOLS)
                .trim_end_matches(CURRENCY_SYMBOLS)
                .trim()
                .replace(',', ".");
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

pub fn format_price(amount: f64, format: Option<&str>) -> String {
    let fixed = format!("{amount:.2}");
    match format {
        Some(fmt) => fmt.replace("{value}", &fixed),
        None => fixed,
    }
}

/// `#rgb` or `#rrggbb` → RGBA with full alpha.
pub fn parse_hex_color(raw: &str) -> Option<[u8; 4]> {
    let hex = raw.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgb[i] = v * 16 + v;
            }
            Some([rgb[0], rgb[1], rgb[2], 255])
        }
        6 => Some([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            255,
        ]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn price_parsing_tolerates_locale() {
        assert_eq!(parse_price(&json!(12)), Some(12.0));
        assert_eq!(parse_price(&json!("12,5")), Some(12.5));
        assert_eq!(parse_price(&json!("€ 19.90")), Some(19.9));
        assert_eq!(parse_price(&json!("7.5€")), Some(7.5));
        assert_eq!(parse_price(&json!("abc")), None);
        assert_eq!(parse_price(&json!(true)), None);
    }

    #[test]
    fn price_formatting() {
        assert_eq!(format_price(12.5, None), "12.50");
        assert_eq!(format_price(3.0, Some("{value} €")), "3.00 €");
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#fff"), Some([255, 255, 255, 255]));
        assert_eq!(parse_hex_color("#22c55e"), Some([0x22, 0xc5, 0x5e, 255]));
        assert_eq!(parse_hex_color("22c55e"), None);
        assert_eq!(parse_hex_color("#22c5"), None);
        assert_eq!(parse_hex_color("#ggg"), None);
    }

    #[test]
    fn url_shapes() {
        let v = Validator::default();
        assert!(v.looks_like_url("https://cdn.example.com/x.png"));
        assert!(v.looks_like_url("/static/uploads/a.png"));
        assert!(v.looks_like_url("/ASSETS/a.png"));
        assert!(!v.looks_like_url("ftp://x"));
        assert!(!v.looks_like_url("uploads/a.png"));
    }

    #[test]
    fn every_error_names_its_field() {
        let err = ValidationError::InvalidColor { field: "bg".into() };
        assert_eq!(err.field(), "bg");
    }
}
