//! ENVI-style ASCII header (`.hdr`) parsing.
//!
//! Headers are `key = value` lines. Values may be brace-wrapped, and
//! comma-separated values form lists (the `wavelength` key is always treated
//! as a list). Numeric values are coerced, with integral floats stored as
//! integers.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A single parsed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    Text(String),
    FloatList(Vec<f64>),
    TextList(Vec<String>),
}

impl HeaderValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(v) => Some(*v),
            HeaderValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Int(v) => Some(*v as f64),
            HeaderValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_list(&self) -> Option<&[f64]> {
        match self {
            HeaderValue::FloatList(v) => Some(v),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            HeaderValue::Int(v) => Value::from(*v),
            HeaderValue::Float(v) => Value::from(*v),
            HeaderValue::Text(v) => Value::from(v.clone()),
            HeaderValue::FloatList(v) => Value::from(v.clone()),
            HeaderValue::TextList(v) => Value::from(v.clone()),
        }
    }
}

/// Parsed ENVI header: lowercased keys mapped to typed values.
#[derive(Debug, Clone, Default)]
pub struct EnviHeader {
    values: BTreeMap<String, HeaderValue>,
}

impl EnviHeader {
    pub fn parse(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read ENVI header {}", path.display()))?;
        Ok(Self::parse_str(&text))
    }

    pub fn parse_str(text: &str) -> Self {
        let mut values = BTreeMap::new();

        for line in text.lines() {
            let Some((key, raw_value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let mut value = raw_value.trim();

            let braced = value.starts_with('{') && value.ends_with('}');
            if braced {
                value = value[1..value.len() - 1].trim();
            }

            if value.contains(',') && (line.contains('{') || key == "wavelength") {
                let items: Vec<String> = value.split(',').map(|v| v.trim().to_string()).collect();
                let floats: Option<Vec<f64>> = items.iter().map(|v| v.parse().ok()).collect();
                let parsed = match floats {
                    Some(f) => HeaderValue::FloatList(f),
                    None => HeaderValue::TextList(items),
                };
                values.insert(key, parsed);
            } else {
                let parsed = match value.parse::<f64>() {
                    Ok(num) if num.fract() == 0.0 && num.abs() < i64::MAX as f64 => {
                        HeaderValue::Int(num as i64)
                    }
                    Ok(num) => HeaderValue::Float(num),
                    Err(_) => HeaderValue::Text(value.to_string()),
                };
                values.insert(key, parsed);
            }
        }

        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.values.get(key)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.as_i64()).map(|v| v as usize)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// The wavelength list, when present and numeric.
    pub fn wavelengths(&self) -> Option<Vec<f64>> {
        self.get("wavelength")
            .and_then(|v| v.as_float_list())
            .map(|v| v.to_vec())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// All values as a JSON map, for embedding in product attributes.
    pub fn to_json(&self) -> serde_json::Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}
