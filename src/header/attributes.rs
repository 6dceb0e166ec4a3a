//! CHRIS ASCII attribute dump (`.hdr.txt`) parsing.
//!
//! The dump is a sequence of comment lines: `//Key<TAB>Value`,
//! `//Key  Value`, or a bare `//Key` followed by a non-comment value line.
//! Section titles ending in `ATTRIBUTES` separate blocks, and the `WLLOW…`
//! spectral response table closes the file.

use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Parsed attribute dump: key/value pairs plus the optional spectral table.
#[derive(Debug, Clone, Default)]
pub struct ChrisAttributes {
    pub values: BTreeMap<String, String>,
    pub spectral_table: Option<Vec<BTreeMap<String, String>>>,
}

impl ChrisAttributes {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }
}

/// Parse a CHRIS attribute dump from disk.
pub fn parse_attribute_text(path: &Path, keep_spectral_table: bool) -> Result<ChrisAttributes> {
    if !path.is_file() {
        bail!("CHRIS metadata file not found: {}", path.display());
    }
    let Ok(text) = fs::read_to_string(path) else {
        bail!("Cannot read CHRIS metadata file: {}", path.display());
    };
    Ok(parse_attribute_str(&text, keep_spectral_table))
}

/// Parse a CHRIS attribute dump from a string.
pub fn parse_attribute_str(text: &str, keep_spectral_table: bool) -> ChrisAttributes {
    let ws = Regex::new(r"\s+").unwrap();
    let two_spaces = Regex::new(r" {2,}").unwrap();

    let mut values = BTreeMap::new();
    let mut last_key: Option<String> = None;
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<BTreeMap<String, String>> = Vec::new();
    let mut in_table = false;

    for raw in text.lines() {
        if let Some(stripped) = raw.strip_prefix("//") {
            let text = stripped.trim_start_matches('/').trim();

            if text.to_uppercase().starts_with("WLLOW") {
                in_table = true;
                if keep_spectral_table {
                    columns = ws.split(text).map(str::to_string).collect();
                }
                continue;
            }

            // everything after the table header is table content
            if in_table {
                if keep_spectral_table {
                    let row: Vec<&str> = ws.split(text).collect();
                    if row.len() == columns.len() {
                        rows.push(
                            columns
                                .iter()
                                .cloned()
                                .zip(row.iter().map(|v| v.to_string()))
                                .collect(),
                        );
                    }
                }
                continue;
            }

            // section titles carry no value
            if text.is_empty() || text.to_uppercase().ends_with("ATTRIBUTES") {
                last_key = None;
                continue;
            }

            if text.contains('\t') || text.contains("  ") {
                let (key, value) = if let Some((k, v)) = text.split_once('\t') {
                    (k, v.rsplit('\t').next().unwrap_or(v))
                } else {
                    let parts: Vec<&str> = two_spaces.split(text).collect();
                    (parts[0], *parts.last().unwrap())
                };
                values.insert(key.trim().to_string(), value.trim().to_string());
                last_key = None;
            } else {
                last_key = Some(text.to_string());
            }
        } else if let Some(key) = last_key.take() {
            if !raw.trim().is_empty() {
                values.insert(key, raw.trim().to_string());
            } else {
                last_key = Some(key);
            }
        } else if in_table && keep_spectral_table && !raw.trim().is_empty() {
            let row: Vec<&str> = ws.split(raw.trim()).collect();
            if row.len() == columns.len() {
                rows.push(
                    columns
                        .iter()
                        .cloned()
                        .zip(row.iter().map(|v| v.to_string()))
                        .collect(),
                );
            }
        }
    }

    ChrisAttributes {
        values,
        spectral_table: keep_spectral_table.then_some(rows),
    }
}

fn key_cleaner() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9a-zA-Z_]+").unwrap())
}

/// Normalise an attribute key for use in product attributes:
/// non-alphanumeric runs become `_`, lowercased.
pub fn normalise_key(key: &str) -> String {
    key_cleaner().replace_all(key, "_").to_lowercase()
}

/// Map parsed CHRIS attributes and the dump filename into product root
/// attributes. The product id is the filename stem with `.txt` and `.hdr`
/// extensions stripped.
pub fn build_root_attrs(meta: &ChrisAttributes, hdr_filename: &str) -> Map<String, Value> {
    let mut attrs = Map::new();

    let mut stem = Path::new(hdr_filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(hdr_filename)
        .to_string();
    for ext in [".txt", ".hdr"] {
        if let Some(s) = stem.strip_suffix(ext) {
            stem = s.to_string();
        }
    }
    attrs.insert("id".into(), Value::from(stem));
    attrs.insert("product_type".into(), Value::from("CHRIS-RCI"));

    if let (Some(date), Some(centre)) = (
        meta.get("Image Date (yyyy-mm-dd)"),
        meta.get("Calculated Image Centre Time"),
    ) {
        let datetime = match NaiveDateTime::parse_from_str(
            &format!("{date} {centre}"),
            "%Y-%m-%d %H:%M:%S",
        ) {
            Ok(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            Err(_) => format!("{date}T{centre}Z"),
        };
        attrs.insert("datetime".into(), Value::from(datetime));
    }

    attrs.insert("platform".into(), Value::from("ESA PROBA"));
    if let Some(sensor) = meta.get("Sensor Type") {
        attrs.insert("instrument".into(), Value::from(sensor));
    }

    let lat = meta.get("Lattitude").or_else(|| meta.get("Latitude"));
    if let (Some(lon), Some(lat)) = (meta.get("Longitude"), lat) {
        attrs.insert("center_lon".into(), Value::from(lon));
        attrs.insert("center_lat".into(), Value::from(lat));
    }

    for (key, value) in &meta.values {
        let clean = normalise_key(key);
        if attrs.contains_key(&clean) {
            continue;
        }
        attrs.insert(format!("chris_{clean}"), Value::from(value.clone()));
    }

    attrs
}
