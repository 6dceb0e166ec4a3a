//! Product metadata validation and EO-SIP naming.

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Operating mode to EO-SIP product type.
pub fn product_type_for_mode(mode: &str) -> Option<&'static str> {
    match mode.to_lowercase().as_str() {
        "1" => Some("CHR_MO1_1P"),
        "2" => Some("CHR_MO2_1P"),
        "3" => Some("CHR_MO3_1P"),
        "4" => Some("CHR_MO4_1P"),
        "5" => Some("CHR_MO5_1P"),
        "hrc" => Some("HRC_HRC_1P"),
        _ => None,
    }
}

fn get_str<'a>(attrs: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(|v| v.as_str())
}

/// Validate the product attributes an EO-SIP package is built from.
///
/// Missing and invalid entries are reported separately; all problems are
/// collected before failing.
pub fn do_metadata_check(attrs: &Map<String, Value>) -> Result<()> {
    let pattern_checks = [
        ("chris_lattitude", r"[-]?\d+.\d+"),
        ("chris_longitude", r"[-]?\d+.\d+"),
        ("chris_chris_mode", r"([1-5]|hrc)"),
        ("chris_image_date_yyyy_mm_dd_", r"[A-z0-9\-\s]+"),
        ("chris_calculated_image_centre_time", r"[A-z0-9\-:\s]+"),
    ];
    let range_checks = [
        ("chris_lattitude", -90.0, 90.0),
        ("chris_longitude", -180.0, 180.0),
    ];

    let mut missing = BTreeSet::new();
    let mut invalid = BTreeSet::new();

    for (key, pattern) in pattern_checks {
        let Some(value) = attrs.get(key) else {
            missing.insert(key);
            continue;
        };
        match value.as_str() {
            Some(text) => {
                let regex = Regex::new(&format!("^{pattern}$")).expect("valid check pattern");
                if !regex.is_match(text) {
                    invalid.insert(key);
                }
            }
            None => {
                invalid.insert(key);
            }
        }
    }

    match attrs.get("wavelength") {
        None => {
            missing.insert("wavelength");
        }
        Some(Value::Array(items)) if !items.is_empty() => {
            if !items.iter().all(|v| v.is_number()) {
                invalid.insert("wavelength");
            }
        }
        Some(_) => {
            invalid.insert("wavelength");
        }
    }

    for (key, min, max) in range_checks {
        let Some(value) = attrs.get(key) else {
            missing.insert(key);
            continue;
        };
        match value.as_str().and_then(|t| t.parse::<f64>().ok()) {
            Some(number) if (min..=max).contains(&number) => {}
            _ => {
                invalid.insert(key);
            }
        }
    }

    if let Some(date) = get_str(attrs, "chris_image_date_yyyy_mm_dd_") {
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            invalid.insert("chris_image_date_yyyy_mm_dd_");
        }
    }
    if let Some(time) = get_str(attrs, "chris_calculated_image_centre_time") {
        if NaiveTime::parse_from_str(time, "%H:%M:%S").is_err() {
            invalid.insert("chris_calculated_image_centre_time");
        }
    }

    if !missing.is_empty() {
        bail!("Missing metadata entries identified: {missing:?}");
    }
    if !invalid.is_empty() {
        bail!("Invalid metadata identified: {invalid:?}");
    }
    Ok(())
}

fn split_degrees(raw: &str) -> Result<(bool, u32, u32)> {
    let Some((degrees, fraction)) = raw.split_once('.') else {
        bail!("Coordinate {raw} has no decimal part");
    };
    let negative = degrees.starts_with('-');
    let degrees: u32 = degrees.trim_start_matches('-').parse()?;
    let milli = (format!("0.{fraction}").parse::<f64>()? * 1000.0) as u32;
    Ok((negative, degrees, milli))
}

/// Format a latitude string for EO-SIP file names: `"012.34"` → `N12-340`.
pub fn format_latitude(raw: &str) -> Result<String> {
    let (negative, degrees, milli) = split_degrees(raw)?;
    let hemisphere = if negative { 'S' } else { 'N' };
    Ok(format!("{hemisphere}{degrees:02}-{milli:03}"))
}

/// Format a longitude string for EO-SIP file names: `"-012.034"` → `W012-034`.
pub fn format_longitude(raw: &str) -> Result<String> {
    let (negative, degrees, milli) = split_degrees(raw)?;
    let hemisphere = if negative { 'W' } else { 'E' };
    Ok(format!("{hemisphere}{degrees:03}-{milli:03}"))
}

/// Acquisition timestamp from the image date and centre time attributes.
pub fn acquisition_timestamp(attrs: &Map<String, Value>) -> Result<NaiveDateTime> {
    let (Some(date), Some(time)) = (
        get_str(attrs, "chris_image_date_yyyy_mm_dd_"),
        get_str(attrs, "chris_calculated_image_centre_time"),
    ) else {
        bail!("Acquisition date/time attributes missing");
    };
    Ok(NaiveDateTime::parse_from_str(
        &format!("{date} {time}"),
        "%Y-%m-%d %H:%M:%S",
    )?)
}

/// EO-SIP file name root:
/// `{sat}_{class}_{product type}_{yyyymmdd}T{hhmmss}_{lat}_{lon}`.
pub fn file_name_root(
    attrs: &Map<String, Value>,
    sat_id: &str,
    file_class: &str,
) -> Result<String> {
    let mode = get_str(attrs, "chris_chris_mode").unwrap_or_default();
    let Some(product_type) = product_type_for_mode(mode) else {
        bail!("Unknown CHRIS mode: {mode}");
    };

    let latitude = get_str(attrs, "chris_lattitude").unwrap_or_default();
    let longitude = get_str(attrs, "chris_longitude").unwrap_or_default();
    let timestamp = acquisition_timestamp(attrs)?.format("%Y%m%dT%H%M%S");

    Ok(format!(
        "{sat_id}_{file_class}_{product_type}_{timestamp}_{}_{}",
        format_latitude(latitude)?,
        format_longitude(longitude)?,
    ))
}
