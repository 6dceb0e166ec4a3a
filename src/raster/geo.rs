//! Geolocation helpers: UTM zone lookup, affine grids, GPS ephemeris checks.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::header::attributes::ChrisAttributes;
use crate::raster::BandCube;

/// GDAL-style geotransform: (origin x, x res, 0, origin y, 0, -y res).
pub type GeoTransform = (f64, f64, f64, f64, f64, f64);

/// EPSG code of the WGS 84 UTM zone containing a lon/lat point.
pub fn utm_epsg_from_lonlat(lon: f64, lat: f64) -> i32 {
    let zone = ((lon + 180.0) / 6.0).floor() as i32 + 1;
    (if lat >= 0.0 { 326 } else { 327 }) * 100 + zone
}

/// Geotransform whose grid is centred on the given projected point.
pub fn affine_from_center(
    east: f64,
    north: f64,
    width: usize,
    height: usize,
    xres: f64,
    yres: f64,
) -> GeoTransform {
    let origin_x = east - (xres * (width as f64 / 2.0));
    let origin_y = north + (yres * (height as f64 / 2.0));
    (origin_x, xres, 0.0, origin_y, 0.0, -yres)
}

/// Projected x/y coordinate vectors for a geotransformed grid.
pub fn build_xy_coords(gt: GeoTransform, width: usize, height: usize) -> (Vec<f64>, Vec<f64>) {
    let (a, b, _c, d, _e, f) = gt;
    let x = (0..width).map(|i| a + b * i as f64).collect();
    let y = (0..height).map(|i| d + f * i as f64).collect();
    (x, y)
}

/// CF grid-mapping attributes for a UTM EPSG code.
pub fn grid_mapping_attrs(epsg: i32) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert(
        "grid_mapping_name".into(),
        Value::from("transverse_mercator"),
    );
    attrs.insert("spatial_ref".into(), Value::from(format!("EPSG:{epsg}")));
    attrs.insert("epsg_code".into(), Value::from(format!("EPSG:{epsg}")));
    attrs
}

/// Centre lon/lat and nominal ground sample distance from CHRIS attributes.
/// Mode 1 images are 36 m; every other mode is 18 m.
pub fn extract_center_lat_lon_gsd(meta: &ChrisAttributes) -> (Option<f64>, Option<f64>, f64) {
    let lon = meta.get("Longitude").and_then(|v| v.trim().parse().ok());
    let lat = meta
        .get("Lattitude")
        .or_else(|| meta.get("Latitude"))
        .and_then(|v| v.trim().parse().ok());

    let mode: Option<i64> = meta.get("CHRIS Mode").and_then(|v| v.trim().parse().ok());
    let gsd = if mode == Some(1) { 36.0 } else { 18.0 };

    match (lon, lat) {
        (Some(lon), Some(lat)) => (Some(lon), Some(lat), gsd),
        _ => (None, None, gsd),
    }
}

/// Extract the EPSG integer from a `spatial_ref` attribute like `EPSG:32612`.
pub fn epsg_from_attrs(attrs: &Map<String, Value>) -> Option<i32> {
    let spatial_ref = attrs.get("spatial_ref")?.as_str()?;
    let code = spatial_ref.to_uppercase().strip_prefix("EPSG:")?.parse().ok()?;
    Some(code)
}

/// Constant viewing/illumination geometry values from CHRIS attributes,
/// keyed by their EOPF condition layer names.
pub fn constant_geometry_values(meta: &ChrisAttributes) -> Vec<(String, f64)> {
    let normalised: std::collections::BTreeMap<String, &str> = meta
        .values
        .iter()
        .map(|(k, v)| {
            let key = k.split_whitespace().collect::<Vec<_>>().join(" ");
            (key.to_lowercase(), v.as_str())
        })
        .collect();

    [
        ("sza", "solar zenith angle"),
        ("oza", "observation zenith angle"),
        ("oaa", "observation azimuth angle"),
        ("saa", "solar azimuth angle"),
    ]
    .iter()
    .filter_map(|(name, key)| {
        normalised
            .get(*key)
            .and_then(|v| v.trim().parse().ok())
            .map(|v| (name.to_string(), v))
    })
    .collect()
}

/// Project a WGS 84 lon/lat point into its UTM zone (metres).
///
/// Standard transverse Mercator series expansion; accurate to well under a
/// metre, which is ample for nominal-GSD grids.
pub fn lonlat_to_utm(lon: f64, lat: f64) -> (f64, f64) {
    const A: f64 = 6_378_137.0;
    const F: f64 = 1.0 / 298.257_223_563;
    const K0: f64 = 0.9996;

    let zone = ((lon + 180.0) / 6.0).floor() + 1.0;
    let lon0 = ((zone - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let e2 = F * (2.0 - F);
    let ep2 = e2 / (1.0 - e2);

    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();

    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();
    let tan_lat = lat_rad.tan();

    let n = A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = ep2 * cos_lat * cos_lat;
    let a_coef = cos_lat * (lon_rad - lon0);

    let m = A
        * ((1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0) * lat_rad
            - (3.0 * e2 / 8.0 + 3.0 * e2 * e2 / 32.0 + 45.0 * e2 * e2 * e2 / 1024.0)
                * (2.0 * lat_rad).sin()
            + (15.0 * e2 * e2 / 256.0 + 45.0 * e2 * e2 * e2 / 1024.0) * (4.0 * lat_rad).sin()
            - (35.0 * e2 * e2 * e2 / 3072.0) * (6.0 * lat_rad).sin());

    let east = K0
        * n
        * (a_coef
            + (1.0 - t + c) * a_coef.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a_coef.powi(5) / 120.0)
        + 500_000.0;

    let mut north = K0
        * (m + n
            * tan_lat
            * (a_coef * a_coef / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a_coef.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a_coef.powi(6) / 720.0));
    if lat < 0.0 {
        north += 10_000_000.0;
    }

    (east, north)
}

/// Convert a GPS week/seconds pair to a datetime (GPS epoch 1980-01-06).
pub fn gpstime_to_datetime(gps_week: f64, gps_seconds: f64) -> NaiveDateTime {
    let epoch = NaiveDate::from_ymd_opt(1980, 1, 6)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    epoch
        + Duration::days(gps_week as i64 * 7)
        + Duration::milliseconds((gps_seconds * 1000.0) as i64)
}

/// Convert WGS 84 ECEF coordinates (metres) to geodetic lat/lon/alt
/// (degrees, metres). Bowring's closed-form approximation.
pub fn ecef_to_geodetic(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    const A: f64 = 6_378_137.0;
    const F: f64 = 1.0 / 298.257_223_563;
    const B: f64 = A * (1.0 - F);
    let e2 = F * (2.0 - F);
    let ep2 = (A * A - B * B) / (B * B);

    let lon = y.atan2(x);
    let p = (x * x + y * y).sqrt();
    let theta = (z * A).atan2(p * B);

    let lat = (z + ep2 * B * theta.sin().powi(3)).atan2(p - e2 * A * theta.cos().powi(3));
    let n = A / (1.0 - e2 * lat.sin() * lat.sin()).sqrt();
    let alt = p / lat.cos() - n;

    (lat.to_degrees(), lon.to_degrees(), alt)
}

/// Apply the 180° sequence rotation when GPS ephemeris says it is needed.
///
/// Images in a CHRIS sequence are collected during a rocking manoeuvre, so
/// alternate images have alternating N-S / S-N collection. The GPS file gives
/// the orbit direction; the image index parity decides the rotation. Any
/// parsing problem leaves the cube untouched.
pub fn flip_using_gps(
    cube: &mut BandCube,
    meta: &ChrisAttributes,
    gps_file: Option<&Path>,
    centre_times_file: Option<&Path>,
) {
    if gps_file.is_none() || centre_times_file.is_none() {
        return;
    }
    let Some(descending) = orbit_is_descending(meta, gps_file.unwrap()) else {
        return;
    };

    let image_index = meta
        .get("Image No x of y")
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(1);

    let need_flip = (!descending && matches!(image_index, 1 | 3 | 5))
        || (descending && matches!(image_index, 2 | 4));
    if need_flip {
        cube.rotate_180();
    }
}

fn orbit_is_descending(meta: &ChrisAttributes, gps_file: &Path) -> Option<bool> {
    // rows are filtered by acquisition year so multi-year files work
    let year = meta
        .get("Image Date (yyyy-mm-dd)")
        .map(|d| d.chars().take(4).collect::<String>())
        .filter(|y| y.len() == 4);

    let text = fs::read_to_string(gps_file).ok()?;
    let mut first: Option<Vec<String>> = None;
    let mut last: Option<Vec<String>> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(year) = &year {
            if !line.contains(year.as_str()) {
                continue;
            }
        }
        let row: Vec<String> = line.split('\t').map(|v| v.trim().to_string()).collect();
        if first.is_none() {
            first = Some(row);
        } else {
            last = Some(row);
        }
    }

    let (first, last) = (first?, last?);
    let (start_lat, _, _) = ecef_to_geodetic(
        first.get(3)?.parse().ok()?,
        first.get(5)?.parse().ok()?,
        first.get(7)?.parse().ok()?,
    );
    let (end_lat, _, _) = ecef_to_geodetic(
        last.get(3)?.parse().ok()?,
        last.get(5)?.parse().ok()?,
        last.get(7)?.parse().ok()?,
    );

    Some(start_lat > end_lat)
}
