//! EOPF-style product assembly.
//!
//! A product is the decoded cube plus its merged attributes, laid out as
//!
//! ```text
//! measurements/
//!     image/
//!         y, x
//!         oa01_radiance, oa02_radiance, ...
//! conditions/
//!     geometry/          (constant illumination/viewing layers, if known)
//! ```
//!
//! written either as a Zarr store or as a COG product directory
//! (`attrs.json` per group level, one GeoTIFF per band).

use anyhow::Result;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

use crate::common::files::write_file_with_dirs;
use crate::header::attributes::{build_root_attrs, parse_attribute_text};
use crate::header::envi::EnviHeader;
use crate::raster::geo;
use crate::raster::{BandCube, DataType};
use crate::store::tiff::{self, GeoTags};
use crate::store::zarr::ZarrWriter;

const MEASUREMENT_BASE: &str = "measurements/image";

/// Everything needed to lay a product down on disk.
pub struct EopfProduct {
    pub name: String,
    pub root_attrs: Map<String, Value>,
    pub band_attrs: Vec<Map<String, Value>>,
    pub geometry: Vec<(String, f64)>,
    pub transform: Option<geo::GeoTransform>,
    pub epsg: Option<i32>,
}

/// Units string for radiance bands: the CHRIS field wins over the ENVI key.
fn radiance_units(header: &EnviHeader, root_attrs: &Map<String, Value>) -> Option<String> {
    root_attrs
        .get("chris_calibration_data_units")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| {
            header
                .get_str("calibration data units")
                .or_else(|| header.get_str("chris_calibration_data_units"))
                .map(str::to_string)
        })
}

/// Assemble product attributes from the cube, the ENVI header, and the CHRIS
/// attribute dump. The product name falls back to the dump's filename stem.
pub fn build_product(
    cube: &BandCube,
    header: &EnviHeader,
    hdr_txt_path: &Path,
    product_name: Option<&str>,
) -> Result<EopfProduct> {
    let chris_meta = parse_attribute_text(hdr_txt_path, false).unwrap_or_default();
    let hdr_name = hdr_txt_path.to_string_lossy();
    let mut root_attrs = build_root_attrs(&chris_meta, &hdr_name);

    let name = match product_name {
        Some(name) => name.to_string(),
        None => root_attrs
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("product")
            .to_string(),
    };

    let units = radiance_units(header, &root_attrs);

    // merge the ENVI header into the root attributes
    for (key, value) in header.to_json() {
        root_attrs.entry(key).or_insert(value);
    }

    root_attrs.insert(
        "stac_discovery".into(),
        json!({
            "properties": {
                "product:type": root_attrs.get("product_type").cloned().unwrap_or(Value::Null),
                "start_datetime": root_attrs.get("datetime").cloned().unwrap_or(Value::Null),
                "platform": root_attrs.get("platform").cloned().unwrap_or(Value::Null),
                "instrument": root_attrs.get("instrument").cloned().unwrap_or(Value::Null),
            }
        }),
    );
    root_attrs.insert("measurement".into(), Value::from("radiance"));
    if let Some(units) = &units {
        root_attrs.insert("measurement:units".into(), Value::from(units.clone()));
    }

    let band_attrs = (0..cube.bands)
        .map(|index| {
            let mut attrs = Map::new();
            attrs.insert("measurement".into(), Value::from("radiance"));
            if let Some(units) = &units {
                attrs.insert("units".into(), Value::from(units.clone()));
            }
            if let Some(wavelengths) = &cube.wavelengths {
                attrs.insert("wavelength_nm".into(), Value::from(wavelengths[index]));
            }
            attrs
        })
        .collect();

    // georeference from the scene centre when the dump provides one
    let (lon, lat, gsd) = geo::extract_center_lat_lon_gsd(&chris_meta);
    let (transform, epsg) = match (lon, lat) {
        (Some(lon), Some(lat)) => {
            let epsg = geo::utm_epsg_from_lonlat(lon, lat);
            let (east, north) = geo::lonlat_to_utm(lon, lat);
            let gt = geo::affine_from_center(east, north, cube.width, cube.height, gsd, gsd);
            for (key, value) in geo::grid_mapping_attrs(epsg) {
                root_attrs.entry(key).or_insert(value);
            }
            (Some(gt), Some(epsg))
        }
        _ => (None, None),
    };

    Ok(EopfProduct {
        name,
        root_attrs,
        band_attrs,
        geometry: geo::constant_geometry_values(&chris_meta),
        transform,
        epsg,
    })
}

fn band_name(index: usize) -> String {
    format!("oa{:02}_radiance", index + 1)
}

/// Write the product as an EOPF-style Zarr store.
pub fn write_eopf_zarr(
    cube: &BandCube,
    header: &EnviHeader,
    hdr_txt_path: &Path,
    out_path: &Path,
) -> Result<()> {
    let stem = out_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());
    let product = build_product(cube, header, hdr_txt_path, stem.as_deref())?;

    let writer = ZarrWriter::create(out_path)?;
    writer.write_group("", &product.root_attrs)?;
    writer.write_group("measurements", &Map::new())?;
    writer.write_group(MEASUREMENT_BASE, &Map::new())?;

    let y: Vec<f64> = (0..cube.height).map(|v| v as f64).collect();
    let x: Vec<f64> = (0..cube.width).map(|v| v as f64).collect();
    writer.write_array(
        &format!("{MEASUREMENT_BASE}/y"),
        &[cube.height],
        &[cube.height],
        &["y"],
        DataType::F64,
        &y,
        &Map::new(),
    )?;
    writer.write_array(
        &format!("{MEASUREMENT_BASE}/x"),
        &[cube.width],
        &[cube.width],
        &["x"],
        DataType::F64,
        &x,
        &Map::new(),
    )?;

    let chunks = [cube.height.min(512), cube.width.min(512)];
    for index in 0..cube.bands {
        writer.write_array(
            &format!("{MEASUREMENT_BASE}/{}", band_name(index)),
            &[cube.height, cube.width],
            &chunks,
            &["y", "x"],
            cube.dtype,
            cube.band(index),
            &product.band_attrs[index],
        )?;
    }

    if !product.geometry.is_empty() {
        writer.write_group("conditions", &Map::new())?;
        writer.write_group("conditions/geometry", &Map::new())?;
        for (name, value) in &product.geometry {
            let layer = vec![*value; cube.height * cube.width];
            writer.write_array(
                &format!("conditions/geometry/{name}"),
                &[cube.height, cube.width],
                &chunks,
                &["y", "x"],
                DataType::F32,
                &layer,
                &Map::new(),
            )?;
        }
    }

    writer.consolidate()?;
    Ok(())
}

/// Write the product as a COG product directory.
pub fn write_eopf_cog(
    cube: &BandCube,
    header: &EnviHeader,
    hdr_txt_path: &Path,
    out_dir: &Path,
) -> Result<()> {
    let stem = out_dir
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());
    let product = build_product(cube, header, hdr_txt_path, stem.as_deref())?;

    if out_dir.exists() {
        fs::remove_dir_all(out_dir)?;
    }
    let image_dir = out_dir.join(MEASUREMENT_BASE);
    fs::create_dir_all(&image_dir)?;

    write_file_with_dirs(
        out_dir.join("attrs.json"),
        serde_json::to_string_pretty(&Value::Object(product.root_attrs.clone()))?,
    )?;
    write_file_with_dirs(
        out_dir.join("measurements/attrs.json"),
        serde_json::to_string_pretty(&json!({}))?,
    )?;
    write_file_with_dirs(
        image_dir.join("attrs.json"),
        serde_json::to_string_pretty(&json!({}))?,
    )?;

    let geo_tags = GeoTags {
        transform: product.transform,
        epsg: product.epsg,
        description: None,
    };
    for index in 0..cube.bands {
        tiff::write_tiff(
            &image_dir.join(format!("{}.tif", band_name(index))),
            cube.width,
            cube.height,
            1,
            cube.dtype,
            cube.band(index),
            &geo_tags,
        )?;
    }

    Ok(())
}

/// Write the cube as a plain Zarr product: a single `data` array with
/// `band`/`y`/`x`/`wavelength` coordinates and the header as root attributes.
pub fn write_plain_zarr(cube: &BandCube, header: &EnviHeader, out_path: &Path) -> Result<()> {
    let writer = ZarrWriter::create(out_path)?;
    writer.write_group("", &header.to_json())?;

    writer.write_array(
        "data",
        &[cube.bands, cube.height, cube.width],
        &[1, cube.height.min(512), cube.width.min(512)],
        &["band", "y", "x"],
        cube.dtype,
        &cube.data,
        &Map::new(),
    )?;

    let band: Vec<f64> = (1..=cube.bands).map(|v| v as f64).collect();
    writer.write_array(
        "band",
        &[cube.bands],
        &[cube.bands],
        &["band"],
        DataType::I64,
        &band,
        &Map::new(),
    )?;

    let y: Vec<f64> = (0..cube.height).map(|v| v as f64).collect();
    writer.write_array(
        "y",
        &[cube.height],
        &[cube.height],
        &["y"],
        DataType::I64,
        &y,
        &Map::new(),
    )?;
    let x: Vec<f64> = (0..cube.width).map(|v| v as f64).collect();
    writer.write_array(
        "x",
        &[cube.width],
        &[cube.width],
        &["x"],
        DataType::I64,
        &x,
        &Map::new(),
    )?;

    if let Some(wavelengths) = &cube.wavelengths {
        writer.write_array(
            "wavelength",
            &[cube.bands],
            &[cube.bands],
            &["band"],
            DataType::F64,
            wavelengths,
            &Map::new(),
        )?;
    }

    writer.consolidate()?;
    Ok(())
}

/// Write the cube as a plain multi-band GeoTIFF, wavelengths embedded as a
/// JSON description tag.
pub fn write_plain_geotiff(cube: &BandCube, header: &EnviHeader, out_path: &Path) -> Result<()> {
    // re-pack (band, y, x) planes into chunky pixel order
    let mut data = Vec::with_capacity(cube.data.len());
    for y in 0..cube.height {
        for x in 0..cube.width {
            for b in 0..cube.bands {
                data.push(cube.get(b, y, x));
            }
        }
    }

    let description = cube
        .wavelengths
        .as_ref()
        .map(|w| json!({ "wavelengths": w }).to_string());

    // georeference only when the header carries a grid mapping
    let epsg = geo::epsg_from_attrs(&header.to_json());

    tiff::write_tiff(
        out_path,
        cube.width,
        cube.height,
        cube.bands,
        cube.dtype,
        &data,
        &GeoTags {
            transform: None,
            epsg,
            description,
        },
    )
}
