//! EO-SIP conversion pipeline.
//!
//! Products (EOPF Zarr stores or COG product directories) are loaded, their
//! metadata validated, grouped by acquisition sequence, and packaged as
//! `*.ZIP` EO-SIP files containing a browse PNG, the EarthObservation
//! metadata XML, the SIP information XML, and the payload trees.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::common::files::{collect_inputs, next_version, tree_size};
use crate::safe::builder::{make_safe, SafeOptions};
use crate::sip::angles::illumination_angles;
use crate::sip::metadata::{
    acquisition_timestamp, do_metadata_check, file_name_root, product_type_for_mode,
};
use crate::sip::thumbnail::{band_indexes, normalise_band, png_bytes, rgb_thumbnail};
use crate::sip::xml::{render_earth_observation, render_sip_info, PackageInfo};
use crate::store::tiff;
use crate::store::zarr::ZarrStore;

/// Converter options.
#[derive(Debug, Clone)]
pub struct SipOptions {
    pub sat_id: String,
    pub file_class: String,
    pub creator: String,
}

impl Default for SipOptions {
    fn default() -> Self {
        Self {
            sat_id: "PR1".to_string(),
            file_class: "OPER".to_string(),
            creator: "ESA".to_string(),
        }
    }
}

/// Normalised browse planes for one product.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub width: usize,
    pub height: usize,
    pub red: Vec<f64>,
    pub green: Vec<f64>,
    pub blue: Vec<f64>,
}

/// One loaded product.
#[derive(Debug, Clone)]
pub struct Data {
    pub path: PathBuf,
    pub raw_metadata: Map<String, Value>,
    pub thumbnail: Thumbnail,
}

fn attr_str<'a>(attrs: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(|v| v.as_str())
}

/// Wavelengths aligned to the band arrays. Headers keep the bogus leading
/// 0.0 nm entry that the decoded cube drops, so an off-by-one list is
/// realigned by skipping it.
fn aligned_wavelengths(attrs: &Map<String, Value>, band_count: usize) -> Result<Vec<f64>> {
    let Some(Value::Array(items)) = attrs.get("wavelength") else {
        bail!("Product attributes carry no wavelength list");
    };
    let mut wavelengths: Vec<f64> = items.iter().filter_map(|v| v.as_f64()).collect();
    if wavelengths.len() != items.len() {
        bail!("Wavelength list is not numeric");
    }
    if wavelengths.len() == band_count + 1 && wavelengths.first() == Some(&0.0) {
        wavelengths.remove(0);
    }
    if wavelengths.len() < band_count {
        bail!(
            "Wavelength list ({}) shorter than band count ({band_count})",
            wavelengths.len()
        );
    }
    wavelengths.truncate(band_count);
    Ok(wavelengths)
}

fn build_thumbnail(
    bands: Vec<(String, usize, usize, Vec<f64>)>,
    attrs: &Map<String, Value>,
) -> Result<Thumbnail> {
    if bands.is_empty() {
        bail!("Product has no band arrays");
    }
    let (width, height) = (bands[0].2, bands[0].1);
    let wavelengths = aligned_wavelengths(attrs, bands.len())?;
    let (r, g, b) = band_indexes(&wavelengths)?;

    println!(
        "Generating image with bands {}, {} and {}",
        bands[r].0, bands[g].0, bands[b].0
    );

    Ok(Thumbnail {
        width,
        height,
        red: normalise_band(&bands[r].3),
        green: normalise_band(&bands[g].3),
        blue: normalise_band(&bands[b].3),
    })
}

/// Load an EOPF Zarr product: root attributes plus the band arrays of the
/// deepest measurement group.
pub fn load_zarr_product(path: &Path) -> Result<Data> {
    let store = ZarrStore::open(path)?;
    let raw_metadata = store.root_attrs()?;

    let group = store
        .groups()
        .into_iter()
        .filter(|g| !g.is_empty())
        .max()
        .context("Zarr product has no groups")?;

    let mut bands = Vec::new();
    for name in store.array_names(&group)? {
        let attrs = store.array_attrs(&group, &name)?;
        let dims = attrs.get("_ARRAY_DIMENSIONS").cloned().unwrap_or_default();
        if dims.as_array().map(|d| d.len()) != Some(2) {
            continue; // coordinate vectors
        }
        let (height, width, values) = store.read_array_2d(&group, &name)?;
        bands.push((name, height, width, values));
    }

    let thumbnail = build_thumbnail(bands, &raw_metadata)?;
    Ok(Data {
        path: path.to_path_buf(),
        raw_metadata,
        thumbnail,
    })
}

/// Load a COG product directory: `attrs.json` plus the band GeoTIFFs of the
/// deepest group directory.
pub fn load_cog_product(path: &Path) -> Result<Data> {
    let attrs_path = path.join("attrs.json");
    let raw_metadata: Map<String, Value> = serde_json::from_str(
        &fs::read_to_string(&attrs_path)
            .with_context(|| format!("Missing {}", attrs_path.display()))?,
    )?;

    let band_dir = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.path().to_path_buf())
        .max()
        .unwrap_or_else(|| path.to_path_buf());

    let mut bands = Vec::new();
    let mut tif_names: Vec<PathBuf> = fs::read_dir(&band_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "tif"))
        .collect();
    tif_names.sort();

    for tif in tif_names {
        let image = tiff::read_tiff(&tif)?;
        let name = tif
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        bands.push((name, image.height, image.width, image.plane(0)));
    }

    let thumbnail = build_thumbnail(bands, &raw_metadata)?;
    Ok(Data {
        path: path.to_path_buf(),
        raw_metadata,
        thumbnail,
    })
}

/// Load a product of either kind, by directory suffix.
pub fn load_product(path: &Path) -> Result<Data> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.ends_with(".zarr") {
        load_zarr_product(path)
    } else if name.ends_with(".cog") {
        load_cog_product(path)
    } else {
        bail!("File type not recognised")
    }
}

fn image_index(data: &Data) -> u32 {
    attr_str(&data.raw_metadata, "chris_image_no_x_of_y")
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
        .unwrap_or(u32::MAX)
}

/// The centre image of an acquisition sequence: the member with the lowest
/// `Image No x of y` index (ties keep the first).
pub fn identify_centre_image(all_data: &[Data]) -> &Data {
    all_data
        .iter()
        .min_by_key(|data| image_index(data))
        .expect("sequence has at least one member")
}

/// Append a directory tree to an open ZIP under `{prefix}/…`.
pub fn zip_directory<W: Write + std::io::Seek>(
    dir: &Path,
    prefix: &str,
    zip: &mut ZipWriter<W>,
) -> Result<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .expect("walk stays under dir");
        if relative.as_os_str().is_empty() {
            continue;
        }
        let name = format!("{prefix}/{}", relative.to_string_lossy().replace('\\', "/"));

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            zip.write_all(&fs::read(entry.path())?)?;
        }
    }
    Ok(())
}

fn acquisition_key(data: &Data) -> String {
    attr_str(&data.raw_metadata, "chris_image_tag_number")
        .or_else(|| attr_str(&data.raw_metadata, "id"))
        .map(str::to_string)
        .unwrap_or_else(|| data.path.to_string_lossy().into_owned())
}

fn package_info(
    centre: &Data,
    group: &[Data],
    extras: Option<&Path>,
    id: &str,
) -> Result<PackageInfo> {
    let attrs = &centre.raw_metadata;
    let timestamp = acquisition_timestamp(attrs)?;

    let latitude: f64 = attr_str(attrs, "chris_lattitude")
        .unwrap_or_default()
        .parse()
        .context("Unparseable chris_lattitude")?;
    let longitude: f64 = attr_str(attrs, "chris_longitude")
        .unwrap_or_default()
        .parse()
        .context("Unparseable chris_longitude")?;

    let (azimuth, elevation) = illumination_angles(timestamp, latitude, longitude);

    let mode = attr_str(attrs, "chris_chris_mode").unwrap_or_default();
    let product_type = product_type_for_mode(mode).unwrap_or("CHR_MO1_1P");

    let file_size = match extras {
        Some(extras) => tree_size(extras),
        None => group.iter().map(|d| tree_size(&d.path)).sum(),
    };

    let mut vendor_specific = Vec::new();
    if let Some(original) = attr_str(attrs, "id") {
        vendor_specific.push(("originalName".to_string(), original.to_string()));
    }
    if let Some(site) = attr_str(attrs, "chris_target_name") {
        vendor_specific.push(("siteName".to_string(), site.to_string()));
    }
    if let Some(code) = attr_str(attrs, "chris_image_target_code") {
        vendor_specific.push(("targetCode".to_string(), code.to_string()));
    }

    Ok(PackageInfo {
        id: id.to_string(),
        begin: timestamp,
        end: timestamp,
        result_time: timestamp,
        operational_mode: format!("MODE-{}", mode.to_uppercase()),
        product_type: product_type.to_string(),
        illumination_azimuth: azimuth,
        illumination_elevation: elevation,
        center_position: format!("{latitude} {longitude}"),
        file_size,
        vendor_specific,
    })
}

/// Convert the comma-separated inputs into EO-SIP packages in `output`.
/// Returns the package paths written.
pub fn convert_eo_sip(
    inputs: &str,
    output: &Path,
    extras: Option<&Path>,
    options: &SipOptions,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output folder {}", output.display()))?;

    let input_list: Vec<String> = inputs.split(',').map(str::to_string).collect();
    let entries = collect_inputs(&input_list);
    if entries.is_empty() {
        bail!("No usable inputs in {inputs:?}");
    }

    if let Some(extras) = extras {
        if !(extras.is_dir() && extras.to_string_lossy().ends_with(".SAFE")) {
            bail!("Extras {} is not a SAFE directory", extras.display());
        }
    }

    // load and validate everything up front
    let mut sequences: BTreeMap<String, Vec<Data>> = BTreeMap::new();
    for entry in &entries {
        println!("Processing {}", entry.display());
        let data = load_product(entry)?;
        do_metadata_check(&data.raw_metadata)?;
        sequences.entry(acquisition_key(&data)).or_default().push(data);
    }

    let mut written = Vec::new();

    for group in sequences.values() {
        let centre = identify_centre_image(group);
        let attrs = &centre.raw_metadata;

        let root = file_name_root(attrs, &options.sat_id, &options.file_class)?;
        let version = next_version(&root, ".ZIP", output);
        let name = format!("{root}_{version}");

        let info = package_info(centre, group, extras, &name)?;
        let metadata_xml = render_earth_observation(&info)?;
        let info_xml = render_sip_info(&options.creator, Utc::now())?;

        let thumbnail = &centre.thumbnail;
        let image = rgb_thumbnail(
            &thumbnail.red,
            &thumbnail.green,
            &thumbnail.blue,
            thumbnail.width,
            thumbnail.height,
        )?;
        let image_data = png_bytes(&image)?;

        let zip_path = output.join(format!("{name}.ZIP"));
        println!("Writing to {}", zip_path.display());

        let mut zip = ZipWriter::new(File::create(&zip_path)?);
        let file_options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(format!("{name}.BI.PNG"), file_options)?;
        zip.write_all(&image_data)?;
        zip.start_file(format!("{name}.MD.XML"), file_options)?;
        zip.write_all(metadata_xml.as_bytes())?;
        zip.start_file(format!("{name}.SI.XML"), file_options)?;
        zip.write_all(info_xml.as_bytes())?;

        match extras {
            Some(extras) => {
                let prefix = extras
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "extras.SAFE".to_string());
                zip_directory(extras, &prefix, &mut zip)?;
            }
            None => {
                for member in group {
                    let prefix = member
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    zip_directory(&member.path, &prefix, &mut zip)?;
                }
            }
        }

        zip.finish()?;
        written.push(zip_path);
    }

    // extras metadata also gets re-packaged as a SAFE archive when its
    // member files carry the required attributes
    if let Some(extras) = extras {
        let measurement = extras.join("measurement");
        let source = if measurement.is_dir() {
            measurement
        } else {
            extras.to_path_buf()
        };
        let safe_options = SafeOptions {
            sat_id: options.sat_id.clone(),
            file_class: options.file_class.clone(),
            ..Default::default()
        };
        if let Err(error) = make_safe(&source.to_string_lossy(), output, &safe_options) {
            eprintln!(
                "  [WARN] No SAFE archive from extras {}: {error}",
                extras.display()
            );
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn data_with_index(index: &str) -> Data {
        let mut raw_metadata = Map::new();
        raw_metadata.insert("chris_image_no_x_of_y".into(), Value::from(index));
        Data {
            path: PathBuf::from("unused"),
            raw_metadata,
            thumbnail: Thumbnail {
                width: 0,
                height: 0,
                red: Vec::new(),
                green: Vec::new(),
                blue: Vec::new(),
            },
        }
    }

    #[test]
    fn test_identify_centre_image_all_present() {
        let all: Vec<Data> = (1..6).map(|i| data_with_index(&format!("{i} of 5"))).collect();
        let centre = identify_centre_image(&all);
        assert_eq!(
            attr_str(&centre.raw_metadata, "chris_image_no_x_of_y"),
            Some("1 of 5")
        );
    }

    #[test]
    fn test_identify_centre_image_missing_members() {
        let all: Vec<Data> = (2..6).map(|i| data_with_index(&format!("{i} of 5"))).collect();
        assert_eq!(
            attr_str(&identify_centre_image(&all).raw_metadata, "chris_image_no_x_of_y"),
            Some("2 of 5")
        );

        let all: Vec<Data> = (3..6).map(|i| data_with_index(&format!("{i} of 5"))).collect();
        assert_eq!(
            attr_str(&identify_centre_image(&all).raw_metadata, "chris_image_no_x_of_y"),
            Some("3 of 5")
        );
    }

    #[test]
    fn test_identify_centre_image_duplicates() {
        let all: Vec<Data> = (0..4).map(|_| data_with_index("1 of 5")).collect();
        assert_eq!(
            attr_str(&identify_centre_image(&all).raw_metadata, "chris_image_no_x_of_y"),
            Some("1 of 5")
        );
    }

    #[test]
    fn test_zip_directory_preserves_layout() {
        let tmp_in = TempDir::new().unwrap();
        let tmp_out = TempDir::new().unwrap();

        for i in 0..5 {
            let dir = tmp_in.path().join(format!("outputs{i}"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("file{i}.txt")), "x".repeat(100)).unwrap();
        }

        let zip_path = tmp_out.path().join("output.zip");
        let mut zip = ZipWriter::new(File::create(&zip_path).unwrap());
        zip_directory(tmp_in.path(), "folder contents", &mut zip).unwrap();
        zip.finish().unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        archive.extract(tmp_out.path()).unwrap();

        let extracted = tmp_out.path().join("folder contents");
        let entries: Vec<_> = fs::read_dir(&extracted).unwrap().flatten().collect();
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| e.path().is_dir()));
        assert!(extracted.join("outputs2/file2.txt").is_file());
    }

    #[test]
    fn test_aligned_wavelengths_drops_bogus_lead() {
        let mut attrs = Map::new();
        attrs.insert("wavelength".into(), json!([0.0, 442.5, 491.1]));
        assert_eq!(aligned_wavelengths(&attrs, 2).unwrap(), vec![442.5, 491.1]);

        attrs.insert("wavelength".into(), json!([442.5, 491.1]));
        assert_eq!(aligned_wavelengths(&attrs, 2).unwrap(), vec![442.5, 491.1]);
    }

    #[test]
    fn test_load_product_rejects_unknown_kind() {
        let err = load_product(Path::new("something.other")).unwrap_err();
        assert!(err.to_string().contains("File type not recognised"));
    }
}
