//! SAFE archive assembly.
//!
//! Each input becomes one `*.SAFE` directory in the output folder:
//!
//! ```text
//! CHRIS_20040411T181816_0001_RPI-BAS_F65D.SAFE/
//!     manifest.safe
//!     measurement/      copies of the member files
//!     metadata/         one {ext}.xsd per recognised extension
//! ```
//!
//! The name carries the acquisition timestamp (parsed out of the member
//! files), a version number, the optional package type, and a CRC-16 over
//! the manifest. `documentation/` and `index/` are created and pruned when
//! they stay empty.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::common::checksum::crc16;
use crate::common::files::next_version;
use crate::header::attributes::parse_attribute_str;
use crate::safe::manifest::{describe_data_object, render_manifest};
use crate::safe::schemas::schema_for_extension;

/// Package types accepted in SAFE names.
pub const VALID_PACKAGE_TYPES: [&str; 6] = [
    "RPI-BAS", "RPI-DAT", "RPI-MTD", "COL-MTD", "DAT-PRD", "DAT-AUX",
];

/// SAFE builder options, defaults matching operational CHRIS products.
#[derive(Debug, Clone)]
pub struct SafeOptions {
    pub package_type: Option<String>,
    pub mode: String,
    pub file_class: String,
    pub sat_id: String,
}

impl Default for SafeOptions {
    fn default() -> Self {
        Self {
            package_type: None,
            mode: "1".to_string(),
            file_class: "OPER".to_string(),
            sat_id: "PR1".to_string(),
        }
    }
}

/// Harvest SAFE naming metadata from member files.
///
/// Every member is parsed as CHRIS attribute text; harvested keys are
/// squashed (spaces and hyphens removed) so `Image Date (yyyy-mm-dd)` becomes
/// `ImageDate(yyyymmdd)`. Binary members simply contribute nothing.
pub fn harvest_metadata(paths: &[PathBuf]) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for path in paths {
        let Ok(text) = fs::read_to_string(path) else {
            continue;
        };
        let parsed = parse_attribute_str(&text, false);
        for (key, value) in parsed.values {
            let squashed: String = key.chars().filter(|c| *c != ' ' && *c != '-').collect();
            metadata.insert(squashed, value);
        }
    }
    metadata
}

/// Build a versioned file name from harvested metadata:
/// `CHRIS_{yyyymmdd}T{hhmmss}_{NNNN}{suffix}`.
pub fn generate_file_name(
    metadata: &BTreeMap<String, String>,
    suffix: &str,
    output: &Path,
) -> Result<String> {
    let root = file_name_root(metadata)?;
    let version = next_version(&root, suffix, output);
    Ok(format!("{root}_{version}{suffix}"))
}

fn file_name_root(metadata: &BTreeMap<String, String>) -> Result<String> {
    let date = metadata.get("ImageDate(yyyymmdd)");
    let time = metadata.get("CalculatedImageCentreTime");
    let (Some(date), Some(time)) = (date, time) else {
        bail!("Required metadata not available");
    };
    let date: String = date.chars().filter(|c| *c != '-').collect();
    let time: String = time.chars().filter(|c| *c != ':').collect();
    Ok(format!("CHRIS_{date}T{time}"))
}

/// Build one SAFE archive per comma-separated input. Returns the created
/// archive paths.
pub fn make_safe(inputs: &str, output: &Path, options: &SafeOptions) -> Result<Vec<PathBuf>> {
    if let Some(package_type) = &options.package_type {
        if !VALID_PACKAGE_TYPES.contains(&package_type.as_str()) {
            bail!("Package type {package_type} not in {VALID_PACKAGE_TYPES:?}");
        }
    }

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output folder {}", output.display()))?;

    let mut created = Vec::new();

    for input in inputs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let input = Path::new(input);
        println!("Processing {}", input.display());

        let members = member_files(input)?;
        if members.is_empty() {
            eprintln!("  [WARN] No files found under {}", input.display());
            continue;
        }

        let metadata = harvest_metadata(&members);
        let root = file_name_root(&metadata)?;

        let data_objects = members
            .iter()
            .map(|path| describe_data_object(path, "measurement"))
            .collect::<Result<Vec<_>>>()?;
        let manifest = render_manifest(&data_objects)?;
        let checksum = crc16(&manifest);

        let package_tag = options
            .package_type
            .as_ref()
            .map(|p| format!("_{p}"))
            .unwrap_or_default();
        let version = next_version(&root, ".SAFE", output);
        let safe_path = output.join(format!("{root}_{version}{package_tag}_{checksum}.SAFE"));

        println!("Packaging {}", safe_path.display());
        assemble_tree(&safe_path, &members, &manifest)?;
        created.push(safe_path);
    }

    Ok(created)
}

fn member_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("{} not recognised. Ensure that path is valid", input.display());
    }

    let mut members = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            members.push(entry.path().to_path_buf());
        }
    }
    Ok(members)
}

fn assemble_tree(safe_path: &Path, members: &[PathBuf], manifest: &str) -> Result<()> {
    let measurement_dir = safe_path.join("measurement");
    let metadata_dir = safe_path.join("metadata");
    let documentation_dir = safe_path.join("documentation");
    let index_dir = safe_path.join("index");
    for dir in [&measurement_dir, &metadata_dir, &documentation_dir, &index_dir] {
        fs::create_dir_all(dir)?;
    }

    for member in members {
        let Some(name) = member.file_name() else {
            continue;
        };
        fs::copy(member, measurement_dir.join(name))
            .with_context(|| format!("Failed to copy {}", member.display()))?;
    }

    let mut extensions: Vec<String> = members
        .iter()
        .filter_map(|m| m.extension().map(|e| e.to_string_lossy().to_lowercase()))
        .collect();
    extensions.sort();
    extensions.dedup();
    for extension in extensions {
        match schema_for_extension(&extension) {
            Some(schema) => {
                fs::write(metadata_dir.join(format!("{extension}.xsd")), schema?)?;
            }
            None => println!("  Schema for {extension} not found"),
        }
    }

    write_manifest(manifest, safe_path)?;

    // optional folders are pruned when nothing landed in them
    for dir in [&measurement_dir, &metadata_dir, &documentation_dir, &index_dir] {
        if fs::read_dir(dir)?.next().is_none() {
            fs::remove_dir(dir)?;
        }
    }

    Ok(())
}

/// Write manifest text to `manifest.safe` in a directory.
pub fn write_manifest(manifest: &str, dir: &Path) -> Result<()> {
    fs::write(dir.join("manifest.safe"), manifest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mock_metadata() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("ImageDate(yyyymmdd)".to_string(), "19700101".to_string()),
            ("CalculatedImageCentreTime".to_string(), "12:34:56".to_string()),
        ])
    }

    #[test]
    fn test_generate_file_name_success() {
        let tmp = TempDir::new().unwrap();
        let name = generate_file_name(&mock_metadata(), ".test", tmp.path()).unwrap();
        assert_eq!(name, "CHRIS_19700101T123456_0001.test");
    }

    #[test]
    fn test_generate_file_name_missing_metadata() {
        let tmp = TempDir::new().unwrap();
        for key in ["ImageDate(yyyymmdd)", "CalculatedImageCentreTime"] {
            let mut metadata = mock_metadata();
            metadata.remove(key);
            let err = generate_file_name(&metadata, ".test", tmp.path()).unwrap_err();
            assert!(err.to_string().contains("Required metadata not available"));
        }
    }

    #[test]
    fn test_harvest_metadata_squashes_keys() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("myfile.txt");
        fs::write(
            &file,
            "//Image Date (yyyy-mm-dd)\n2004-04-11\n//Calculated Image Centre Time\n18:18:16",
        )
        .unwrap();

        let metadata = harvest_metadata(&[file]);
        assert_eq!(metadata["ImageDate(yyyymmdd)"], "2004-04-11");
        assert_eq!(metadata["CalculatedImageCentreTime"], "18:18:16");
    }

    #[test]
    fn test_invalid_package_type_rejected() {
        let tmp = TempDir::new().unwrap();
        let options = SafeOptions {
            package_type: Some("BAD-TYPE".to_string()),
            ..Default::default()
        };
        let err = make_safe("whatever", tmp.path(), &options).unwrap_err();
        assert!(err.to_string().contains("Package type BAD-TYPE"));
    }
}
