//! Integration tests for the EO-SIP converter.

mod helpers;

use helpers::{build_cog_product, build_zarr_product, TestEnv};
use std::fs::{self, File};

use chrispack::sip::converter::{convert_eo_sip, load_product, SipOptions};

const EXPECTED_ROOT: &str = "PR1_OPER_CHR_MO3_1P_20040411T181816_N31-600_W110-540";

fn archive_names(path: &std::path::Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

#[test]
fn test_convert_zarr_product_to_eo_sip() {
    let env = TestEnv::new();
    let product = build_zarr_product(&env.root, "CHRIS_AU_040411_3FB1_41", 1);
    let output = env.root.join("out");

    let written = convert_eo_sip(
        &product.to_string_lossy(),
        &output,
        None,
        &SipOptions::default(),
    )
    .unwrap();

    assert_eq!(written.len(), 1);
    let name = written[0].file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(name, format!("{EXPECTED_ROOT}_0001.ZIP"));

    let names = archive_names(&written[0]);
    assert!(names.contains(&format!("{EXPECTED_ROOT}_0001.BI.PNG")));
    assert!(names.contains(&format!("{EXPECTED_ROOT}_0001.MD.XML")));
    assert!(names.contains(&format!("{EXPECTED_ROOT}_0001.SI.XML")));
    // payload tree nested under the product directory name
    assert!(names
        .iter()
        .any(|n| n.starts_with("CHRIS_AU_040411_3FB1_41.zarr/") && n.ends_with(".zarray")));
}

#[test]
fn test_convert_cog_product_to_eo_sip() {
    let env = TestEnv::new();
    let product = build_cog_product(&env.root, "CHRIS_AU_040411_3FB1_41", 1);
    let output = env.root.join("out");

    let written = convert_eo_sip(
        &product.to_string_lossy(),
        &output,
        None,
        &SipOptions::default(),
    )
    .unwrap();

    let names = archive_names(&written[0]);
    assert!(names
        .iter()
        .any(|n| n.contains("measurements/image/oa01_radiance.tif")));
}

#[test]
fn test_metadata_xml_contents() {
    let env = TestEnv::new();
    let product = build_zarr_product(&env.root, "CHRIS_AU_040411_3FB1_41", 1);
    let output = env.root.join("out");

    let written = convert_eo_sip(
        &product.to_string_lossy(),
        &output,
        None,
        &SipOptions::default(),
    )
    .unwrap();

    let mut archive = zip::ZipArchive::new(File::open(&written[0]).unwrap()).unwrap();
    let mut xml = String::new();
    std::io::Read::read_to_string(
        &mut archive
            .by_name(&format!("{EXPECTED_ROOT}_0001.MD.XML"))
            .unwrap(),
        &mut xml,
    )
    .unwrap();

    assert!(xml.contains(&format!("<eop:identifier>{EXPECTED_ROOT}_0001</eop:identifier>")));
    assert!(xml.contains("<eop:productType>CHR_MO3_1P</eop:productType>"));
    assert!(xml.contains("MODE-3"));
    assert!(xml.contains("<gml:beginPosition>2004-04-11T18:18:16Z</gml:beginPosition>"));
    assert!(xml.contains("<eop:localValue>Audobon</eop:localValue>"));
}

#[test]
fn test_sequence_packages_once_around_centre_image() {
    let env = TestEnv::new();
    let inputs_dir = env.root.join("inputs");
    fs::create_dir(&inputs_dir).unwrap();
    // same tag number: one acquisition sequence of three images
    for index in [2u32, 3, 4] {
        build_zarr_product(&inputs_dir, &format!("CHRIS_AU_040411_3FB1_4{index}"), index);
    }
    let output = env.root.join("out");

    let written = convert_eo_sip(
        &inputs_dir.to_string_lossy(),
        &output,
        None,
        &SipOptions::default(),
    )
    .unwrap();

    // one package for the whole sequence, all member trees inside
    assert_eq!(written.len(), 1);
    let names = archive_names(&written[0]);
    for index in [2, 3, 4] {
        assert!(names
            .iter()
            .any(|n| n.starts_with(&format!("CHRIS_AU_040411_3FB1_4{index}.zarr/"))));
    }
}

#[test]
fn test_extras_safe_replaces_payload() {
    let env = TestEnv::new();
    let product = build_zarr_product(&env.root, "CHRIS_AU_040411_3FB1_41", 1);

    let extras = env.root.join("metadata.SAFE");
    fs::create_dir_all(extras.join("measurement")).unwrap();
    fs::write(extras.join("manifest.safe"), "<manifest/>").unwrap();
    fs::write(extras.join("measurement/data.dat"), b"payload").unwrap();

    let output = env.root.join("out");
    let written = convert_eo_sip(
        &product.to_string_lossy(),
        &output,
        Some(&extras),
        &SipOptions::default(),
    )
    .unwrap();

    let names = archive_names(&written[0]);
    assert!(names.contains(&"metadata.SAFE/manifest.safe".to_string()));
    assert!(names.contains(&"metadata.SAFE/measurement/data.dat".to_string()));
    // product payload replaced by the SAFE tree
    assert!(!names.iter().any(|n| n.contains(".zarr/")));
    // browse image and XMLs still present
    assert!(names.iter().any(|n| n.ends_with(".BI.PNG")));
}

#[test]
fn test_extras_with_metadata_also_produces_safe_archive() {
    let env = TestEnv::new();
    let product = build_zarr_product(&env.root, "CHRIS_AU_040411_3FB1_41", 1);

    let extras = env.root.join("metadata.SAFE");
    fs::create_dir_all(extras.join("measurement")).unwrap();
    fs::write(
        extras.join("measurement/image.txt"),
        "//Image Date (yyyy-mm-dd)\n2004-04-11\n//Calculated Image Centre Time\n18:18:16",
    )
    .unwrap();

    let output = env.root.join("out");
    convert_eo_sip(
        &product.to_string_lossy(),
        &output,
        Some(&extras),
        &SipOptions::default(),
    )
    .unwrap();

    let safe_archives: Vec<_> = fs::read_dir(&output)
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".SAFE"))
        .collect();
    assert_eq!(safe_archives.len(), 1);
    let name = safe_archives[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("CHRIS_20040411T181816_0001_"));
}

#[test]
fn test_versions_increment_across_runs() {
    let env = TestEnv::new();
    let product = build_zarr_product(&env.root, "CHRIS_AU_040411_3FB1_41", 1);
    let output = env.root.join("out");
    let options = SipOptions::default();

    let first = convert_eo_sip(&product.to_string_lossy(), &output, None, &options).unwrap();
    let second = convert_eo_sip(&product.to_string_lossy(), &output, None, &options).unwrap();

    assert!(first[0].to_string_lossy().ends_with("_0001.ZIP"));
    assert!(second[0].to_string_lossy().ends_with("_0002.ZIP"));
}

#[test]
fn test_load_product_round_trip_thumbnail() {
    let env = TestEnv::new();
    let product = build_zarr_product(&env.root, "CHRIS_AU_040411_3FB1_41", 1);

    let data = load_product(&product).unwrap();
    assert_eq!(data.thumbnail.width, 8);
    assert_eq!(data.thumbnail.height, 6);
    assert_eq!(data.thumbnail.red.len(), 48);
    // normalised planes stay in the unit range
    assert!(data
        .thumbnail
        .red
        .iter()
        .chain(&data.thumbnail.green)
        .chain(&data.thumbnail.blue)
        .all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(data.raw_metadata["product_type"], "CHRIS-RCI");
}

#[test]
fn test_unrecognised_input_fails() {
    let env = TestEnv::new();
    let file = env.root.join("plain.bin");
    fs::write(&file, b"not a product").unwrap();

    let err = convert_eo_sip(
        &file.to_string_lossy(),
        &env.root.join("out"),
        None,
        &SipOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("File type not recognised"));
}
