//! Shared test utilities for chrispack tests.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use chrispack::header::envi::EnviHeader;
use chrispack::raster::{BandCube, DataType};
use chrispack::store::product;

/// Test environment with a temporary working directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub root: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }
}

/// CHRIS attribute dump contents for the standard mock acquisition.
pub fn sample_attribute_text(image_index: u32) -> String {
    format!(
        "//Image Date (yyyy-mm-dd)\t2004-04-11\n\
         //Calculated Image Centre Time\t18:18:16\n\
         //Sensor Type\tCHRIS\n\
         //CHRIS Mode\t3\n\
         //Longitude\t-110.54\n\
         //Lattitude\t031.60\n\
         //Image Tag Number\t3FB1\n\
         //Image Target Code\tAU\n\
         //Target Name\tAudobon\n\
         //Image No x of y\t{image_index} of 5\n\
         //Solar Zenith Angle\t028.00\n"
    )
}

/// Write the mock attribute dump and return its path.
pub fn write_attribute_dump(dir: &Path, name: &str, image_index: u32) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, sample_attribute_text(image_index)).expect("Failed to write dump");
    path
}

/// A small 3-band cube with recognisable planes: zeros, tens, a ramp.
pub fn sample_cube() -> BandCube {
    let (height, width) = (6, 8);
    let plane = height * width;
    let mut data = vec![0.0; 3 * plane];
    data[plane..2 * plane].fill(10.0);
    for (i, v) in data[2 * plane..].iter_mut().enumerate() {
        *v = i as f64;
    }
    BandCube {
        bands: 3,
        height,
        width,
        data,
        wavelengths: Some(vec![442.5, 530.8, 661.5]),
        dtype: DataType::F32,
    }
}

/// ENVI header matching [`sample_cube`].
pub fn sample_header() -> EnviHeader {
    EnviHeader::parse_str(
        "samples = 8\n\
         lines = 6\n\
         bands = 3\n\
         data type = 4\n\
         interleave = bsq\n\
         byte order = 0\n\
         wavelength = {442.5, 530.8, 661.5}\n\
         calibration data units = microWatts/nm/m^2/str\n",
    )
}

/// Build an EOPF Zarr product for one image of the mock sequence.
pub fn build_zarr_product(dir: &Path, name: &str, image_index: u32) -> PathBuf {
    let dump = write_attribute_dump(dir, &format!("{name}.hdr.txt"), image_index);
    let out = dir.join(format!("{name}.zarr"));
    product::write_eopf_zarr(&sample_cube(), &sample_header(), &dump, &out)
        .expect("Failed to write product");
    out
}

/// Build an EOPF COG product directory for one image of the mock sequence.
pub fn build_cog_product(dir: &Path, name: &str, image_index: u32) -> PathBuf {
    let dump = write_attribute_dump(dir, &format!("{name}.hdr.txt"), image_index);
    let out = dir.join(format!("{name}.cog"));
    product::write_eopf_cog(&sample_cube(), &sample_header(), &dump, &out)
        .expect("Failed to write product");
    out
}

pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "Expected file {}", path.display());
}

pub fn assert_dir_exists(path: &Path) {
    assert!(path.is_dir(), "Expected directory {}", path.display());
}
