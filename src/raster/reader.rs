//! RCI raster reader, driven by the accompanying ENVI header.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::header::envi::EnviHeader;
use crate::raster::{BandCube, DataType, ALL_DATA_TYPES};

/// Band interleave layout of the raw file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    Bsq,
    Bil,
    Bip,
}

/// Optional post-read processing.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Divide samples by this reflectance scale factor.
    pub scale_factor: Option<f64>,
    /// 1-based band subset, applied after the zero-wavelength drop.
    pub out_bands: Option<Vec<usize>>,
    /// Output sample type; integer types are range-normalised.
    pub out_dtype: Option<DataType>,
}

/// Reader for a raw `.rci` cube described by an ENVI `.hdr` header.
#[derive(Debug)]
pub struct RciReader {
    rci_path: PathBuf,
    pub header: EnviHeader,
    pub dtype: DataType,
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub interleave: Interleave,
    big_endian: bool,
    offset: usize,
    opts: ReadOptions,
}

impl RciReader {
    pub fn open(rci_path: &Path, hdr_path: &Path, opts: ReadOptions) -> Result<Self> {
        let header = EnviHeader::parse(hdr_path)?;

        for key in ["samples", "lines", "bands", "data type"] {
            if !header.contains(key) {
                bail!("Missing '{key}' in header");
            }
        }

        let code = header.get_i64("data type").unwrap_or(0);
        let Some(mut dtype) = DataType::from_envi_code(code) else {
            bail!("Unsupported ENVI data type code: {code}");
        };
        let big_endian = header.get_i64("byte order").unwrap_or(0) != 0;

        let width = header.get_usize("samples").context("samples")?;
        let height = header.get_usize("lines").context("lines")?;
        let bands = header.get_usize("bands").context("bands")?;
        let offset = header.get_usize("header offset").unwrap_or(0);

        let interleave = match header
            .get_str("interleave")
            .unwrap_or("bsq")
            .to_uppercase()
            .as_str()
        {
            "BSQ" => Interleave::Bsq,
            "BIL" => Interleave::Bil,
            "BIP" => Interleave::Bip,
            other => bail!("Unsupported interleave: {other}"),
        };

        // The header occasionally lies about the sample type; accept any
        // type whose item size makes the file size come out right.
        let size = (fs::metadata(rci_path)
            .with_context(|| format!("Failed to stat {}", rci_path.display()))?
            .len() as usize)
            .saturating_sub(offset);
        let expected = width * height * bands * dtype.itemsize();
        if size != expected {
            let alternate = ALL_DATA_TYPES
                .iter()
                .find(|alt| size == width * height * bands * alt.itemsize());
            match alternate {
                Some(alt) => {
                    eprintln!(
                        "  [WARN] file size {} bytes matches dtype {}, not {}; using {}",
                        size,
                        alt.name(),
                        dtype.name(),
                        alt.name()
                    );
                    dtype = *alt;
                }
                None => bail!(
                    "File size {size} != expected {expected} (width*height*bands*itemsize); \
                     hdr bands={bands}, dtype={}",
                    dtype.name()
                ),
            }
        }

        Ok(Self {
            rci_path: rci_path.to_path_buf(),
            header,
            dtype,
            width,
            height,
            bands,
            interleave,
            big_endian,
            offset,
            opts,
        })
    }

    /// Decode the raw cube into `(band, y, x)` order and apply the configured
    /// band subset, scaling, and output type normalisation.
    pub fn read(&self) -> Result<BandCube> {
        let raw = fs::read(&self.rci_path)
            .with_context(|| format!("Failed to read {}", self.rci_path.display()))?;
        let raw = &raw[self.offset..];

        let (bands, height, width) = (self.bands, self.height, self.width);
        let item = self.dtype.itemsize();
        let mut data = vec![0.0f64; bands * height * width];

        for b in 0..bands {
            for y in 0..height {
                for x in 0..width {
                    let source_index = match self.interleave {
                        Interleave::Bsq => (b * height + y) * width + x,
                        Interleave::Bil => (y * bands + b) * width + x,
                        Interleave::Bip => (y * width + x) * bands + b,
                    };
                    data[(b * height + y) * width + x] =
                        self.dtype.decode(raw, source_index * item, self.big_endian);
                }
            }
        }

        let wavelengths = self
            .header
            .wavelengths()
            .filter(|w| w.len() >= bands)
            .map(|w| w[..bands].to_vec());

        let mut cube = BandCube {
            bands,
            height,
            width,
            data,
            wavelengths,
            dtype: self.dtype,
        };

        drop_zero_wavelength_lead(&mut cube);

        if let Some(out_bands) = &self.opts.out_bands {
            cube = select_bands(&cube, out_bands)?;
        }

        if let Some(scale) = self.opts.scale_factor {
            for v in &mut cube.data {
                *v /= scale;
            }
            cube.dtype = DataType::F32;
        }

        if let Some(target) = self.opts.out_dtype {
            normalise_to_dtype(&mut cube, target);
        }

        Ok(cube)
    }
}

/// CHRIS headers list a bogus leading band with wavelength 0.0; drop it.
fn drop_zero_wavelength_lead(cube: &mut BandCube) {
    let Some(wavelengths) = &cube.wavelengths else {
        return;
    };
    if cube.bands < 2 || wavelengths.first() != Some(&0.0) {
        return;
    }

    let plane = cube.height * cube.width;
    cube.data.drain(..plane);
    cube.bands -= 1;
    cube.wavelengths = Some(wavelengths[1..].to_vec());
}

fn select_bands(cube: &BandCube, out_bands: &[usize]) -> Result<BandCube> {
    let plane = cube.height * cube.width;
    let mut data = Vec::with_capacity(out_bands.len() * plane);
    let mut wavelengths = cube.wavelengths.as_ref().map(|_| Vec::new());

    for &band in out_bands {
        if band == 0 || band > cube.bands {
            bail!("Band {band} out of range 1..={}", cube.bands);
        }
        data.extend_from_slice(cube.band(band - 1));
        if let (Some(out), Some(all)) = (&mut wavelengths, &cube.wavelengths) {
            out.push(all[band - 1]);
        }
    }

    Ok(BandCube {
        bands: out_bands.len(),
        height: cube.height,
        width: cube.width,
        data,
        wavelengths,
        dtype: cube.dtype,
    })
}

/// Cast to the target type; integer targets get min-max range normalisation
/// (a constant cube maps to zeros).
fn normalise_to_dtype(cube: &mut BandCube, target: DataType) {
    if target.is_integer() {
        let min = cube.data.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = cube.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if range == 0.0 {
            cube.data.iter_mut().for_each(|v| *v = 0.0);
        } else {
            let scale = target.integer_max() / range;
            for v in &mut cube.data {
                *v = ((*v - min) * scale).trunc();
            }
        }
    }
    cube.dtype = target;
}
