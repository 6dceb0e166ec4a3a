//! Baseline GeoTIFF writer and reader.
//!
//! Writes classic little-endian TIFF: a single uncompressed strip, chunky
//! sample layout, with ModelPixelScale / ModelTiepoint / GeoKey tags when the
//! grid is georeferenced, and the band wavelengths as a JSON ImageDescription
//! tag. The reader understands exactly this profile; it exists so the EO-SIP
//! converter can load COG product directories written by this crate.

use anyhow::{bail, Context, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fs;
use std::path::Path;

use crate::raster::geo::GeoTransform;
use crate::raster::DataType;

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_IMAGE_DESCRIPTION: u16 = 270;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIG: u16 = 284;
const TAG_SAMPLE_FORMAT: u16 = 339;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_ASCII: u16 = 2;
const TYPE_DOUBLE: u16 = 12;

/// Optional georeferencing and annotation tags.
#[derive(Debug, Clone, Default)]
pub struct GeoTags {
    /// Geotransform; written as pixel scale + tiepoint.
    pub transform: Option<GeoTransform>,
    /// Projected CRS EPSG code for the GeoKey directory.
    pub epsg: Option<i32>,
    /// Free-text ImageDescription (wavelength JSON).
    pub description: Option<String>,
}

fn sample_layout(dtype: DataType) -> (u16, u16) {
    // (bits per sample, sample format)
    match dtype {
        DataType::U8 => (8, 1),
        DataType::U16 => (16, 1),
        DataType::U32 => (32, 1),
        DataType::U64 => (64, 1),
        DataType::I16 => (16, 2),
        DataType::I32 => (32, 2),
        DataType::I64 => (64, 2),
        DataType::F32 => (32, 3),
        DataType::F64 => (64, 3),
    }
}

fn dtype_from_layout(bits: u16, format: u16) -> Option<DataType> {
    match (bits, format) {
        (8, 1) => Some(DataType::U8),
        (16, 1) => Some(DataType::U16),
        (32, 1) => Some(DataType::U32),
        (64, 1) => Some(DataType::U64),
        (16, 2) => Some(DataType::I16),
        (32, 2) => Some(DataType::I32),
        (64, 2) => Some(DataType::I64),
        (32, 3) => Some(DataType::F32),
        (64, 3) => Some(DataType::F64),
        _ => None,
    }
}

struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    /// Inline value or resolved offset.
    value: u32,
}

/// Write a TIFF file. `data` is chunky `(y, x, sample)` order with
/// `samples` values per pixel, encoded with `dtype`.
pub fn write_tiff(
    path: &Path,
    width: usize,
    height: usize,
    samples: usize,
    dtype: DataType,
    data: &[f64],
    tags: &GeoTags,
) -> Result<()> {
    if data.len() != width * height * samples {
        bail!("TIFF data length mismatch for {}", path.display());
    }
    let (bits, format) = sample_layout(dtype);

    // layout: header | strip | auxiliary blocks | IFD
    let strip_offset = 8u32;
    let strip_len = (data.len() * dtype.itemsize()) as u32;
    let mut aux: Vec<u8> = Vec::new();
    let aux_base = strip_offset + strip_len;
    let mut entries: Vec<IfdEntry> = Vec::new();

    let push_values_short = |aux: &mut Vec<u8>, values: &[u16]| -> u32 {
        let offset = aux_base + aux.len() as u32;
        for v in values {
            aux.write_u16::<LittleEndian>(*v).unwrap();
        }
        offset
    };

    entries.push(IfdEntry {
        tag: TAG_IMAGE_WIDTH,
        field_type: TYPE_LONG,
        count: 1,
        value: width as u32,
    });
    entries.push(IfdEntry {
        tag: TAG_IMAGE_LENGTH,
        field_type: TYPE_LONG,
        count: 1,
        value: height as u32,
    });

    let bits_value = if samples <= 2 {
        let mut v = [0u8; 4];
        for (i, _) in (0..samples).enumerate() {
            LittleEndian::write_u16(&mut v[i * 2..i * 2 + 2], bits);
        }
        LittleEndian::read_u32(&v)
    } else {
        push_values_short(&mut aux, &vec![bits; samples])
    };
    entries.push(IfdEntry {
        tag: TAG_BITS_PER_SAMPLE,
        field_type: TYPE_SHORT,
        count: samples as u32,
        value: bits_value,
    });

    entries.push(IfdEntry {
        tag: TAG_COMPRESSION,
        field_type: TYPE_SHORT,
        count: 1,
        value: 1,
    });
    entries.push(IfdEntry {
        tag: TAG_PHOTOMETRIC,
        field_type: TYPE_SHORT,
        count: 1,
        value: 1, // BlackIsZero
    });

    if let Some(description) = &tags.description {
        let mut bytes = description.as_bytes().to_vec();
        bytes.push(0);
        let offset = aux_base + aux.len() as u32;
        let count = bytes.len() as u32;
        let value = if count <= 4 {
            let mut v = [0u8; 4];
            v[..bytes.len()].copy_from_slice(&bytes);
            LittleEndian::read_u32(&v)
        } else {
            aux.extend_from_slice(&bytes);
            offset
        };
        entries.push(IfdEntry {
            tag: TAG_IMAGE_DESCRIPTION,
            field_type: TYPE_ASCII,
            count,
            value,
        });
    }

    entries.push(IfdEntry {
        tag: TAG_STRIP_OFFSETS,
        field_type: TYPE_LONG,
        count: 1,
        value: strip_offset,
    });
    entries.push(IfdEntry {
        tag: TAG_SAMPLES_PER_PIXEL,
        field_type: TYPE_SHORT,
        count: 1,
        value: samples as u32,
    });
    entries.push(IfdEntry {
        tag: TAG_ROWS_PER_STRIP,
        field_type: TYPE_LONG,
        count: 1,
        value: height as u32,
    });
    entries.push(IfdEntry {
        tag: TAG_STRIP_BYTE_COUNTS,
        field_type: TYPE_LONG,
        count: 1,
        value: strip_len,
    });
    entries.push(IfdEntry {
        tag: TAG_PLANAR_CONFIG,
        field_type: TYPE_SHORT,
        count: 1,
        value: 1, // chunky
    });

    let format_value = if samples <= 2 {
        let mut v = [0u8; 4];
        for (i, _) in (0..samples).enumerate() {
            LittleEndian::write_u16(&mut v[i * 2..i * 2 + 2], format);
        }
        LittleEndian::read_u32(&v)
    } else {
        push_values_short(&mut aux, &vec![format; samples])
    };
    entries.push(IfdEntry {
        tag: TAG_SAMPLE_FORMAT,
        field_type: TYPE_SHORT,
        count: samples as u32,
        value: format_value,
    });

    if let Some((origin_x, xres, _, origin_y, _, neg_yres)) = tags.transform {
        let scale_offset = aux_base + aux.len() as u32;
        for v in [xres, -neg_yres, 0.0] {
            aux.write_f64::<LittleEndian>(v).unwrap();
        }
        entries.push(IfdEntry {
            tag: TAG_MODEL_PIXEL_SCALE,
            field_type: TYPE_DOUBLE,
            count: 3,
            value: scale_offset,
        });

        let tiepoint_offset = aux_base + aux.len() as u32;
        for v in [0.0, 0.0, 0.0, origin_x, origin_y, 0.0] {
            aux.write_f64::<LittleEndian>(v).unwrap();
        }
        entries.push(IfdEntry {
            tag: TAG_MODEL_TIEPOINT,
            field_type: TYPE_DOUBLE,
            count: 6,
            value: tiepoint_offset,
        });
    }

    if let Some(epsg) = tags.epsg {
        // header (version, revision, minor, key count) + 3 keys
        let keys: [u16; 16] = [
            1, 1, 0, 3, //
            1024, 0, 1, 1, // GTModelType = projected
            1025, 0, 1, 1, // GTRasterType = pixel-is-area
            3072, 0, 1, epsg as u16, // ProjectedCSType
        ];
        let offset = push_values_short(&mut aux, &keys);
        entries.push(IfdEntry {
            tag: TAG_GEO_KEY_DIRECTORY,
            field_type: TYPE_SHORT,
            count: keys.len() as u32,
            value: offset,
        });
    }

    entries.sort_by_key(|e| e.tag);

    let ifd_offset = aux_base + aux.len() as u32;
    let mut out: Vec<u8> = Vec::with_capacity(ifd_offset as usize + 6 + entries.len() * 12);
    out.extend_from_slice(b"II");
    out.write_u16::<LittleEndian>(42)?;
    out.write_u32::<LittleEndian>(ifd_offset)?;

    for value in data {
        dtype.encode_le(*value, &mut out);
    }
    out.extend_from_slice(&aux);

    out.write_u16::<LittleEndian>(entries.len() as u16)?;
    for entry in &entries {
        out.write_u16::<LittleEndian>(entry.tag)?;
        out.write_u16::<LittleEndian>(entry.field_type)?;
        out.write_u32::<LittleEndian>(entry.count)?;
        out.write_u32::<LittleEndian>(entry.value)?;
    }
    out.write_u32::<LittleEndian>(0)?;

    fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// A decoded TIFF image (chunky sample order, samples widened to f64).
#[derive(Debug)]
pub struct TiffImage {
    pub width: usize,
    pub height: usize,
    pub samples: usize,
    pub dtype: DataType,
    pub data: Vec<f64>,
    pub description: Option<String>,
}

impl TiffImage {
    /// One sample plane extracted from the chunky layout.
    pub fn plane(&self, sample: usize) -> Vec<f64> {
        (0..self.width * self.height)
            .map(|i| self.data[i * self.samples + sample])
            .collect()
    }
}

fn entry_inline_shorts(value: u32, count: usize) -> Vec<u16> {
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, value);
    (0..count.min(2))
        .map(|i| LittleEndian::read_u16(&bytes[i * 2..i * 2 + 2]))
        .collect()
}

/// Read a TIFF file written by [`write_tiff`].
pub fn read_tiff(path: &Path) -> Result<TiffImage> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.len() < 8 || &bytes[..2] != b"II" || LittleEndian::read_u16(&bytes[2..4]) != 42 {
        bail!("{} is not a little-endian TIFF", path.display());
    }

    let ifd_offset = LittleEndian::read_u32(&bytes[4..8]) as usize;
    let entry_count = LittleEndian::read_u16(&bytes[ifd_offset..ifd_offset + 2]) as usize;

    let mut width = 0usize;
    let mut height = 0usize;
    let mut samples = 1usize;
    let mut bits = 0u16;
    let mut format = 1u16;
    let mut strip_offset = 0usize;
    let mut strip_len = 0usize;
    let mut compression = 1u32;
    let mut description = None;

    for i in 0..entry_count {
        let at = ifd_offset + 2 + i * 12;
        let tag = LittleEndian::read_u16(&bytes[at..at + 2]);
        let count = LittleEndian::read_u32(&bytes[at + 4..at + 8]) as usize;
        let value = LittleEndian::read_u32(&bytes[at + 8..at + 12]);

        match tag {
            TAG_IMAGE_WIDTH => width = value as usize,
            TAG_IMAGE_LENGTH => height = value as usize,
            TAG_SAMPLES_PER_PIXEL => samples = value as usize,
            TAG_COMPRESSION => compression = value,
            TAG_BITS_PER_SAMPLE => {
                bits = if count <= 2 {
                    entry_inline_shorts(value, count)[0]
                } else {
                    LittleEndian::read_u16(&bytes[value as usize..value as usize + 2])
                };
            }
            TAG_SAMPLE_FORMAT => {
                format = if count <= 2 {
                    entry_inline_shorts(value, count)[0]
                } else {
                    LittleEndian::read_u16(&bytes[value as usize..value as usize + 2])
                };
            }
            TAG_STRIP_OFFSETS => strip_offset = value as usize,
            TAG_STRIP_BYTE_COUNTS => strip_len = value as usize,
            TAG_IMAGE_DESCRIPTION => {
                let raw = if count <= 4 {
                    let mut v = [0u8; 4];
                    LittleEndian::write_u32(&mut v, value);
                    v[..count].to_vec()
                } else {
                    bytes[value as usize..value as usize + count].to_vec()
                };
                let text = String::from_utf8_lossy(&raw)
                    .trim_end_matches('\0')
                    .to_string();
                description = Some(text);
            }
            _ => {}
        }
    }

    if compression != 1 {
        bail!("Unsupported TIFF compression {compression} in {}", path.display());
    }
    let Some(dtype) = dtype_from_layout(bits, format) else {
        bail!(
            "Unsupported TIFF sample layout ({bits} bits, format {format}) in {}",
            path.display()
        );
    };
    let expected = width * height * samples * dtype.itemsize();
    if strip_len != expected || strip_offset + strip_len > bytes.len() {
        bail!("Corrupt TIFF strip in {}", path.display());
    }

    let strip = &bytes[strip_offset..strip_offset + strip_len];
    let data = (0..width * height * samples)
        .map(|i| dtype.decode(strip, i * dtype.itemsize(), false))
        .collect();

    Ok(TiffImage {
        width,
        height,
        samples,
        dtype,
        data,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_single_sample() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("band.tif");
        let data: Vec<f64> = (0..12).map(|v| v as f64).collect();

        write_tiff(&path, 4, 3, 1, DataType::I32, &data, &GeoTags::default()).unwrap();
        let image = read_tiff(&path).unwrap();

        assert_eq!((image.width, image.height, image.samples), (4, 3, 1));
        assert_eq!(image.dtype, DataType::I32);
        assert_eq!(image.data, data);
    }

    #[test]
    fn test_round_trip_multi_sample_with_description() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cube.tif");
        // 2x2, 3 samples, chunky
        let data: Vec<f64> = (0..12).map(|v| v as f64 * 0.5).collect();
        let tags = GeoTags {
            description: Some("{\"wavelengths\":[442.5,530.8,661.5]}".to_string()),
            ..Default::default()
        };

        write_tiff(&path, 2, 2, 3, DataType::F32, &data, &tags).unwrap();
        let image = read_tiff(&path).unwrap();

        assert_eq!(image.samples, 3);
        assert_eq!(image.data, data);
        assert_eq!(
            image.description.as_deref(),
            Some("{\"wavelengths\":[442.5,530.8,661.5]}")
        );
        assert_eq!(image.plane(1), vec![0.5, 2.0, 3.5, 5.0]);
    }

    #[test]
    fn test_geotags_written_and_file_parses() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("geo.tif");
        let data = vec![1.0; 4];
        let tags = GeoTags {
            transform: Some((500_000.0, 18.0, 0.0, 3_500_000.0, 0.0, -18.0)),
            epsg: Some(32612),
            description: None,
        };

        write_tiff(&path, 2, 2, 1, DataType::U16, &data, &tags).unwrap();
        let image = read_tiff(&path).unwrap();
        assert_eq!(image.dtype, DataType::U16);
        assert_eq!(image.data, data);
    }

    #[test]
    fn test_rejects_non_tiff() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("not.tif");
        fs::write(&path, b"not a tiff at all").unwrap();
        assert!(read_tiff(&path).is_err());
    }
}
