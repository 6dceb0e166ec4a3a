//! Zarr v2 directory store writer and reader.
//!
//! Arrays are written C-order, little-endian, uncompressed (`compressor:
//! null`), with xarray `_ARRAY_DIMENSIONS` attributes and a consolidated
//! `.zmetadata` at the root. The reader handles exactly the stores this
//! crate writes; it exists so the EO-SIP converter can load products back.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::common::files::write_file_with_dirs;
use crate::raster::DataType;

/// `.zarray` metadata document.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArrayMeta {
    pub zarr_format: u8,
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: String,
    pub compressor: Option<Value>,
    pub fill_value: Option<f64>,
    pub order: String,
    pub filters: Option<Value>,
}

impl ArrayMeta {
    fn new(shape: Vec<usize>, chunks: Vec<usize>, dtype: DataType) -> Self {
        Self {
            zarr_format: 2,
            shape,
            chunks,
            dtype: dtype.zarr_dtype().to_string(),
            compressor: None,
            fill_value: Some(0.0),
            order: "C".to_string(),
            filters: None,
        }
    }
}

/// Writer for a Zarr v2 directory store.
pub struct ZarrWriter {
    root: PathBuf,
}

impl ZarrWriter {
    /// Create a fresh store, replacing any existing directory.
    pub fn create(root: &Path) -> Result<Self> {
        if root.exists() {
            fs::remove_dir_all(root)
                .with_context(|| format!("Failed to replace {}", root.display()))?;
        }
        fs::create_dir_all(root)?;
        let writer = Self {
            root: root.to_path_buf(),
        };
        writer.write_group("", &Map::new())?;
        Ok(writer)
    }

    fn node_dir(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    /// Write a group node (`.zgroup` plus optional `.zattrs`).
    pub fn write_group(&self, path: &str, attrs: &Map<String, Value>) -> Result<()> {
        let dir = self.node_dir(path);
        write_file_with_dirs(
            dir.join(".zgroup"),
            serde_json::to_string_pretty(&json!({"zarr_format": 2}))?,
        )?;
        if !attrs.is_empty() {
            write_file_with_dirs(
                dir.join(".zattrs"),
                serde_json::to_string_pretty(&Value::Object(attrs.clone()))?,
            )?;
        }
        Ok(())
    }

    /// Write an array node: `.zarray`, `.zattrs` (attrs + `_ARRAY_DIMENSIONS`),
    /// and the raw chunk files. `data` is C-order and is chunked on disk
    /// according to `chunks`.
    pub fn write_array(
        &self,
        path: &str,
        shape: &[usize],
        chunks: &[usize],
        dims: &[&str],
        dtype: DataType,
        data: &[f64],
        attrs: &Map<String, Value>,
    ) -> Result<()> {
        if shape.len() != chunks.len() || shape.len() != dims.len() {
            bail!("Array rank mismatch for {path}");
        }
        if shape.iter().product::<usize>() != data.len() {
            bail!("Array data length mismatch for {path}");
        }

        let dir = self.node_dir(path);
        fs::create_dir_all(&dir)?;

        let meta = ArrayMeta::new(shape.to_vec(), chunks.to_vec(), dtype);
        write_file_with_dirs(dir.join(".zarray"), serde_json::to_string_pretty(&meta)?)?;

        let mut all_attrs = attrs.clone();
        all_attrs.insert(
            "_ARRAY_DIMENSIONS".into(),
            Value::from(dims.iter().map(|d| d.to_string()).collect::<Vec<_>>()),
        );
        write_file_with_dirs(
            dir.join(".zattrs"),
            serde_json::to_string_pretty(&Value::Object(all_attrs))?,
        )?;

        let grid: Vec<usize> = shape
            .iter()
            .zip(chunks)
            .map(|(s, c)| s.div_ceil(*c))
            .collect();

        for chunk_index in ChunkGrid::new(&grid) {
            let name: Vec<String> = chunk_index.iter().map(|i| i.to_string()).collect();
            let bytes = encode_chunk(shape, chunks, &chunk_index, dtype, data);
            fs::write(dir.join(name.join(".")), bytes)?;
        }

        Ok(())
    }

    /// Gather every metadata document into a consolidated `.zmetadata`.
    pub fn consolidate(&self) -> Result<()> {
        let mut metadata = Map::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy();
            if !matches!(name.as_ref(), ".zgroup" | ".zattrs" | ".zarray") {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .expect("walk stays under root")
                .to_string_lossy()
                .replace('\\', "/");
            let doc: Value = serde_json::from_str(&fs::read_to_string(entry.path())?)?;
            metadata.insert(rel, doc);
        }

        write_file_with_dirs(
            self.root.join(".zmetadata"),
            serde_json::to_string_pretty(&json!({
                "metadata": metadata,
                "zarr_consolidated_format": 1,
            }))?,
        )?;
        Ok(())
    }
}

/// Iterator over the chunk indices of a chunk grid, last axis fastest.
struct ChunkGrid {
    grid: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl ChunkGrid {
    fn new(grid: &[usize]) -> Self {
        let next = if grid.iter().all(|&g| g > 0) {
            Some(vec![0; grid.len()])
        } else {
            None
        };
        Self {
            grid: grid.to_vec(),
            next,
        }
    }
}

impl Iterator for ChunkGrid {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.clone()?;
        let mut following = current.clone();
        let mut axis = self.grid.len();
        loop {
            if axis == 0 {
                self.next = None;
                break;
            }
            axis -= 1;
            following[axis] += 1;
            if following[axis] < self.grid[axis] {
                self.next = Some(following);
                break;
            }
            following[axis] = 0;
        }
        Some(current)
    }
}

/// Encode one chunk as raw little-endian bytes. Edge chunks are padded with
/// the fill value to the full chunk shape, as Zarr requires.
fn encode_chunk(
    shape: &[usize],
    chunks: &[usize],
    chunk_index: &[usize],
    dtype: DataType,
    data: &[f64],
) -> Vec<u8> {
    let chunk_len: usize = chunks.iter().product();
    let mut out = Vec::with_capacity(chunk_len * dtype.itemsize());

    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }

    for offset in ChunkGrid::new(chunks) {
        let mut source = Some(0usize);
        for axis in 0..shape.len() {
            let position = chunk_index[axis] * chunks[axis] + offset[axis];
            if position >= shape[axis] {
                source = None;
                break;
            }
            source = source.map(|s| s + position * strides[axis]);
        }
        let value = source.map(|s| data[s]).unwrap_or(0.0);
        dtype.encode_le(value, &mut out);
    }

    out
}

/// Reader over a Zarr v2 directory store written by [`ZarrWriter`].
pub struct ZarrStore {
    root: PathBuf,
}

impl ZarrStore {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.join(".zgroup").is_file() {
            bail!("{} is not a Zarr group store", root.display());
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn read_attrs(&self, dir: &Path) -> Result<Map<String, Value>> {
        let path = dir.join(".zattrs");
        if !path.is_file() {
            return Ok(Map::new());
        }
        let doc: Value = serde_json::from_str(&fs::read_to_string(&path)?)
            .with_context(|| format!("Invalid attributes in {}", path.display()))?;
        match doc {
            Value::Object(map) => Ok(map),
            _ => bail!("Attributes in {} are not an object", path.display()),
        }
    }

    /// Root group attributes.
    pub fn root_attrs(&self) -> Result<Map<String, Value>> {
        self.read_attrs(&self.root)
    }

    /// Relative paths of every group in the store, root included, sorted.
    pub fn groups(&self) -> Vec<String> {
        let mut groups = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name().into_iter().flatten() {
            if entry.file_type().is_dir() && entry.path().join(".zgroup").is_file() {
                let rel = entry
                    .path()
                    .strip_prefix(&self.root)
                    .expect("walk stays under root")
                    .to_string_lossy()
                    .replace('\\', "/");
                groups.push(rel);
            }
        }
        groups
    }

    /// Names of the arrays directly under a group, sorted.
    pub fn array_names(&self, group: &str) -> Result<Vec<String>> {
        let dir = if group.is_empty() {
            self.root.clone()
        } else {
            self.root.join(group)
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().join(".zarray").is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Attributes of one array.
    pub fn array_attrs(&self, group: &str, name: &str) -> Result<Map<String, Value>> {
        self.read_attrs(&self.root.join(group).join(name))
    }

    /// Load a 2-D array, reassembling it from its chunk grid.
    pub fn read_array_2d(&self, group: &str, name: &str) -> Result<(usize, usize, Vec<f64>)> {
        let dir = if group.is_empty() {
            self.root.join(name)
        } else {
            self.root.join(group).join(name)
        };
        let meta: ArrayMeta = serde_json::from_str(&fs::read_to_string(dir.join(".zarray"))?)
            .with_context(|| format!("Invalid .zarray under {}", dir.display()))?;
        if meta.shape.len() != 2 {
            bail!("Array {name} is not 2-D");
        }
        let Some(dtype) = DataType::from_zarr_dtype(&meta.dtype) else {
            bail!("Unsupported dtype {} in {name}", meta.dtype);
        };

        let (height, width) = (meta.shape[0], meta.shape[1]);
        let (ch, cw) = (meta.chunks[0], meta.chunks[1]);
        let mut data = vec![0.0f64; height * width];

        for cy in 0..height.div_ceil(ch) {
            for cx in 0..width.div_ceil(cw) {
                let chunk_path = dir.join(format!("{cy}.{cx}"));
                let bytes = fs::read(&chunk_path)
                    .with_context(|| format!("Missing chunk {}", chunk_path.display()))?;
                for y in 0..ch {
                    for x in 0..cw {
                        let (gy, gx) = (cy * ch + y, cx * cw + x);
                        if gy >= height || gx >= width {
                            continue;
                        }
                        let offset = (y * cw + x) * dtype.itemsize();
                        data[gy * width + gx] = dtype.decode(&bytes, offset, false);
                    }
                }
            }
        }

        Ok((height, width, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chunk_grid_iterates_in_c_order() {
        let indices: Vec<Vec<usize>> = ChunkGrid::new(&[2, 2]).collect();
        assert_eq!(
            indices,
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
    }

    #[test]
    fn test_write_and_read_round_trip_with_edge_chunks() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store.zarr");
        let writer = ZarrWriter::create(&root).unwrap();

        // 3x5 array in 2x2 chunks: edge chunks are padded
        let data: Vec<f64> = (0..15).map(|v| v as f64).collect();
        writer
            .write_array(
                "group/values",
                &[3, 5],
                &[2, 2],
                &["y", "x"],
                DataType::I32,
                &data,
                &Map::new(),
            )
            .unwrap();
        writer.write_group("group", &Map::new()).unwrap();
        writer.consolidate().unwrap();

        assert!(root.join("group/values/.zarray").is_file());
        assert!(root.join("group/values/0.0").is_file());
        assert!(root.join("group/values/1.2").is_file());
        assert!(root.join(".zmetadata").is_file());

        let store = ZarrStore::open(&root).unwrap();
        let (height, width, read) = store.read_array_2d("group", "values").unwrap();
        assert_eq!((height, width), (3, 5));
        assert_eq!(read, data);
    }

    #[test]
    fn test_array_dimensions_attribute_written() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store.zarr");
        let writer = ZarrWriter::create(&root).unwrap();
        writer
            .write_array(
                "x",
                &[4],
                &[4],
                &["x"],
                DataType::F64,
                &[0.0, 1.0, 2.0, 3.0],
                &Map::new(),
            )
            .unwrap();

        let store = ZarrStore::open(&root).unwrap();
        let attrs = store.array_attrs("", "x").unwrap();
        assert_eq!(attrs["_ARRAY_DIMENSIONS"], serde_json::json!(["x"]));
    }

    #[test]
    fn test_groups_and_array_names_sorted() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store.zarr");
        let writer = ZarrWriter::create(&root).unwrap();
        writer.write_group("measurements", &Map::new()).unwrap();
        writer.write_group("measurements/image", &Map::new()).unwrap();
        let data = vec![0.0; 4];
        for name in ["b_array", "a_array"] {
            writer
                .write_array(
                    &format!("measurements/image/{name}"),
                    &[2, 2],
                    &[2, 2],
                    &["y", "x"],
                    DataType::F32,
                    &data,
                    &Map::new(),
                )
                .unwrap();
        }

        let store = ZarrStore::open(&root).unwrap();
        assert_eq!(
            store.groups(),
            vec!["", "measurements", "measurements/image"]
        );
        assert_eq!(
            store.array_names("measurements/image").unwrap(),
            vec!["a_array", "b_array"]
        );
    }
}
