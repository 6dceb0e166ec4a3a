//! Product stores: Zarr v2 directory stores, baseline GeoTIFF files, and the
//! EOPF-style product layouts built from them.

pub mod product;
pub mod tiff;
pub mod zarr;
