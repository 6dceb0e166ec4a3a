//! File operations shared by the SAFE and EO-SIP builders.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory suffixes that mark a product tree as a single input entry.
const PRODUCT_SUFFIXES: [&str; 3] = [".zarr", ".cog", ".SAFE"];

/// Write a file, creating parent directories as needed.
pub fn write_file_with_dirs<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn is_product_dir(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    PRODUCT_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Expand a list of input paths into concrete entries.
///
/// Plain files pass through unchanged. Directories named `*.zarr`, `*.cog` or
/// `*.SAFE` are product trees and count as one entry. Any other directory is
/// searched recursively for such product trees. Inputs that resolve to
/// nothing are reported and skipped.
pub fn collect_inputs(inputs: &[String]) -> Vec<PathBuf> {
    let mut entries = Vec::new();

    for input in inputs {
        let path = PathBuf::from(input.trim());
        let before = entries.len();

        if path.is_file() {
            entries.push(path.clone());
        } else if path.is_dir() {
            if is_product_dir(&path) {
                entries.push(path.clone());
            } else {
                let mut walker = WalkDir::new(&path).sort_by_file_name().into_iter();
                loop {
                    let entry = match walker.next() {
                        Some(Ok(entry)) => entry,
                        Some(Err(_)) => continue,
                        None => break,
                    };
                    if entry.file_type().is_dir() && is_product_dir(entry.path()) {
                        entries.push(entry.path().to_path_buf());
                        walker.skip_current_dir();
                    }
                }
            }
        }

        if entries.len() == before {
            eprintln!(
                "  [WARN] {} not recognised. Ensure that path is valid",
                path.display()
            );
        }
    }

    entries
}

/// Size of a file, or the recursive size of a directory (symlinks skipped).
pub fn tree_size(path: &Path) -> u64 {
    if path.is_file() {
        return fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    }

    let mut total = 0;
    for entry in WalkDir::new(path).into_iter().flatten() {
        if entry.file_type().is_file() && !entry.path_is_symlink() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    total
}

/// Next free zero-padded 4-digit version for `{root}_{NNNN}…{suffix}` entries
/// in a directory. Matching is by prefix so names that append further tags
/// after the version (package type, checksum) still count.
pub fn next_version(root: &str, suffix: &str, dir: &Path) -> String {
    let prefix = format!("{root}_");
    let mut highest = 0u32;

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(suffix) {
                continue;
            }
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            if rest.len() >= 4 {
                if let Ok(version) = rest[..4].parse::<u32>() {
                    highest = highest.max(version);
                }
            }
        }
    }

    format!("{:04}", highest + 1)
}
