//! File Collector: expands `-f` arguments into the list of RGD files to pack.
//!
//! Explicitly named files are taken as-is whatever their extension. Directories
//! are walked recursively and only `.yaml`/`.yml` files are kept. Walk order is
//! sorted by file name so the same tree always packs into the same manifest.
//! Paths are deduplicated by canonical location; the first occurrence wins.

use crate::error::{KroctlError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

const YAML_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| YAML_EXTENSIONS.contains(&ext))
}

pub fn collect_files<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for input in inputs {
        let input = input.as_ref();
        let metadata = fs::metadata(input).map_err(|source| KroctlError::PathNotFound {
            path: input.to_path_buf(),
            source,
        })?;

        if metadata.is_dir() {
            for path in walk_yaml_files(input)? {
                push_unique(&mut files, &mut seen, path);
            }
        } else {
            push_unique(&mut files, &mut seen, input.to_path_buf());
        }
    }

    if files.is_empty() {
        return Err(KroctlError::NoInputFiles);
    }

    Ok(files)
}

fn walk_yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            KroctlError::PathNotFound {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop detected")),
            }
        })?;

        if is_yaml_file(entry.path()) && points_to_file(&entry)? {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Regular files, and symlinks whose target is one. Symlinked directories are
/// not descended into.
fn points_to_file(entry: &DirEntry) -> Result<bool> {
    if !entry.path_is_symlink() {
        return Ok(entry.file_type().is_file());
    }
    let metadata = fs::metadata(entry.path()).map_err(|source| KroctlError::PathNotFound {
        path: entry.path().to_path_buf(),
        source,
    })?;
    Ok(metadata.is_file())
}

fn push_unique(files: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>, path: PathBuf) {
    let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
    if seen.insert(key) {
        files.push(path);
    }
}
