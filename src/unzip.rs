// src/unzip.rs

//! ZIP extraction stage.
//!
//! Downloaded archives each hold one or more XML reports. Extraction
//! is per-item idempotent: an item that already exists in the output
//! directory is left alone, so a partially extracted archive finishes
//! cleanly on the next run.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Extract every item of `zip_path` into `output_dir`. Returns the
/// number of items newly extracted.
pub fn unzip_file(zip_path: &Path, output_dir: &Path) -> Result<usize> {
    let file = File::open(zip_path).map_err(|e| Error::InputError {
        path: zip_path.display().to_string(),
        detail: e.to_string(),
    })?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| Error::ParseError(format!("bad zip {}: {e}", zip_path.display())))?;

    let mut extracted = 0;
    for index in 0..archive.len() {
        let mut item = archive
            .by_index(index)
            .map_err(|e| Error::ParseError(format!("bad zip entry in {}: {e}", zip_path.display())))?;

        // entries with path traversal are refused outright
        let Some(relative) = item.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(Error::ParseError(format!(
                "zip entry '{}' escapes the output directory",
                item.name()
            )));
        };
        let target = output_dir.join(relative);

        if item.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if target.exists() {
            debug!(item = item.name(), "item skipped (exists already)");
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut item, &mut out)?;
        extracted += 1;
        debug!(item = item.name(), target = %target.display(), "item extracted");
    }
    Ok(extracted)
}
