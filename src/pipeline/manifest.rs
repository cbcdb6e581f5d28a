// src/pipeline/manifest.rs

//! Append-only stage manifests.
//!
//! A manifest lists the inputs a stage has fully processed, one entry
//! per line. It is the sole mechanism preventing re-ingestion: a file
//! is appended only after its processing produced complete output, so
//! an interrupted run leaves the manifest consistent and the next run
//! picks up exactly the unfinished inputs.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// In-memory view of a stage manifest, backed by a line-per-entry file.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    seen: HashSet<String>,
}

impl Manifest {
    /// Load a manifest; a missing file reads as empty. Trailing blank
    /// lines are tolerated.
    pub fn load(path: &Path) -> Result<Self> {
        let seen = match fs::read_to_string(path) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                return Err(Error::ManifestError {
                    path: path.display().to_string(),
                    detail: e.to_string(),
                });
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            seen,
        })
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.seen.contains(entry)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Append one entry and flush it to disk immediately.
    pub fn record(&mut self, entry: &str) -> Result<()> {
        if self.seen.contains(entry) {
            return Ok(());
        }
        let write = |path: &Path| -> std::io::Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(entry.as_bytes())?;
            file.write_all(b"\n")?;
            file.flush()
        };
        write(&self.path).map_err(|e| Error::ManifestError {
            path: self.path.display().to_string(),
            detail: e.to_string(),
        })?;
        self.seen.insert(entry.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&dir.path().join("none.txt")).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_record_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parsed.txt");

        let mut manifest = Manifest::load(&path).unwrap();
        manifest.record("a.xml").unwrap();
        manifest.record("b.xml").unwrap();
        assert!(manifest.contains("a.xml"));

        let reloaded = Manifest::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("b.xml"));
    }

    #[test]
    fn test_record_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parsed.txt");

        let mut manifest = Manifest::load(&path).unwrap();
        manifest.record("a.xml").unwrap();
        manifest.record("a.xml").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "a.xml\n");
    }

    #[test]
    fn test_trailing_blank_lines_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("downloaded.txt");
        std::fs::write(&path, "one.zip\ntwo.zip\n\n\n").unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn test_unreadable_path_is_manifest_error() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where a file is expected
        let path = dir.path().join("sub");
        std::fs::create_dir(&path).unwrap();
        let result = Manifest::load(&path);
        assert!(matches!(result.unwrap_err(), Error::ManifestError { .. }));
    }
}
