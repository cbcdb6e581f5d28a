// src/pipeline/mod.rs

//! Generic per-stage driver.
//!
//! Every stage (unzip, parse, insert; download differs only in being
//! URL-keyed) is the same loop: list candidate files by extension,
//! subtract the stage manifest, process the remainder in sorted order,
//! and append each filename to the manifest only once its processing
//! has succeeded. A failure is logged through the
//! observer and the loop moves on; the failed file is retried on the
//! next invocation.
//!
//! The driver is restartable and crash-safe: the manifest is appended
//! and flushed per file, never ahead of completion.

pub mod manifest;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::observe::{EventKind, Observer, StageEvent};
pub use manifest::Manifest;

/// Identity and directories of one stage run.
pub struct StageContext<'a> {
    /// Feed name, used in log records and retry database names.
    pub resource: &'a str,
    /// Stage name for log records ("unzip", "parse", "insert").
    pub stage: &'a str,
    /// Directory holding this stage's inputs.
    pub source_dir: &'a Path,
    /// Directory this stage writes into.
    pub working_dir: &'a Path,
    /// Path of this stage's append-only manifest.
    pub manifest_path: &'a Path,
}

/// Counts for one stage invocation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StageOutcome {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Files in `dir` whose name ends with `extension`, case-insensitive.
/// Subdirectories are ignored.
pub fn glob_dir(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::InputError {
        path: dir.display().to_string(),
        detail: e.to_string(),
    })?;
    let suffix = extension.to_lowercase();
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::InputError {
            path: dir.display().to_string(),
            detail: e.to_string(),
        })?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.to_lowercase().ends_with(&suffix) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Drive one stage over its pending inputs.
///
/// `processor` receives the input's path inside `source_dir` and must
/// produce complete output before returning `Ok`. Listing or manifest
/// failures abort the stage (the pipeline "cannot start"); per-file
/// processor failures are reported and skipped.
pub fn run_stage(
    ctx: &StageContext<'_>,
    extension: &str,
    observer: &dyn Observer,
    mut processor: impl FnMut(&Path) -> Result<()>,
) -> Result<StageOutcome> {
    let mut manifest = Manifest::load(ctx.manifest_path)?;

    let mut pending: Vec<String> = glob_dir(ctx.source_dir, extension)?
        .into_iter()
        .filter(|name| !manifest.contains(name))
        .collect();
    pending.sort();

    debug!(
        resource = ctx.resource,
        stage = ctx.stage,
        pending = pending.len(),
        already_processed = manifest.len(),
        "stage starting"
    );

    let skipped = manifest.len();
    let mut failed = 0usize;
    let mut processed = 0usize;

    // Lazy sequence of completed filenames; the manifest consumes it
    // one record at a time so interruption never over-reports.
    let completed = pending.iter().filter_map(|name| {
        let source: PathBuf = ctx.source_dir.join(name);
        match processor(&source) {
            Ok(()) => {
                observer.event(StageEvent::new(
                    ctx.resource,
                    ctx.stage,
                    name,
                    EventKind::Processed,
                ));
                Some(name.as_str())
            }
            Err(e) => {
                failed += 1;
                observer.event(
                    StageEvent::new(ctx.resource, ctx.stage, name, EventKind::Failed)
                        .with_detail(e.to_string()),
                );
                None
            }
        }
    });

    for name in completed {
        manifest.record(name)?;
        processed += 1;
    }

    Ok(StageOutcome {
        processed,
        failed,
        skipped,
    })
}
