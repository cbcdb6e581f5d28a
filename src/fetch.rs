// src/fetch.rs

//! Feed downloads.
//!
//! URLs are generated from the feed manifest's template by substituting
//! `_START_`/`_END_` with consecutive day pairs from the feed's start
//! date up to today. The download manifest is keyed by URL rather than
//! filename; a URL already on disk is recorded without re-fetching, so
//! a hand-copied archive repairs the manifest instead of fighting it.
//!
//! Sources rate-limit aggressively, hence the mandatory delay between
//! requests.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::observe::{EventKind, Observer, StageEvent};
use crate::pipeline::Manifest;

/// Default timeout for HTTP requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Characters rejected by common object stores; replaced in filenames.
const UNSAFE_FILENAME_CHARS: &[char] = &[
    '&', '@', ':', ',', '$', '=', '+', '?', ';', ' ', '\\', '^', '>', '<', '{', '}', '[', ']',
    '%', '~', '|',
];

/// Replacements that shrink well-known URL boilerplate before linting.
const FILENAME_REPLACEMENTS: &[(&str, &str)] = &[
    ("http://oasis.caiso.com/oasisapi/", "oasis_"),
    ("/", "_"),
    ("&", ","),
    ("SingleZip", "SZ"),
    ("queryname", "q"),
    ("startdatetime", "sdt"),
    ("enddatetime", "edt"),
    ("market_run_id", "mri"),
    ("version", "v"),
];

/// Consecutive day pairs `(d, d+1)` from `start` through `end`.
pub fn day_pairs(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut pairs = Vec::new();
    let mut day = start;
    while day < end {
        let next = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
        pairs.push((day, next));
        day = next;
    }
    pairs
}

/// Substitute `_START_`/`_END_` in the URL template for each pair,
/// formatted `%Y%m%d`.
pub fn generate_urls(template: &str, pairs: &[(NaiveDate, NaiveDate)]) -> Vec<String> {
    pairs
        .iter()
        .map(|(start, end)| {
            template
                .replace("_START_", &start.format("%Y%m%d").to_string())
                .replace("_END_", &end.format("%Y%m%d").to_string())
        })
        .collect()
}

/// Map a download URL to a filename safe for the local filesystem and
/// remote object stores.
pub fn url_to_filename(url: &str, ending: &str) -> String {
    let mut name = url.to_string();
    for (from, to) in FILENAME_REPLACEMENTS {
        name = name.replace(from, to);
    }
    let linted: String = name
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    format!("{linted}{ending}")
}

/// Blocking HTTP downloader with a fixed inter-request delay.
pub struct Downloader {
    client: Client,
    delay: Duration,
}

impl Downloader {
    pub fn new(delay_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadError(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            delay: Duration::from_secs(delay_secs),
        })
    }

    /// Download every URL not yet in the manifest into `dest_dir`.
    ///
    /// Each successful download is recorded immediately. A URL whose
    /// target file already exists on disk is recorded without a
    /// request. Failures are reported and left for the next run.
    pub fn download_all(
        &self,
        resource: &str,
        urls: &[String],
        manifest: &mut Manifest,
        dest_dir: &Path,
        observer: &dyn Observer,
    ) -> Result<usize> {
        let mut downloaded = 0;
        for url in urls {
            let filename = url_to_filename(url, ".zip");
            if manifest.contains(url) {
                continue;
            }
            let dest_path = dest_dir.join(&filename);
            if dest_path.exists() {
                observer.event(
                    StageEvent::new(resource, "download", url, EventKind::Skipped)
                        .with_detail("file exists locally, updating manifest"),
                );
                manifest.record(url)?;
                continue;
            }
            match self.fetch_one(url, &dest_path) {
                Ok(()) => {
                    observer.event(
                        StageEvent::new(resource, "download", url, EventKind::Processed)
                            .with_detail(filename),
                    );
                    manifest.record(url)?;
                    downloaded += 1;
                }
                Err(e) => {
                    observer.event(
                        StageEvent::new(resource, "download", url, EventKind::Failed)
                            .with_detail(e.to_string()),
                    );
                }
            }
            std::thread::sleep(self.delay);
        }
        Ok(downloaded)
    }

    /// Fetch one URL to `dest_path`, writing through a `.tmp` sibling
    /// so interrupted downloads never look complete.
    fn fetch_one(&self, url: &str, dest_path: &Path) -> Result<()> {
        debug!(url, dest = %dest_path.display(), "downloading");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let temp_path = dest_path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        io::copy(&mut response, &mut file)
            .map_err(|e| Error::DownloadError(format!("failed to write {url}: {e}")))?;
        fs::rename(&temp_path, dest_path)?;

        info!(url, dest = %dest_path.display(), "downloaded");
        Ok(())
    }
}
