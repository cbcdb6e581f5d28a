// src/feed.rs

//! Feed directory lifecycle.
//!
//! One feed is one directory under `<root>/data/<name>` holding a
//! `manifest.json` plus four stage directories:
//!
//! ```text
//! data/<feed>/
//!     manifest.json
//!     zip/   + downloaded.txt
//!     xml/   + unzipped.txt
//!     sql/   + parsed.txt
//!     db/    + state.txt
//! ```
//!
//! This module scaffolds that layout, reports per-stage progress,
//! resets stages, archives and restores whole feeds, and drives the
//! stage pipeline in order: download, unzip, parse, insert.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::observe::Observer;
use crate::pipeline::{Manifest, StageContext, StageOutcome, run_stage};
use crate::transform::Transformer;
use crate::{fetch, ingest, unzip};

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Unzip,
    Parse,
    Insert,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Download, Stage::Unzip, Stage::Parse, Stage::Insert];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Unzip => "unzip",
            Stage::Parse => "parse",
            Stage::Insert => "insert",
        }
    }

    /// Directory this stage writes into.
    pub fn dir(&self) -> &'static str {
        match self {
            Stage::Download => "zip",
            Stage::Unzip => "xml",
            Stage::Parse => "sql",
            Stage::Insert => "db",
        }
    }

    /// Manifest filename, kept inside the stage's output directory.
    pub fn manifest_file(&self) -> &'static str {
        match self {
            Stage::Download => "downloaded.txt",
            Stage::Unzip => "unzipped.txt",
            Stage::Parse => "parsed.txt",
            Stage::Insert => "state.txt",
        }
    }

    /// Input extension for the file-driven stages.
    fn extension(&self) -> &'static str {
        match self {
            Stage::Download => ".zip",
            Stage::Unzip => ".zip",
            Stage::Parse => ".xml",
            Stage::Insert => ".sql",
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "download" => Ok(Stage::Download),
            "unzip" => Ok(Stage::Unzip),
            "parse" => Ok(Stage::Parse),
            "insert" => Ok(Stage::Insert),
            other => Err(Error::FeedError(format!("unknown stage '{other}'"))),
        }
    }
}

fn default_pk_exclusions() -> Vec<String> {
    vec!["value".to_string()]
}

/// `manifest.json`: static description of one feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedManifest {
    pub name: String,
    /// URL template with `_START_` and `_END_` placeholders.
    pub url: String,
    /// `[year, month, day]` of the first report to fetch.
    pub start_date: [i32; 3],
    pub download_delay_secs: u64,
    /// Stripped from parsed element names.
    #[serde(default)]
    pub xml_namespace: String,
    /// Columns excluded from inferred primary keys.
    #[serde(default = "default_pk_exclusions")]
    pub pk_exclusions: Vec<String>,
}

impl FeedManifest {
    pub fn start_date(&self) -> Result<chrono::NaiveDate> {
        let [year, month, day] = self.start_date;
        chrono::NaiveDate::from_ymd_opt(year, month as u32, day as u32).ok_or_else(|| {
            Error::FeedError(format!("bad start_date {:?} for feed {}", self.start_date, self.name))
        })
    }
}

/// Handle on one feed directory.
pub struct Feed {
    root: PathBuf,
    name: String,
}

impl Feed {
    pub fn new(root: &Path, name: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join("data").join(&self.name)
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.dir().join(stage.dir())
    }

    pub fn stage_manifest_path(&self, stage: Stage) -> PathBuf {
        self.stage_dir(stage).join(stage.manifest_file())
    }

    fn manifest_json_path(&self) -> PathBuf {
        self.dir().join("manifest.json")
    }

    /// Scaffold the feed directory and write its `manifest.json`.
    pub fn create(&self, manifest: &FeedManifest) -> Result<()> {
        let dir = self.dir();
        if dir.exists() {
            return Err(Error::FeedError(format!(
                "feed directory {} already exists",
                dir.display()
            )));
        }
        for stage in Stage::ALL {
            fs::create_dir_all(self.stage_dir(stage))?;
        }
        let contents = serde_json::to_string_pretty(manifest)
            .map_err(|e| Error::FeedError(format!("cannot serialize manifest: {e}")))?;
        fs::write(self.manifest_json_path(), contents)?;
        fs::write(
            dir.join("README.md"),
            format!(
                "# {name}\n\nGridfeed feed directory. Source URL template:\n\n    {url}\n",
                name = manifest.name,
                url = manifest.url
            ),
        )?;
        info!(feed = %self.name, dir = %dir.display(), "created feed");
        Ok(())
    }

    pub fn load_manifest(&self) -> Result<FeedManifest> {
        let path = self.manifest_json_path();
        let contents = fs::read_to_string(&path).map_err(|e| Error::FeedError(format!(
            "cannot read {}: {e}",
            path.display()
        )))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::FeedError(format!("bad manifest {}: {e}", path.display())))
    }

    /// Per-stage manifest entry counts: downloaded, unzipped, parsed,
    /// inserted.
    pub fn status(&self) -> Result<[usize; 4]> {
        let mut counts = [0; 4];
        for (slot, stage) in Stage::ALL.iter().enumerate() {
            counts[slot] = Manifest::load(&self.stage_manifest_path(*stage))?.len();
        }
        Ok(counts)
    }

    /// Drop and recreate one stage directory, manifest included.
    pub fn reset(&self, stage: Stage) -> Result<PathBuf> {
        let dir = self.stage_dir(stage);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&dir)?;
        info!(feed = %self.name, stage = stage.as_str(), "stage reset");
        Ok(dir)
    }

    /// Pack the whole feed directory into `<dest>/<name>.tar.gz`.
    pub fn archive(&self, dest_dir: &Path) -> Result<PathBuf> {
        let feed_dir = self.dir();
        if !feed_dir.exists() {
            return Err(Error::ArchiveError(format!(
                "feed directory {} does not exist",
                feed_dir.display()
            )));
        }
        fs::create_dir_all(dest_dir)?;
        let archive_path = dest_dir.join(format!("{}.tar.gz", self.name));
        let file = File::create(&archive_path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let pack = |e: std::io::Error| Error::ArchiveError(format!("packing {} failed: {e}", self.name));
        builder.append_dir_all(".", &feed_dir).map_err(pack)?;
        let encoder = builder.into_inner().map_err(pack)?;
        encoder.finish().map_err(pack)?;
        info!(feed = %self.name, archive = %archive_path.display(), "archived");
        Ok(archive_path)
    }

    /// Unpack an archive produced by [`Feed::archive`]. Refuses to
    /// overwrite an existing feed directory.
    pub fn restore(&self, archive: &Path) -> Result<PathBuf> {
        let feed_dir = self.dir();
        if feed_dir.exists() {
            return Err(Error::ArchiveError(format!(
                "delete {} before restoring",
                feed_dir.display()
            )));
        }
        let file = File::open(archive).map_err(|e| Error::ArchiveError(format!(
            "cannot open {}: {e}",
            archive.display()
        )))?;
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        fs::create_dir_all(&feed_dir)?;
        tar.unpack(&feed_dir)
            .map_err(|e| Error::ArchiveError(format!("unpacking {} failed: {e}", archive.display())))?;
        info!(feed = %self.name, archive = %archive.display(), "restored");
        Ok(feed_dir)
    }

    /// Run the given stages in pipeline order.
    pub fn run(&self, stages: &[Stage], observer: &dyn Observer) -> Result<Vec<(Stage, StageOutcome)>> {
        let manifest = self.load_manifest()?;
        let mut outcomes = Vec::new();
        for stage in Stage::ALL {
            if !stages.contains(&stage) {
                continue;
            }
            let outcome = match stage {
                Stage::Download => self.run_download(&manifest, observer)?,
                Stage::Unzip => self.run_unzip(&manifest, observer)?,
                Stage::Parse => self.run_parse(&manifest, observer)?,
                Stage::Insert => self.run_insert(&manifest, observer)?,
            };
            outcomes.push((stage, outcome));
        }
        Ok(outcomes)
    }

    fn run_download(&self, feed: &FeedManifest, observer: &dyn Observer) -> Result<StageOutcome> {
        let dest = self.stage_dir(Stage::Download);
        fs::create_dir_all(&dest)?;
        let start = feed.start_date()?;
        let today = chrono::Local::now().date_naive();
        let urls = fetch::generate_urls(&feed.url, &fetch::day_pairs(start, today));

        let mut manifest = Manifest::load(&self.stage_manifest_path(Stage::Download))?;
        let skipped = manifest.len();
        let downloader = fetch::Downloader::new(feed.download_delay_secs)?;
        let downloaded =
            downloader.download_all(&feed.name, &urls, &mut manifest, &dest, observer)?;
        Ok(StageOutcome {
            processed: downloaded,
            failed: urls.len().saturating_sub(manifest.len()),
            skipped,
        })
    }

    fn run_unzip(&self, feed: &FeedManifest, observer: &dyn Observer) -> Result<StageOutcome> {
        let source_dir = self.stage_dir(Stage::Download);
        let working_dir = self.stage_dir(Stage::Unzip);
        fs::create_dir_all(&working_dir)?;
        let manifest_path = self.stage_manifest_path(Stage::Unzip);
        let ctx = StageContext {
            resource: &feed.name,
            stage: Stage::Unzip.as_str(),
            source_dir: &source_dir,
            working_dir: &working_dir,
            manifest_path: &manifest_path,
        };
        run_stage(&ctx, Stage::Unzip.extension(), observer, |zip_path| {
            unzip::unzip_file(zip_path, &working_dir).map(|_| ())
        })
    }

    fn run_parse(&self, feed: &FeedManifest, observer: &dyn Observer) -> Result<StageOutcome> {
        let source_dir = self.stage_dir(Stage::Unzip);
        let working_dir = self.stage_dir(Stage::Parse);
        fs::create_dir_all(&working_dir)?;
        let manifest_path = self.stage_manifest_path(Stage::Parse);
        let ctx = StageContext {
            resource: &feed.name,
            stage: Stage::Parse.as_str(),
            source_dir: &source_dir,
            working_dir: &working_dir,
            manifest_path: &manifest_path,
        };
        run_stage(&ctx, Stage::Parse.extension(), observer, |xml_path| {
            let transformer =
                Transformer::from_file(xml_path, &feed.xml_namespace, &feed.pk_exclusions)?;
            let file_name = xml_path
                .file_name()
                .ok_or_else(|| Error::InputError {
                    path: xml_path.display().to_string(),
                    detail: "no file name".to_string(),
                })?;
            let target = working_dir.join(Path::new(file_name).with_extension("sql"));
            transformer.write_script(&target)
        })
    }

    fn run_insert(&self, feed: &FeedManifest, observer: &dyn Observer) -> Result<StageOutcome> {
        let source_dir = self.stage_dir(Stage::Parse);
        let working_dir = self.stage_dir(Stage::Insert);
        fs::create_dir_all(&working_dir)?;
        let manifest_path = self.stage_manifest_path(Stage::Insert);
        let ctx = StageContext {
            resource: &feed.name,
            stage: Stage::Insert.as_str(),
            source_dir: &source_dir,
            working_dir: &working_dir,
            manifest_path: &manifest_path,
        };
        run_stage(&ctx, Stage::Insert.extension(), observer, |sql_path| {
            ingest::execute_script(&feed.name, sql_path, &working_dir).map(|_| ())
        })
    }
}

/// Names of the feeds under `<root>/data`, sorted.
pub fn list_feeds(root: &Path) -> Result<Vec<String>> {
    let data_dir = root.join("data");
    let entries = fs::read_dir(&data_dir).map_err(|e| Error::FeedError(format!(
        "cannot list {}: {e}",
        data_dir.display()
    )))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::FeedError(e.to_string()))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}
