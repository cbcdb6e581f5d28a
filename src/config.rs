// src/config.rs

//! Client configuration.
//!
//! One small JSON file under the user's config directory holding the
//! path of the data root (the directory whose `data/` subdirectory
//! contains one directory per feed).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

/// Persisted client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data root; feeds live under `<root>/data/<feed>`.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Config {
    /// `~/.config/gridfeed/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| Error::ConfigError("HOME is not set".to_string()))?;
        Ok(PathBuf::from(home).join(".config").join("gridfeed").join("config.json"))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::ConfigError(format!("{}: {e}", path.display()))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }
}
