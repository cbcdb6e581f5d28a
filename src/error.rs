// src/error.rs

use thiserror::Error;

/// Core error types for Gridfeed
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cannot read an input file
    #[error("Failed to read input {path}: {detail}")]
    InputError { path: String, detail: String },

    /// XML is malformed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A raw name sanitized to an empty identifier
    #[error("Name {0:?} sanitizes to an empty identifier")]
    BadIdentifier(String),

    /// The same element name was observed under two different parents
    #[error("Element '{element}' observed under both '{first}' and '{second}'")]
    AmbiguousParent {
        element: String,
        first: String,
        second: String,
    },

    /// I/O failure writing an output SQL script
    #[error("Failed to write SQL script {path}: {detail}")]
    EmitError { path: String, detail: String },

    /// Database execution failed after exhausting all retry databases
    #[error("Ingest of {script} failed after {attempts} attempts: {detail}")]
    IngestError {
        script: String,
        attempts: u32,
        detail: String,
    },

    /// Stage manifest file cannot be read or appended
    #[error("Manifest {path}: {detail}")]
    ManifestError { path: String, detail: String },

    /// HTTP download failure
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Feed archive or restore failure
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// Feed layout or manifest problems
    #[error("Feed error: {0}")]
    FeedError(String),

    /// Client configuration problems
    #[error("Config error: {0}")]
    ConfigError(String),
}

/// Result type alias using Gridfeed's Error type
pub type Result<T> = std::result::Result<T, Error>;
