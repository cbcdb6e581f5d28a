// src/lib.rs

//! Gridfeed
//!
//! Ingests hierarchical XML reports from energy-market data sources and
//! lands them in SQLite, one feed directory per source.
//!
//! # Architecture
//!
//! - Schemaless transform: tables, typed columns, primary keys, and
//!   foreign-key back-references are inferred from the document alone
//! - Idempotent by construction: `INSERT OR IGNORE` everywhere, and an
//!   append-only manifest per stage so re-runs skip finished inputs
//! - Four stages per feed: download, unzip, parse, insert
//! - Single-threaded cooperative pipeline: one file at a time, the
//!   manifest is appended only after a file completes

pub mod config;
mod error;
pub mod feed;
pub mod fetch;
pub mod ingest;
pub mod observe;
pub mod pipeline;
pub mod transform;
pub mod unzip;

pub use error::{Error, Result};
