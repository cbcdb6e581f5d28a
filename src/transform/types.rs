// src/transform/types.rs

//! Column type inference and identifier sanitization.
//!
//! XML gives us text; SQLite wants types. `SqlType::infer` classifies a
//! leaf value by attempting an integer parse, then a float parse, then
//! falling back to TEXT. `sanitize` maps raw element and attribute
//! names (including attribute sigils like `@xmlns`) onto identifiers
//! that are safe in generated SQL.
//!
//! See: https://www.sqlite.org/datatype3.html

use crate::error::{Error, Result};

/// SQLite storage classes for inferred columns.
///
/// `Blob` is reserved for completeness; textual input never infers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl SqlType {
    /// Classify a leaf value.
    ///
    /// An absent value is `Null`. Otherwise integer parse, then float
    /// parse, then `Text`. Pure and total.
    pub fn infer(value: Option<&str>) -> SqlType {
        let Some(text) = value else {
            return SqlType::Null;
        };
        if text.parse::<i64>().is_ok() {
            SqlType::Integer
        } else if text.parse::<f64>().is_ok() {
            SqlType::Real
        } else {
            SqlType::Text
        }
    }

    /// Render the type keyword used in emitted DDL.
    pub fn render(&self) -> &'static str {
        match self {
            SqlType::Null => "NULL",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
        }
    }
}

/// Map a raw element or attribute name to a safe identifier.
///
/// Strips every character outside `[A-Za-z0-9_]` and lowercases the
/// rest, so `@xmlns` becomes `xmlns` and `REPORT_DATA` becomes
/// `report_data`. Idempotent. A name that sanitizes to the empty
/// string is rejected with `BadIdentifier`.
pub fn sanitize(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .flat_map(|c| c.to_lowercase())
        .collect();

    if cleaned.is_empty() {
        return Err(Error::BadIdentifier(raw.to_string()));
    }
    Ok(cleaned)
}
