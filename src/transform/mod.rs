// src/transform/mod.rs

//! Schemaless XML-to-SQL transformation.
//!
//! This module turns one XML report into a SQL script: `CREATE TABLE`
//! statements for a schema inferred purely from the document, followed
//! by `INSERT OR IGNORE` statements that are safe to replay. The
//! pieces:
//!
//! - [`node`]: parse XML into a map/seq/scalar tree
//! - [`walker`]: pre-order traversal with an explicit frame stack
//! - [`types`]: column type inference and identifier sanitization
//! - [`schema`]: table, column, key, and parent-link inference
//! - [`ddl`] and [`insert`]: statement emission
//!
//! Example report structure this was built for (CAISO OASIS):
//!
//! ```text
//! OASISReport -> MessageHeader -> [TimeDate, Source, Version]
//! OASISReport -> MessagePayload -> RTO -> REPORT_ITEM -> REPORT_DATA -> [...]
//! ```
//!
//! `REPORT_ITEM` has no scalar children of its own, yet both
//! `REPORT_HEADER` and `REPORT_DATA` hang off it; it becomes a table
//! with a synthetic `id` primary key so the header and data rows stay
//! correlated.

pub mod ddl;
pub mod insert;
pub mod node;
pub mod schema;
pub mod types;
pub mod walker;

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
pub use node::Node;
pub use schema::{SchemaModel, Table};
pub use types::{SqlType, sanitize};

/// One parsed document plus its inferred schema, ready to emit SQL.
///
/// Synthetic row identifiers are minted at construction time, so the
/// emitted script is frozen: replaying it, or emitting it twice from
/// the same `Transformer`, produces identical statements.
pub struct Transformer {
    document: Node,
    schema: SchemaModel,
}

impl Transformer {
    /// Parse a document and infer its schema.
    ///
    /// `namespace` is stripped from element names; `exclusions` are
    /// column names kept out of inferred primary keys.
    pub fn new(xml: &str, namespace: &str, exclusions: &[String]) -> Result<Self> {
        let mut document = node::parse_document(xml, namespace)?;
        let schema = schema::SchemaBuilder::new(exclusions).build(&document)?;
        insert::assign_synthetic_ids(&mut document, &schema)?;
        Ok(Self { document, schema })
    }

    /// Read and transform an XML file.
    pub fn from_file(path: &Path, namespace: &str, exclusions: &[String]) -> Result<Self> {
        let xml = fs::read_to_string(path).map_err(|e| Error::InputError {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        Self::new(&xml, namespace, exclusions)
    }

    pub fn schema(&self) -> &SchemaModel {
        &self.schema
    }

    /// `CREATE TABLE` statements, parents before children.
    pub fn creation_ddl(&self) -> Result<Vec<String>> {
        ddl::creation_ddl(&self.schema)
    }

    /// `INSERT OR IGNORE` statements in document pre-order.
    pub fn insertion_sql(&self) -> Result<Vec<String>> {
        insert::insertion_sql(&self.document, &self.schema)
    }

    /// The full script: DDL first, then insertions, one statement per
    /// line.
    pub fn script(&self) -> Result<String> {
        let mut lines = self.creation_ddl()?;
        lines.extend(self.insertion_sql()?);
        let mut script = lines.join("\n");
        script.push('\n');
        Ok(script)
    }

    /// Write the script next to other stage outputs.
    pub fn write_script(&self, target: &Path) -> Result<()> {
        let script = self.script()?;
        debug!(target_file = %target.display(), bytes = script.len(), "writing SQL script");
        fs::write(target, script).map_err(|e| Error::EmitError {
            path: target.display().to_string(),
            detail: e.to_string(),
        })
    }
}
