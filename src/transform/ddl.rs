// src/transform/ddl.rs

//! `CREATE TABLE` emission from an inferred schema.
//!
//! One statement per table, in discovery order so parents precede
//! children. A table with a parent carries shadow columns named
//! `<parent>_<pk>` for each parent primary-key column plus a composite
//! `FOREIGN KEY` clause referencing them; primary-key and foreign-key
//! tuples are always in sanitized-sorted order.

use super::schema::SchemaModel;
use super::types::SqlType;
use crate::error::{Error, Result};

/// `<name> <TYPE>` for a column definition. A NULL-typed column (its
/// element was absent everywhere in the document) is declared with no
/// storage class at all: SQLite accepts a bare column name, while the
/// keyword `NULL` in type position is a syntax error.
fn column_def(schema: &SchemaModel, column: &str, rename: Option<&str>) -> Result<String> {
    let ty = schema
        .column_type(column)
        .ok_or_else(|| Error::ParseError(format!("column '{column}' has no inferred type")))?;
    let name = rename.unwrap_or(column);
    Ok(match ty {
        SqlType::Null => name.to_string(),
        _ => format!("{name} {}", ty.render()),
    })
}

/// Emit one `CREATE TABLE IF NOT EXISTS` statement per inferred table.
pub fn creation_ddl(schema: &SchemaModel) -> Result<Vec<String>> {
    let mut statements = Vec::with_capacity(schema.tables().len());

    for table in schema.tables() {
        let mut defs: Vec<String> = Vec::new();

        for column in &table.local_columns {
            defs.push(column_def(schema, column, None)?);
        }

        if let Some(parent_idx) = table.parent {
            let parent = schema.table_at(parent_idx);
            for pk in &parent.primary_key {
                let shadow = format!("{}_{}", parent.name, pk);
                defs.push(column_def(schema, pk, Some(&shadow))?);
            }
            let shadow: Vec<String> = parent
                .primary_key
                .iter()
                .map(|pk| format!("{}_{}", parent.name, pk))
                .collect();
            defs.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                shadow.join(", "),
                parent.name,
                parent.primary_key.join(", ")
            ));
        }

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}));",
            table.name,
            defs.join(", "),
            table.primary_key.join(", ")
        ));
    }

    Ok(statements)
}
