// src/transform/insert.rs

//! `INSERT OR IGNORE` emission.
//!
//! A first pass mints synthetic row identifiers: every map node whose
//! table keys on the synthetic `id` gets a fresh UUID stored onto the
//! node itself, so child visits can read it back like any other scalar.
//! The emission pass then walks the tree pre-order and produces one
//! insert per map node, carrying the parent row's primary-key values as
//! `<parent>_<pk>` shadow columns. Pre-order means a parent row is
//! always inserted before its children.
//!
//! `INSERT OR IGNORE` is what makes re-running a script a no-op: rows
//! keyed on the same primary key are silently skipped.

use uuid::Uuid;

use super::node::Node;
use super::schema::{SYNTHETIC_ID, SchemaModel};
use super::types::{SqlType, sanitize};
use super::walker::{Frame, Visitor, walk};
use crate::error::{Error, Result};

/// Mint a UUID `id` child on every map node whose table keys on the
/// synthetic identifier and which does not already carry one.
pub fn assign_synthetic_ids(document: &mut Node, schema: &SchemaModel) -> Result<()> {
    let Node::Map(entries) = document else {
        return Ok(());
    };
    for (name, child) in entries.iter_mut() {
        assign(name, child, schema)?;
    }
    Ok(())
}

fn assign(name: &str, node: &mut Node, schema: &SchemaModel) -> Result<()> {
    match node {
        Node::Map(entries) => {
            let table_name = sanitize(name)?;
            if let Some(table) = schema.table(&table_name)
                && table.has_synthetic_key()
            {
                let mut has_id = false;
                for (key, _) in entries.iter() {
                    if sanitize(key)? == SYNTHETIC_ID {
                        has_id = true;
                        break;
                    }
                }
                if !has_id {
                    entries.push((
                        SYNTHETIC_ID.to_string(),
                        Node::Scalar(Some(Uuid::new_v4().to_string())),
                    ));
                }
            }
            for (key, child) in entries.iter_mut() {
                assign(key, child, schema)?;
            }
        }
        Node::Seq(items) => {
            for item in items {
                assign(name, item, schema)?;
            }
        }
        Node::Scalar(_) => {}
    }
    Ok(())
}

/// Emit insertion statements for every row in the document, pre-order.
pub fn insertion_sql(document: &Node, schema: &SchemaModel) -> Result<Vec<String>> {
    let mut emitter = InsertEmitter {
        schema,
        statements: Vec::new(),
    };
    walk(document, &mut emitter)?;
    Ok(emitter.statements)
}

struct InsertEmitter<'a> {
    schema: &'a SchemaModel,
    statements: Vec<String>,
}

impl Visitor for InsertEmitter<'_> {
    fn on_map(&mut self, stack: &[Frame<'_>]) -> Result<()> {
        if stack.len() == 1 {
            // synthetic root: no table, no row
            return Ok(());
        }
        let Some(top) = stack.last() else {
            return Ok(());
        };
        let name = sanitize(&top.name)?;
        let table = self
            .schema
            .table(&name)
            .ok_or_else(|| Error::ParseError(format!("no table inferred for element '{name}'")))?;

        let mut columns = Vec::new();
        let mut values = Vec::new();

        // Local values bind in sorted column order. A missing key is
        // recoverable: the column is skipped for this row.
        let mut locals = table.local_columns.clone();
        locals.sort();
        for column in &locals {
            if let Some(text) = scalar_child(top.node, column)? {
                columns.push(column.clone());
                values.push(render_value(text, self.column_type(column)?));
            }
        }

        if let Some(parent_idx) = table.parent {
            let parent = self.schema.table_at(parent_idx);
            if let Some(parent_node) = nearest_frame(stack, &parent.name)? {
                for pk in &parent.primary_key {
                    if let Some(text) = scalar_child(parent_node, pk)? {
                        columns.push(format!("{}_{}", parent.name, pk));
                        values.push(render_value(text, self.column_type(pk)?));
                    }
                }
            }
        }

        if columns.is_empty() {
            return Ok(());
        }
        self.statements.push(format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({});",
            table.name,
            columns.join(", "),
            values.join(", ")
        ));
        Ok(())
    }
}

impl InsertEmitter<'_> {
    fn column_type(&self, column: &str) -> Result<SqlType> {
        self.schema
            .column_type(column)
            .ok_or_else(|| Error::ParseError(format!("column '{column}' has no inferred type")))
    }
}

/// Nearest enclosing map frame with the given sanitized name, skipping
/// the frame being visited itself.
fn nearest_frame<'a>(stack: &'a [Frame<'_>], name: &str) -> Result<Option<&'a Node>> {
    for frame in stack[..stack.len() - 1].iter().rev() {
        if !matches!(frame.node, Node::Map(_)) {
            continue;
        }
        if sanitize(&frame.name)? == name {
            return Ok(Some(frame.node));
        }
    }
    Ok(None)
}

/// Value of the direct scalar child whose sanitized key matches
/// `column`; absent scalars and non-scalar children read as missing.
fn scalar_child<'a>(node: &'a Node, column: &str) -> Result<Option<&'a str>> {
    for (key, child) in node.entries() {
        if sanitize(key)? == column {
            if let Node::Scalar(Some(text)) = child {
                return Ok(Some(text));
            }
            return Ok(None);
        }
    }
    Ok(None)
}

fn render_value(text: &str, ty: SqlType) -> String {
    match ty {
        SqlType::Integer => text
            .trim()
            .parse::<i64>()
            .map(|i| i.to_string())
            .unwrap_or_else(|_| quote_text(text)),
        SqlType::Real => text
            .trim()
            .parse::<f64>()
            .map(|f| f.to_string())
            .unwrap_or_else(|_| quote_text(text)),
        _ => quote_text(text),
    }
}

/// TEXT literal: double-quoted, internal quotes doubled, NUL bytes
/// replaced rather than rejected.
fn quote_text(text: &str) -> String {
    let cleaned = text.replace('\0', "\u{FFFD}");
    format!("\"{}\"", cleaned.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::node::parse_document;
    use crate::transform::schema::SchemaBuilder;

    fn inserts(xml: &str, exclusions: &[&str]) -> Vec<String> {
        let mut doc = parse_document(xml, "").unwrap();
        let exclusions: Vec<String> = exclusions.iter().map(|s| s.to_string()).collect();
        let schema = SchemaBuilder::new(&exclusions).build(&doc).unwrap();
        assign_synthetic_ids(&mut doc, &schema).unwrap();
        insertion_sql(&doc, &schema).unwrap()
    }

    #[test]
    fn test_minimal_inserts() {
        let statements = inserts(r#"<R xmlns="x"><A><v>1</v></A></R>"#, &[]);
        assert_eq!(
            statements,
            vec![
                r#"INSERT OR IGNORE INTO r (xmlns) VALUES ("x");"#,
                r#"INSERT OR IGNORE INTO a (v, r_xmlns) VALUES (1, "x");"#,
            ]
        );
    }

    #[test]
    fn test_repeated_siblings_share_parent_key() {
        let statements = inserts(
            "<LIST><ITEM><v>1</v></ITEM><ITEM><v>2</v></ITEM></LIST>",
            &[],
        );
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("INSERT OR IGNORE INTO list (id) VALUES (\""));

        // both item rows carry the same list_id tuple
        let key0 = statements[1].rsplit_once("VALUES (").unwrap().1;
        let key1 = statements[2].rsplit_once("VALUES (").unwrap().1;
        let fk0 = key0.rsplit(',').next().unwrap();
        let fk1 = key1.rsplit(',').next().unwrap();
        assert_eq!(fk0, fk1);
        assert!(statements[1].contains("INTO item (v, list_id)"));
    }

    #[test]
    fn test_parent_row_emitted_before_children() {
        let statements = inserts("<OUTER><INNER><x>1</x></INNER></OUTER>", &[]);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("INSERT OR IGNORE INTO outer (id)"));
        assert!(statements[1].starts_with("INSERT OR IGNORE INTO inner (x, outer_id)"));
    }

    #[test]
    fn test_synthetic_id_round_trips_to_child() {
        let statements = inserts("<OUTER><INNER><x>1</x></INNER></OUTER>", &[]);
        let outer_id = statements[0]
            .rsplit_once("VALUES (")
            .unwrap()
            .1
            .trim_end_matches(");")
            .to_string();
        assert!(statements[1].ends_with(&format!("VALUES (1, {outer_id});")));
    }

    #[test]
    fn test_missing_key_skips_column() {
        let statements = inserts("<t><r><a>1</a><b>2</b></r><r><a>3</a></r></t>", &[]);
        let second_row = statements
            .iter()
            .find(|s| s.contains("VALUES (3"))
            .unwrap();
        assert!(second_row.contains("(a, t_id)"), "got: {second_row}");
        assert!(!second_row.contains(" b"));
    }

    #[test]
    fn test_quote_doubling() {
        let statements = inserts(r#"<t><r><name>say "hi"</name></r></t>"#, &[]);
        let row = statements.iter().find(|s| s.contains("INTO r ")).unwrap();
        assert!(row.contains(r#""say ""hi""""#), "got: {row}");
    }

    #[test]
    fn test_nul_byte_replaced() {
        assert_eq!(quote_text("a\0b"), "\"a\u{FFFD}b\"");
    }

    #[test]
    fn test_integer_rendered_as_decimal() {
        assert_eq!(render_value("0042", SqlType::Integer), "42");
        assert_eq!(render_value("3.5", SqlType::Real), "3.5");
        assert_eq!(render_value("x", SqlType::Text), "\"x\"");
    }

    #[test]
    fn test_type_mismatch_falls_back_to_quoting() {
        assert_eq!(render_value("oops", SqlType::Integer), "\"oops\"");
    }

    #[test]
    fn test_excluded_column_still_inserted() {
        let statements = inserts(
            "<t><row><opr_date>d1</opr_date><value>2426.9</value></row></t>",
            &["value"],
        );
        let row = statements.iter().find(|s| s.contains("INTO row ")).unwrap();
        assert!(row.contains("opr_date"));
        assert!(row.contains("value"));
        assert!(row.contains("2426.9"));
    }
}
