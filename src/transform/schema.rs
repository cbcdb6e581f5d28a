// src/transform/schema.rs

//! Schema inference over a parsed document tree.
//!
//! Two walker passes feed a finalize step. The type scan classifies
//! every scalar leaf into a global column-type map; the structure scan
//! discovers tables, their scalar columns, and the enclosing parent of
//! each table. Finalize injects synthetic `id` columns for tables with
//! no scalar children, computes primary keys (local columns minus the
//! feed's exclusion set), and resolves parent names into arena indices.
//!
//! Running the passes back to back makes inference order-insensitive:
//! every scalar name is classified before any table looks at its
//! children, so forward references in the document cannot drop columns.
//!
//! Tables live in a flat arena; `parent` and `children` are indices
//! into it, which keeps the model cycle-free and easy to dump in tests.

use std::collections::{BTreeMap, HashMap};

use super::node::Node;
use super::types::{SqlType, sanitize};
use super::walker::{Frame, Visitor, walk};
use crate::error::{Error, Result};

/// Column name injected into tables that have no scalar children.
pub const SYNTHETIC_ID: &str = "id";

/// One inferred table.
#[derive(Debug, Clone)]
pub struct Table {
    /// Sanitized, globally unique table name.
    pub name: String,
    /// Scalar columns observed under this element, in observation order.
    pub local_columns: Vec<String>,
    /// Primary-key columns, sorted by name.
    pub primary_key: Vec<String>,
    /// Arena index of the enclosing table, `None` for the top level.
    pub parent: Option<usize>,
    /// Arena indices of tables whose parent is this table.
    pub children: Vec<usize>,
}

impl Table {
    /// True when the primary key is the synthetic `id` column.
    pub fn has_synthetic_key(&self) -> bool {
        self.primary_key.len() == 1 && self.primary_key[0] == SYNTHETIC_ID
    }
}

/// The inferred schema for one document: a table arena plus the global
/// column-type map.
#[derive(Debug)]
pub struct SchemaModel {
    tables: Vec<Table>,
    index: HashMap<String, usize>,
    types: BTreeMap<String, SqlType>,
}

impl SchemaModel {
    /// Tables in discovery (document pre-order) order.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Look up a table by sanitized name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.index.get(name).map(|&idx| &self.tables[idx])
    }

    /// Table at an arena index.
    pub fn table_at(&self, idx: usize) -> &Table {
        &self.tables[idx]
    }

    /// Inferred type for a sanitized column name.
    pub fn column_type(&self, column: &str) -> Option<SqlType> {
        self.types.get(column).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Builds a [`SchemaModel`] from a document, owning all intermediate
/// scan state.
pub struct SchemaBuilder {
    exclusions: Vec<String>,
}

impl SchemaBuilder {
    /// `exclusions` are column names (compared after sanitization) that
    /// never participate in an inferred primary key.
    pub fn new(exclusions: &[String]) -> Self {
        let exclusions = exclusions
            .iter()
            .filter_map(|e| sanitize(e).ok())
            .collect();
        Self { exclusions }
    }

    pub fn build(self, document: &Node) -> Result<SchemaModel> {
        let mut types = BTreeMap::new();
        walk(document, &mut TypeScan { types: &mut types })?;

        let mut scan = StructureScan {
            protos: Vec::new(),
            index: HashMap::new(),
            types: &types,
        };
        walk(document, &mut scan)?;
        let StructureScan { protos, index, .. } = scan;

        self.finalize(protos, index, types)
    }

    fn finalize(
        self,
        protos: Vec<ProtoTable>,
        index: HashMap<String, usize>,
        mut types: BTreeMap<String, SqlType>,
    ) -> Result<SchemaModel> {
        let mut tables = Vec::with_capacity(protos.len());
        let mut parent_names = Vec::with_capacity(protos.len());

        for proto in protos {
            let mut local_columns = proto.local_columns;
            let mut primary_key: Vec<String> = local_columns
                .iter()
                .filter(|c| !self.exclusions.contains(*c))
                .cloned()
                .collect();

            // Element-only tables (and tables whose every column is
            // excluded) get a synthetic id as their identity.
            if primary_key.is_empty() {
                if !local_columns.iter().any(|c| c == SYNTHETIC_ID) {
                    local_columns.push(SYNTHETIC_ID.to_string());
                }
                types.entry(SYNTHETIC_ID.to_string()).or_insert(SqlType::Text);
                primary_key = vec![SYNTHETIC_ID.to_string()];
            }
            primary_key.sort();

            parent_names.push(proto.parent);
            tables.push(Table {
                name: proto.name,
                local_columns,
                primary_key,
                parent: None,
                children: Vec::new(),
            });
        }

        for (idx, parent_name) in parent_names.iter().enumerate() {
            let Some(parent_name) = parent_name else {
                continue;
            };
            let parent_idx = *index.get(parent_name).ok_or_else(|| {
                Error::ParseError(format!(
                    "table '{}' references unknown parent '{}'",
                    tables[idx].name, parent_name
                ))
            })?;
            tables[idx].parent = Some(parent_idx);
            tables[parent_idx].children.push(idx);
        }

        Ok(SchemaModel {
            tables,
            index,
            types,
        })
    }
}

/// Pass 1: classify every scalar leaf. First non-NULL classification
/// of a name is sticky; a NULL placeholder may be upgraded later.
struct TypeScan<'a> {
    types: &'a mut BTreeMap<String, SqlType>,
}

impl Visitor for TypeScan<'_> {
    fn on_scalar(&mut self, stack: &[Frame<'_>]) -> Result<()> {
        let Some(top) = stack.last() else {
            return Ok(());
        };
        let name = sanitize(&top.name)?;
        let Node::Scalar(value) = top.node else {
            return Ok(());
        };
        let inferred = SqlType::infer(value.as_deref());
        match self.types.get(&name) {
            None => {
                self.types.insert(name, inferred);
            }
            Some(SqlType::Null) if inferred != SqlType::Null => {
                self.types.insert(name, inferred);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Table being assembled during the structure scan.
struct ProtoTable {
    name: String,
    local_columns: Vec<String>,
    parent: Option<String>,
    parent_resolved: bool,
}

/// Pass 2: discover tables, columns, and parents.
struct StructureScan<'a> {
    protos: Vec<ProtoTable>,
    index: HashMap<String, usize>,
    types: &'a BTreeMap<String, SqlType>,
}

impl StructureScan<'_> {
    fn ensure(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.protos.len();
        self.protos.push(ProtoTable {
            name: name.to_string(),
            local_columns: Vec::new(),
            parent: None,
            parent_resolved: false,
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Nearest enclosing frame with a different name, skipping the
    /// sequence frames that repeat this table's own name. `None` means
    /// the synthetic root encloses this table directly.
    fn enclosing_parent(stack: &[Frame<'_>], own: &str) -> Result<Option<String>> {
        for (pos, frame) in stack.iter().enumerate().rev().skip(1) {
            if pos == 0 {
                return Ok(None);
            }
            let name = sanitize(&frame.name)?;
            if name == own {
                continue;
            }
            return Ok(Some(name));
        }
        Ok(None)
    }

    fn observe(&mut self, stack: &[Frame<'_>]) -> Result<()> {
        if stack.len() == 1 {
            // synthetic root: not a table
            return Ok(());
        }
        let Some(top) = stack.last() else {
            return Ok(());
        };
        let name = sanitize(&top.name)?;
        let idx = self.ensure(&name);

        if let Node::Map(entries) = top.node {
            for (key, _) in entries {
                let column = sanitize(key)?;
                // only scalar children become columns; everything else
                // becomes a child table
                if self.types.contains_key(&column)
                    && !self.protos[idx].local_columns.contains(&column)
                {
                    self.protos[idx].local_columns.push(column);
                }
            }
        }

        let parent = Self::enclosing_parent(stack, &name)?;
        let proto = &mut self.protos[idx];
        if proto.parent_resolved {
            if proto.parent != parent {
                return Err(Error::AmbiguousParent {
                    element: name,
                    first: proto
                        .parent
                        .clone()
                        .unwrap_or_else(|| super::node::ROOT_NAME.to_string()),
                    second: parent.unwrap_or_else(|| super::node::ROOT_NAME.to_string()),
                });
            }
        } else {
            proto.parent = parent;
            proto.parent_resolved = true;
        }
        Ok(())
    }
}

impl Visitor for StructureScan<'_> {
    fn on_map(&mut self, stack: &[Frame<'_>]) -> Result<()> {
        self.observe(stack)
    }

    fn on_seq(&mut self, stack: &[Frame<'_>]) -> Result<()> {
        self.observe(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::node::parse_document;

    fn infer(xml: &str, exclusions: &[&str]) -> SchemaModel {
        let doc = parse_document(xml, "").unwrap();
        let exclusions: Vec<String> = exclusions.iter().map(|s| s.to_string()).collect();
        SchemaBuilder::new(&exclusions).build(&doc).unwrap()
    }

    #[test]
    fn test_minimal_two_tables() {
        let schema = infer(r#"<R xmlns="x"><A><v>1</v></A></R>"#, &[]);
        assert_eq!(schema.tables().len(), 2);

        let r = schema.table("r").unwrap();
        assert_eq!(r.local_columns, vec!["xmlns"]);
        assert_eq!(r.primary_key, vec!["xmlns"]);
        assert!(r.parent.is_none());

        let a = schema.table("a").unwrap();
        assert_eq!(a.local_columns, vec!["v"]);
        assert_eq!(a.primary_key, vec!["v"]);
        assert_eq!(schema.table_at(a.parent.unwrap()).name, "r");
        assert_eq!(schema.column_type("v"), Some(SqlType::Integer));
        assert_eq!(schema.column_type("xmlns"), Some(SqlType::Text));
    }

    #[test]
    fn test_repeated_siblings_are_one_table() {
        let schema = infer("<LIST><ITEM><v>1</v></ITEM><ITEM><v>2</v></ITEM></LIST>", &[]);
        assert_eq!(schema.tables().len(), 2);

        let item = schema.table("item").unwrap();
        assert_eq!(item.local_columns, vec!["v"]);
        assert_eq!(schema.table_at(item.parent.unwrap()).name, "list");

        let list = schema.table("list").unwrap();
        assert!(list.has_synthetic_key());
        assert_eq!(list.local_columns, vec![SYNTHETIC_ID]);
        assert_eq!(list.children.len(), 1);
    }

    #[test]
    fn test_empty_parent_gets_synthetic_id() {
        let schema = infer("<OUTER><INNER><x>1</x></INNER></OUTER>", &[]);
        let outer = schema.table("outer").unwrap();
        assert_eq!(outer.local_columns, vec![SYNTHETIC_ID]);
        assert_eq!(outer.primary_key, vec![SYNTHETIC_ID]);
        assert_eq!(schema.column_type(SYNTHETIC_ID), Some(SqlType::Text));

        let inner = schema.table("inner").unwrap();
        assert_eq!(inner.primary_key, vec!["x"]);
        assert_eq!(schema.table_at(inner.parent.unwrap()).name, "outer");
    }

    #[test]
    fn test_exclusions_drop_out_of_primary_key() {
        let schema = infer(
            "<t><row><opr_date>2018-02-24</opr_date><value>2426.9</value></row></t>",
            &["value"],
        );
        let row = schema.table("row").unwrap();
        assert_eq!(row.local_columns, vec!["opr_date", "value"]);
        assert_eq!(row.primary_key, vec!["opr_date"]);
    }

    #[test]
    fn test_all_columns_excluded_falls_back_to_id() {
        let schema = infer("<t><row><value>1</value></row></t>", &["value"]);
        let row = schema.table("row").unwrap();
        assert_eq!(row.primary_key, vec![SYNTHETIC_ID]);
        assert!(row.local_columns.contains(&"value".to_string()));
        assert!(row.local_columns.contains(&SYNTHETIC_ID.to_string()));
    }

    #[test]
    fn test_primary_key_is_sorted() {
        let schema = infer("<t><row><zz>1</zz><aa>2</aa></row></t>", &[]);
        let row = schema.table("row").unwrap();
        assert_eq!(row.local_columns, vec!["zz", "aa"]);
        assert_eq!(row.primary_key, vec!["aa", "zz"]);
    }

    #[test]
    fn test_first_nonnull_type_is_sticky() {
        let schema = infer("<t><a><v>1</v></a><b><v>oops</v></b></t>", &[]);
        assert_eq!(schema.column_type("v"), Some(SqlType::Integer));
    }

    #[test]
    fn test_null_placeholder_upgrades() {
        let schema = infer("<t><a><v/></a><b><v>3.5</v></b></t>", &[]);
        assert_eq!(schema.column_type("v"), Some(SqlType::Real));
    }

    #[test]
    fn test_ambiguous_parent_is_reported() {
        let doc =
            parse_document("<t><a><x><v>1</v></x></a><b><x><v>2</v></x></b></t>", "").unwrap();
        let result = SchemaBuilder::new(&[]).build(&doc);
        match result.unwrap_err() {
            Error::AmbiguousParent { element, first, second } => {
                assert_eq!(element, "x");
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("expected AmbiguousParent, got {other:?}"),
        }
    }

    #[test]
    fn test_deep_nesting_chain() {
        let schema = infer(
            "<r><m><rto><name>CAISO</name><item><h><sys>OASIS</sys></h></item></rto></m></r>",
            &[],
        );
        assert_eq!(schema.tables().len(), 5);
        let h = schema.table("h").unwrap();
        assert_eq!(schema.table_at(h.parent.unwrap()).name, "item");
        let item = schema.table("item").unwrap();
        assert_eq!(schema.table_at(item.parent.unwrap()).name, "rto");
        let rto = schema.table("rto").unwrap();
        assert_eq!(rto.local_columns, vec!["name"]);
    }

    #[test]
    fn test_discovery_order_is_preorder() {
        let schema = infer("<r><a><b><v>1</v></b></a><c><w>2</w></c></r>", &[]);
        let names: Vec<&str> = schema.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["r", "a", "b", "c"]);
    }
}
