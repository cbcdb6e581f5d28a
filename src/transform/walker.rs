// src/transform/walker.rs

//! Depth-first pre-order traversal over a [`Node`] tree.
//!
//! The walker owns an explicit stack of `(name, node)` frames; the
//! bottom frame is the synthetic document root and the top frame is
//! the node currently being visited. Visitors receive the whole stack
//! on every callback, which is how the schema scan finds enclosing
//! tables and the insert emitter resolves parent rows.
//!
//! Sequence elements are visited under the *parent's* name rather than
//! their position, which is what collapses repeated siblings into a
//! single table downstream.

use super::node::{Node, ROOT_NAME};
use crate::error::Result;

/// One traversal frame: the name a node was reached by, and the node.
#[derive(Debug)]
pub struct Frame<'a> {
    pub name: String,
    pub node: &'a Node,
}

/// Per-kind callbacks invoked during traversal.
///
/// The top of `stack` is the node the callback is about; the default
/// implementations do nothing so visitors only override what they use.
pub trait Visitor {
    fn on_map(&mut self, _stack: &[Frame<'_>]) -> Result<()> {
        Ok(())
    }
    fn on_seq(&mut self, _stack: &[Frame<'_>]) -> Result<()> {
        Ok(())
    }
    fn on_scalar(&mut self, _stack: &[Frame<'_>]) -> Result<()> {
        Ok(())
    }
}

/// Walk `document` pre-order, with the bottom frame named [`ROOT_NAME`].
pub fn walk<'a>(document: &'a Node, visitor: &mut dyn Visitor) -> Result<()> {
    let mut stack = vec![Frame {
        name: ROOT_NAME.to_string(),
        node: document,
    }];
    walk_frames(&mut stack, visitor)
}

fn walk_frames<'a>(stack: &mut Vec<Frame<'a>>, visitor: &mut dyn Visitor) -> Result<()> {
    let top = stack.last().expect("walker stack is never empty");
    let name = top.name.clone();
    let node: &'a Node = top.node;

    match node {
        Node::Map(entries) => {
            visitor.on_map(stack)?;
            for (child_name, child) in entries {
                stack.push(Frame {
                    name: child_name.clone(),
                    node: child,
                });
                walk_frames(stack, visitor)?;
                stack.pop();
            }
        }
        Node::Seq(items) => {
            visitor.on_seq(stack)?;
            for item in items {
                stack.push(Frame {
                    name: name.clone(),
                    node: item,
                });
                walk_frames(stack, visitor)?;
                stack.pop();
            }
        }
        Node::Scalar(_) => visitor.on_scalar(stack)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::node::parse_document;

    /// Records (kind, name, depth) triples in visit order.
    #[derive(Default)]
    struct Recorder {
        visits: Vec<(&'static str, String, usize)>,
    }

    impl Visitor for Recorder {
        fn on_map(&mut self, stack: &[Frame<'_>]) -> Result<()> {
            let top = stack.last().unwrap();
            self.visits.push(("map", top.name.clone(), stack.len()));
            Ok(())
        }
        fn on_seq(&mut self, stack: &[Frame<'_>]) -> Result<()> {
            let top = stack.last().unwrap();
            self.visits.push(("seq", top.name.clone(), stack.len()));
            Ok(())
        }
        fn on_scalar(&mut self, stack: &[Frame<'_>]) -> Result<()> {
            let top = stack.last().unwrap();
            self.visits.push(("scalar", top.name.clone(), stack.len()));
            Ok(())
        }
    }

    #[test]
    fn test_preorder_with_root_frame() {
        let doc = parse_document("<r><a><v>1</v></a></r>", "").unwrap();
        let mut rec = Recorder::default();
        walk(&doc, &mut rec).unwrap();
        assert_eq!(
            rec.visits,
            vec![
                ("map", ROOT_NAME.to_string(), 1),
                ("map", "r".to_string(), 2),
                ("map", "a".to_string(), 3),
                ("scalar", "v".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_seq_items_visited_under_parent_name() {
        let doc = parse_document("<l><i>1</i><i>2</i></l>", "").unwrap();
        let mut rec = Recorder::default();
        walk(&doc, &mut rec).unwrap();
        assert_eq!(
            rec.visits,
            vec![
                ("map", ROOT_NAME.to_string(), 1),
                ("map", "l".to_string(), 2),
                ("seq", "i".to_string(), 3),
                ("scalar", "i".to_string(), 4),
                ("scalar", "i".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_map_children_in_document_order() {
        let doc = parse_document("<r><b>1</b><a>2</a></r>", "").unwrap();
        let mut rec = Recorder::default();
        walk(&doc, &mut rec).unwrap();
        let names: Vec<&str> = rec
            .visits
            .iter()
            .filter(|(kind, _, _)| *kind == "scalar")
            .map(|(_, name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
