//! The in-memory devicetree: [`Tree`], [`Node`], [`Property`], and the
//! supporting marker/ordered-map types the parser and fixup passes build on.

mod marker;
mod node;
mod ordered_map;
mod property;

pub use marker::{Marker, MarkerKind};
pub use node::Node;
pub use ordered_map::OrderedMap;
pub use property::{Property, PropertyType};

use crate::error::{DtError, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// A single `/memreserve/` entry: the leading labels (if any), the 64-bit
/// address, and the 64-bit length, in source order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemReserve {
    pub labels: Vec<String>,
    pub address: u64,
    pub length: u64,
}

pub(crate) struct TreeData {
    pub(crate) root: Node,
    pub(crate) alias2node: HashMap<String, Node>,
    pub(crate) phandle2node: HashMap<u32, Node>,
    pub(crate) label2node: HashMap<String, Node>,
    pub(crate) label2prop: HashMap<String, Property>,
    pub(crate) label2prop_offset: HashMap<String, (Property, usize)>,
    pub(crate) memreserves: Vec<MemReserve>,
    pub(crate) filename: String,
}

pub(crate) type WeakTree = Weak<RefCell<TreeData>>;

/// A fully parsed, fixed-up devicetree.
///
/// Cheap to clone (an `Rc` handle); every [`Node`] and [`Property`] reached
/// through it shares the same underlying tables. A `Tree` produced by
/// [`crate::parse_file`] or [`crate::parse_str`] has already run every
/// fixup pass: phandles are assigned, references are patched into
/// property values, aliases are registered, `/omit-if-no-ref/` nodes with
/// no referrer are pruned, and label uniqueness has been checked.
#[derive(Clone)]
pub struct Tree(pub(crate) Rc<RefCell<TreeData>>);

impl Tree {
    pub(crate) fn new(filename: impl Into<String>) -> Tree {
        let filename = filename.into();
        let inner = Rc::new_cyclic(|weak: &WeakTree| {
            let root = Node::new_root(weak.clone());
            RefCell::new(TreeData {
                root,
                alias2node: HashMap::new(),
                phandle2node: HashMap::new(),
                label2node: HashMap::new(),
                label2prop: HashMap::new(),
                label2prop_offset: HashMap::new(),
                memreserves: Vec::new(),
                filename,
            })
        });
        Tree(inner)
    }

    pub fn filename(&self) -> String {
        self.0.borrow().filename.clone()
    }

    pub fn root(&self) -> Node {
        self.0.borrow().root.clone()
    }

    pub fn memreserves(&self) -> Vec<MemReserve> {
        self.0.borrow().memreserves.clone()
    }

    pub(crate) fn push_memreserve(&self, reserve: MemReserve) {
        self.0.borrow_mut().memreserves.push(reserve);
    }

    pub(crate) fn set_phandle_map(&self, map: HashMap<u32, Node>) {
        self.0.borrow_mut().phandle2node = map;
    }

    pub(crate) fn set_alias_map(&self, map: HashMap<String, Node>) {
        self.0.borrow_mut().alias2node = map;
    }

    pub(crate) fn set_label_maps(
        &self,
        label2node: HashMap<String, Node>,
        label2prop: HashMap<String, Property>,
        label2prop_offset: HashMap<String, (Property, usize)>,
    ) {
        let mut data = self.0.borrow_mut();
        data.label2node = label2node;
        data.label2prop = label2prop;
        data.label2prop_offset = label2prop_offset;
    }

    /// Iterates over every node in the tree, depth-first, children visited
    /// in insertion order (matches source order on first definition).
    pub fn node_iter(&self) -> impl Iterator<Item = Node> {
        self.root().node_iter()
    }

    /// Looks up a node by absolute path (`/foo/bar`) or by alias, optionally
    /// followed by a `/`-separated path under the alias's target
    /// (`some-alias/baz`). Only the first path segment may be an alias.
    pub fn get_node(&self, path: &str) -> Result<Node> {
        let (mut cur, rest): (Node, &str) = if let Some(stripped) = path.strip_prefix('/') {
            (self.root(), stripped)
        } else {
            let (alias, rest) = match path.split_once('/') {
                Some((a, r)) => (a, r),
                None => (path, ""),
            };
            let node = self.0.borrow().alias2node.get(alias).cloned().ok_or_else(|| {
                DtError::semantic(format!(
                    "no alias '{alias}' found -- did you forget the leading '/' in the node path?"
                ))
            })?;
            (node, rest)
        };

        for component in rest.split('/') {
            if component.is_empty() {
                continue;
            }
            cur = cur.child(component).ok_or_else(|| {
                DtError::semantic(format!(
                    "component '{component}' in path '{path}' does not exist"
                ))
            })?;
        }
        Ok(cur)
    }

    pub fn has_node(&self, path: &str) -> bool {
        self.get_node(path).is_ok()
    }

    pub fn alias_node(&self, alias: &str) -> Option<Node> {
        self.0.borrow().alias2node.get(alias).cloned()
    }

    pub fn phandle_node(&self, phandle: u32) -> Option<Node> {
        self.0.borrow().phandle2node.get(&phandle).cloned()
    }

    pub fn label_node(&self, label: &str) -> Option<Node> {
        self.0.borrow().label2node.get(label).cloned()
    }

    pub fn label_property(&self, label: &str) -> Option<Property> {
        self.0.borrow().label2prop.get(label).cloned()
    }

    pub fn label_property_offset(&self, label: &str) -> Option<(Property, usize)> {
        self.0.borrow().label2prop_offset.get(label).cloned()
    }

    /// Resolves a `&foo` or `&{/path}` reference string as it appears in a
    /// parsed property value marker. A bareword label is resolved by
    /// scanning every node's labels in tree order; a `{/path}` reference is
    /// resolved with [`Tree::get_node`] instead. The label→node index built
    /// by fixup pass 5 isn't available yet during passes 1-2, which is when
    /// references first need resolving.
    pub(crate) fn resolve_ref(&self, reference: &str) -> Result<Node> {
        if let Some(path) = reference.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            return self.get_node(path);
        }
        self.root()
            .node_iter()
            .find(|node| node.labels().iter().any(|l| l == reference))
            .ok_or_else(|| DtError::semantic(format!("undefined node label '{reference}'")))
    }
}
