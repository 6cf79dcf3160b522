use super::ordered_map::OrderedMap;
use super::property::Property;
use super::WeakTree;
use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

pub(crate) struct NodeData {
    pub(crate) name: String,
    pub(crate) parent: Option<Weak<RefCell<NodeData>>>,
    pub(crate) dt: WeakTree,
    pub(crate) properties: OrderedMap<String, Property>,
    pub(crate) children: OrderedMap<String, Node>,
    pub(crate) labels: Vec<String>,
    pub(crate) omit_if_no_ref: bool,
    pub(crate) is_referenced: bool,
}

/// A node in the devicetree (`node-name { ... };`).
///
/// Cheap to clone: a `Node` is a handle onto shared, reference-counted
/// state, so every clone observes the same name, properties, children, and
/// flags. Equality and hashing are by node identity, not by content.
#[derive(Clone)]
pub struct Node(pub(crate) Rc<RefCell<NodeData>>);

impl Node {
    pub(crate) fn new_root(dt: WeakTree) -> Node {
        Node(Rc::new(RefCell::new(NodeData {
            name: "/".to_string(),
            parent: None,
            dt,
            properties: OrderedMap::new(),
            children: OrderedMap::new(),
            labels: Vec::new(),
            omit_if_no_ref: false,
            is_referenced: false,
        })))
    }

    pub(crate) fn new_child(name: impl Into<String>, parent: &Node) -> Node {
        let dt = parent.0.borrow().dt.clone();
        Node(Rc::new(RefCell::new(NodeData {
            name: name.into(),
            parent: Some(Rc::downgrade(&parent.0)),
            dt,
            properties: OrderedMap::new(),
            children: OrderedMap::new(),
            labels: Vec::new(),
            omit_if_no_ref: false,
            is_referenced: false,
        })))
    }

    pub(crate) fn dt(&self) -> WeakTree {
        self.0.borrow().dt.clone()
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// The substring of the node's name after its `@`, or an empty string
    /// if the name has none.
    pub fn unit_address(&self) -> String {
        let name = self.0.borrow().name.clone();
        match name.split_once('@') {
            Some((_, addr)) => addr.to_string(),
            None => String::new(),
        }
    }

    pub fn parent(&self) -> Option<Node> {
        self.0
            .borrow()
            .parent
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .map(Node)
    }

    /// `/` followed by the `/`-joined names of this node's ancestors
    /// (excluding the root) and itself. The root node's own path is `/`.
    pub fn path(&self) -> String {
        let mut names = Vec::new();
        let mut cur = self.clone();
        while let Some(parent) = cur.parent() {
            names.push(cur.name());
            cur = parent;
        }
        if names.is_empty() {
            "/".to_string()
        } else {
            names.reverse();
            format!("/{}", names.join("/"))
        }
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.values().cloned().collect()
    }

    pub fn child(&self, name: &str) -> Option<Node> {
        self.0.borrow().children.get(&name.to_string()).cloned()
    }

    pub fn properties(&self) -> Vec<Property> {
        self.0.borrow().properties.values().cloned().collect()
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.0.borrow().properties.get(&name.to_string()).cloned()
    }

    pub fn labels(&self) -> Vec<String> {
        self.0.borrow().labels.clone()
    }

    pub fn omit_if_no_ref(&self) -> bool {
        self.0.borrow().omit_if_no_ref
    }

    pub fn is_referenced(&self) -> bool {
        self.0.borrow().is_referenced
    }

    /// Iterates over this node and all its descendants, depth-first, with
    /// children visited in insertion order.
    pub fn node_iter(&self) -> impl Iterator<Item = Node> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out.into_iter()
    }

    fn collect_into(&self, out: &mut Vec<Node>) {
        out.push(self.clone());
        for child in self.children() {
            child.collect_into(out);
        }
    }

    pub(crate) fn add_label(&self, label: impl Into<String>) {
        let label = label.into();
        let mut data = self.0.borrow_mut();
        if !data.labels.contains(&label) {
            data.labels.push(label);
        }
    }

    pub(crate) fn set_omit_if_no_ref(&self, value: bool) {
        self.0.borrow_mut().omit_if_no_ref = value;
    }

    pub(crate) fn mark_referenced(&self) {
        self.0.borrow_mut().is_referenced = true;
    }

    pub(crate) fn insert_child(&self, child: Node) {
        let name = child.name();
        self.0.borrow_mut().children.insert(name, child);
    }

    pub(crate) fn remove_child(&self, name: &str) -> Option<Node> {
        self.0.borrow_mut().children.remove(&name.to_string())
    }

    pub(crate) fn insert_property(&self, property: Property) {
        let name = property.name();
        self.0.borrow_mut().properties.insert(name, property);
    }

    pub(crate) fn remove_property(&self, name: &str) -> Option<Property> {
        self.0.borrow_mut().properties.remove(&name.to_string())
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.path())
    }
}
