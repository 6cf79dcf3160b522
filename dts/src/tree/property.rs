use super::marker::{Marker, MarkerKind};
use super::node::{Node, NodeData};
use crate::error::{DtError, Result};
use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

pub(crate) struct PropertyData {
    pub(crate) name: String,
    pub(crate) node: Weak<RefCell<NodeData>>,
    pub(crate) value: Vec<u8>,
    pub(crate) labels: Vec<String>,
    pub(crate) markers: Vec<Marker>,
}

/// A property (`name = ...;`) attached to a [`Node`].
///
/// Cheap to clone, equality and hashing by identity, same as `Node`.
#[derive(Clone)]
pub struct Property(pub(crate) Rc<RefCell<PropertyData>>);

/// A property's type, inferred purely from its marker sequence and final
/// value length. Labels within the value never influence this.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PropertyType {
    Empty,
    Bytes,
    Num,
    Nums,
    String,
    Strings,
    Path,
    Phandle,
    Compound,
}

impl Property {
    pub(crate) fn new(name: impl Into<String>, owner: &Node) -> Property {
        Property(Rc::new(RefCell::new(PropertyData {
            name: name.into(),
            node: Rc::downgrade(&owner.0),
            value: Vec::new(),
            labels: Vec::new(),
            markers: Vec::new(),
        })))
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn node(&self) -> Node {
        Node(
            self.0
                .borrow()
                .node
                .upgrade()
                .expect("property outlived its owning node"),
        )
    }

    pub fn value(&self) -> Vec<u8> {
        self.0.borrow().value.clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.0.borrow().labels.clone()
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.0.borrow().markers.clone()
    }

    /// The labels attached at specific byte offsets within the value
    /// (`'x = < 0 label: 1 >;'` gives `[("label", 4)]`), in source order.
    pub fn value_labels(&self) -> Vec<(String, usize)> {
        self.0
            .borrow()
            .markers
            .iter()
            .filter(|m| m.kind == MarkerKind::RefLabel)
            .filter_map(|m| m.reference.clone().map(|label| (label, m.offset)))
            .collect()
    }

    pub(crate) fn add_label(&self, label: impl Into<String>) {
        let label = label.into();
        let mut data = self.0.borrow_mut();
        if !data.labels.contains(&label) {
            data.labels.push(label);
        }
    }

    pub(crate) fn clear_value(&self) {
        let mut data = self.0.borrow_mut();
        data.value.clear();
        data.markers.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.0.borrow().value.len()
    }

    pub(crate) fn push_bytes(&self, bytes: &[u8]) {
        self.0.borrow_mut().value.extend_from_slice(bytes);
    }

    pub(crate) fn push_marker(&self, marker: Marker) {
        self.0.borrow_mut().markers.push(marker);
    }

    pub(crate) fn set_value_and_markers(&self, value: Vec<u8>, markers: Vec<Marker>) {
        let mut data = self.0.borrow_mut();
        data.value = value;
        data.markers = markers;
    }

    pub(crate) fn marker_count(&self) -> usize {
        self.0.borrow().markers.len()
    }

    /// Reads marker `index` fresh, after any offset shifts earlier splices
    /// in the same fixup pass may have applied. Marker indices stay stable
    /// across splices — only offsets move.
    pub(crate) fn marker_at(&self, index: usize) -> Marker {
        self.0.borrow().markers[index].clone()
    }

    /// Overwrites a fixed-width region in place (phandle patch).
    pub(crate) fn overwrite_bytes(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.0.borrow_mut();
        data.value[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Inserts `bytes` at `offset`, growing the value (path reference
    /// patch), and shifts every marker positioned after the insertion point
    /// so later regions keep pointing at the right bytes.
    pub(crate) fn splice_bytes(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.0.borrow_mut();
        data.value.splice(offset..offset, bytes.iter().copied());
        let len = bytes.len();
        for marker in data.markers.iter_mut() {
            if marker.offset > offset {
                marker.offset += len;
            }
        }
    }

    fn tree(&self) -> crate::tree::Tree {
        crate::tree::Tree(
            self.node()
                .dt()
                .upgrade()
                .expect("property outlived its tree"),
        )
    }

    fn err(&self, expected: &str) -> DtError {
        DtError::semantic(format!(
            "expected property '{}' on {} in {} to be assigned with '{}', not '{:?}'",
            self.name(),
            self.node().path(),
            self.tree().filename(),
            expected,
            self.inferred_type(),
        ))
    }

    /// The type table, computed from the marker sequence with
    /// `RefLabel` markers removed and the final value length.
    pub fn inferred_type(&self) -> PropertyType {
        let data = self.0.borrow();
        let kinds: Vec<MarkerKind> = data
            .markers
            .iter()
            .map(|m| m.kind)
            .filter(|k| *k != MarkerKind::RefLabel)
            .collect();
        let len = data.value.len();
        drop(data);

        if kinds.is_empty() {
            return PropertyType::Empty;
        }
        if kinds == [MarkerKind::StartBytes] {
            return PropertyType::Bytes;
        }
        if kinds == [MarkerKind::StartU32] {
            return if len == 4 {
                PropertyType::Num
            } else {
                PropertyType::Nums
            };
        }
        if !kinds.is_empty() && kinds.iter().all(|k| *k == MarkerKind::StartU32) {
            return PropertyType::Nums;
        }
        if !kinds.is_empty() && kinds.iter().all(|k| *k == MarkerKind::StartString) {
            return if kinds.len() == 1 {
                PropertyType::String
            } else {
                PropertyType::Strings
            };
        }
        if kinds == [MarkerKind::RefPath] {
            return PropertyType::Path;
        }
        if kinds == [MarkerKind::StartU32, MarkerKind::RefPhandle] && len == 4 {
            return PropertyType::Phandle;
        }
        PropertyType::Compound
    }

    pub fn to_num(&self) -> Result<u32> {
        self.to_num_signed(false).map(|v| v as u32)
    }

    pub fn to_num_signed(&self, signed: bool) -> Result<i64> {
        if self.inferred_type() != PropertyType::Num {
            return Err(self.err("foo = < (number) >;"));
        }
        let bytes = self.value();
        let raw = u32::from_be_bytes(bytes.try_into().unwrap());
        Ok(if signed { raw as i32 as i64 } else { raw as i64 })
    }

    pub fn to_nums(&self) -> Result<Vec<u32>> {
        match self.inferred_type() {
            PropertyType::Num | PropertyType::Nums => Ok(self
                .value()
                .chunks_exact(4)
                .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
                .collect()),
            _ => Err(self.err("foo = < (number) (number) ... >;")),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.inferred_type() != PropertyType::Bytes {
            return Err(self.err("foo = [ (byte) (byte) ... ];"));
        }
        Ok(self.value())
    }

    pub fn to_string_value(&self) -> Result<String> {
        if self.inferred_type() != PropertyType::String {
            return Err(self.err("foo = \"string\";"));
        }
        self.decode_strings().map(|mut v| v.remove(0))
    }

    pub fn to_strings(&self) -> Result<Vec<String>> {
        match self.inferred_type() {
            PropertyType::String | PropertyType::Strings => self.decode_strings(),
            _ => Err(self.err("foo = \"string\", \"string\", ...;")),
        }
    }

    fn decode_strings(&self) -> Result<Vec<String>> {
        let value = self.value();
        let text = String::from_utf8(value).map_err(|_| {
            DtError::semantic(format!(
                "value of property '{}' on {} in {} is not valid UTF-8",
                self.name(),
                self.node().path(),
                self.tree().filename()
            ))
        })?;
        // Every STRING chunk is null-terminated, so splitting on '\0' leaves
        // one trailing empty element per string that isn't part of the data.
        let mut parts: Vec<String> = text.split('\0').map(|s| s.to_string()).collect();
        parts.pop();
        Ok(parts)
    }

    pub fn to_path(&self) -> Result<Node> {
        match self.inferred_type() {
            PropertyType::Path | PropertyType::String => {
                let value = self.value();
                let text = String::from_utf8(value).map_err(|_| {
                    DtError::semantic(format!(
                        "value of property '{}' on {} is not valid UTF-8",
                        self.name(),
                        self.node().path()
                    ))
                })?;
                let path = text.trim_end_matches('\0');
                self.tree().get_node(path).map_err(|_| {
                    DtError::semantic(format!(
                        "property '{}' on {} points to the non-existent node \"{}\"",
                        self.name(),
                        self.node().path(),
                        path
                    ))
                })
            }
            _ => Err(self.err("foo = &bar;")),
        }
    }

    pub fn to_node(&self) -> Result<Node> {
        match self.inferred_type() {
            PropertyType::Phandle | PropertyType::Num => {
                let phandle = u32::from_be_bytes(self.value().try_into().unwrap());
                self.tree().phandle_node(phandle).ok_or_else(|| {
                    DtError::semantic(format!(
                        "the phandle given in property '{}' ({}) on {} does not exist",
                        self.name(),
                        phandle,
                        self.node().path()
                    ))
                })
            }
            _ => Err(self.err("foo = < &bar >;")),
        }
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Property {}

impl Hash for Property {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state)
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Property({} on {})", self.name(), self.node().path())
    }
}
