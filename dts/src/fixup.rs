//! The five post-parse fixup passes, run once, in order, over a
//! freshly parsed [`Tree`]:
//!
//! 1. register phandles — assign a `phandle` property to every node that's
//!    referenced by a `&label`/`&{path}` phandle use and doesn't already
//!    carry one, resolving self-referential `phandle = <&self>;` placeholders
//!    in place; an explicit literal `0` or `0xFFFFFFFF` is rejected.
//! 2. patch property values — overwrite `RefPhandle` regions with the
//!    resolved phandle, and splice `RefPath` regions with the resolved
//!    node's path string.
//! 3. register aliases — index the `/aliases` node's properties.
//! 4. prune `/omit-if-no-ref/` nodes that ended up with no referrer.
//! 5. register labels — index node/property/value labels, rejecting a
//!    label bound to more than one location.

use crate::error::{DtError, Result};
use crate::tree::{Marker, MarkerKind, Node, Property, Tree};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};

pub(crate) fn run(tree: &Tree) -> Result<()> {
    log::debug!("fixup: pass 1 (register phandles) starting");
    register_phandles(tree)?;
    log::debug!("fixup: pass 2 (patch references) starting");
    patch_references(tree)?;
    log::debug!("fixup: pass 3 (register aliases) starting");
    register_aliases(tree)?;
    log::debug!("fixup: pass 4 (prune omit-if-no-ref) starting");
    prune_omitted(tree)?;
    log::debug!("fixup: pass 5 (register labels) starting");
    register_labels(tree)?;
    log::debug!("fixup: complete for {}", tree.filename());
    Ok(())
}

fn phandle_property(node: &Node) -> Option<Property> {
    node.property("phandle")
}

/// Reads a node's already-assigned phandle straight out of its `phandle`
/// property's raw bytes. Used instead of the type-checked `to_num` accessor
/// because a self-referential `phandle = <&self>;` property's inferred type
/// is PHANDLE, not NUM, even after its value has been patched with the real
/// allocated number.
fn phandle_value(node: &Node) -> u32 {
    let prop = phandle_property(node)
        .expect("every phandle reference target was assigned a phandle in pass 1");
    let value = prop.value();
    u32::from_be_bytes(value[..4].try_into().expect("phandle property is 4 bytes"))
}

/// Smallest phandle integer not already in `phandle2node`, skipping the two
/// forbidden sentinel values (0 and 0xFFFFFFFF are reserved).
fn allocate_phandle(phandle2node: &HashMap<u32, Node>) -> u32 {
    let mut candidate: u32 = 1;
    while candidate == 0xFFFFFFFF || phandle2node.contains_key(&candidate) {
        candidate += 1;
    }
    candidate
}

fn register_phandles(tree: &Tree) -> Result<()> {
    let mut phandle2node: HashMap<u32, Node> = HashMap::new();
    let mut needs_phandle = Vec::new();
    let mut seen: HashSet<Node> = HashSet::new();

    for node in tree.node_iter() {
        if let Some(prop) = phandle_property(&node) {
            if prop.len() != 4 {
                return Err(DtError::semantic(format!(
                    "bad phandle length ({}) on {}, expected 4 bytes",
                    prop.len(),
                    node.path()
                )));
            }
            if let Some(marker) = prop.markers().iter().find(|m| m.kind == MarkerKind::RefPhandle) {
                let reference = marker.reference.as_deref().unwrap_or_default();
                let target = tree.resolve_ref(reference)?;
                if target != node {
                    return Err(DtError::semantic(format!(
                        "{} phandle refers to another node ({})",
                        node.path(),
                        target.path()
                    )));
                }
                if seen.insert(node.clone()) {
                    needs_phandle.push(node.clone());
                }
                continue;
            }
            let value = prop.to_num()?;
            if value == 0 || value == 0xFFFFFFFF {
                return Err(DtError::semantic(format!(
                    "phandle value {value:#x} on {} is forbidden",
                    node.path()
                )));
            }
            if let Some(existing) = phandle2node.get(&value) {
                return Err(DtError::semantic(format!(
                    "duplicate phandle {value:#x} on {} and {}",
                    existing.path(),
                    node.path()
                )));
            }
            phandle2node.insert(value, node.clone());
        }
    }

    for node in tree.node_iter() {
        for prop in node.properties() {
            for marker in prop.markers() {
                if marker.kind == MarkerKind::RefPhandle {
                    let reference = marker.reference.as_deref().unwrap_or_default();
                    let target = tree.resolve_ref(reference).map_err(|_| {
                        DtError::semantic(format!(
                            "undefined reference '&{reference}' in property '{}' on {}",
                            prop.name(),
                            prop.node().path()
                        ))
                    })?;
                    if seen.insert(target.clone()) {
                        needs_phandle.push(target);
                    }
                }
            }
        }
    }

    let allocated = needs_phandle.len();
    for node in needs_phandle {
        let value = allocate_phandle(&phandle2node);
        match phandle_property(&node) {
            Some(prop) => prop.overwrite_bytes(0, &value.to_be_bytes()),
            None => {
                let prop = Property::new("phandle", &node);
                prop.push_marker(Marker::start(0, MarkerKind::StartU32));
                prop.push_bytes(&value.to_be_bytes());
                node.insert_property(prop);
            }
        }
        phandle2node.insert(value, node);
    }

    log::debug!("fixup: phandles registered ({} total, {allocated} newly allocated)", phandle2node.len());
    tree.set_phandle_map(phandle2node);
    Ok(())
}

fn patch_references(tree: &Tree) -> Result<()> {
    let mut patched = 0usize;
    for node in tree.node_iter() {
        for prop in node.properties() {
            let count = prop.marker_count();
            for index in 0..count {
                let marker = prop.marker_at(index);
                match marker.kind {
                    MarkerKind::RefPhandle => {
                        let reference = marker.reference.clone().unwrap_or_default();
                        let target = tree.resolve_ref(&reference).map_err(|_| {
                            DtError::semantic(format!(
                                "undefined reference '&{reference}' in property '{}' on {}",
                                prop.name(),
                                prop.node().path()
                            ))
                        })?;
                        let phandle = phandle_value(&target);
                        prop.overwrite_bytes(marker.offset, &phandle.to_be_bytes());
                        target.mark_referenced();
                        patched += 1;
                    }
                    MarkerKind::RefPath => {
                        let reference = marker.reference.clone().unwrap_or_default();
                        let target = tree.resolve_ref(&reference).map_err(|_| {
                            DtError::semantic(format!(
                                "undefined reference '&{reference}' in property '{}' on {}",
                                prop.name(),
                                prop.node().path()
                            ))
                        })?;
                        let mut bytes = target.path().into_bytes();
                        bytes.push(0);
                        prop.splice_bytes(marker.offset, &bytes);
                        target.mark_referenced();
                        patched += 1;
                    }
                    _ => {}
                }
            }
        }
    }
    log::debug!("fixup: references patched ({patched} total)");
    Ok(())
}

fn register_aliases(tree: &Tree) -> Result<()> {
    let Ok(aliases) = tree.get_node("/aliases") else {
        log::debug!("fixup: aliases registered (no /aliases node)");
        return Ok(());
    };
    let mut map = HashMap::new();
    for prop in aliases.properties() {
        let name = prop.name();
        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase() || b == b'-')
        {
            return Err(DtError::semantic(format!(
                "alias property name '{name}' must match [0-9a-z-]+"
            )));
        }
        let target = prop.to_path().map_err(|_| {
            DtError::semantic(format!("alias '{name}' does not point to an existing node"))
        })?;
        map.insert(name, target);
    }
    log::debug!("fixup: aliases registered ({} total)", map.len());
    tree.set_alias_map(map);
    Ok(())
}

fn prune_omitted(tree: &Tree) -> Result<()> {
    let mut to_remove = Vec::new();
    for node in tree.node_iter() {
        if node.omit_if_no_ref() && !node.is_referenced() {
            if let Some(parent) = node.parent() {
                to_remove.push((parent, node.name()));
            }
        }
    }
    let pruned = to_remove.len();
    for (parent, name) in to_remove {
        parent.remove_child(&name);
    }
    log::debug!("fixup: omit-if-no-ref nodes pruned ({pruned} total)");
    Ok(())
}

enum LabelTarget {
    Node(Node),
    Property(Property),
    PropertyOffset(Property, usize),
}

impl LabelTarget {
    /// Renders a duplicate-label location the same way for every kind of
    /// target, so that `"Label '{label}' appears " + descriptions.join(" and
    /// ")` reads naturally regardless of how many locations collide.
    fn describe(&self) -> String {
        match self {
            LabelTarget::Node(node) => format!("on {}", node.path()),
            LabelTarget::Property(prop) => {
                format!("on property '{}' of node {}", prop.name(), prop.node().path())
            }
            LabelTarget::PropertyOffset(prop, _offset) => format!(
                "in the value of property '{}' of node {}",
                prop.name(),
                prop.node().path()
            ),
        }
    }
}

fn register_labels(tree: &Tree) -> Result<()> {
    let mut by_label: HashMap<String, Vec<LabelTarget>> = HashMap::new();

    for node in tree.node_iter() {
        for label in node.labels() {
            by_label.entry(label).or_default().push(LabelTarget::Node(node.clone()));
        }
        for prop in node.properties() {
            for label in prop.labels() {
                by_label
                    .entry(label)
                    .or_default()
                    .push(LabelTarget::Property(prop.clone()));
            }
            for (label, offset) in prop.value_labels() {
                by_label
                    .entry(label)
                    .or_default()
                    .push(LabelTarget::PropertyOffset(prop.clone(), offset));
            }
        }
    }

    let mut label2node = HashMap::new();
    let mut label2prop = HashMap::new();
    let mut label2prop_offset = HashMap::new();

    let labels: Vec<String> = by_label.keys().cloned().sorted().collect();
    for label in &labels {
        let targets = &by_label[label];
        if targets.len() > 1 {
            let descriptions: Vec<String> = targets.iter().map(LabelTarget::describe).sorted().collect();
            return Err(DtError::semantic(format!(
                "Label '{label}' appears {}",
                descriptions.join(" and ")
            )));
        }
        match &targets[0] {
            LabelTarget::Node(node) => {
                label2node.insert(label.clone(), node.clone());
            }
            LabelTarget::Property(prop) => {
                label2prop.insert(label.clone(), prop.clone());
            }
            LabelTarget::PropertyOffset(prop, offset) => {
                label2prop_offset.insert(label.clone(), (prop.clone(), *offset));
            }
        }
    }

    log::debug!("fixup: labels registered ({} total)", labels.len());
    tree.set_label_maps(label2node, label2prop, label2prop_offset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseOptions;
    use crate::lex::Lexer;
    use crate::parser::Parser;

    fn build(text: &str) -> Tree {
        let options = ParseOptions::new();
        let lexer = Lexer::from_str("<test>", text, &options);
        let tree = Parser::new(lexer).parse().expect("parse error");
        run(&tree).expect("fixup error");
        tree
    }

    #[test]
    fn assigns_phandle_to_referenced_node() {
        let tree = build(
            r#"/dts-v1/;
/ {
    target: a { };
    b { ref = <&target>; };
};"#,
        );
        let a = tree.root().child("a").unwrap();
        assert!(a.is_referenced());
        let phandle = a.property("phandle").unwrap().to_num().unwrap();
        assert_ne!(phandle, 0);
        let b = tree.root().child("b").unwrap();
        assert_eq!(b.property("ref").unwrap().to_node().unwrap(), a);
    }

    #[test]
    fn path_reference_expands_to_node_path() {
        let tree = build(
            r#"/dts-v1/;
/ {
    a { b { }; };
    c { p = &{/a/b}; };
};"#,
        );
        let c = tree.root().child("c").unwrap();
        assert_eq!(c.property("p").unwrap().to_path().unwrap().path(), "/a/b");
    }

    #[test]
    fn duplicate_phandle_is_rejected() {
        let options = ParseOptions::new();
        let lexer = Lexer::from_str(
            "<test>",
            r#"/dts-v1/;
/ {
    a { phandle = <1>; };
    b { phandle = <1>; };
};"#,
            &options,
        );
        let tree = Parser::new(lexer).parse().unwrap();
        assert!(run(&tree).is_err());
    }

    #[test]
    fn self_referential_phandle_placeholder_is_resolved() {
        let tree = build(
            r#"/dts-v1/;
/ {
    n: a {
        phandle = <&n>;
    };
};"#,
        );
        let a = tree.root().child("a").unwrap();
        // A self-referential `phandle = <&n>;` property's inferred type is
        // PHANDLE, not NUM (its marker sequence is [StartU32, RefPhandle]),
        // so the raw value is read directly rather than through `to_num`.
        let raw = a.property("phandle").unwrap().value();
        let phandle = u32::from_be_bytes(raw.try_into().unwrap());
        assert_ne!(phandle, 0);
        assert_eq!(tree.phandle_node(phandle).unwrap(), a);
    }

    #[test]
    fn explicit_zero_phandle_is_forbidden() {
        let options = ParseOptions::new();
        let lexer = Lexer::from_str("<test>", "/dts-v1/;\n/ { a { phandle = <0>; }; };", &options);
        let tree = Parser::new(lexer).parse().unwrap();
        assert!(run(&tree).is_err());
    }

    #[test]
    fn explicit_all_ones_phandle_is_forbidden() {
        let options = ParseOptions::new();
        let lexer = Lexer::from_str(
            "<test>",
            "/dts-v1/;\n/ { a { phandle = <0xFFFFFFFF>; }; };",
            &options,
        );
        let tree = Parser::new(lexer).parse().unwrap();
        assert!(run(&tree).is_err());
    }

    #[test]
    fn phandle_allocation_fills_smallest_unused_value() {
        let tree = build(
            r#"/dts-v1/;
/ {
    a { phandle = <5>; };
    target: b { };
    c { ref = <&target>; };
};"#,
        );
        let b = tree.root().child("b").unwrap();
        assert_eq!(b.property("phandle").unwrap().to_num().unwrap(), 1);
    }

    #[test]
    fn aliases_are_registered() {
        let tree = build(
            r#"/dts-v1/;
/ {
    aliases { a0 = &n; };
    n: node { };
};"#,
        );
        assert_eq!(tree.alias_node("a0").unwrap().path(), "/node");
    }

    #[test]
    fn omit_if_no_ref_node_without_referrer_is_pruned() {
        let tree = build(
            r#"/dts-v1/;
/ {
    a {
        /omit-if-no-ref/;
    };
    b { };
};"#,
        );
        assert!(tree.root().child("a").is_none());
        assert!(tree.root().child("b").is_some());
    }

    #[test]
    fn omit_if_no_ref_node_with_referrer_is_kept() {
        let tree = build(
            r#"/dts-v1/;
/ {
    target: a {
        /omit-if-no-ref/;
    };
    b { ref = <&target>; };
};"#,
        );
        assert!(tree.root().child("a").is_some());
    }

    #[test]
    fn duplicate_label_across_namespaces_is_rejected() {
        let options = ParseOptions::new();
        let lexer = Lexer::from_str(
            "<test>",
            r#"/dts-v1/;
/ {
    same: a { };
    b { same: prop = <1>; };
};"#,
            &options,
        );
        let tree = Parser::new(lexer).parse().unwrap();
        assert!(run(&tree).is_err());
    }
}
