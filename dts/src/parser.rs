//! Recursive-descent parser: turns a [`Lexer`]'s token stream into a
//! [`Tree`] whose node bodies are fully built and whose property values are
//! assembled byte-for-byte, with deferred-reference [`Marker`]s left in
//! place for the fixup passes to resolve.

use crate::error::Result;
use crate::eval::eval_expr;
use crate::lex::{Lexer, Token, TokenKind};
use crate::tree::{Marker, MarkerKind, Node, Property, Tree};

pub(crate) struct Parser {
    lexer: Lexer,
    tree: Tree,
}

impl Parser {
    pub(crate) fn new(lexer: Lexer) -> Parser {
        let tree = Tree::new(lexer.filename().to_string());
        Parser { lexer, tree }
    }

    pub(crate) fn parse(mut self) -> Result<Tree> {
        self.parse_header()?;
        self.parse_top_items()?;
        self.expect(TokenKind::Eof)?;
        Ok(self.tree)
    }

    /// Parses one or more `/dts-v1/;` at the start of the file, rejecting a
    /// `/plugin/` that follows any of them.
    fn parse_header(&mut self) -> Result<()> {
        let mut saw_dts_v1 = false;
        while matches!(self.lexer.peek()?.kind, TokenKind::DtsV1) {
            self.lexer.next()?;
            self.expect(TokenKind::Semicolon)?;
            saw_dts_v1 = true;
            if matches!(self.lexer.peek()?.kind, TokenKind::Plugin) {
                return Err(self.lexer.error("/plugin/ overlays are not supported"));
            }
        }
        if !saw_dts_v1 {
            return Err(self.lexer.error("expected '/dts-v1/;' at start of file"));
        }
        Ok(())
    }

    fn parse_top_items(&mut self) -> Result<()> {
        loop {
            let labels = self.take_labels()?;
            match self.lexer.peek()?.kind.clone() {
                TokenKind::Eof => {
                    if !labels.is_empty() {
                        return Err(self.lexer.error("expected a node after label"));
                    }
                    return Ok(());
                }
                TokenKind::MemReserve => {
                    self.lexer.next()?;
                    let address = eval_expr(&mut self.lexer)? as u64;
                    let length = eval_expr(&mut self.lexer)? as u64;
                    self.expect(TokenKind::Semicolon)?;
                    self.tree.push_memreserve(crate::tree::MemReserve {
                        labels,
                        address,
                        length,
                    });
                }
                TokenKind::Slash => {
                    self.lexer.next()?;
                    log::debug!("parser: top-level root block");
                    let node = self.tree.root();
                    for label in labels {
                        node.add_label(label);
                    }
                    self.node_body(&node)?;
                    self.expect(TokenKind::Semicolon)?;
                }
                TokenKind::Ref(reference) => {
                    self.lexer.next()?;
                    log::debug!("parser: top-level labeled reference block '&{reference}'");
                    let node = self.tree.resolve_ref(&reference)?;
                    for label in labels {
                        node.add_label(label);
                    }
                    self.node_body(&node)?;
                    self.expect(TokenKind::Semicolon)?;
                }
                TokenKind::DeleteNode => {
                    self.lexer.next()?;
                    let reference = self.expect_ref()?;
                    log::debug!("parser: top-level /delete-node/ &{reference}");
                    let node = self.tree.resolve_ref(&reference)?;
                    match node.parent() {
                        Some(parent) => {
                            parent.remove_child(&node.name());
                        }
                        None => return Err(self.lexer.error("cannot delete the root node")),
                    }
                    self.expect(TokenKind::Semicolon)?;
                }
                TokenKind::OmitIfNoRef => {
                    self.lexer.next()?;
                    let reference = self.expect_ref()?;
                    log::debug!("parser: top-level /omit-if-no-ref/ &{reference}");
                    let node = self.tree.resolve_ref(&reference)?;
                    node.set_omit_if_no_ref(true);
                    self.expect(TokenKind::Semicolon)?;
                }
                other => {
                    return Err(self.lexer.error(format!(
                        "expected a node, '/memreserve/', '/delete-node/', or \
                         '/omit-if-no-ref/', found '{}'",
                        other.describe()
                    )))
                }
            }
        }
    }

    /// Parses the contents of a `{ ... }` node body, mutating `node` in
    /// place, and consumes the closing `}` (but not the trailing `;`).
    fn node_body(&mut self, node: &Node) -> Result<()> {
        self.expect(TokenKind::OpenBrace)?;
        loop {
            let labels = self.take_labels()?;
            match self.lexer.peek()?.kind.clone() {
                TokenKind::CloseBrace => {
                    if !labels.is_empty() {
                        return Err(self.lexer.error("expected a node or property after label"));
                    }
                    self.lexer.next()?;
                    return Ok(());
                }
                TokenKind::DeleteNode => {
                    self.lexer.next()?;
                    let name = self.expect_propnodename()?;
                    node.remove_child(&name);
                    self.expect(TokenKind::Semicolon)?;
                }
                TokenKind::DeleteProperty => {
                    self.lexer.next()?;
                    let name = self.expect_propnodename()?;
                    node.remove_property(&name);
                    self.expect(TokenKind::Semicolon)?;
                }
                TokenKind::OmitIfNoRef => {
                    self.lexer.next()?;
                    self.expect(TokenKind::Semicolon)?;
                    node.set_omit_if_no_ref(true);
                }
                TokenKind::PropNodeName(name) => {
                    self.lexer.next()?;
                    match self.lexer.peek()?.kind.clone() {
                        TokenKind::OpenBrace => {
                            let child = match node.child(&name) {
                                Some(existing) => existing,
                                None => {
                                    let created = Node::new_child(name.clone(), node);
                                    node.insert_child(created.clone());
                                    created
                                }
                            };
                            for label in labels {
                                child.add_label(label);
                            }
                            self.node_body(&child)?;
                            self.expect(TokenKind::Semicolon)?;
                        }
                        TokenKind::Equal => {
                            self.lexer.next()?;
                            let prop = match node.property(&name) {
                                Some(existing) => existing,
                                None => Property::new(name.clone(), node),
                            };
                            for label in labels {
                                prop.add_label(label);
                            }
                            self.parse_property_value(&prop)?;
                            self.expect(TokenKind::Semicolon)?;
                            node.insert_property(prop);
                        }
                        TokenKind::Semicolon => {
                            self.lexer.next()?;
                            let prop = match node.property(&name) {
                                Some(existing) => existing,
                                None => Property::new(name.clone(), node),
                            };
                            for label in labels {
                                prop.add_label(label);
                            }
                            node.insert_property(prop);
                        }
                        other => {
                            return Err(self.lexer.error(format!(
                                "expected '{{', '=', or ';' after '{name}', found '{}'",
                                other.describe()
                            )))
                        }
                    }
                }
                other => {
                    return Err(self.lexer.error(format!(
                        "expected a node or property, found '{}'",
                        other.describe()
                    )))
                }
            }
        }
    }

    fn parse_property_value(&mut self, prop: &Property) -> Result<()> {
        prop.clear_value();
        loop {
            self.take_value_labels(prop)?;
            self.parse_value_chunk(prop)?;
            self.take_value_labels(prop)?;
            if matches!(self.lexer.peek()?.kind, TokenKind::Comma) {
                self.lexer.next()?;
            } else {
                return Ok(());
            }
        }
    }

    /// Consumes `label:` tokens appearing before or after a whole
    /// comma-separated chunk (e.g. `foo = start: <1 2>, "str" end:;`),
    /// recording each as a REF-LABEL marker at the current value offset.
    fn take_value_labels(&mut self, prop: &Property) -> Result<()> {
        while let TokenKind::Label(_) = self.lexer.peek()?.kind {
            if let TokenKind::Label(label) = self.lexer.next()?.kind {
                let offset = prop.len();
                prop.push_marker(Marker::reference(offset, MarkerKind::RefLabel, label));
            }
        }
        Ok(())
    }

    fn parse_value_chunk(&mut self, prop: &Property) -> Result<()> {
        match self.lexer.peek()?.kind.clone() {
            TokenKind::OpenBracket => {
                self.lexer.next()?;
                self.parse_byte_array(prop)
            }
            TokenKind::Lt => {
                self.lexer.next()?;
                self.parse_cell_array(prop, MarkerKind::StartU32)
            }
            TokenKind::Bits => {
                self.lexer.next()?;
                let width_tok = self.lexer.next()?;
                let width = match width_tok.kind {
                    TokenKind::Number(8) => 8,
                    TokenKind::Number(16) => 16,
                    TokenKind::Number(32) => 32,
                    TokenKind::Number(64) => 64,
                    other => {
                        return Err(self
                            .lexer
                            .error(format!("expected 8, 16, 32 or 64 after /bits/, found '{}'", other.describe())))
                    }
                };
                self.expect(TokenKind::Lt)?;
                self.parse_cell_array(prop, kind_for_bits(width))
            }
            TokenKind::Str(text) => {
                self.lexer.next()?;
                let start = prop.len();
                prop.push_marker(Marker::start(start, MarkerKind::StartString));
                prop.push_bytes(text.as_bytes());
                prop.push_bytes(&[0]);
                Ok(())
            }
            TokenKind::Ref(reference) => {
                self.lexer.next()?;
                let offset = prop.len();
                prop.push_marker(Marker::reference(offset, MarkerKind::RefPath, reference));
                Ok(())
            }
            TokenKind::Incbin => {
                self.lexer.next()?;
                self.parse_incbin(prop)
            }
            other => Err(self
                .lexer
                .error(format!("expected a property value, found '{}'", other.describe()))),
        }
    }

    fn parse_byte_array(&mut self, prop: &Property) -> Result<()> {
        let start = prop.len();
        prop.push_marker(Marker::start(start, MarkerKind::StartBytes));
        loop {
            match self.lexer.peek()?.kind.clone() {
                TokenKind::CloseBracket => {
                    self.lexer.next()?;
                    return Ok(());
                }
                TokenKind::Label(label) => {
                    self.lexer.next()?;
                    let offset = prop.len();
                    prop.push_marker(Marker::reference(offset, MarkerKind::RefLabel, label));
                }
                TokenKind::Byte(byte) => {
                    self.lexer.next()?;
                    prop.push_bytes(&[byte]);
                }
                other => {
                    return Err(self
                        .lexer
                        .error(format!("expected a byte or ']', found '{}'", other.describe())))
                }
            }
        }
    }

    fn parse_cell_array(&mut self, prop: &Property, kind: MarkerKind) -> Result<()> {
        let start = prop.len();
        prop.push_marker(Marker::start(start, kind));
        let width = kind.element_width().unwrap();
        loop {
            match self.lexer.peek()?.kind.clone() {
                TokenKind::Gt => {
                    self.lexer.next()?;
                    return Ok(());
                }
                TokenKind::Label(label) => {
                    self.lexer.next()?;
                    let offset = prop.len();
                    prop.push_marker(Marker::reference(offset, MarkerKind::RefLabel, label));
                }
                TokenKind::Ref(reference) => {
                    if kind != MarkerKind::StartU32 {
                        return Err(self
                            .lexer
                            .error("phandle references are only allowed in arrays with 32-bit elements"));
                    }
                    self.lexer.next()?;
                    let offset = prop.len();
                    prop.push_marker(Marker::reference(offset, MarkerKind::RefPhandle, reference));
                    prop.push_bytes(&vec![0u8; width]);
                }
                _ => {
                    let value = eval_expr(&mut self.lexer)?;
                    let bytes = encode_width(value, width, &self.lexer)?;
                    prop.push_bytes(&bytes);
                }
            }
        }
    }

    fn parse_incbin(&mut self, prop: &Property) -> Result<()> {
        self.expect(TokenKind::OpenParen)?;
        let filename = self.expect_str()?;
        let mut offset = None;
        let mut length = None;
        if matches!(self.lexer.peek()?.kind, TokenKind::Comma) {
            self.lexer.next()?;
            offset = Some(eval_expr(&mut self.lexer)? as usize);
            if matches!(self.lexer.peek()?.kind, TokenKind::Comma) {
                self.lexer.next()?;
                length = Some(eval_expr(&mut self.lexer)? as usize);
            }
        }
        self.expect(TokenKind::CloseParen)?;
        let bytes = self.lexer.read_incbin(&filename, offset, length)?;
        let start = prop.len();
        prop.push_marker(Marker::start(start, MarkerKind::StartBytes));
        prop.push_bytes(&bytes);
        Ok(())
    }

    fn take_labels(&mut self) -> Result<Vec<String>> {
        let mut labels = Vec::new();
        while let TokenKind::Label(_) = self.lexer.peek()?.kind {
            if let TokenKind::Label(label) = self.lexer.next()?.kind {
                labels.push(label);
            }
        }
        Ok(labels)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        let tok = self.lexer.next()?;
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(self.lexer.error(format!(
                "expected '{}', found '{}'",
                kind.describe(),
                tok.kind.describe()
            )))
        }
    }

    fn expect_propnodename(&mut self) -> Result<String> {
        let tok = self.lexer.next()?;
        match tok.kind {
            TokenKind::PropNodeName(name) => Ok(name),
            other => Err(self
                .lexer
                .error(format!("expected a name, found '{}'", other.describe()))),
        }
    }

    fn expect_ref(&mut self) -> Result<String> {
        let tok = self.lexer.next()?;
        match tok.kind {
            TokenKind::Ref(reference) => Ok(reference),
            other => Err(self
                .lexer
                .error(format!("expected a reference, found '{}'", other.describe()))),
        }
    }

    fn expect_str(&mut self) -> Result<String> {
        let tok = self.lexer.next()?;
        match tok.kind {
            TokenKind::Str(text) => Ok(text),
            other => Err(self
                .lexer
                .error(format!("expected a string, found '{}'", other.describe()))),
        }
    }
}

fn kind_for_bits(width: i128) -> MarkerKind {
    match width {
        8 => MarkerKind::StartBytes,
        16 => MarkerKind::StartU16,
        32 => MarkerKind::StartU32,
        64 => MarkerKind::StartU64,
        _ => unreachable!("validated by caller"),
    }
}

/// Range-checks `value` against an unsigned-or-signed `width`-byte window
/// and encodes it big-endian. A literal like `-1` is accepted for any width
/// (all-ones pattern); a value must fit one interpretation or the other.
fn encode_width(value: i128, width: usize, lexer: &Lexer) -> Result<Vec<u8>> {
    let bits = (width * 8) as u32;
    let umax: i128 = if bits >= 127 { i128::MAX } else { (1i128 << bits) - 1 };
    let smin: i128 = -(1i128 << (bits - 1));
    let smax: i128 = (1i128 << (bits - 1)) - 1;
    if !(0..=umax).contains(&value) && !(smin..=smax).contains(&value) {
        return Err(lexer.error(format!("value {value} does not fit in a {bits}-bit cell")));
    }
    let pattern = (value as u128) & if bits >= 128 { u128::MAX } else { (1u128 << bits) - 1 };
    let full = pattern.to_be_bytes();
    Ok(full[16 - width..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseOptions;

    fn parse(text: &str) -> Tree {
        let options = ParseOptions::new();
        let lexer = Lexer::from_str("<test>", text, &options);
        Parser::new(lexer).parse().expect("parse error")
    }

    #[test]
    fn minimal_tree() {
        let tree = parse("/dts-v1/;\n/ { };");
        assert_eq!(tree.root().path(), "/");
        assert!(tree.root().children().is_empty());
    }

    #[test]
    fn nested_nodes_and_properties() {
        let tree = parse(
            r#"/dts-v1/;
/ {
    a {
        foo = <1 2 3>;
        bar;
    };
};"#,
        );
        let a = tree.root().child("a").expect("child a");
        assert_eq!(a.property("foo").unwrap().to_nums().unwrap(), vec![1, 2, 3]);
        assert_eq!(a.property("bar").unwrap().value().len(), 0);
    }

    #[test]
    fn rejects_plugin() {
        let options = ParseOptions::new();
        let lexer = Lexer::from_str("<test>", "/dts-v1/; /plugin/;\n/ { };", &options);
        assert!(Parser::new(lexer).parse().is_err());
    }

    #[test]
    fn merges_repeated_node_blocks() {
        let tree = parse(
            r#"/dts-v1/;
/ {
    a { foo = <1>; };
};
/ {
    a { bar = <2>; };
};"#,
        );
        let a = tree.root().child("a").unwrap();
        assert!(a.property("foo").is_some());
        assert!(a.property("bar").is_some());
    }

    #[test]
    fn string_and_byte_and_path_values() {
        let tree = parse(
            r#"/dts-v1/;
/ {
    n1: a {
        s = "hello";
        b = [01 02 03];
        p = &n1;
    };
};"#,
        );
        let a = tree.root().child("a").unwrap();
        assert_eq!(a.property("s").unwrap().to_string_value().unwrap(), "hello");
        assert_eq!(a.property("b").unwrap().to_bytes().unwrap(), vec![1, 2, 3]);
        assert_eq!(a.property("p").unwrap().markers()[0].kind, MarkerKind::RefPath);
    }

    #[test]
    fn bits_directive_controls_cell_width() {
        let tree = parse(
            r#"/dts-v1/;
/ {
    a {
        w = /bits/ 16 <1 2 3>;
    };
};"#,
        );
        let a = tree.root().child("a").unwrap();
        assert_eq!(a.property("w").unwrap().value(), vec![0, 1, 0, 2, 0, 3]);
    }

    #[test]
    fn phandle_reference_rejected_outside_32_bit_cells() {
        let text = r#"/dts-v1/;
/ {
    n: a { };
    b { w = /bits/ 8 <&n>; };
};"#;
        let options = ParseOptions::new();
        let lexer = Lexer::from_str("<test>", text, &options);
        assert!(Parser::new(lexer).parse().is_err());
    }

    #[test]
    fn delete_node_and_delete_property() {
        let tree = parse(
            r#"/dts-v1/;
/ {
    a { foo = <1>; };
    b { bar = <2>; };
};
/ {
    /delete-node/ a;
    b {
        /delete-property/ bar;
    };
};"#,
        );
        assert!(tree.root().child("a").is_none());
        assert!(tree.root().child("b").unwrap().property("bar").is_none());
    }

    #[test]
    fn negative_cell_value_encodes_as_all_ones() {
        let tree = parse(
            r#"/dts-v1/;
/ {
    a { v = <-1>; };
};"#,
        );
        let a = tree.root().child("a").unwrap();
        assert_eq!(a.property("v").unwrap().value(), vec![0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn value_out_of_range_is_a_parse_error() {
        let options = ParseOptions::new();
        let lexer = Lexer::from_str(
            "<test>",
            "/dts-v1/;\n/ { a { v = <0x100000000>; }; };",
            &options,
        );
        assert!(Parser::new(lexer).parse().is_err());
    }

    #[test]
    fn value_labels_before_and_after_a_chunk() {
        let tree = parse(
            r#"/dts-v1/;
/ {
    a {
        v = start: <1 2>, end: "hi";
    };
};"#,
        );
        let a = tree.root().child("a").unwrap();
        let v = a.property("v").unwrap();
        let labels: Vec<_> = v
            .markers()
            .iter()
            .filter(|m| m.kind == MarkerKind::RefLabel)
            .map(|m| (m.offset, m.reference.clone().unwrap()))
            .collect();
        assert_eq!(labels, vec![(0, "start".to_string()), (8, "end".to_string())]);
    }
}
