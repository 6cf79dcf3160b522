//! A Devicetree Source (DTS) front-end: a hand-written mode-switching lexer,
//! a recursive-descent parser with a full C-like constant-expression
//! evaluator, a file-inclusion stack with loop detection, and a post-parse
//! fixup engine that assigns phandles, expands path/phandle references into
//! the binary value stream, indexes labels, and prunes unreferenced
//! `/omit-if-no-ref/` nodes.
//!
//! The entry points are [`parse_file`] and [`parse_str`]; both return a
//! [`tree::Tree`] that has already run every fixup pass. [`tree::Tree`]
//! implements [`std::fmt::Display`], rendering itself back to canonical DTS
//! text.
//!
//! Out of scope: the `/plugin/` overlay dialect (rejected outright),
//! DTB binary input/output, and semantic validation of binding-specific
//! property shapes (`reg`/`ranges` interpretation) — this crate only gets a
//! client as far as a structured tree and typed scalar/string/path/phandle
//! accessors on each property.

mod config;
mod error;
mod eval;
mod fixup;
mod lex;
mod parser;
mod position;
mod serialize;
mod tree;

pub use config::ParseOptions;
pub use error::{DtError, Result};
pub use position::Position;
pub use tree::{MemReserve, Marker, MarkerKind, Node, OrderedMap, Property, PropertyType, Tree};

use lex::Lexer;
use parser::Parser;
use std::path::Path;

/// Parses `path` (and any files it `/include/`s) into a fixed-up [`Tree`].
///
/// `path` may be the literal string `-`, which reads the root document from
/// standard input; `/include/`d files are still resolved against the
/// filesystem regardless of how the root document itself was read.
pub fn parse_file(path: impl AsRef<Path>, options: &ParseOptions) -> Result<Tree> {
    let path = path.as_ref();
    log::debug!("reading root document '{}'", path.display());
    let lexer = Lexer::from_file(path, options)?;
    parse_with(lexer)
}

/// Parses `text`, as if it were a file named `filename`, into a fixed-up
/// [`Tree`]. `/include/` tokens inside `text` still resolve against the
/// filesystem (relative to the current working directory, since `filename`
/// need not name a real file) and against `options`' include paths.
pub fn parse_str(filename: impl Into<String>, text: impl Into<String>, options: &ParseOptions) -> Result<Tree> {
    let filename = filename.into();
    log::debug!("reading in-memory document '{filename}'");
    let lexer = Lexer::from_str(filename, text, options);
    parse_with(lexer)
}

fn parse_with(lexer: Lexer) -> Result<Tree> {
    let tree = Parser::new(lexer).parse()?;
    fixup::run(&tree)?;
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_str_runs_fixup_and_serializes() {
        let options = ParseOptions::new();
        let tree = parse_str(
            "<test>",
            r#"/dts-v1/;
/ {
    target: a { };
    b { ref = <&target>; };
};"#,
            &options,
        )
        .expect("parse error");
        let a = tree.root().child("a").unwrap();
        assert!(a.is_referenced());
        assert!(tree.to_string().contains("phandle = <0x1>;"));
    }

    #[test]
    fn parse_file_reports_io_error_for_missing_file() {
        let options = ParseOptions::new();
        let err = parse_file("/no/such/file.dts", &options).unwrap_err();
        assert!(matches!(err, DtError::Io { .. }));
    }
}
