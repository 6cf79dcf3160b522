//! Mode-switching lexer: turns source bytes into a single-look-ahead stream
//! of [`Token`]s, transparently splicing in `/include/`d files and applying
//! `#line` directives.

mod token;

pub use token::{Token, TokenKind};

use crate::config::ParseOptions;
use crate::error::{DtError, Result};
use crate::position::Position;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Mode {
    Default,
    ExpectPropOrNodeName,
    ExpectByte,
}

struct IncludeFrame {
    filename: String,
    dir: PathBuf,
    contents: String,
    offset: usize,
    position: Position,
}

pub struct Lexer {
    filename: String,
    dir: PathBuf,
    contents: String,
    offset: usize,
    position: Position,
    stack: Vec<IncludeFrame>,
    include_path: Vec<PathBuf>,
    mode: Mode,
    lookahead: Option<Token>,
    /// Start position of the most recently produced token (peeked or
    /// consumed) — what `error()` reports, per the offending token's start
    /// rather than wherever scanning has since advanced to.
    last_token_pos: Position,
}

impl Lexer {
    pub fn from_file(path: &Path, options: &ParseOptions) -> Result<Lexer> {
        let contents = read_source(path)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Lexer {
            filename: path.display().to_string(),
            dir,
            contents,
            offset: 0,
            position: Position::start(),
            stack: Vec::new(),
            include_path: options.include_paths().to_vec(),
            mode: Mode::Default,
            lookahead: None,
            last_token_pos: Position::start(),
        })
    }

    /// Builds a lexer over an in-memory string, as if it were the named
    /// file — used for parsing string sources and in tests.
    pub fn from_str(filename: impl Into<String>, text: impl Into<String>, options: &ParseOptions) -> Lexer {
        Lexer {
            filename: filename.into(),
            dir: PathBuf::new(),
            contents: text.into(),
            offset: 0,
            position: Position::start(),
            stack: Vec::new(),
            include_path: options.include_paths().to_vec(),
            mode: Mode::Default,
            lookahead: None,
            last_token_pos: Position::start(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn pos(&self) -> Position {
        self.position
    }

    pub fn peek(&mut self) -> Result<&Token> {
        if self.lookahead.is_none() {
            let tok = self.raw_next()?;
            self.last_token_pos = tok.pos;
            self.lookahead = Some(tok);
        }
        Ok(self.lookahead.as_ref().unwrap())
    }

    pub fn next(&mut self) -> Result<Token> {
        if let Some(tok) = self.lookahead.take() {
            return Ok(tok);
        }
        let tok = self.raw_next()?;
        self.last_token_pos = tok.pos;
        Ok(tok)
    }

    /// Reports an error at the start of the most recently peeked or
    /// consumed token, per §6's "column is the byte offset ... to the
    /// offending token's start" — not wherever raw scanning has since
    /// advanced to.
    pub(crate) fn error(&self, message: impl Into<String>) -> DtError {
        DtError::syntax(self.filename.clone(), self.last_token_pos, message)
    }

    fn error_at(&self, pos: Position, message: impl Into<String>) -> DtError {
        DtError::syntax(self.filename.clone(), pos, message)
    }

    /// Advances `len` bytes from the current offset, updating line/column
    /// tracking per byte consumed (column is a byte offset, so multi-byte
    /// UTF-8 sequences advance it by more than one per character).
    fn advance(&mut self, len: usize) {
        for &b in self.contents.as_bytes()[self.offset..self.offset + len].iter() {
            self.position.advance(b);
        }
        self.offset += len;
    }

    fn rest(&self) -> &str {
        &self.contents[self.offset..]
    }

    fn raw_next(&mut self) -> Result<Token> {
        loop {
            if self.offset >= self.contents.len() {
                if self.stack.is_empty() {
                    return Ok(Token {
                        kind: TokenKind::Eof,
                        file: self.filename.clone(),
                        pos: self.position,
                    });
                }
                self.leave_file();
                continue;
            }

            if let Some(len) = match_skip(self.rest()) {
                self.advance(len);
                continue;
            }

            if let Some((len, filename)) = match_include(self.rest()) {
                let start_pos = self.position;
                self.advance(len);
                let filename = unescape(&filename)?;
                self.enter_file(&filename, start_pos)?;
                continue;
            }

            if self.position.column() == 0 {
                if let Some((len, line, filename)) = match_line_directive(self.rest()) {
                    self.advance(len);
                    log::debug!("applying #line directive: '{filename}' line {line}");
                    self.filename = filename;
                    self.position = Position::new(line, 0);
                    continue;
                }
            }

            let start_pos = self.position;

            if let Some((len, kind)) = match_directive_keyword(self.rest()) {
                self.advance(len);
                return self.emit(kind, start_pos);
            }

            if let Some((len, label)) = match_label(self.rest()) {
                self.advance(len);
                return self.emit(TokenKind::Label(label), start_pos);
            }

            if let Some((len, raw)) = match_char_literal(self.rest()) {
                self.advance(len);
                let bytes = unescape(&raw)?;
                if bytes.len() != 1 {
                    return Err(self.error_at(start_pos, "character literals must be length 1"));
                }
                return self.emit(TokenKind::CharLiteral(bytes[0] as i64), start_pos);
            }

            if let Some((len, raw)) = match_string(self.rest()) {
                self.advance(len);
                let bytes = unescape(&raw)?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| self.error_at(start_pos, "string is not valid UTF-8"))?;
                return self.emit(TokenKind::Str(text), start_pos);
            }

            if let Some((len, reference)) = match_ref(self.rest()) {
                self.advance(len);
                return self.emit(TokenKind::Ref(reference), start_pos);
            }

            match self.mode {
                Mode::Default => {
                    if let Some((len, value)) = match_number(self.rest()) {
                        self.advance(len);
                        return self.emit(TokenKind::Number(value), start_pos);
                    }
                }
                Mode::ExpectPropOrNodeName => {
                    if let Some((len, name)) = match_propnodename(self.rest()) {
                        self.advance(len);
                        self.mode = Mode::Default;
                        return self.emit(TokenKind::PropNodeName(name), start_pos);
                    }
                }
                Mode::ExpectByte => {
                    if let Some((len, byte)) = match_byte(self.rest()) {
                        self.advance(len);
                        return self.emit(TokenKind::Byte(byte), start_pos);
                    }
                }
            }

            if let Some((len, kind)) = match_punct(self.rest()) {
                self.advance(len);
                return self.emit(kind, start_pos);
            }

            let bad = self.contents.as_bytes()[self.offset];
            self.advance(1);
            return self.emit(TokenKind::Bad(bad), start_pos);
        }
    }

    fn emit(&mut self, kind: TokenKind, pos: Position) -> Result<Token> {
        self.update_mode(&kind);
        Ok(Token {
            kind,
            file: self.filename.clone(),
            pos,
        })
    }

    fn update_mode(&mut self, kind: &TokenKind) {
        use TokenKind::*;
        match kind {
            DeleteProperty | DeleteNode | OmitIfNoRef | Semicolon | OpenBrace => {
                self.mode = Mode::ExpectPropOrNodeName
            }
            OpenBracket => self.mode = Mode::ExpectByte,
            MemReserve | Bits | CloseBracket => self.mode = Mode::Default,
            _ => {}
        }
    }

    fn enter_file(&mut self, filename: &str, start_pos: Position) -> Result<()> {
        if filename == "-" {
            return Err(self.error_at(start_pos, "cannot /include/ standard input"));
        }
        let (contents, resolved_dir, resolved_name) = self.resolve(filename, start_pos)?;

        for frame in &self.stack {
            if frame.filename == resolved_name {
                let mut chain: Vec<String> = self
                    .stack
                    .iter()
                    .map(|f| f.filename.clone())
                    .collect();
                chain.push(resolved_name.clone());
                return Err(self.error_at(
                    start_pos,
                    format!("recursive /include/:\n{}", chain.join(" ->\n")),
                ));
            }
        }
        if self.filename == resolved_name {
            return Err(self.error_at(start_pos, format!("recursive /include/:\n{resolved_name}")));
        }

        self.stack.push(IncludeFrame {
            filename: std::mem::replace(&mut self.filename, resolved_name),
            dir: std::mem::replace(&mut self.dir, resolved_dir),
            contents: std::mem::replace(&mut self.contents, contents),
            offset: self.offset,
            position: self.position,
        });
        log::debug!(
            "entering /include/d file '{}' from '{}' (depth {})",
            self.filename,
            self.stack.last().unwrap().filename,
            self.stack.len()
        );
        self.offset = 0;
        self.position = Position::start();
        Ok(())
    }

    fn leave_file(&mut self) {
        let frame = self.stack.pop().expect("leave_file with empty stack");
        log::debug!(
            "leaving /include/d file '{}', returning to '{}' (depth {})",
            self.filename,
            frame.filename,
            self.stack.len()
        );
        self.filename = frame.filename;
        self.dir = frame.dir;
        self.contents = frame.contents;
        self.offset = frame.offset;
        self.position = frame.position;
    }

    /// Resolves `filename` relative to the including file's directory first,
    /// then each configured include path, in order.
    fn resolve(&self, filename: &str, start_pos: Position) -> Result<(String, PathBuf, String)> {
        let mut candidates = vec![self.dir.join(filename)];
        for path in &self.include_path {
            candidates.push(path.join(filename));
        }
        for candidate in &candidates {
            match std::fs::read_to_string(candidate) {
                Ok(contents) => {
                    let dir = candidate.parent().map(Path::to_path_buf).unwrap_or_default();
                    return Ok((contents, dir, candidate.display().to_string()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(DtError::Io {
                        path: candidate.clone(),
                        source: e,
                    })
                }
            }
        }
        Err(self.error_at(start_pos, format!("'{filename}' could not be found")))
    }

    /// Reads a raw byte slice out of a file for `/incbin/`, using the same
    /// include-path search as `/include/`.
    pub(crate) fn read_incbin(
        &self,
        filename: &str,
        offset: Option<usize>,
        length: Option<usize>,
    ) -> Result<Vec<u8>> {
        let mut candidates = vec![self.dir.join(filename)];
        for path in &self.include_path {
            candidates.push(path.join(filename));
        }
        for candidate in &candidates {
            match std::fs::read(candidate) {
                Ok(bytes) => {
                    let start = offset.unwrap_or(0);
                    let end = match length {
                        Some(len) => start + len,
                        None => bytes.len(),
                    };
                    if start > bytes.len() || end > bytes.len() || start > end {
                        return Err(
                            self.error(format!("offset/length out of range for '{filename}'"))
                        );
                    }
                    return Ok(bytes[start..end].to_vec());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(DtError::Io {
                        path: candidate.clone(),
                        source: e,
                    })
                }
            }
        }
        Err(self.error(format!("'{filename}' could not be found")))
    }
}

fn read_source(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| DtError::Io {
                path: PathBuf::from("-"),
                source: e,
            })?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).map_err(|e| DtError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Replaces backslash escapes in raw token text: named escapes (`\n`, `\t`,
/// ...), 1-3 digit octal escapes, `\xHH` hex escapes, and `\c` for any other
/// character as `c` itself. Operates on bytes since an octal/hex escape may
/// not be valid UTF-8 on its own.
fn unescape(raw: &str) -> Result<Vec<u8>> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        i += 1;
        if i >= bytes.len() {
            out.push(b'\\');
            break;
        }
        match bytes[i] {
            b'a' => {
                out.push(0x07);
                i += 1;
            }
            b'b' => {
                out.push(0x08);
                i += 1;
            }
            b't' => {
                out.push(b'\t');
                i += 1;
            }
            b'n' => {
                out.push(b'\n');
                i += 1;
            }
            b'v' => {
                out.push(0x0b);
                i += 1;
            }
            b'f' => {
                out.push(0x0c);
                i += 1;
            }
            b'r' => {
                out.push(b'\r');
                i += 1;
            }
            b'0'..=b'7' => {
                let start = i;
                let mut end = i;
                while end < bytes.len() && end < start + 3 && (b'0'..=b'7').contains(&bytes[end]) {
                    end += 1;
                }
                let value = u32::from_str_radix(
                    std::str::from_utf8(&bytes[start..end]).unwrap(),
                    8,
                )
                .unwrap();
                if value > 255 {
                    return Err(DtError::semantic("octal escape out of range (> 255)"));
                }
                out.push(value as u8);
                i = end;
            }
            b'x' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && end < start + 2 && bytes[end].is_ascii_hexdigit() {
                    end += 1;
                }
                let value = u32::from_str_radix(
                    std::str::from_utf8(&bytes[start..end]).unwrap(),
                    16,
                )
                .unwrap_or(0);
                out.push(value as u8);
                i = end;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn match_skip(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    if bytes[0].is_ascii_whitespace() {
        let mut i = 0;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        return Some(i);
    }
    if s.starts_with("//") {
        let end = s.find('\n').unwrap_or(s.len());
        return Some(end);
    }
    if s.starts_with("/*") {
        return match s[2..].find("*/") {
            Some(rel) => Some(2 + rel + 2),
            None => Some(s.len()),
        };
    }
    None
}

fn match_include(s: &str) -> Option<(usize, String)> {
    let rest = s.strip_prefix("/include/")?;
    let mut i = 9;
    let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
    i += rest.len() - trimmed.len();
    if !trimmed.starts_with('"') {
        return None;
    }
    let (qlen, content) = match_quoted(trimmed)?;
    Some((i + qlen, content))
}

fn match_line_directive(s: &str) -> Option<(usize, u32, String)> {
    let rest = s.strip_prefix('#')?;
    let rest = rest.strip_prefix("line").unwrap_or(rest);
    let rest2 = rest.trim_start_matches(|c: char| c == ' ' || c == '\t');
    if rest2.len() == rest.len() {
        return None;
    }
    let digits_end = rest2.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest2.len());
    if digits_end == 0 {
        return None;
    }
    let line: u32 = rest2[..digits_end].parse().ok()?;
    let rest3 = &rest2[digits_end..];
    let rest4 = rest3.trim_start_matches(|c: char| c == ' ' || c == '\t');
    if rest4.len() == rest3.len() || !rest4.starts_with('"') {
        return None;
    }
    let (qlen, filename) = match_quoted(rest4)?;
    let consumed = s.len() - rest4.len() + qlen;
    let after = &s[consumed..];
    let line_end = after.find('\n').unwrap_or(after.len());
    Some((consumed + line_end, line, filename))
}

/// Matches a `"..."`-quoted span, returning its length (including quotes)
/// and the raw (still-escaped) content between them.
fn match_quoted(s: &str) -> Option<(usize, String)> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'"') {
        return None;
    }
    let mut i = 1;
    let mut escaped = false;
    while i < bytes.len() {
        let c = bytes[i];
        if escaped {
            escaped = false;
        } else if c == b'\\' {
            escaped = true;
        } else if c == b'"' {
            return Some((i + 1, s[1..i].to_string()));
        }
        i += 1;
    }
    None
}

fn match_string(s: &str) -> Option<(usize, String)> {
    match_quoted(s)
}

fn match_char_literal(s: &str) -> Option<(usize, String)> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'\'') {
        return None;
    }
    let mut i = 1;
    let mut escaped = false;
    while i < bytes.len() {
        let c = bytes[i];
        if escaped {
            escaped = false;
        } else if c == b'\\' {
            escaped = true;
        } else if c == b'\'' {
            return Some((i + 1, s[1..i].to_string()));
        }
        i += 1;
    }
    None
}

fn match_directive_keyword(s: &str) -> Option<(usize, TokenKind)> {
    const DIRECTIVES: &[(&str, TokenKind)] = &[
        ("/dts-v1/", TokenKind::DtsV1),
        ("/plugin/", TokenKind::Plugin),
        ("/memreserve/", TokenKind::MemReserve),
        ("/delete-property/", TokenKind::DeleteProperty),
        ("/delete-node/", TokenKind::DeleteNode),
        ("/omit-if-no-ref/", TokenKind::OmitIfNoRef),
        ("/incbin/", TokenKind::Incbin),
        ("/bits/", TokenKind::Bits),
    ];
    for (text, kind) in DIRECTIVES {
        if s.starts_with(text) {
            return Some((text.len(), kind.clone()));
        }
    }
    None
}

fn match_label(s: &str) -> Option<(usize, String)> {
    let bytes = s.as_bytes();
    let first = *bytes.first()?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if bytes.get(i) == Some(&b':') {
        Some((i + 1, s[..i].to_string()))
    } else {
        None
    }
}

fn match_ref(s: &str) -> Option<(usize, String)> {
    let rest = s.strip_prefix('&')?;
    if let Some(path_rest) = rest.strip_prefix('{') {
        let end = path_rest.find('}')?;
        let path = &path_rest[..end];
        if !path
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"/,._+*#?@-".contains(&b))
        {
            return None;
        }
        return Some((1 + 1 + end + 1, format!("{{{path}}}")));
    }
    let bytes = rest.as_bytes();
    let first = *bytes.first()?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    Some((1 + i, rest[..i].to_string()))
}

fn match_number(s: &str) -> Option<(usize, i128)> {
    let bytes = s.as_bytes();
    let (digits_len, radix, digits_start) = if s.starts_with("0x") || s.starts_with("0X") {
        let mut i = 2;
        while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
            i += 1;
        }
        if i == 2 {
            return None;
        }
        (i, 16, 2)
    } else if bytes.first() == Some(&b'0') {
        let mut i = 1;
        while i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
            i += 1;
        }
        if i == 1 {
            // A bare `0` with no octal digits following it: parse the
            // leading zero itself rather than an empty digit slice.
            (i, 8, 0)
        } else {
            (i, 8, 1)
        }
    } else if bytes.first().is_some_and(u8::is_ascii_digit) {
        let mut i = 0;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        (i, 10, 0)
    } else {
        return None;
    };
    let value = i128::from_str_radix(&s[digits_start..digits_len], radix).ok()?;
    let mut end = digits_len;
    for suffix in ["ULL", "UL", "LL", "U", "L"] {
        if s[end..].to_uppercase().starts_with(suffix) {
            end += suffix.len();
            break;
        }
    }
    Some((end, value))
}

fn match_propnodename(s: &str) -> Option<(usize, String)> {
    let (backslash, rest) = if let Some(r) = s.strip_prefix('\\') {
        (1, r)
    } else {
        (0, s)
    };
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len()
        && (bytes[i].is_ascii_alphanumeric() || b",._+*#?@-".contains(&bytes[i]))
    {
        i += 1;
    }
    if i == 0 {
        return None;
    }
    Some((backslash + i, rest[..i].to_string()))
}

fn match_byte(s: &str) -> Option<(usize, u8)> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || !bytes[0].is_ascii_hexdigit() || !bytes[1].is_ascii_hexdigit() {
        return None;
    }
    let value = u8::from_str_radix(&s[..2], 16).ok()?;
    Some((2, value))
}

fn match_punct(s: &str) -> Option<(usize, TokenKind)> {
    use TokenKind::*;
    const MULTI: &[(&str, TokenKind)] = &[
        ("==", EqEq),
        ("!=", NotEq),
        ("<=", Le),
        (">=", Ge),
        ("<<", Shl),
        (">>", Shr),
        ("&&", AmpAmp),
        ("||", PipePipe),
    ];
    for (text, kind) in MULTI {
        if s.starts_with(text) {
            return Some((text.len(), kind.clone()));
        }
    }
    let kind = match s.as_bytes().first()? {
        b'/' => Slash,
        b';' => Semicolon,
        b',' => Comma,
        b':' => Colon,
        b'?' => Question,
        b'=' => Equal,
        b'<' => Lt,
        b'>' => Gt,
        b'+' => Plus,
        b'-' => Minus,
        b'*' => Star,
        b'%' => Percent,
        b'~' => Tilde,
        b'!' => Bang,
        b'^' => Caret,
        b'|' => Pipe,
        b'&' => Amp,
        b'(' => OpenParen,
        b')' => CloseParen,
        b'{' => OpenBrace,
        b'}' => CloseBrace,
        b'[' => OpenBracket,
        b']' => CloseBracket,
        _ => return None,
    };
    Some((1, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseOptions;

    fn lex_all(text: &str) -> Vec<TokenKind> {
        let options = ParseOptions::new();
        let mut lexer = Lexer::from_str("<test>", text, &options);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next().expect("lex error");
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn tokenizes_header() {
        let toks = lex_all("/dts-v1/;\n\n/ {\n};");
        assert_eq!(
            toks,
            vec![
                TokenKind::DtsV1,
                TokenKind::Semicolon,
                TokenKind::Slash,
                TokenKind::OpenBrace,
                TokenKind::CloseBrace,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn tokenizes_label_and_propnodename() {
        let toks = lex_all("/ { n1: a { }; };");
        assert!(toks.contains(&TokenKind::Label("n1".into())));
        assert!(toks.contains(&TokenKind::PropNodeName("a".into())));
    }

    #[test]
    fn tokenizes_reference_forms() {
        let toks = lex_all("&n1 &{/a/b}");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ref("n1".into()),
                TokenKind::Ref("{/a/b}".into()),
            ]
        );
    }

    #[test]
    fn bareword_ampersand_without_identifier_is_punctuation() {
        let toks = lex_all("& &&x");
        assert_eq!(toks[0], TokenKind::Amp);
    }

    #[test]
    fn numbers_in_various_bases() {
        let toks = lex_all("0x1F 010 42 3UL");
        assert_eq!(
            toks,
            vec![
                TokenKind::Number(0x1f),
                TokenKind::Number(8),
                TokenKind::Number(42),
                TokenKind::Number(3),
            ]
        );
    }

    #[test]
    fn bare_zero_lexes_as_number_zero() {
        let toks = lex_all("0 00 0 0x1000");
        assert_eq!(
            toks,
            vec![
                TokenKind::Number(0),
                TokenKind::Number(0),
                TokenKind::Number(0),
                TokenKind::Number(0x1000),
            ]
        );
    }

    #[test]
    fn byte_mode_recognizes_hex_pairs_and_labels() {
        let toks = lex_all("[ 01 lbl: 02 ]");
        assert_eq!(
            toks,
            vec![
                TokenKind::OpenBracket,
                TokenKind::Byte(1),
                TokenKind::Label("lbl".into()),
                TokenKind::Byte(2),
                TokenKind::CloseBracket,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let toks = lex_all("a // comment\nb /* multi\nline */ c");
        assert_eq!(toks.len(), 3);
    }

    #[test]
    fn string_escapes_are_unescaped_at_lex_time() {
        let toks = lex_all("\"a\\nb\\x41\"");
        assert_eq!(toks, vec![TokenKind::Str("a\nbA".into())]);
    }
}
