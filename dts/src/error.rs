use crate::position::Position;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// The single error kind raised for every fault the library can encounter:
/// unreadable files, syntactic errors, and post-parse (fixup / accessor)
/// errors. Every variant's `Display` renders the text a caller is meant to
/// show a user; the variants exist so callers that care can still match on
/// the mechanism.
#[derive(Debug)]
pub enum DtError {
    /// A file could not be opened or read. Carries the path that failed and
    /// the underlying I/O error.
    Io { path: PathBuf, source: std::io::Error },
    /// A lexical or grammatical error at a specific source location.
    Syntax {
        file: String,
        at: Position,
        message: String,
    },
    /// A fault discovered after a successful parse: fixup-pass failures
    /// (duplicate phandles, unresolved references, duplicate labels, ...)
    /// and typed-accessor mismatches. The message already names whatever
    /// node path, property name, or filename is relevant.
    Semantic { message: String },
}

impl DtError {
    pub fn syntax(file: impl Into<String>, at: Position, message: impl Into<String>) -> DtError {
        DtError::Syntax {
            file: file.into(),
            at,
            message: message.into(),
        }
    }

    pub fn semantic(message: impl Into<String>) -> DtError {
        DtError::Semantic {
            message: message.into(),
        }
    }
}

impl Display for DtError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DtError::Io { path, source } => {
                write!(f, "could not read '{}': {}", path.display(), source)
            }
            DtError::Syntax { file, at, message } => {
                write!(
                    f,
                    "{}:{} (column {}): parse error: {}",
                    file,
                    at.line(),
                    at.column(),
                    message
                )
            }
            DtError::Semantic { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for DtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DtError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DtError>;
