use std::path::PathBuf;

/// Inputs to a parse beyond the root filename itself: the ordered list of
/// directories searched for `/include/`d files that don't resolve relative
/// to the including file. Constructed once, passed by reference, never
/// mutated during a parse.
#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
    include_paths: Vec<PathBuf>,
}

impl ParseOptions {
    pub fn new() -> ParseOptions {
        ParseOptions::default()
    }

    pub fn add_include_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }
}
