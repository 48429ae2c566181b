//! Core traits for unit extraction.

use std::path::Path;

use super::{DocumentableUnit, Language, ParseError};

/// Holds a parsed tree-sitter tree and associated metadata.
pub struct ParsedFile {
    /// The tree-sitter parse tree.
    pub tree: tree_sitter::Tree,
    /// The original source code (kept for node text extraction).
    pub source: Vec<u8>,
    /// The file path (for error reporting).
    pub path: String,
}

impl ParsedFile {
    /// Get the source code as a string slice.
    pub fn source_str(&self) -> &str {
        std::str::from_utf8(&self.source).unwrap_or("")
    }

    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }

    /// Get text for a byte range.
    pub fn slice(&self, start: usize, end: usize) -> &str {
        std::str::from_utf8(&self.source[start..end]).unwrap_or("")
    }

    /// Fail with the location of the first ERROR or MISSING node, if any.
    pub fn check_syntax(&self) -> Result<(), ParseError> {
        let root = self.tree.root_node();
        if !root.has_error() {
            return Ok(());
        }

        let mut cursor = root.walk();
        let mut reason = "syntax error".to_string();
        'walk: loop {
            let node = cursor.node();
            if node.is_error() || node.is_missing() {
                let what = if node.is_missing() {
                    format!("missing `{}`", node.kind())
                } else {
                    "syntax error".to_string()
                };
                reason = format!(
                    "{} at line {}, column {}",
                    what,
                    node.start_position().row + 1,
                    node.start_position().column + 1
                );
                break;
            }
            if node.has_error() && cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    break 'walk;
                }
            }
        }

        Err(ParseError::new(&self.path, reason))
    }
}

/// Language-specific unit extractor.
///
/// Each language family implements this trait and is registered once in
/// `languages/mod.rs`.
///
/// # Thread Safety
///
/// tree_sitter::Parser is not Sync, so implementations create parsers as
/// needed.
pub trait LanguageExtractor: Send + Sync {
    /// Returns the language family handled by this extractor.
    fn language(&self) -> Language;

    /// Returns file extensions this extractor handles (without dot).
    fn file_extensions(&self) -> &'static [&'static str];

    /// Parse a source file into a tree-sitter tree.
    ///
    /// The grammar may depend on the extension (e.g. `.tsx`).
    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile>;

    /// Extract all documentable units from a parsed file, in source order.
    fn extract_units(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<DocumentableUnit>>;

    /// Check if this extractor handles the given file extension.
    fn handles_extension(&self, ext: &str) -> bool {
        self.file_extensions().contains(&ext)
    }
}
