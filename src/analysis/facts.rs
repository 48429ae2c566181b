//! Unit structures extracted from source files.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
    /// End line (1-indexed).
    pub end_line: usize,
    /// End column (1-indexed).
    pub end_col: usize,
}

impl Span {
    /// Create a span from a tree-sitter node.
    pub fn from_node(node: tree_sitter::Node) -> Self {
        Self::between(node, node)
    }

    /// Create a span from the start of `first` to the end of `last`.
    pub fn between(first: tree_sitter::Node, last: tree_sitter::Node) -> Self {
        let start = first.start_position();
        let end = last.end_position();
        Self {
            start_byte: first.start_byte(),
            end_byte: last.end_byte(),
            start_line: start.row + 1, // tree-sitter is 0-indexed
            start_col: start.column + 1,
            end_line: end.row + 1,
            end_col: end.column + 1,
        }
    }

    /// Create a span from the start of `first` up to the start of `until`.
    pub fn until_start_of(first: tree_sitter::Node, until: tree_sitter::Node) -> Self {
        let start = first.start_position();
        let end = until.start_position();
        Self {
            start_byte: first.start_byte(),
            end_byte: until.start_byte(),
            start_line: start.row + 1,
            start_col: start.column + 1,
            end_line: end.row + 1,
            end_col: end.column + 1,
        }
    }

    /// Whether the span's lines intersect the inclusive range `[start, end]`.
    pub fn overlaps_lines(&self, start: usize, end: usize) -> bool {
        self.start_line <= end && start <= self.end_line
    }

    /// Whether the span's lines fully contain the inclusive range `[start, end]`.
    pub fn contains_lines(&self, start: usize, end: usize) -> bool {
        self.start_line <= start && end <= self.end_line
    }

    /// Whether this span contains the byte range of `other`.
    pub fn contains(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }

    pub fn len(&self) -> usize {
        self.end_byte - self.start_byte
    }

    pub fn is_empty(&self) -> bool {
        self.start_byte == self.end_byte
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// Source language family of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    CCpp,
    Java,
    JavaScriptTypeScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::CCpp => "c_cpp",
            Language::Java => "java",
            Language::JavaScriptTypeScript => "javascript_typescript",
        }
    }

    /// Determine the language family from a file extension (without dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyi" => Some(Language::Python),
            "c" | "h" | "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(Language::CCpp),
            "java" => Some(Language::Java),
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "mts" | "cts" | "tsx" => {
                Some(Language::JavaScriptTypeScript)
            }
            _ => None,
        }
    }

    /// Human-readable name used in prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::CCpp => "C/C++",
            Language::Java => "Java",
            Language::JavaScriptTypeScript => "JavaScript/TypeScript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of documentable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Function,
    Method,
    Class,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Function => "function",
            UnitKind::Method => "method",
            UnitKind::Class => "class",
        }
    }

    /// Check if this is a callable (function or method).
    pub fn is_callable(&self) -> bool {
        matches!(self, UnitKind::Function | UnitKind::Method)
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub declared_type: Option<String>,
    pub default_present: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: None,
            default_present: false,
        }
    }
}

/// A doc block already attached to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingDoc {
    /// Raw text of the block as it appears in the file.
    pub text: String,
    pub span: Span,
}

/// Where and how a new doc block is inserted.
///
/// The bytes in `start..end` are replaced with
/// `prefix + indented(doc) + suffix`. For a declaration that starts its own
/// line the range is empty and sits at the line start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertAnchor {
    pub start: usize,
    pub end: usize,
    /// Indentation applied to every non-empty doc line.
    pub indent: String,
    pub prefix: String,
    pub suffix: String,
}

/// Light structural facts about a unit body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BodyFacts {
    /// A `return <expr>` (or expression body) exists.
    pub returns_value: bool,
    /// Text of the first returned expression.
    pub return_expr: Option<String>,
    pub has_loops: bool,
    pub has_conditionals: bool,
    /// More than one return statement.
    pub early_return: bool,
    /// Exception types thrown or raised, in first-seen order.
    pub throws: Vec<String>,
}

/// One function, method or class declaration.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentableUnit {
    pub language: Language,
    pub kind: UnitKind,
    pub name: String,
    /// Enclosing unit names joined with `.`, ending with `name`.
    pub name_path: String,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    /// Declaration header text, whitespace-collapsed.
    pub signature: String,
    /// Full extent of the declaration including wrappers.
    pub span: Span,
    /// Declaration header: from the declaration start to the body start.
    pub decl_span: Span,
    pub body_span: Option<Span>,
    /// Body source with recognised doc blocks removed.
    pub body_text: String,
    pub existing_doc: Option<ExistingDoc>,
    pub anchor: InsertAnchor,
    pub facts: BodyFacts,
}

impl DocumentableUnit {
    /// Parameter names in declaration order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }
}

/// A file could not be parsed into units.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {reason}", file.display())]
pub struct ParseError {
    pub file: PathBuf,
    pub reason: String,
}

impl ParseError {
    pub fn new(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            reason: reason.into(),
        }
    }
}
