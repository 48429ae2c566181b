//! AST-backed unit extraction.
//!
//! This module finds the documentable units of a source file: functions,
//! methods and classes, with their parameters, bodies and any doc block
//! already attached.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ Source File     │────▶│ Extractor    │────▶│ Candidates   │────▶│ DocumentableUnit │
//! └─────────────────┘     │ (per family) │     └──────────────┘     │ (name path,      │
//!                         └──────────────┘       units::assemble    │  body, anchor)   │
//!                                                                   └──────────────────┘
//! ```
//!
//! # Adding a New Language
//!
//! 1. Create a new module in `src/analysis/languages/`
//! 2. Implement `LanguageExtractor`, producing `units::Candidate`s
//! 3. Register the extractor in `languages/mod.rs`

mod facts;
mod languages;
mod traits;
pub(crate) mod units;

use std::path::Path;

pub use facts::{
    BodyFacts, DocumentableUnit, ExistingDoc, InsertAnchor, Language, ParseError, Parameter,
    Span, UnitKind,
};
pub use languages::{
    get_extractor, get_extractor_for_extension, register_extractors, registered_extensions,
    CCppExtractor, JavaExtractor, JavaScriptExtractor, PythonExtractor,
};
pub use traits::{LanguageExtractor, ParsedFile};
pub use units::collapse_whitespace;

/// Extract the documentable units of one file.
///
/// Any syntax error yields a [`ParseError`] for the whole file rather than a
/// partial unit list.
pub fn extract(
    path: &Path,
    source: &[u8],
    language: Language,
) -> Result<Vec<DocumentableUnit>, ParseError> {
    if std::str::from_utf8(source).is_err() {
        return Err(ParseError::new(path, "file is not valid UTF-8"));
    }

    let extractor = get_extractor(language);
    let parsed = extractor
        .parse(path, source)
        .map_err(|e| ParseError::new(path, e.to_string()))?;
    parsed.check_syntax()?;

    extractor
        .extract_units(&parsed)
        .map_err(|e| ParseError::new(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_rejects_invalid_utf8() {
        let err = extract(Path::new("a.py"), &[0x66, 0xff, 0xfe], Language::Python).unwrap_err();
        assert!(err.reason.contains("UTF-8"));
    }

    #[test]
    fn test_extract_reports_syntax_error() {
        let err = extract(
            Path::new("broken.js"),
            b"function broken( {\n",
            Language::JavaScriptTypeScript,
        )
        .unwrap_err();
        assert_eq!(err.file, Path::new("broken.js"));
        assert!(err.reason.contains("line"));
    }

    #[test]
    fn test_decl_spans_do_not_overlap() {
        let src = b"class A:\n    def f(self):\n        def g():\n            pass\n        return g\n";
        let units = extract(Path::new("a.py"), src, Language::Python).unwrap();
        assert_eq!(units.len(), 3);
        for pair in units.windows(2) {
            assert!(pair[0].decl_span.end_byte <= pair[1].decl_span.start_byte);
        }
    }
}
