//! Edit planning.
//!
//! Turns generated docs into insert/replace/skip decisions and the byte
//! edits that realise them. Edits within a file are kept in descending
//! offset order so they can be applied bottom-up.

mod apply;
mod diff;

pub use apply::{read_source, write_atomic, FileError};
pub use diff::unified_diff;

use serde::Serialize;
use thiserror::Error;

use crate::analysis::units::line_indent;
use crate::analysis::{collapse_whitespace, DocumentableUnit};
use crate::synth::GeneratedDoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    /// No doc present; a new one is added.
    Insert,
    /// A doc is present but differs.
    Replace,
    /// The present doc already matches.
    Skip,
}

impl EditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditKind::Insert => "insert",
            EditKind::Replace => "replace",
            EditKind::Skip => "skip",
        }
    }
}

/// A byte-range replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

/// The decision taken for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitDecision {
    pub name_path: String,
    pub line: usize,
    pub kind: EditKind,
    pub provider_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("edits for {first} and {second} overlap")]
    Overlap { first: String, second: String },
}

/// Edits for one file.
#[derive(Debug, Clone, Default)]
pub struct FilePlan {
    /// Decisions in source order.
    pub decisions: Vec<UnitDecision>,
    /// Edits ordered by descending offset.
    pub edits: Vec<Edit>,
}

impl FilePlan {
    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    pub fn count(&self, kind: EditKind) -> usize {
        self.decisions.iter().filter(|d| d.kind == kind).count()
    }

    /// Apply all edits to the source the plan was built from.
    pub fn apply(&self, source: &str) -> String {
        let mut text = source.to_string();
        for edit in &self.edits {
            text.replace_range(edit.start..edit.end, &edit.replacement);
        }
        text
    }
}

/// Decide how a generated doc relates to the unit's existing doc.
pub fn decide(unit: &DocumentableUnit, doc: &GeneratedDoc) -> EditKind {
    match &unit.existing_doc {
        None => EditKind::Insert,
        Some(existing)
            if collapse_whitespace(&existing.text) == collapse_whitespace(&doc.text) =>
        {
            EditKind::Skip
        }
        Some(_) => EditKind::Replace,
    }
}

/// Build the edit plan for one file from the units that have a generated doc.
///
/// Units whose generation failed are simply absent from `generated`.
pub fn plan<'a>(
    source: &str,
    generated: impl IntoIterator<Item = (&'a DocumentableUnit, &'a GeneratedDoc)>,
) -> Result<FilePlan, PlanError> {
    let bytes = source.as_bytes();
    let mut decisions = Vec::new();
    let mut edits: Vec<(usize, String, Edit)> = Vec::new();

    for (order, (unit, doc)) in generated.into_iter().enumerate() {
        let kind = decide(unit, doc);
        decisions.push(UnitDecision {
            name_path: unit.name_path.clone(),
            line: unit.decl_span.start_line,
            kind,
            provider_id: doc.provider_id.clone(),
        });

        let edit = match (kind, &unit.existing_doc) {
            (EditKind::Skip, _) => continue,
            (EditKind::Replace, Some(existing)) => {
                let indent = line_indent(bytes, existing.span.start_byte);
                Edit {
                    start: existing.span.start_byte,
                    end: existing.span.end_byte,
                    replacement: indent_lines(&doc.text, &indent, false),
                }
            }
            _ => {
                let anchor = &unit.anchor;
                Edit {
                    start: anchor.start,
                    end: anchor.end,
                    replacement: format!(
                        "{}{}{}",
                        anchor.prefix,
                        indent_lines(&doc.text, &anchor.indent, true),
                        anchor.suffix
                    ),
                }
            }
        };
        edits.push((order, unit.name_path.clone(), edit));
    }

    // Ties keep source order once applied bottom-up.
    edits.sort_by(|a, b| b.2.start.cmp(&a.2.start).then(b.0.cmp(&a.0)));
    for pair in edits.windows(2) {
        let (higher, lower) = (&pair[0], &pair[1]);
        if lower.2.end > higher.2.start {
            return Err(PlanError::Overlap {
                first: lower.1.clone(),
                second: higher.1.clone(),
            });
        }
    }

    decisions.sort_by_key(|d| d.line);
    Ok(FilePlan {
        decisions,
        edits: edits.into_iter().map(|(_, _, e)| e).collect(),
    })
}

/// Prefix each non-empty line with `indent`, optionally skipping the first.
fn indent_lines(text: &str, indent: &str, first: bool) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if line.is_empty() || (i == 0 && !first) {
                line.to_string()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
