//! Shared assembly of documentable units.
//!
//! Language extractors produce [`Candidate`]s straight from the tree. This
//! module turns them into [`DocumentableUnit`]s: it assigns name paths and
//! method kinds by span containment, strips recognised doc blocks from body
//! text, and computes insertion anchors.

use std::cmp::Reverse;
use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use tree_sitter::Node;

use super::{
    BodyFacts, DocumentableUnit, ExistingDoc, InsertAnchor, Language, Parameter, ParsedFile,
    Span, UnitKind,
};

lazy_static! {
    static ref THROWN_NAME: Regex =
        Regex::new(r"^(?:throw|raise)\s+(?:new\s+)?([A-Za-z_][A-Za-z0-9_.:]*)").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// A declaration found by a language extractor, before assembly.
pub(crate) struct Candidate<'t> {
    /// `Function` is promoted to `Method` when nested directly in a class.
    pub kind: UnitKind,
    pub name: String,
    /// Owning class written in the declaration itself (`Foo::bar`).
    pub qualifier: Option<String>,
    /// Outermost node of the declaration (export, decorator, template, const).
    pub outer: Node<'t>,
    pub body: Option<Node<'t>>,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub existing_doc: Option<ExistingDoc>,
    pub anchor: InsertAnchor,
    pub facts: BodyFacts,
}

/// Node kinds that drive body fact collection for one language.
pub(crate) struct BodyKinds {
    pub returns: &'static [&'static str],
    pub throws: &'static [&'static str],
    pub loops: &'static [&'static str],
    pub conditionals: &'static [&'static str],
    /// Nested scopes whose statements belong to another unit.
    pub nested: &'static [&'static str],
}

/// Build the final unit list from candidates.
pub(crate) fn assemble(
    parsed: &ParsedFile,
    language: Language,
    mut candidates: Vec<Candidate<'_>>,
) -> Vec<DocumentableUnit> {
    let mut seen_positions = HashSet::new();
    candidates.retain(|c| seen_positions.insert((c.outer.start_byte(), c.name.clone())));
    candidates.sort_by_key(|c| (c.outer.start_byte(), Reverse(c.outer.end_byte())));

    let doc_spans: Vec<Span> = candidates
        .iter()
        .filter_map(|c| c.existing_doc.as_ref().map(|d| d.span.clone()))
        .collect();

    // (end_byte, name_path, kind) of enclosing units
    let mut stack: Vec<(usize, String, UnitKind)> = Vec::new();
    let mut units = Vec::with_capacity(candidates.len());

    for c in candidates {
        let start = c.outer.start_byte();
        while stack.last().map(|(end, _, _)| *end <= start).unwrap_or(false) {
            stack.pop();
        }
        let parent = stack.last();

        let mut kind = c.kind;
        if kind == UnitKind::Function
            && (c.qualifier.is_some() || parent.map(|p| p.2) == Some(UnitKind::Class))
        {
            kind = UnitKind::Method;
        }

        let mut segments = Vec::new();
        if let Some((_, path, _)) = parent {
            segments.push(path.clone());
        }
        if let Some(q) = &c.qualifier {
            segments.push(q.clone());
        }
        segments.push(c.name.clone());
        let name_path = segments.join(".");

        let span = Span::from_node(c.outer);
        let (decl_span, body_span, body_text) = match c.body {
            Some(body) => {
                let body_span = Span::from_node(body);
                let text = strip_docs(parsed, &body_span, &doc_spans);
                (Span::until_start_of(c.outer, body), Some(body_span), text)
            }
            None => (span.clone(), None, String::new()),
        };
        let signature = collapse_whitespace(parsed.slice(decl_span.start_byte, decl_span.end_byte));

        stack.push((c.outer.end_byte(), name_path.clone(), kind));
        units.push(DocumentableUnit {
            language,
            kind,
            name: c.name,
            name_path,
            parameters: c.parameters,
            return_type: c.return_type,
            signature,
            span,
            decl_span,
            body_span,
            body_text,
            existing_doc: c.existing_doc,
            anchor: c.anchor,
            facts: c.facts,
        });
    }

    units
}

/// Body text with every doc block inside it removed, each together with the
/// whitespace that follows it.
fn strip_docs(parsed: &ParsedFile, body: &Span, doc_spans: &[Span]) -> String {
    let source = &parsed.source;
    let mut inner: Vec<&Span> = doc_spans.iter().filter(|d| body.contains(d)).collect();
    inner.sort_by_key(|d| d.start_byte);

    let mut out = Vec::with_capacity(body.len());
    let mut pos = body.start_byte;
    for doc in inner {
        if doc.start_byte < pos {
            continue;
        }
        out.extend_from_slice(&source[pos..doc.start_byte]);
        let mut end = doc.end_byte;
        while end < body.end_byte && source[end].is_ascii_whitespace() {
            end += 1;
        }
        pos = end;
    }
    out.extend_from_slice(&source[pos..body.end_byte]);
    String::from_utf8_lossy(&out).into_owned()
}

/// Byte offset of the start of the line containing `offset`.
pub(crate) fn line_start(source: &[u8], offset: usize) -> usize {
    source[..offset]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Leading whitespace of the line containing `offset`.
pub(crate) fn line_indent(source: &[u8], offset: usize) -> String {
    let start = line_start(source, offset);
    let len = source[start..]
        .iter()
        .take_while(|b| **b == b' ' || **b == b'\t')
        .count();
    String::from_utf8_lossy(&source[start..start + len]).into_owned()
}

/// Anchor for a doc block placed directly above `node`.
pub(crate) fn anchor_before(parsed: &ParsedFile, node: Node) -> InsertAnchor {
    let source = &parsed.source;
    let offset = node.start_byte();
    let start = line_start(source, offset);
    let indent = line_indent(source, offset);

    if source[start..offset].iter().all(|b| b.is_ascii_whitespace()) {
        return InsertAnchor {
            start,
            end: start,
            indent,
            prefix: String::new(),
            suffix: "\n".to_string(),
        };
    }

    // Code precedes the declaration on its line: break the line before it.
    let trimmed = offset
        - source[start..offset]
            .iter()
            .rev()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
    InsertAnchor {
        start: trimmed,
        end: offset,
        prefix: "\n".to_string(),
        suffix: format!("\n{}", indent),
        indent,
    }
}

/// The doc comment immediately before `node`, if `accept` recognises it.
///
/// Only whitespace with at most one line break may separate the two.
pub(crate) fn preceding_comment(
    parsed: &ParsedFile,
    node: Node,
    accept: impl Fn(&str) -> bool,
) -> Option<ExistingDoc> {
    let prev = node.prev_sibling()?;
    if !prev.kind().ends_with("comment") || !adjacent(parsed, prev, node) {
        return None;
    }
    let text = parsed.node_text(prev);
    if !accept(text) {
        return None;
    }
    Some(ExistingDoc {
        text: text.to_string(),
        span: Span::from_node(prev),
    })
}

/// A run of consecutive line comments starting with `marker` before `node`.
pub(crate) fn preceding_line_comments(
    parsed: &ParsedFile,
    node: Node,
    marker: &str,
) -> Option<ExistingDoc> {
    let mut first = None;
    let mut last = None;
    let mut next = node;
    while let Some(prev) = next.prev_sibling() {
        let text = parsed.node_text(prev);
        if !prev.kind().ends_with("comment")
            || !text.starts_with(marker)
            || text.starts_with("////")
            || !adjacent(parsed, prev, next)
        {
            break;
        }
        if last.is_none() {
            last = Some(prev);
        }
        first = Some(prev);
        next = prev;
    }

    let (first, last) = (first?, last?);
    Some(ExistingDoc {
        text: parsed.slice(first.start_byte(), last.end_byte()).to_string(),
        span: Span::between(first, last),
    })
}

fn adjacent(parsed: &ParsedFile, before: Node, after: Node) -> bool {
    if before.end_byte() > after.start_byte() {
        return false;
    }
    let gap = &parsed.source[before.end_byte()..after.start_byte()];
    gap.iter().all(|b| b.is_ascii_whitespace()) && gap.iter().filter(|b| **b == b'\n').count() <= 1
}

/// Walk a body and record returns, loops, branches and thrown exceptions.
pub(crate) fn collect_facts(parsed: &ParsedFile, body: Node, kinds: &BodyKinds) -> BodyFacts {
    let mut facts = BodyFacts::default();
    let mut returns = 0;
    let mut stack = vec![body];

    while let Some(node) = stack.pop() {
        let kind = node.kind();
        if node.id() != body.id() && kinds.nested.contains(&kind) {
            continue;
        }

        if kinds.returns.contains(&kind) {
            returns += 1;
            let value = node
                .named_children(&mut node.walk())
                .find(|n| !n.kind().ends_with("comment"));
            if let Some(value) = value {
                facts.returns_value = true;
                if facts.return_expr.is_none() {
                    facts.return_expr = Some(collapse_whitespace(parsed.node_text(value)));
                }
            }
        } else if kinds.throws.contains(&kind) {
            if let Some(name) = thrown_name(parsed.node_text(node)) {
                if !facts.throws.contains(&name) {
                    facts.throws.push(name);
                }
            }
        } else if kinds.loops.contains(&kind) {
            facts.has_loops = true;
        } else if kinds.conditionals.contains(&kind) {
            facts.has_conditionals = true;
        }

        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    facts.early_return = returns > 1;
    facts
}

/// Facts for an expression-bodied function such as `x => x - 1`.
pub(crate) fn expression_facts(parsed: &ParsedFile, expr: Node) -> BodyFacts {
    BodyFacts {
        returns_value: true,
        return_expr: Some(collapse_whitespace(parsed.node_text(expr))),
        ..Default::default()
    }
}

/// Exception type named by a throw/raise statement.
pub(crate) fn thrown_name(statement: &str) -> Option<String> {
    let caps = THROWN_NAME.captures(statement.trim())?;
    let name = caps.get(1)?.as_str();
    let last = name.rsplit(['.', ':']).next().unwrap_or(name);
    let lower = last.to_lowercase();
    let looks_like_type = last.chars().next().map(char::is_uppercase).unwrap_or(false)
        || lower.contains("error")
        || lower.contains("exception");
    looks_like_type.then(|| name.to_string())
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Strip the leading `:` or `->` of a type annotation.
pub(crate) fn annotation_type(text: &str) -> String {
    let text = text.trim();
    let text = text
        .strip_prefix("->")
        .or_else(|| text.strip_prefix(':'))
        .unwrap_or(text);
    collapse_whitespace(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrown_name() {
        assert_eq!(
            thrown_name("throw new Error(\"boom\");"),
            Some("Error".to_string())
        );
        assert_eq!(
            thrown_name("raise ValueError('bad')"),
            Some("ValueError".to_string())
        );
        assert_eq!(
            thrown_name("throw std::runtime_error(\"x\");"),
            Some("std::runtime_error".to_string())
        );
        assert_eq!(thrown_name("throw err;"), None);
        assert_eq!(thrown_name("raise"), None);
    }

    #[test]
    fn test_line_helpers() {
        let src = b"a = 1\n    def f():\n";
        assert_eq!(line_start(src, 10), 6);
        assert_eq!(line_indent(src, 10), "    ");
        assert_eq!(line_start(src, 2), 0);
    }

    #[test]
    fn test_annotation_type() {
        assert_eq!(annotation_type(": number"), "number");
        assert_eq!(annotation_type("-> Dict[str,  int]"), "Dict[str, int]");
        assert_eq!(annotation_type("int"), "int");
    }
}
