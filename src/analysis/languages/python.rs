//! Python unit extractor using tree-sitter.

use std::path::Path;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language as Grammar, Node, Parser, Query, QueryCursor};

use crate::analysis::units::{
    annotation_type, collect_facts, line_indent, line_start, BodyKinds, Candidate,
};
use crate::analysis::{
    units, DocumentableUnit, ExistingDoc, InsertAnchor, Language, LanguageExtractor, Parameter,
    ParsedFile, Span, UnitKind,
};

const DECLARATION_QUERY: &str = r#"
; Function definitions (sync and async)
(function_definition
  name: (identifier) @func_name
) @function

; Class definitions
(class_definition
  name: (identifier) @class_name
) @class
"#;

const BODY_KINDS: BodyKinds = BodyKinds {
    returns: &["return_statement"],
    throws: &["raise_statement"],
    loops: &["for_statement", "while_statement", "list_comprehension", "generator_expression"],
    conditionals: &["if_statement", "conditional_expression", "match_statement"],
    nested: &["function_definition", "class_definition", "lambda"],
};

pub struct PythonExtractor {
    language: Grammar,
}

impl PythonExtractor {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_python::LANGUAGE.into(),
        }
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;
        Ok(parser)
    }

    fn candidate<'t>(
        &self,
        parsed: &ParsedFile,
        node: Node<'t>,
        name: String,
        kind: UnitKind,
    ) -> Option<Candidate<'t>> {
        let body = node.child_by_field_name("body")?;
        let outer = match node.parent() {
            Some(p) if p.kind() == "decorated_definition" => p,
            _ => node,
        };

        let (parameters, return_type) = if kind == UnitKind::Function {
            let in_class = outer
                .parent()
                .and_then(|block| block.parent())
                .map(|p| p.kind() == "class_definition")
                .unwrap_or(false);
            let params = node
                .child_by_field_name("parameters")
                .map(|p| extract_parameters(parsed, p, in_class))
                .unwrap_or_default();
            let ret = node
                .child_by_field_name("return_type")
                .map(|t| annotation_type(parsed.node_text(t)));
            (params, ret)
        } else {
            (Vec::new(), None)
        };

        let facts = if kind == UnitKind::Function {
            collect_facts(parsed, body, &BODY_KINDS)
        } else {
            Default::default()
        };

        Some(Candidate {
            kind,
            name,
            qualifier: None,
            outer,
            body: Some(body),
            parameters,
            return_type,
            existing_doc: docstring(parsed, body),
            anchor: body_anchor(parsed, node, body),
            facts,
        })
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageExtractor for PythonExtractor {
    fn language(&self) -> Language {
        Language::Python
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse Python file"))?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: path.to_string_lossy().to_string(),
        })
    }

    fn extract_units(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<DocumentableUnit>> {
        let query = Query::new(&self.language, DECLARATION_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut candidates = Vec::new();
        while let Some(m) = matches.next() {
            let mut name = String::new();
            let mut kind = UnitKind::Function;
            let mut decl_node = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "func_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = UnitKind::Function;
                    }
                    "class_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = UnitKind::Class;
                    }
                    "function" | "class" => decl_node = Some(capture.node),
                    _ => {}
                }
            }

            if let Some(node) = decl_node {
                if let Some(c) = self.candidate(parsed, node, name, kind) {
                    candidates.push(c);
                }
            }
        }

        Ok(units::assemble(parsed, Language::Python, candidates))
    }
}

fn extract_parameters(parsed: &ParsedFile, params: Node, in_class: bool) -> Vec<Parameter> {
    let mut out = Vec::new();
    let mut cursor = params.walk();

    for (idx, child) in params.named_children(&mut cursor).enumerate() {
        let param = match child.kind() {
            "identifier" => Parameter::new(parsed.node_text(child)),
            "typed_parameter" => {
                let name = child
                    .named_child(0)
                    .map(|n| parsed.node_text(n))
                    .unwrap_or_default();
                Parameter {
                    name: name.to_string(),
                    declared_type: child
                        .child_by_field_name("type")
                        .map(|t| annotation_type(parsed.node_text(t))),
                    default_present: false,
                }
            }
            "default_parameter" | "typed_default_parameter" => Parameter {
                name: child
                    .child_by_field_name("name")
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default(),
                declared_type: child
                    .child_by_field_name("type")
                    .map(|t| annotation_type(parsed.node_text(t))),
                default_present: true,
            },
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                Parameter::new(parsed.node_text(child))
            }
            _ => continue,
        };

        if idx == 0 && in_class && matches!(param.name.as_str(), "self" | "cls") {
            continue;
        }
        if !param.name.is_empty() {
            out.push(param);
        }
    }

    out
}

/// A leading string statement in the body.
fn docstring(parsed: &ParsedFile, body: Node) -> Option<ExistingDoc> {
    let first = body
        .named_children(&mut body.walk())
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    if !matches!(expr.kind(), "string" | "concatenated_string") || first.named_child_count() != 1 {
        return None;
    }
    Some(ExistingDoc {
        text: parsed.node_text(first).to_string(),
        span: Span::from_node(first),
    })
}

/// Docstrings go on the line of the first body statement.
fn body_anchor(parsed: &ParsedFile, def: Node, body: Node) -> InsertAnchor {
    let source = &parsed.source;
    let offset = body.start_byte();
    let start = line_start(source, offset);

    if source[start..offset].iter().all(|b| b.is_ascii_whitespace()) {
        return InsertAnchor {
            start,
            end: start,
            indent: line_indent(source, offset),
            prefix: String::new(),
            suffix: "\n".to_string(),
        };
    }

    // `def f(): return 1` moves the body onto its own line.
    let indent = format!("{}    ", line_indent(source, def.start_byte()));
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
