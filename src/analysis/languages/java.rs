//! Java unit extractor using tree-sitter.

use std::path::Path;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language as Grammar, Node, Parser, Query, QueryCursor};

use crate::analysis::units::{
    anchor_before, collapse_whitespace, collect_facts, preceding_comment, BodyKinds, Candidate,
};
use crate::analysis::{
    units, DocumentableUnit, Language, LanguageExtractor, Parameter, ParsedFile, UnitKind,
};

const DECLARATION_QUERY: &str = r#"
; Methods (interface methods have no body)
(method_declaration
  name: (identifier) @method_name
) @method

(constructor_declaration
  name: (identifier) @method_name
) @method

; Type declarations
(class_declaration
  name: (identifier) @class_name
) @class

(interface_declaration
  name: (identifier) @class_name
) @class

(enum_declaration
  name: (identifier) @class_name
) @class

(record_declaration
  name: (identifier) @class_name
) @class
"#;

const BODY_KINDS: BodyKinds = BodyKinds {
    returns: &["return_statement"],
    throws: &["throw_statement"],
    loops: &[
        "for_statement",
        "enhanced_for_statement",
        "while_statement",
        "do_statement",
    ],
    conditionals: &["if_statement", "ternary_expression", "switch_expression"],
    nested: &[
        "lambda_expression",
        "class_body",
        "class_declaration",
        "method_declaration",
    ],
};

pub struct JavaExtractor {
    language: Grammar,
}

impl JavaExtractor {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_java::LANGUAGE.into(),
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
    ) -> Candidate<'t> {
        let body = node.child_by_field_name("body");

        let (parameters, return_type, facts) = if kind == UnitKind::Class {
            (Vec::new(), None, Default::default())
        } else {
            let parameters = node
                .child_by_field_name("parameters")
                .map(|p| extract_parameters(parsed, p))
                .unwrap_or_default();
            // constructors have no return type
            let return_type = node
                .child_by_field_name("type")
                .map(|t| collapse_whitespace(parsed.node_text(t)));
            let mut facts = body
                .map(|b| collect_facts(parsed, b, &BODY_KINDS))
                .unwrap_or_default();
            for thrown in declared_throws(parsed, node) {
                if !facts.throws.contains(&thrown) {
                    facts.throws.push(thrown);
                }
            }
            (parameters, return_type, facts)
        };

        Candidate {
            kind,
            name,
            qualifier: None,
            outer: node,
            body,
            parameters,
            return_type,
            existing_doc: preceding_comment(parsed, node, |text| text.starts_with("/**")),
            anchor: anchor_before(parsed, node),
            facts,
        }
    }
}

impl Default for JavaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageExtractor for JavaExtractor {
    fn language(&self) -> Language {
        Language::Java
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["java"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse Java file"))?;

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
            let mut kind = UnitKind::Method;
            let mut decl_node = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "method_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = UnitKind::Method;
                    }
                    "class_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = UnitKind::Class;
                    }
                    "method" | "class" => decl_node = Some(capture.node),
                    _ => {}
                }
            }

            if let Some(node) = decl_node {
                if !name.is_empty() {
                    candidates.push(self.candidate(parsed, node, name, kind));
                }
            }
        }

        Ok(units::assemble(parsed, Language::Java, candidates))
    }
}

fn extract_parameters(parsed: &ParsedFile, params: Node) -> Vec<Parameter> {
    let mut out = Vec::new();
    let mut cursor = params.walk();

    for child in params.named_children(&mut cursor) {
        match child.kind() {
            "formal_parameter" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default();
                let declared_type = child
                    .child_by_field_name("type")
                    .map(|t| collapse_whitespace(parsed.node_text(t)));
                if !name.is_empty() {
                    out.push(Parameter {
                        name,
                        declared_type,
                        default_present: false,
                    });
                }
            }
            "spread_parameter" => {
                // `String... args`: the name sits in a trailing declarator
                let declarator = child
                    .named_children(&mut child.walk())
                    .find(|n| n.kind() == "variable_declarator");
                let name_node = declarator.and_then(|d| d.child_by_field_name("name"));
                if let Some(name_node) = name_node {
                    let type_text =
                        parsed.slice(child.start_byte(), name_node.start_byte());
                    out.push(Parameter {
                        name: parsed.node_text(name_node).to_string(),
                        declared_type: Some(collapse_whitespace(type_text)),
                        default_present: false,
                    });
                }
            }
            _ => {}
        }
    }

    out
}

/// Exception types listed in a `throws` clause.
fn declared_throws(parsed: &ParsedFile, node: Node) -> Vec<String> {
    let mut cursor = node.walk();
    let clause = node.children(&mut cursor).find(|n| n.kind() == "throws");
    match clause {
        Some(clause) => clause
            .named_children(&mut clause.walk())
            .map(|n| parsed.node_text(n).to_string())
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(src: &str) -> Vec<DocumentableUnit> {
        let extractor = JavaExtractor::new();
        let parsed = extractor.parse(Path::new("Sample.java"), src.as_bytes()).unwrap();
        parsed.check_syntax().unwrap();
        extractor.extract_units(&parsed).unwrap()
    }

    #[test]
    fn test_class_and_methods() {
        let units = extract(
            r#"
public class Sample {
    /**
     * Stale.
     */
    public int add(int a, int b) {
        return a + b;
    }

    public Sample(String name) throws IllegalArgumentException {
        if (name == null) {
            throw new IllegalArgumentException("name");
        }
    }

    static void log(String... parts) {}
}
"#,
        );

        let paths: Vec<_> = units.iter().map(|u| u.name_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["Sample", "Sample.add", "Sample.Sample", "Sample.log"]
        );

        let add = &units[1];
        assert_eq!(add.kind, UnitKind::Method);
        assert_eq!(add.return_type.as_deref(), Some("int"));
        assert_eq!(add.parameters[1].declared_type.as_deref(), Some("int"));
        assert!(add.existing_doc.is_some());

        let ctor = &units[2];
        assert_eq!(ctor.return_type, None);
        assert_eq!(ctor.facts.throws, vec!["IllegalArgumentException"]);

        let log = &units[3];
        assert_eq!(log.parameter_names(), vec!["parts"]);
        assert_eq!(log.return_type.as_deref(), Some("void"));
    }

    #[test]
    fn test_interface_method_without_body() {
        let units = extract("interface Shape {\n    double area();\n}\n");
        assert_eq!(units.len(), 2);
        assert!(units[1].body_span.is_none());
        assert_eq!(units[1].name_path, "Shape.area");
    }
}
