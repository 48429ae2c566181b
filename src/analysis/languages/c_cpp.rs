//! C and C++ unit extractor using tree-sitter.
//!
//! Headers (`.h`) are parsed with the C grammar. C++ sources get free
//! functions, in-class methods, out-of-class `Foo::bar` definitions and
//! class/struct bodies.

use std::path::Path;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language as Grammar, Node, Parser, Query, QueryCursor};

use crate::analysis::units::{
    anchor_before, collapse_whitespace, collect_facts, preceding_comment,
    preceding_line_comments, BodyKinds, Candidate,
};
use crate::analysis::{
    units, DocumentableUnit, ExistingDoc, Language, LanguageExtractor, Parameter, ParsedFile,
    UnitKind,
};

const C_QUERY: &str = r#"
(function_definition
  declarator: (_) @declarator
) @function

(struct_specifier
  name: (_) @class_name
  body: (_)
) @class
"#;

const CPP_QUERY: &str = r#"
(function_definition
  declarator: (_) @declarator
) @function

(struct_specifier
  name: (_) @class_name
  body: (_)
) @class

(class_specifier
  name: (_) @class_name
  body: (_)
) @class
"#;

const BODY_KINDS: BodyKinds = BodyKinds {
    returns: &["return_statement"],
    throws: &["throw_statement"],
    loops: &[
        "for_statement",
        "for_range_loop",
        "while_statement",
        "do_statement",
    ],
    conditionals: &[
        "if_statement",
        "conditional_expression",
        "switch_statement",
    ],
    nested: &["lambda_expression", "class_specifier", "struct_specifier"],
};

/// Wrapper nodes whose start is the real start of a declaration.
const OUTER_WRAPPERS: &[&str] = &["template_declaration", "type_definition", "declaration"];

pub struct CCppExtractor {
    c: Grammar,
    cpp: Grammar,
}

impl CCppExtractor {
    pub fn new() -> Self {
        Self {
            c: tree_sitter_c::LANGUAGE.into(),
            cpp: tree_sitter_cpp::LANGUAGE.into(),
        }
    }

    fn is_c(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()).unwrap_or(""),
            "c" | "h"
        )
    }

    fn create_parser(&self, path: &Path) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        if Self::is_c(path) {
            parser.set_language(&self.c)?;
        } else {
            parser.set_language(&self.cpp)?;
        }
        Ok(parser)
    }

    fn function_candidate<'t>(
        &self,
        parsed: &ParsedFile,
        node: Node<'t>,
        declarator: Node<'t>,
    ) -> Option<Candidate<'t>> {
        let (func_decl, indirection) = find_function_declarator(declarator)?;
        let name_node = func_decl.child_by_field_name("declarator")?;
        let full_name = collapse_whitespace(parsed.node_text(name_node));

        let (qualifier, name) = match full_name.rsplit_once("::") {
            Some((scope, name)) => (Some(scope.replace("::", ".")), name.to_string()),
            None => (None, full_name),
        };

        let parameters = func_decl
            .child_by_field_name("parameters")
            .map(|p| extract_parameters(parsed, p))
            .unwrap_or_default();
        let return_type = node
            .child_by_field_name("type")
            .map(|t| format!("{}{}", collapse_whitespace(parsed.node_text(t)), indirection));
        let body = node.child_by_field_name("body");
        let facts = body
            .map(|b| collect_facts(parsed, b, &BODY_KINDS))
            .unwrap_or_default();

        let outer = outer_node(node);
        Some(Candidate {
            kind: UnitKind::Function,
            name,
            qualifier,
            outer,
            body,
            parameters,
            return_type,
            existing_doc: doc_comment(parsed, outer),
            anchor: anchor_before(parsed, outer),
            facts,
        })
    }

    fn class_candidate<'t>(
        &self,
        parsed: &ParsedFile,
        node: Node<'t>,
        name: String,
    ) -> Candidate<'t> {
        let outer = outer_node(node);
        Candidate {
            kind: UnitKind::Class,
            name,
            qualifier: None,
            outer,
            body: node.child_by_field_name("body"),
            parameters: Vec::new(),
            return_type: None,
            existing_doc: doc_comment(parsed, outer),
            anchor: anchor_before(parsed, outer),
            facts: Default::default(),
        }
    }
}

impl Default for CCppExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageExtractor for CCppExtractor {
    fn language(&self) -> Language {
        Language::CCpp
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["c", "h", "cpp", "cc", "cxx", "hpp", "hh", "hxx"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser(path)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse C/C++ file"))?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: path.to_string_lossy().to_string(),
        })
    }

    fn extract_units(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<DocumentableUnit>> {
        let (grammar, query_src) = if Self::is_c(Path::new(&parsed.path)) {
            (&self.c, C_QUERY)
        } else {
            (&self.cpp, CPP_QUERY)
        };
        let query = Query::new(grammar, query_src)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut candidates = Vec::new();
        while let Some(m) = matches.next() {
            let mut class_name = None;
            let mut declarator = None;
            let mut decl_node = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "declarator" => declarator = Some(capture.node),
                    "class_name" => class_name = Some(parsed.node_text(capture.node).to_string()),
                    "function" | "class" => decl_node = Some(capture.node),
                    _ => {}
                }
            }

            let Some(node) = decl_node else { continue };
            if let Some(declarator) = declarator {
                if let Some(c) = self.function_candidate(parsed, node, declarator) {
                    candidates.push(c);
                }
            } else if let Some(name) = class_name {
                candidates.push(self.class_candidate(parsed, node, name));
            }
        }

        Ok(units::assemble(parsed, Language::CCpp, candidates))
    }
}

/// Dig through pointer/reference declarators to the function declarator.
///
/// Returns the declarator and the indirection (`*`, `&`) it was wrapped in.
fn find_function_declarator(mut node: Node) -> Option<(Node, String)> {
    let mut indirection = String::new();
    for _ in 0..8 {
        match node.kind() {
            "function_declarator" => return Some((node, indirection)),
            "pointer_declarator" => indirection.push_str(" *"),
            "reference_declarator" => indirection.push_str(" &"),
            _ => {}
        }
        node = match node.child_by_field_name("declarator") {
            Some(next) => next,
            None => node
                .named_children(&mut node.walk())
                .find(|n| n.kind().ends_with("declarator"))?,
        };
    }
    None
}

fn outer_node(node: Node) -> Node {
    let mut outer = node;
    while let Some(parent) = outer.parent() {
        if OUTER_WRAPPERS.contains(&parent.kind()) {
            outer = parent;
        } else {
            break;
        }
    }
    outer
}

/// Doxygen `/** */` or a run of `///` lines.
fn doc_comment(parsed: &ParsedFile, node: Node) -> Option<ExistingDoc> {
    preceding_comment(parsed, node, |text| text.starts_with("/**"))
        .or_else(|| preceding_line_comments(parsed, node, "///"))
}

fn extract_parameters(parsed: &ParsedFile, params: Node) -> Vec<Parameter> {
    let mut cursor = params.walk();
    let children: Vec<Node> = params.named_children(&mut cursor).collect();

    // `f(void)` declares no parameters
    if children.len() == 1 && collapse_whitespace(parsed.node_text(children[0])) == "void" {
        return Vec::new();
    }

    let mut out = Vec::new();
    for (idx, child) in children.iter().enumerate() {
        match child.kind() {
            "parameter_declaration" | "optional_parameter_declaration" => {
                let default = child.child_by_field_name("default_value");
                let end = default
                    .map(|d| d.start_byte())
                    .unwrap_or_else(|| child.end_byte());
                let name_node = child
                    .child_by_field_name("declarator")
                    .and_then(innermost_identifier);

                let (name, declared_type) = match name_node {
                    Some(n) => {
                        let before = parsed.slice(child.start_byte(), n.start_byte());
                        let after = parsed.slice(n.end_byte(), end);
                        let ty = format!("{}{}", before, after);
                        let ty = collapse_whitespace(ty.trim_end().trim_end_matches('='));
                        (parsed.node_text(n).to_string(), ty)
                    }
                    None => (
                        format!("arg{}", idx + 1),
                        collapse_whitespace(parsed.slice(child.start_byte(), end)),
                    ),
                };
                out.push(Parameter {
                    name,
                    declared_type: (!declared_type.is_empty()).then_some(declared_type),
                    default_present: default.is_some(),
                });
            }
            "variadic_parameter" => out.push(Parameter::new("...")),
            _ => {}
        }
    }

    out
}

fn innermost_identifier(node: Node) -> Option<Node> {
    if node.kind() == "identifier" {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    children.into_iter().find_map(innermost_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(path: &str, src: &str) -> Vec<DocumentableUnit> {
        let extractor = CCppExtractor::new();
        let parsed = extractor.parse(Path::new(path), src.as_bytes()).unwrap();
        parsed.check_syntax().unwrap();
        extractor.extract_units(&parsed).unwrap()
    }

    #[test]
    fn test_c_functions() {
        let units = extract(
            "math.c",
            "int add(int a, int b) {\n    return a + b;\n}\n\nvoid reset(void) {\n}\n\nchar *dup(const char *s) {\n    return 0;\n}\n",
        );
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].name, "add");
        assert_eq!(units[0].parameter_names(), vec!["a", "b"]);
        assert!(units[1].parameters.is_empty());
        assert_eq!(units[2].return_type.as_deref(), Some("char *"));
        assert_eq!(units[2].parameters[0].declared_type.as_deref(), Some("const char *"));
    }

    #[test]
    fn test_cpp_class_and_out_of_class_method() {
        let units = extract(
            "shape.cpp",
            r#"
/// A counter.
/// Second line.
class Counter {
public:
    int next() { return ++value; }
private:
    int value = 0;
};

int Counter::reset(int to = 0) {
    return to;
}
"#,
        );

        let paths: Vec<_> = units.iter().map(|u| u.name_path.as_str()).collect();
        assert_eq!(paths, vec!["Counter", "Counter.next", "Counter.reset"]);
        assert_eq!(units[0].kind, UnitKind::Class);
        assert_eq!(units[1].kind, UnitKind::Method);
        assert_eq!(units[2].kind, UnitKind::Method);
        assert!(units[2].parameters[0].default_present);

        let doc = units[0].existing_doc.as_ref().unwrap();
        assert!(doc.text.starts_with("/// A counter."));
        assert!(doc.text.ends_with("/// Second line."));
    }

    #[test]
    fn test_doxygen_block() {
        let units = extract(
            "m.cpp",
            "/**\n * \\brief Old.\n */\ndouble half(double x) { return x / 2; }\n",
        );
        assert!(units[0].existing_doc.is_some());
        assert_eq!(units[0].facts.return_expr.as_deref(), Some("x / 2"));
    }
}
