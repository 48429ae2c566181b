//! JavaScript and TypeScript unit extractor using tree-sitter.
//!
//! One extractor serves `.js`, `.ts` and `.tsx` files; the grammar is chosen
//! from the file extension at parse time.

use std::path::Path;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language as Grammar, Node, Parser, Query, QueryCursor};

use crate::analysis::units::{
    anchor_before, annotation_type, collect_facts, expression_facts, preceding_comment,
    BodyKinds, Candidate,
};
use crate::analysis::{
    units, DocumentableUnit, Language, LanguageExtractor, Parameter, ParsedFile, UnitKind,
};

const DECLARATION_QUERY: &str = r#"
(function_declaration
  name: (_) @func_name
) @function

(generator_function_declaration
  name: (_) @func_name
) @function

(class_declaration
  name: (_) @class_name
) @class

(method_definition
  name: (_) @method_name
) @method

(variable_declarator
  name: (identifier) @var_name
  value: (_) @value
) @binding
"#;

/// TypeScript adds abstract classes on top of the shared declarations.
const TS_EXTRA_QUERY: &str = r#"
(abstract_class_declaration
  name: (_) @class_name
) @class
"#;

const BODY_KINDS: BodyKinds = BodyKinds {
    returns: &["return_statement"],
    throws: &["throw_statement"],
    loops: &[
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
    ],
    conditionals: &["if_statement", "ternary_expression", "switch_statement"],
    nested: &[
        "function_declaration",
        "generator_function_declaration",
        "function_expression",
        "function",
        "arrow_function",
        "class_declaration",
        "class",
        "method_definition",
    ],
};

const FUNCTION_VALUES: &[&str] = &["arrow_function", "function_expression", "function"];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Dialect {
    JavaScript,
    TypeScript,
    Tsx,
}

impl Dialect {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "ts" | "mts" | "cts" => Dialect::TypeScript,
            "tsx" => Dialect::Tsx,
            _ => Dialect::JavaScript,
        }
    }
}

pub struct JavaScriptExtractor {
    javascript: Grammar,
    typescript: Grammar,
    tsx: Grammar,
}

impl JavaScriptExtractor {
    pub fn new() -> Self {
        Self {
            javascript: tree_sitter_javascript::LANGUAGE.into(),
            typescript: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            tsx: tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    fn grammar(&self, dialect: Dialect) -> &Grammar {
        match dialect {
            Dialect::JavaScript => &self.javascript,
            Dialect::TypeScript => &self.typescript,
            Dialect::Tsx => &self.tsx,
        }
    }

    fn create_parser(&self, dialect: Dialect) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(self.grammar(dialect))?;
        Ok(parser)
    }

    fn collect<'t>(
        &self,
        parsed: &'t ParsedFile,
        grammar: &Grammar,
        source: &str,
        candidates: &mut Vec<Candidate<'t>>,
    ) -> anyhow::Result<()> {
        let query = Query::new(grammar, source)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        while let Some(m) = matches.next() {
            let mut name = String::new();
            let mut kind = UnitKind::Function;
            let mut decl_node = None;
            let mut value_node = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "func_name" | "var_name" => {
                        name = parsed.node_text(capture.node).to_string();
                    }
                    "method_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = UnitKind::Method;
                    }
                    "class_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = UnitKind::Class;
                    }
                    "value" => value_node = Some(capture.node),
                    "function" | "class" | "method" | "binding" => {
                        decl_node = Some(capture.node)
                    }
                    _ => {}
                }
            }

            let Some(node) = decl_node else { continue };
            if name.is_empty() {
                continue;
            }

            // object literal methods have no statement of their own to document
            if kind == UnitKind::Method
                && node.parent().map(|p| p.kind()) != Some("class_body")
            {
                continue;
            }

            let candidate = match value_node {
                // `const name = <function>` binds the function to the variable name
                Some(value) if FUNCTION_VALUES.contains(&value.kind()) => binding_outer(node)
                    .and_then(|outer| self.candidate(parsed, outer, value, name, kind)),
                Some(_) => None,
                None => self.candidate(parsed, export_outer(node), node, name, kind),
            };
            if let Some(c) = candidate {
                candidates.push(c);
            }
        }

        Ok(())
    }

    fn candidate<'t>(
        &self,
        parsed: &ParsedFile,
        outer: Node<'t>,
        func: Node<'t>,
        name: String,
        kind: UnitKind,
    ) -> Option<Candidate<'t>> {
        let body = func.child_by_field_name("body");

        let (parameters, return_type, facts) = if kind == UnitKind::Class {
            (Vec::new(), None, Default::default())
        } else {
            let parameters = match func.child_by_field_name("parameters") {
                Some(params) => extract_parameters(parsed, params),
                // single unparenthesised arrow parameter
                None => func
                    .child_by_field_name("parameter")
                    .map(|p| vec![Parameter::new(parsed.node_text(p))])
                    .unwrap_or_default(),
            };
            let return_type = func
                .child_by_field_name("return_type")
                .map(|t| annotation_type(parsed.node_text(t)));
            let facts = match body {
                Some(b) if b.kind() == "statement_block" => collect_facts(parsed, b, &BODY_KINDS),
                Some(expr) => expression_facts(parsed, expr),
                None => Default::default(),
            };
            (parameters, return_type, facts)
        };

        let head = decorated_start(outer);
        Some(Candidate {
            kind,
            name,
            qualifier: None,
            outer,
            body,
            parameters,
            return_type,
            existing_doc: preceding_comment(parsed, head, |text| text.starts_with("/**")),
            anchor: anchor_before(parsed, head),
            facts,
        })
    }
}

impl Default for JavaScriptExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageExtractor for JavaScriptExtractor {
    fn language(&self) -> Language {
        Language::JavaScriptTypeScript
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs", "ts", "mts", "cts", "tsx"]
    }

    fn parse(&self, path: &Path, source: &[u8]) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser(Dialect::from_path(path))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse JavaScript/TypeScript file"))?;

        Ok(ParsedFile {
            tree,
            source: source.to_vec(),
            path: path.to_string_lossy().to_string(),
        })
    }

    fn extract_units(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<DocumentableUnit>> {
        let dialect = Dialect::from_path(Path::new(&parsed.path));
        let grammar = self.grammar(dialect);

        let mut candidates = Vec::new();
        self.collect(parsed, grammar, DECLARATION_QUERY, &mut candidates)?;
        if dialect != Dialect::JavaScript {
            self.collect(parsed, grammar, TS_EXTRA_QUERY, &mut candidates)?;
        }

        Ok(units::assemble(
            parsed,
            Language::JavaScriptTypeScript,
            candidates,
        ))
    }
}

/// Declarations may be wrapped in `export` / `export default`.
fn export_outer(node: Node) -> Node {
    match node.parent() {
        Some(p) if p.kind() == "export_statement" => p,
        _ => node,
    }
}

/// The `const`/`let`/`var` statement owning a single declarator.
///
/// Statements declaring several bindings yield None.
fn binding_outer(declarator: Node) -> Option<Node> {
    let statement = declarator.parent()?;
    if matches!(
        statement.kind(),
        "lexical_declaration" | "variable_declaration"
    ) && statement.named_child_count() == 1
    {
        Some(export_outer(statement))
    } else {
        None
    }
}

/// First of the decorators stacked directly above a class member.
fn decorated_start(node: Node) -> Node {
    let mut first = node;
    while let Some(prev) = first.prev_sibling() {
        if prev.kind() != "decorator" {
            break;
        }
        first = prev;
    }
    first
}

fn extract_parameters(parsed: &ParsedFile, params: Node) -> Vec<Parameter> {
    let mut out = Vec::new();
    let mut cursor = params.walk();

    for child in params.named_children(&mut cursor) {
        let param = match child.kind() {
            "identifier" | "object_pattern" | "array_pattern" => {
                Parameter::new(parsed.node_text(child))
            }
            "rest_pattern" => Parameter::new(parsed.node_text(child)),
            "assignment_pattern" => Parameter {
                name: child
                    .child_by_field_name("left")
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default(),
                declared_type: None,
                default_present: true,
            },
            // TypeScript
            "required_parameter" | "optional_parameter" => Parameter {
                name: child
                    .child_by_field_name("pattern")
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default(),
                declared_type: child
                    .child_by_field_name("type")
                    .map(|t| annotation_type(parsed.node_text(t))),
                default_present: child.kind() == "optional_parameter"
                    || child.child_by_field_name("value").is_some(),
            },
            _ => continue,
        };
        if !param.name.is_empty() {
            out.push(param);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(path: &str, src: &str) -> Vec<DocumentableUnit> {
        let extractor = JavaScriptExtractor::new();
        let parsed = extractor.parse(Path::new(path), src.as_bytes()).unwrap();
        parsed.check_syntax().unwrap();
        extractor.extract_units(&parsed).unwrap()
    }

    #[test]
    fn test_arrow_function_binding() {
        let units = extract("utils.js", "const dec = x => x - 1;\n");
        assert_eq!(units.len(), 1);
        let dec = &units[0];
        assert_eq!(dec.name, "dec");
        assert_eq!(dec.kind, UnitKind::Function);
        assert_eq!(dec.parameter_names(), vec!["x"]);
        assert_eq!(dec.facts.return_expr.as_deref(), Some("x - 1"));
        assert_eq!(dec.decl_span.start_byte, 0);
    }

    #[test]
    fn test_function_expression_and_class() {
        let units = extract(
            "utils.js",
            r#"
const multiply = function (a, b = 2) { return a * b; };

export class Utils {
  static add(a, b) { return a + b; }
}
"#,
        );
        let paths: Vec<_> = units.iter().map(|u| u.name_path.as_str()).collect();
        assert_eq!(paths, vec!["multiply", "Utils", "Utils.add"]);
        assert!(units[0].parameters[1].default_present);
        assert_eq!(units[1].kind, UnitKind::Class);
        assert_eq!(units[2].kind, UnitKind::Method);
        // export wrapper is part of the class declaration
        assert!(units[1].signature.starts_with("export class Utils"));
    }

    #[test]
    fn test_existing_jsdoc() {
        let src = "/**\n * Old.\n */\nfunction sum(a, b) { return a + b; }\n";
        let units = extract("a.js", src);
        let doc = units[0].existing_doc.as_ref().unwrap();
        assert!(doc.text.starts_with("/**"));
        assert_eq!(doc.span.start_byte, 0);
    }

    #[test]
    fn test_plain_comment_is_not_doc() {
        let units = extract("a.js", "// helper\nfunction sum(a, b) { return a + b; }\n");
        assert!(units[0].existing_doc.is_none());
    }

    #[test]
    fn test_typescript_parameters() {
        let units = extract(
            "utils.ts",
            "export function scale(v: number, by?: number): number {\n  return v * (by ?? 1);\n}\n",
        );
        let scale = &units[0];
        assert_eq!(scale.parameters[0].declared_type.as_deref(), Some("number"));
        assert!(scale.parameters[1].default_present);
        assert_eq!(scale.return_type.as_deref(), Some("number"));
    }

    #[test]
    fn test_decorated_method_anchors_above_decorator() {
        let src = "class Service {\n  @Get()\n  find(id: string) { return id; }\n}\n";
        let units = extract("service.ts", src);
        let find = &units[1];
        assert_eq!(find.name_path, "Service.find");
        assert_eq!(find.anchor.start, src.find("  @Get()").unwrap());
        assert_eq!(find.anchor.indent, "  ");

        let documented =
            "class Service {\n  /**\n   * Finds.\n   */\n  @Get()\n  find(id: string) { return id; }\n}\n";
        let units = extract("service.ts", documented);
        let doc = units[1].existing_doc.as_ref().unwrap();
        assert!(doc.text.contains("Finds."));
    }

    #[test]
    fn test_multi_declarator_binding_skipped() {
        let units = extract("a.js", "const a = () => 1, b = (y) => y;\nconst c = () => 2;\n");
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
    }

    #[test]
    fn test_object_literal_method_skipped() {
        let units = extract(
            "a.js",
            "const ops = {\n  inc(x) { return x + 1; },\n};\nclass K {\n  inc(x) { return x + 1; }\n}\n",
        );
        let paths: Vec<_> = units.iter().map(|u| u.name_path.as_str()).collect();
        assert_eq!(paths, vec!["K", "K.inc"]);
    }

    #[test]
    fn test_non_function_binding_ignored() {
        let units = extract("a.js", "const limit = 10;\nconst inc = x => x + 1;\n");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "inc");
    }
}
