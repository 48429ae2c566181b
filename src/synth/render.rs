//! Formatting of [`DocContent`] in each language's doc comment convention.
//!
//! - Python: `"""` docstring with reST fields
//! - JavaScript/TypeScript: JSDoc
//! - Java: Javadoc
//! - C/C++: Doxygen

use crate::analysis::{collapse_whitespace, DocumentableUnit, Language};

use super::DocContent;

/// Render doc content for a unit. The result carries no indentation.
pub fn render(unit: &DocumentableUnit, content: &DocContent) -> String {
    match unit.language {
        Language::Python => render_docstring(content),
        Language::JavaScriptTypeScript => render_block(unit, content, Tags::JsDoc),
        Language::Java => render_block(unit, content, Tags::Javadoc),
        Language::CCpp => render_block(unit, content, Tags::Doxygen),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tags {
    JsDoc,
    Javadoc,
    Doxygen,
}

fn render_block(unit: &DocumentableUnit, content: &DocContent, tags: Tags) -> String {
    let mut lines = vec!["/**".to_string()];

    let summary = block_text(&content.summary);
    if tags == Tags::Doxygen {
        lines.push(format!(" * \\brief {}", summary));
    } else {
        lines.push(format!(" * {}", summary));
    }
    if let Some(details) = content.details.as_deref().filter(|d| !d.trim().is_empty()) {
        lines.push(" *".to_string());
        lines.push(format!(" * {}", block_text(details)));
    }

    let mut tag_lines = Vec::new();
    for param in &content.params {
        let desc = block_text(&param.description);
        let declared = unit
            .parameters
            .iter()
            .find(|p| p.name == param.name)
            .and_then(|p| p.declared_type.as_deref());
        tag_lines.push(match (tags, declared) {
            (Tags::JsDoc, Some(ty)) => format!("@param {{{}}} {} - {}", ty, param.name, desc),
            (Tags::JsDoc, None) => format!("@param {} - {}", param.name, desc),
            (Tags::Javadoc, _) => format!("@param {} {}", param.name, desc),
            (Tags::Doxygen, _) => format!("\\param {} {}", param.name, desc),
        });
    }
    if let Some(returns) = &content.returns {
        let desc = block_text(returns);
        let ty = unit.return_type.as_deref().filter(|t| !is_void(t));
        tag_lines.push(match (tags, ty) {
            (Tags::JsDoc, Some(ty)) => format!("@returns {{{}}} {}", ty, desc),
            (Tags::JsDoc, None) => format!("@returns {}", desc),
            (Tags::Javadoc, _) => format!("@return {}", desc),
            (Tags::Doxygen, _) => format!("\\return {}", desc),
        });
    }
    for thrown in &content.throws {
        let desc = block_text(&thrown.description);
        tag_lines.push(match tags {
            Tags::JsDoc => format!("@throws {{{}}} {}", thrown.name, desc),
            Tags::Javadoc => format!("@throws {} {}", thrown.name, desc),
            Tags::Doxygen => format!("\\throws {} {}", thrown.name, desc),
        });
    }

    if !tag_lines.is_empty() && tags != Tags::Doxygen {
        lines.push(" *".to_string());
    }
    lines.extend(tag_lines.into_iter().map(|t| format!(" * {}", t)));
    lines.push(" */".to_string());
    lines.join("\n")
}

fn render_docstring(content: &DocContent) -> String {
    let summary = docstring_text(&content.summary);
    let details = content
        .details
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(docstring_text);

    let mut fields = Vec::new();
    for param in &content.params {
        fields.push(format!(
            ":param {}: {}",
            param.name.trim_start_matches('*'),
            docstring_text(&param.description)
        ));
    }
    if let Some(returns) = &content.returns {
        fields.push(format!(":return: {}", docstring_text(returns)));
    }
    for thrown in &content.throws {
        fields.push(format!(
            ":raises {}: {}",
            thrown.name,
            docstring_text(&thrown.description)
        ));
    }

    if details.is_none() && fields.is_empty() {
        return format!("\"\"\"{}\"\"\"", summary);
    }

    let mut lines = vec![format!("\"\"\"{}", summary)];
    if let Some(details) = details {
        lines.push(String::new());
        lines.push(details);
    }
    if !fields.is_empty() {
        lines.push(String::new());
        lines.extend(fields);
    }
    lines.push("\"\"\"".to_string());
    lines.join("\n")
}

/// Single-line text that cannot terminate a block comment.
fn block_text(text: &str) -> String {
    collapse_whitespace(text).replace("*/", "*\\/")
}

/// Single-line text that cannot terminate a docstring.
fn docstring_text(text: &str) -> String {
    collapse_whitespace(text)
        .replace('\\', "\\\\")
        .replace("\"\"\"", "\\\"\\\"\\\"")
}

pub(crate) fn is_void(type_name: &str) -> bool {
    matches!(type_name.trim(), "void" | "None" | "Void" | "undefined" | "never")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{extract, Language};
    use crate::synth::{ParamDoc, ThrowsDoc};
    use std::path::Path;

    fn unit(path: &str, src: &str) -> DocumentableUnit {
        let ext = Path::new(path).extension().unwrap().to_str().unwrap();
        let lang = Language::from_extension(ext).unwrap();
        extract(Path::new(path), src.as_bytes(), lang)
            .unwrap()
            .remove(0)
    }

    fn content() -> DocContent {
        DocContent {
            summary: "Adds two numbers.".to_string(),
            details: None,
            params: vec![
                ParamDoc {
                    name: "a".to_string(),
                    description: "The first operand.".to_string(),
                },
                ParamDoc {
                    name: "b".to_string(),
                    description: "The second operand.".to_string(),
                },
            ],
            returns: Some("The sum of a and b.".to_string()),
            throws: vec![],
        }
    }

    #[test]
    fn test_render_jsdoc() {
        let u = unit("a.ts", "function add(a: number, b) { return a + b; }\n");
        let text = render(&u, &content());
        assert_eq!(
            text,
            "/**\n * Adds two numbers.\n *\n * @param {number} a - The first operand.\n * @param b - The second operand.\n * @returns The sum of a and b.\n */"
        );
    }

    #[test]
    fn test_render_javadoc_with_throws() {
        let u = unit(
            "A.java",
            "class A { int add(int a, int b) { return a + b; } }\n",
        );
        let mut c = content();
        c.throws.push(ThrowsDoc {
            name: "IllegalStateException".to_string(),
            description: "Thrown when IllegalStateException occurs.".to_string(),
        });
        let text = render(&u, &c);
        assert!(text.contains(" * @param a The first operand."));
        assert!(text.contains(" * @return The sum of a and b."));
        assert!(text.contains(" * @throws IllegalStateException Thrown when"));
    }

    #[test]
    fn test_render_doxygen() {
        let u = unit("m.cpp", "int add(int a, int b) { return a + b; }\n");
        let text = render(&u, &content());
        assert!(text.starts_with("/**\n * \\brief Adds two numbers.\n * \\param a"));
        assert!(text.ends_with(" * \\return The sum of a and b.\n */"));
    }

    #[test]
    fn test_render_docstring() {
        let u = unit("m.py", "def add(a, b):\n    return a + b\n");
        let text = render(&u, &content());
        assert_eq!(
            text,
            "\"\"\"Adds two numbers.\n\n:param a: The first operand.\n:param b: The second operand.\n:return: The sum of a and b.\n\"\"\""
        );
    }

    #[test]
    fn test_render_summary_only_docstring() {
        let u = unit("m.py", "class Box:\n    pass\n");
        let c = DocContent {
            summary: "Defines the Box class.".to_string(),
            ..Default::default()
        };
        assert_eq!(render(&u, &c), "\"\"\"Defines the Box class.\"\"\"");
    }

    #[test]
    fn test_block_text_escapes_terminator() {
        assert_eq!(block_text("a */ b"), "a *\\/ b");
    }
}
