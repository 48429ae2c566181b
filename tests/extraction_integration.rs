//! Integration tests for unit extraction against the testdata fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use codedocgen::{extract, signature_hash, DocumentableUnit, Language, UnitKind};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join("repo")
        .join(name)
}

fn units_of(name: &str) -> Vec<DocumentableUnit> {
    codedocgen::init();
    let path = fixture(name);
    let source = fs::read(&path).expect("fixture should exist");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap();
    let language = Language::from_extension(ext).expect("supported extension");
    extract(&path, &source, language).expect("fixture should parse")
}

fn paths(units: &[DocumentableUnit]) -> Vec<&str> {
    units.iter().map(|u| u.name_path.as_str()).collect()
}

#[test]
fn test_javascript_fixture() {
    let units = units_of("sum.js");
    assert_eq!(paths(&units), vec!["sum", "dec", "greet"]);
    assert!(units.iter().all(|u| u.kind == UnitKind::Function));
    assert_eq!(units[1].facts.return_expr.as_deref(), Some("x - 1"));
    assert!(units[2].existing_doc.is_some());
}

#[test]
fn test_typescript_fixture() {
    let units = units_of("shapes.ts");
    assert_eq!(
        paths(&units),
        vec!["Circle", "Circle.constructor", "Circle.area", "isEven"]
    );
    assert_eq!(units[0].kind, UnitKind::Class);
    assert_eq!(units[2].kind, UnitKind::Method);
    assert_eq!(units[3].parameters[0].declared_type.as_deref(), Some("number"));
}

#[test]
fn test_java_fixture() {
    let units = units_of("Calculator.java");
    assert_eq!(
        paths(&units),
        vec!["Calculator", "Calculator.add", "Calculator.reset"]
    );
    assert_eq!(units[2].return_type.as_deref(), Some("void"));
}

#[test]
fn test_python_fixture() {
    let units = units_of("geometry.py");
    assert_eq!(paths(&units), vec!["Point", "Point.__init__", "fetch_data"]);
    // the receiver is not a documented parameter
    assert_eq!(units[1].parameter_names(), vec!["x", "y"]);
    assert_eq!(units[2].facts.throws, vec!["ValueError"]);
    assert_eq!(units[2].return_type.as_deref(), Some("dict"));
}

#[test]
fn test_cpp_fixture() {
    let units = units_of("counter.cpp");
    assert_eq!(paths(&units), vec!["Counter", "Counter.inc", "total"]);
    assert_eq!(units[1].kind, UnitKind::Method);
}

#[test]
fn test_broken_fixture_fails_whole_file() {
    codedocgen::init();
    let path = fixture("broken.py");
    let source = fs::read(&path).unwrap();
    let err = extract(&path, &source, Language::Python).unwrap_err();
    assert_eq!(err.file, path);
}

fn only_unit(path: &str, src: &str) -> DocumentableUnit {
    let ext = Path::new(path).extension().and_then(|e| e.to_str()).unwrap();
    let language = Language::from_extension(ext).unwrap();
    extract(Path::new(path), src.as_bytes(), language)
        .unwrap()
        .remove(0)
}

#[test]
fn test_signature_hash_ignores_existing_doc() {
    let plain = only_unit("m.js", "function sum(a, b) {\n    return a + b;\n}\n");
    let documented = only_unit(
        "m.js",
        "/**\n * Adds.\n */\nfunction sum(a, b) {\n    return a + b;\n}\n",
    );
    assert_eq!(signature_hash(&plain), signature_hash(&documented));

    let py_plain = only_unit("m.py", "def f(x):\n    return x\n");
    let py_doc = only_unit("m.py", "def f(x):\n    \"\"\"Doc.\"\"\"\n    return x\n");
    assert_eq!(signature_hash(&py_plain), signature_hash(&py_doc));
}

#[test]
fn test_signature_hash_tracks_signature_and_body() {
    let base = only_unit("m.js", "function sum(a, b) {\n    return a + b;\n}\n");
    let renamed_param = only_unit("m.js", "function sum(a, c) {\n    return a + c;\n}\n");
    let new_body = only_unit("m.js", "function sum(a, b) {\n    return a - b;\n}\n");
    let typed = only_unit("m.ts", "function sum(a: number, b) {\n    return a + b;\n}\n");
    let reformatted = only_unit("m.js", "function sum(a, b) {\n  return a+b;\n}\n");
    let moved = only_unit("m.js", "\n\nfunction sum(a, b) {\n    return a + b;\n}\n");

    let h = signature_hash(&base);
    assert_ne!(h, signature_hash(&renamed_param));
    assert_ne!(h, signature_hash(&new_body));
    assert_ne!(h, signature_hash(&typed));
    // content-based, not whitespace-normalised
    assert_ne!(h, signature_hash(&reformatted));
    assert_eq!(h, signature_hash(&moved));
}
