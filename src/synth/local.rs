//! Offline heuristic provider.
//!
//! Builds doc content from the unit's identifier, parameters, declared types
//! and body facts. Output is deterministic for a given unit.

use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;

use crate::analysis::{DocumentableUnit, Language, Parameter, UnitKind};
use crate::cache::signature_hash;
use crate::config::DocStyle;

use super::render::{self, is_void};
use super::{DocContent, GeneratedDoc, ParamDoc, SynthesisError, Synthesizer, ThrowsDoc};

pub const LOCAL_PROVIDER_ID: &str = "local";

/// Leading identifier words and the verb that opens the summary.
static VERBS: phf::Map<&'static str, &'static str> = phf_map! {
    "get" => "retrieves",
    "set" => "sets",
    "add" => "adds",
    "remove" => "removes",
    "delete" => "deletes",
    "create" => "creates",
    "update" => "updates",
    "validate" => "validates",
    "compute" => "computes",
    "calculate" => "calculates",
    "calc" => "calculates",
    "process" => "processes",
    "handle" => "handles",
    "parse" => "parses",
    "format" => "formats",
    "convert" => "converts",
    "transform" => "transforms",
    "filter" => "filters",
    "sort" => "sorts",
    "find" => "finds",
    "search" => "searches",
    "load" => "loads",
    "save" => "saves",
    "read" => "reads",
    "write" => "writes",
    "send" => "sends",
    "receive" => "receives",
    "connect" => "connects",
    "disconnect" => "disconnects",
    "start" => "starts",
    "stop" => "stops",
    "init" => "initializes",
    "initialize" => "initializes",
    "reset" => "resets",
    "clear" => "clears",
    "copy" => "copies",
    "move" => "moves",
    "merge" => "merges",
    "split" => "splits",
    "join" => "joins",
    "reverse" => "reverses",
    "rotate" => "rotates",
    "shuffle" => "shuffles",
    "randomize" => "randomizes",
    "encrypt" => "encrypts",
    "decrypt" => "decrypts",
    "hash" => "hashes",
    "encode" => "encodes",
    "decode" => "decodes",
    "compress" => "compresses",
    "decompress" => "decompresses",
    "serialize" => "serializes",
    "deserialize" => "deserializes",
    "export" => "exports",
    "import" => "imports",
    "generate" => "generates",
    "build" => "builds",
    "compile" => "compiles",
    "link" => "links",
    "install" => "installs",
    "uninstall" => "uninstalls",
    "configure" => "configures",
    "setup" => "sets up",
    "teardown" => "tears down",
    "cleanup" => "cleans up",
    "finalize" => "finalizes",
    "destroy" => "destroys",
    "release" => "releases",
    "allocate" => "allocates",
    "deallocate" => "deallocates",
    "free" => "frees",
    "lock" => "locks",
    "unlock" => "unlocks",
    "acquire" => "acquires",
    "wait" => "waits for",
    "notify" => "notifies",
    "signal" => "signals",
    "broadcast" => "broadcasts",
    "subscribe" => "subscribes to",
    "unsubscribe" => "unsubscribes from",
    "publish" => "publishes",
    "consume" => "consumes",
    "produce" => "produces",
    "buffer" => "buffers",
    "cache" => "caches",
    "flush" => "flushes",
    "sync" => "synchronizes",
    "queue" => "queues",
    "enqueue" => "enqueues",
    "dequeue" => "dequeues",
    "pop" => "pops",
    "push" => "pushes",
    "peek" => "peeks at",
    "poll" => "polls",
    "offer" => "offers",
    "take" => "takes",
    "put" => "puts",
    "fetch" => "fetches",
    "check" => "checks",
    "compare" => "compares",
    "count" => "counts",
    "print" => "prints",
    "render" => "renders",
    "apply" => "applies",
    "run" => "runs",
    "execute" => "executes",
    "make" => "makes",
    "greet" => "greets",
    "clamp" => "clamps",
    "scale" => "scales",
    "multiply" => "multiplies",
    "divide" => "divides",
    "subtract" => "subtracts",
    "inc" => "increments",
    "increment" => "increments",
    "dec" => "decrements",
    "decrement" => "decrements",
    "double" => "doubles",
    "log" => "logs",
    "register" => "registers",
    "resolve" => "resolves",
    "open" => "opens",
    "close" => "closes",
    "emit" => "emits",
    "dispatch" => "dispatches",
    "map" => "maps",
    "reduce" => "reduces",
    "normalize" => "normalizes",
    "sanitize" => "sanitizes",
    "ensure" => "ensures",
    "collect" => "collects",
    "extract" => "extracts",
    "draw" => "draws",
    "show" => "shows",
    "hide" => "hides",
    "toggle" => "toggles",
    "enable" => "enables",
    "disable" => "disables",
};

/// Leading identifier words naming an aggregate result.
static AGGREGATES: phf::Map<&'static str, &'static str> = phf_map! {
    "sum" => "sum",
    "total" => "total",
    "diff" => "difference",
    "difference" => "difference",
    "product" => "product",
    "quotient" => "quotient",
    "max" => "maximum",
    "maximum" => "maximum",
    "min" => "minimum",
    "minimum" => "minimum",
    "avg" => "average",
    "average" => "average",
    "mean" => "mean",
};

/// Declared type names and how a value of that type reads.
static TYPE_DESCRIPTIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "int" => "an integer value",
    "integer" => "an integer value",
    "long" => "an integer value",
    "short" => "an integer value",
    "size_t" => "a size value",
    "float" => "a floating-point number",
    "double" => "a double-precision floating-point number",
    "number" => "a numeric value",
    "char" => "a character",
    "string" => "a string value",
    "str" => "a string value",
    "bool" => "a boolean value",
    "boolean" => "a boolean value",
    "list" => "a list of values",
    "array" => "an array of values",
    "dict" => "a dictionary of key-value pairs",
    "map" => "a map of key-value pairs",
    "tuple" => "a tuple of values",
    "set" => "a set of unique values",
    "bytes" => "bytes data",
    "object" => "an object instance",
    "any" => "a value of any type",
};

lazy_static! {
    static ref BINARY_EXPR: Regex = Regex::new(
        r"^\(?\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*([-+*/%])\s*([A-Za-z_$][A-Za-z0-9_$]*|\d+(?:\.\d+)?)\s*\)?;?$"
    )
    .unwrap();
}

/// Arithmetic shape of a returned expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Arithmetic {
    Increment(String),
    Decrement(String),
    Binary {
        op: char,
        left: String,
        right: String,
    },
}

impl Arithmetic {
    fn detect(unit: &DocumentableUnit) -> Option<Self> {
        let expr = unit.facts.return_expr.as_deref()?;
        let caps = BINARY_EXPR.captures(expr.trim())?;
        let left = caps.get(1)?.as_str().to_string();
        let op = caps.get(2)?.as_str().chars().next()?;
        let right = caps.get(3)?.as_str().to_string();
        let is_param = |n: &str| unit.parameters.iter().any(|p| p.name == n);

        if !is_param(&left) {
            return None;
        }
        match (op, right.as_str()) {
            ('+', "1") => Some(Arithmetic::Increment(left)),
            ('-', "1") => Some(Arithmetic::Decrement(left)),
            _ if is_param(&right) => Some(Arithmetic::Binary { op, left, right }),
            _ => None,
        }
    }
}

fn operation_noun(op: char) -> &'static str {
    match op {
        '+' => "sum",
        '-' => "difference",
        '*' => "product",
        '/' => "quotient",
        _ => "remainder",
    }
}

/// Heuristic synthesizer that needs no network or credentials.
pub struct LocalSynthesizer {
    style: DocStyle,
}

impl LocalSynthesizer {
    pub fn new(style: DocStyle) -> Self {
        Self { style }
    }

    /// Build the language-neutral content for a unit.
    pub fn describe(&self, unit: &DocumentableUnit) -> DocContent {
        if unit.kind == UnitKind::Class {
            return DocContent {
                summary: format!("Defines the {} class.", unit.name),
                ..Default::default()
            };
        }

        let arithmetic = Arithmetic::detect(unit);
        let constructor = is_constructor(unit);

        let summary = match (&arithmetic, &constructor) {
            (_, Some(class)) => format!("Initializes a new {} instance.", class),
            (Some(Arithmetic::Increment(x)), _) => format!("Increments {} by one.", x),
            (Some(Arithmetic::Decrement(x)), _) => format!("Decrements {} by one.", x),
            _ => summary_from_name(unit),
        };

        let details = match self.style {
            DocStyle::Detailed => behavior_sentence(unit, arithmetic.is_some()),
            DocStyle::Concise => None,
        };

        let params = unit
            .parameters
            .iter()
            .map(|p| ParamDoc {
                name: p.name.clone(),
                description: describe_parameter(p, arithmetic.as_ref()),
            })
            .collect();

        let returns = if constructor.is_some() {
            None
        } else {
            describe_return(unit, arithmetic.as_ref())
        };

        let verb = if unit.language == Language::Python {
            "Raised"
        } else {
            "Thrown"
        };
        let throws = unit
            .facts
            .throws
            .iter()
            .map(|name| ThrowsDoc {
                name: name.clone(),
                description: format!("{} when {} occurs.", verb, name),
            })
            .collect();

        DocContent {
            summary,
            details,
            params,
            returns,
            throws,
        }
    }
}

impl Synthesizer for LocalSynthesizer {
    fn provider_id(&self) -> &str {
        LOCAL_PROVIDER_ID
    }

    fn fingerprint(&self) -> String {
        format!("{}:{}", LOCAL_PROVIDER_ID, self.style.as_str())
    }

    fn synthesize(&self, unit: &DocumentableUnit) -> Result<GeneratedDoc, SynthesisError> {
        let content = self.describe(unit);
        Ok(GeneratedDoc {
            text: render::render(unit, &content),
            provider_id: LOCAL_PROVIDER_ID.to_string(),
            signature_hash: signature_hash(unit),
        })
    }
}

/// The owning class name when the unit is a constructor.
fn is_constructor(unit: &DocumentableUnit) -> Option<String> {
    if unit.kind != UnitKind::Method && unit.name != "__init__" {
        return None;
    }
    let class = unit
        .name_path
        .rsplit_once('.')
        .map(|(owner, _)| owner.rsplit('.').next().unwrap_or(owner).to_string());

    let is_ctor = match unit.language {
        Language::Python => unit.name == "__init__",
        Language::JavaScriptTypeScript => unit.name == "constructor",
        Language::Java | Language::CCpp => class.as_deref() == Some(unit.name.as_str()),
    };
    if is_ctor {
        Some(class.unwrap_or_else(|| "object".to_string()))
    } else {
        None
    }
}

fn summary_from_name(unit: &DocumentableUnit) -> String {
    let words = split_words(&unit.name);
    let params: Vec<&str> = unit.parameters.iter().map(|p| display_name(&p.name)).collect();
    let Some(first) = words.first() else {
        return format!("Performs the {} operation.", unit.name);
    };
    let rest = words[1..].join(" ");

    if let Some(noun) = AGGREGATES.get(first.as_str()) {
        return if params.is_empty() {
            format!("Calculates the {}.", noun)
        } else {
            format!("Calculates the {} of {}.", noun, human_join(&params))
        };
    }

    match first.as_str() {
        "is" | "has" | "can" | "should" if !rest.is_empty() => {
            let subject = if params.is_empty() {
                "the value".to_string()
            } else {
                human_join(&params)
            };
            let verb = match first.as_str() {
                "is" => "is",
                "has" => "has",
                other => other,
            };
            return format!("Checks whether {} {} {}.", subject, verb, rest);
        }
        _ => {}
    }

    if let Some(verb) = VERBS.get(first.as_str()) {
        let sentence = match (rest.is_empty(), params.is_empty()) {
            (false, false) => format!("{} the {} based on {}", verb, rest, human_join(&params)),
            (false, true) => format!("{} the {}", verb, rest),
            (true, false) => format!("{} {}", verb, human_join(&params)),
            (true, true) => format!("{} the value", verb),
        };
        return format!("{}.", capitalize(&sentence));
    }

    format!("Performs the {} operation.", words.join(" "))
}

fn behavior_sentence(unit: &DocumentableUnit, arithmetic: bool) -> Option<String> {
    let facts = &unit.facts;
    let mut behaviors = Vec::new();
    if facts.has_loops {
        behaviors.push("iterates over data");
    }
    if facts.has_conditionals {
        behaviors.push("conditionally processes input");
    }
    if !facts.throws.is_empty() {
        behaviors.push("may throw exceptions");
    }
    if facts.early_return {
        behaviors.push("may return early");
    }
    if arithmetic {
        behaviors.push("performs arithmetic operations");
    }
    if behaviors.is_empty() {
        return None;
    }
    Some(format!("{}.", capitalize(&human_join(&behaviors))))
}

fn describe_parameter(param: &Parameter, arithmetic: Option<&Arithmetic>) -> String {
    match arithmetic {
        Some(Arithmetic::Increment(x)) if *x == param.name => {
            return "The value to increment.".to_string()
        }
        Some(Arithmetic::Decrement(x)) if *x == param.name => {
            return "The value to decrement.".to_string()
        }
        Some(Arithmetic::Binary { left, right, .. }) if left == right && *left == param.name => {
            return "The operand.".to_string()
        }
        Some(Arithmetic::Binary { left, .. }) if *left == param.name => {
            return "The first operand.".to_string()
        }
        Some(Arithmetic::Binary { right, .. }) if *right == param.name => {
            return "The second operand.".to_string()
        }
        _ => {}
    }

    if param.name.starts_with("**") {
        return "Additional keyword arguments.".to_string();
    }
    if param.name.starts_with('*') || param.name.starts_with("...") {
        return "Additional arguments.".to_string();
    }

    let name = display_name(&param.name);
    let optional = if param.default_present { " (optional)" } else { "" };
    match param.declared_type.as_deref() {
        Some(ty) => match type_description(ty) {
            Some(desc) => format!("The {}, {}{}.", name, desc, optional),
            None => format!("The {}, of type {}{}.", name, ty, optional),
        },
        None => format!("The {} parameter{}.", name, optional),
    }
}

fn describe_return(unit: &DocumentableUnit, arithmetic: Option<&Arithmetic>) -> Option<String> {
    if let Some(ty) = unit.return_type.as_deref() {
        if is_void(ty) {
            return None;
        }
    }

    match arithmetic {
        Some(Arithmetic::Increment(_)) => return Some("The incremented value.".to_string()),
        Some(Arithmetic::Decrement(_)) => return Some("The decremented value.".to_string()),
        Some(Arithmetic::Binary { op, left, right }) => {
            return Some(format!(
                "The {} of {} and {}.",
                operation_noun(*op),
                left,
                right
            ))
        }
        None => {}
    }

    let words = split_words(&unit.name);
    let first = words.first().map(String::as_str).unwrap_or("");
    if let Some(noun) = AGGREGATES.get(first) {
        return Some(format!("The {}.", noun));
    }
    if matches!(first, "is" | "has" | "can" | "should") {
        return Some("True or false.".to_string());
    }

    if let Some(ty) = unit.return_type.as_deref() {
        let lower = ty.to_lowercase();
        let base = lower.split(['<', '[']).next().unwrap_or(&lower).trim();
        let text = match base {
            "bool" | "boolean" => "True or false.".to_string(),
            "int" | "integer" | "long" | "short" | "size_t" => "An integer value.".to_string(),
            "float" | "double" => "A floating-point value.".to_string(),
            "number" => "A numeric value.".to_string(),
            "string" | "str" => "A string value.".to_string(),
            "list" | "array" => "A list of values.".to_string(),
            "dict" | "map" => "A dictionary of values.".to_string(),
            _ => format!("The resulting {}.", ty),
        };
        return Some(text);
    }

    unit.facts
        .returns_value
        .then(|| "The computed result.".to_string())
}

fn type_description(ty: &str) -> Option<&'static str> {
    let lower = ty.trim().to_lowercase();
    let base = lower
        .trim_start_matches("const ")
        .split(['<', '['])
        .next()
        .unwrap_or("")
        .trim();
    TYPE_DESCRIPTIONS.get(base).copied()
}

/// Split an identifier into lowercase words on `_` and case changes.
pub(crate) fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words.into_iter().map(|w| w.to_lowercase()).collect()
}

fn display_name(name: &str) -> &str {
    name.trim_start_matches('*').trim_start_matches("...")
}

fn human_join(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [one] => one.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extract;
    use std::path::Path;

    fn units(path: &str, src: &str) -> Vec<DocumentableUnit> {
        let ext = Path::new(path).extension().unwrap().to_str().unwrap();
        let lang = Language::from_extension(ext).unwrap();
        extract(Path::new(path), src.as_bytes(), lang).unwrap()
    }

    fn doc(path: &str, src: &str) -> String {
        let unit = units(path, src).remove(0);
        LocalSynthesizer::new(DocStyle::Concise)
            .synthesize(&unit)
            .unwrap()
            .text
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("fetchDataFromAPI"), vec!["fetch", "data", "from", "api"]);
        assert_eq!(split_words("parseHTTPResponse"), vec!["parse", "http", "response"]);
        assert_eq!(split_words("__init__"), vec!["init"]);
        assert_eq!(split_words("is_even"), vec!["is", "even"]);
    }

    #[test]
    fn test_sum_doc() {
        let text = doc("utils.js", "function sum(a, b) { return a + b; }\n");
        assert_eq!(
            text,
            "/**\n * Calculates the sum of a and b.\n *\n * @param a - The first operand.\n * @param b - The second operand.\n * @returns The sum of a and b.\n */"
        );
    }

    #[test]
    fn test_decrement_arrow() {
        let text = doc("utils.js", "const dec = x => x - 1;\n");
        assert!(text.contains("Decrements x by one."));
        assert!(text.contains("@param x - The value to decrement."));
        assert!(text.contains("@returns The decremented value."));
    }

    #[test]
    fn test_verb_summary_with_types() {
        let text = doc(
            "api.py",
            "def fetch_data(url: str, retries: int = 3) -> dict:\n    return {}\n",
        );
        assert!(text.starts_with("\"\"\"Fetches the data based on url and retries."));
        assert!(text.contains(":param url: The url, a string value."));
        assert!(text.contains(":param retries: The retries, an integer value (optional)."));
        assert!(text.contains(":return: A dictionary of values."));
    }

    #[test]
    fn test_predicate_and_void() {
        let text = doc("A.java", "class A { void isEven(int n) { } }\n");
        // class comes first; check the method separately
        assert!(text.contains("Defines the A class."));

        let unit = units("A.java", "class A { boolean isEven(int n) { return n % 2 == 0; } }\n")
            .remove(1);
        let content = LocalSynthesizer::new(DocStyle::Concise).describe(&unit);
        assert_eq!(content.summary, "Checks whether n is even.");
        assert_eq!(content.returns.as_deref(), Some("True or false."));

        let unit = units("A.java", "class A { void logAll(int n) { } }\n").remove(1);
        let content = LocalSynthesizer::new(DocStyle::Concise).describe(&unit);
        assert_eq!(content.returns, None);
    }

    #[test]
    fn test_constructor_doc_has_no_returns() {
        let text = doc("Box.java", "class Box {\n    Box(int size) {\n        this.size = size;\n    }\n}\n");
        assert!(text.contains("Defines the Box class."));

        let unit = units("Box.java", "class Box {\n    Box(int size) {\n        this.size = size;\n    }\n}\n")
            .remove(1);
        let content = LocalSynthesizer::new(DocStyle::Concise).describe(&unit);
        assert_eq!(content.summary, "Initializes a new Box instance.");
        assert_eq!(content.returns, None);
        assert_eq!(content.params[0].description, "The size, an integer value.");
    }

    #[test]
    fn test_constructor_and_throws() {
        let unit = units(
            "c.py",
            "class Conn:\n    def __init__(self, host):\n        if not host:\n            raise ValueError('host')\n        self.host = host\n",
        )
        .remove(1);
        let content = LocalSynthesizer::new(DocStyle::Detailed).describe(&unit);
        assert_eq!(content.summary, "Initializes a new Conn instance.");
        assert_eq!(content.returns, None);
        assert_eq!(content.throws[0].description, "Raised when ValueError occurs.");
        assert_eq!(
            content.details.as_deref(),
            Some("Conditionally processes input and may throw exceptions.")
        );
    }

    #[test]
    fn test_fallback_summary() {
        let unit = units("g.js", "function greetUser(name) { console.log(name); }\n").remove(0);
        let content = LocalSynthesizer::new(DocStyle::Concise).describe(&unit);
        assert_eq!(content.summary, "Greets the user based on name.");

        let unit = units("g.js", "function zap() {}\n").remove(0);
        let content = LocalSynthesizer::new(DocStyle::Concise).describe(&unit);
        assert_eq!(content.summary, "Performs the zap operation.");
        assert_eq!(content.returns, None);
    }

    #[test]
    fn test_deterministic() {
        let src = "def total(xs):\n    s = 0\n    for x in xs:\n        s += x\n    return s\n";
        assert_eq!(doc("t.py", src), doc("t.py", src));
    }
}
