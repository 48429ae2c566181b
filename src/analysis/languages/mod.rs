//! Language-specific extractor implementations.

mod c_cpp;
mod java;
mod javascript;
mod python;

pub use c_cpp::CCppExtractor;
pub use java::JavaExtractor;
pub use javascript::JavaScriptExtractor;
pub use python::PythonExtractor;

use super::{Language, LanguageExtractor};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Static storage for the C/C++ extractor.
static C_CPP_EXTRACTOR: OnceCell<CCppExtractor> = OnceCell::new();

/// Static storage for the Java extractor.
static JAVA_EXTRACTOR: OnceCell<JavaExtractor> = OnceCell::new();

/// Static storage for the JavaScript/TypeScript extractor.
static JAVASCRIPT_EXTRACTOR: OnceCell<JavaScriptExtractor> = OnceCell::new();

/// Static storage for the Python extractor.
static PYTHON_EXTRACTOR: OnceCell<PythonExtractor> = OnceCell::new();

/// Whether extractors have been registered.
static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Register all available language extractors.
///
/// Idempotent; called lazily by the lookup functions.
pub fn register_extractors() {
    if REGISTERED.swap(true, Ordering::SeqCst) {
        return;
    }

    C_CPP_EXTRACTOR.get_or_init(CCppExtractor::new);
    JAVA_EXTRACTOR.get_or_init(JavaExtractor::new);
    JAVASCRIPT_EXTRACTOR.get_or_init(JavaScriptExtractor::new);
    PYTHON_EXTRACTOR.get_or_init(PythonExtractor::new);
}

/// Get the extractor for a language family.
pub fn get_extractor(language: Language) -> &'static dyn LanguageExtractor {
    match language {
        Language::CCpp => C_CPP_EXTRACTOR.get_or_init(CCppExtractor::new),
        Language::Java => JAVA_EXTRACTOR.get_or_init(JavaExtractor::new),
        Language::JavaScriptTypeScript => JAVASCRIPT_EXTRACTOR.get_or_init(JavaScriptExtractor::new),
        Language::Python => PYTHON_EXTRACTOR.get_or_init(PythonExtractor::new),
    }
}

/// Get an extractor for the given file extension.
///
/// Returns None if no extractor handles the extension.
pub fn get_extractor_for_extension(ext: &str) -> Option<&'static dyn LanguageExtractor> {
    register_extractors();
    Language::from_extension(ext).map(get_extractor)
}

/// All file extensions with a registered extractor.
pub fn registered_extensions() -> Vec<&'static str> {
    [
        Language::CCpp,
        Language::Java,
        Language::JavaScriptTypeScript,
        Language::Python,
    ]
    .into_iter()
    .flat_map(|l| get_extractor(l).file_extensions().iter().copied())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        for ext in registered_extensions() {
            let extractor = get_extractor_for_extension(ext).unwrap();
            assert!(extractor.handles_extension(ext), "{} not handled", ext);
        }
        assert!(get_extractor_for_extension("rs").is_none());
    }
}
