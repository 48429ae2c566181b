//! codedocgen - documentation comment generator.
//!
//! Finds the functions, methods and classes of Python, C/C++, Java and
//! JavaScript/TypeScript sources, synthesizes a doc comment for each, and
//! previews or applies the edits.
//!
//! # Architecture
//!
//! - `analysis`: tree-sitter based extraction of documentable units
//! - `synth`: doc synthesis (local heuristics or remote chat completions)
//! - `cache`: content-addressed cache of generated docs
//! - `plan`: insert/replace/skip decisions, diffs and atomic writes
//! - `scope`: which files and units a run covers
//! - `runner`: the engine that drives jobs on a worker pool
//! - `report`: output formatting (pretty, JSON)
//!
//! # Adding a New Language
//!
//! See `src/analysis/languages/` for examples. Implement `LanguageExtractor`
//! and register it in `languages/mod.rs`.

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod plan;
pub mod report;
pub mod runner;
pub mod scope;
pub mod synth;

pub use analysis::{
    extract, register_extractors, DocumentableUnit, Language, LanguageExtractor, ParseError,
    UnitKind,
};
pub use cache::{signature_hash, DocCache};
pub use config::{ProviderConfig, RunConfig};
pub use plan::{EditKind, FilePlan};
pub use runner::{Engine, RunReport};
pub use synth::{GeneratedDoc, LocalSynthesizer, RemoteSynthesizer, SynthesisError, Synthesizer};

/// Initialize all subsystems.
///
/// Call this once at startup.
pub fn init() {
    register_extractors();
}
