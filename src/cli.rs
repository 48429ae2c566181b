//! Command-line interface for codedocgen.

use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::{ConfigFile, OutputFormat, OutputMode, ProviderKind, RunConfig};
use crate::report;
use crate::runner::Engine;
use crate::scope::LineRange;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 2;

/// Documentation generator for Python, C/C++, Java and JavaScript/TypeScript.
///
/// Finds functions, methods and classes, writes a doc comment for each in
/// the language's own convention, and either previews the changes as a
/// unified diff or applies them in place.
#[derive(Parser, Debug)]
#[command(name = "codedocgen")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Repository root; base of file identities and workspace walks
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Files to document (comma separated); default: the whole repository
    #[arg(long, value_delimiter = ',')]
    pub files: Vec<PathBuf>,

    /// Restrict to a line range <start>:<end> of a single file
    #[arg(long)]
    pub selection: Option<String>,

    /// Allow a remote AI provider
    #[arg(long)]
    pub enable_ai: bool,

    /// Provider: nltk (local), groq, openai, or azure_openai
    #[arg(long)]
    pub ai_provider: Option<String>,

    /// Path to a clang front-end (C/C++ parsing uses the built-in grammar)
    #[arg(long)]
    pub clang_path: Option<PathBuf>,

    /// Number of files processed in parallel
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Reuse previously generated docs
    #[arg(long)]
    pub enable_cache: bool,

    /// Cache directory (default: platform cache dir)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Delete stale cache entries of the processed files after the run
    #[arg(long)]
    pub prune_cache: bool,

    /// Preview changes as a unified diff (default)
    #[arg(long, conflicts_with = "inplace")]
    pub diff: bool,

    /// Write changes to the files
    #[arg(long)]
    pub inplace: bool,

    /// Path to config YAML file (default: auto-discover in the repository root)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Summary format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Model name for remote providers
    #[arg(long)]
    pub model: Option<String>,

    /// Completion token limit for remote providers
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Doc style: concise or detailed
    #[arg(long)]
    pub style: Option<String>,

    /// Per-request timeout for remote providers
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Azure OpenAI resource endpoint
    #[arg(long)]
    pub azure_endpoint: Option<String>,

    /// Azure OpenAI deployment name
    #[arg(long)]
    pub azure_deployment: Option<String>,

    /// Azure OpenAI API version
    #[arg(long)]
    pub azure_api_version: Option<String>,

    /// Azure auth method: api_key, azure_cli, or managed_identity
    #[arg(long)]
    pub azure_auth: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Resolve flags, config file and defaults into one run configuration.
///
/// CLI flags take precedence over the config file.
pub fn build_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let mut config = RunConfig::new(&cli.repo);

    let config_path = match &cli.config {
        Some(p) => Some(p.clone()),
        None => ConfigFile::discover(&cli.repo),
    };
    if let Some(path) = config_path {
        debug!("loading config {}", path.display());
        ConfigFile::parse_file(&path)?.apply_to(&mut config);
    }

    config.files = cli.files.clone();
    if let Some(selection) = &cli.selection {
        config.selection = Some(selection.parse::<LineRange>()?);
    }

    let provider = &mut config.provider;
    if cli.enable_ai {
        provider.ai_enabled = true;
    }
    if let Some(name) = &cli.ai_provider {
        provider.provider = name.parse::<ProviderKind>()?;
    }
    if cli.model.is_some() {
        provider.model = cli.model.clone();
    }
    if let Some(v) = cli.max_tokens {
        provider.max_tokens = v;
    }
    if let Some(style) = &cli.style {
        provider.style = style.parse()?;
    }
    if let Some(v) = cli.timeout_secs {
        provider.timeout_secs = v;
    }
    if cli.azure_endpoint.is_some() {
        provider.endpoint = cli.azure_endpoint.clone();
    }
    if cli.azure_deployment.is_some() {
        provider.deployment = cli.azure_deployment.clone();
    }
    if let Some(v) = &cli.azure_api_version {
        provider.api_version = v.clone();
    }
    if let Some(method) = &cli.azure_auth {
        provider.auth_method = method.parse()?;
    }

    if cli.clang_path.is_some() {
        config.clang_path = cli.clang_path.clone();
    }
    if let Some(n) = cli.max_workers {
        config.max_workers = n;
    }
    if cli.enable_cache {
        config.cache.enabled = true;
    }
    if cli.cache_dir.is_some() {
        config.cache.dir = cli.cache_dir.clone();
    }
    config.cache.prune = cli.prune_cache;

    config.mode = if cli.inplace {
        OutputMode::InPlace
    } else {
        OutputMode::Diff
    };
    config.format = cli.format.parse::<OutputFormat>()?;
    config.progress = !cli.quiet;

    config.validate()?;
    Ok(config)
}

/// Run the generator and print the results.
pub fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config = build_config(cli)?;
    let format = config.format;
    let mode = config.mode;

    let engine = Engine::new(config)?;
    let report = engine.run()?;
    info!(
        "{} units, {} edits, {} failures",
        report.totals.units,
        report.totals.edits,
        report.failures.len()
    );

    match (format, mode) {
        (OutputFormat::Json, _) => report::write_json(&report)?,
        (OutputFormat::Pretty, OutputMode::Diff) => {
            // stdout carries only the diff
            report::write_diff(&report)?;
            report::write_pretty(&report, &mut io::stderr().lock())?;
        }
        (OutputFormat::Pretty, OutputMode::InPlace) => {
            report::ignore_broken_pipe(report::write_pretty(&report, &mut io::stdout().lock()))?;
        }
    }

    Ok(EXIT_SUCCESS)
}
