//! Run configuration.
//!
//! Settings come from CLI flags, an optional YAML file and the environment.
//! They are resolved once into an immutable [`RunConfig`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::scope::LineRange;

/// Default config file names searched in the repository root.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &[".codedocgen.yaml", "codedocgen.yaml"];

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_MAX_DEPTH: usize = 32;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid {option} {value:?}, expected one of: {expected}")]
    InvalidValue {
        option: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Which documentation backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Offline heuristics.
    #[default]
    Nltk,
    Groq,
    Openai,
    AzureOpenai,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Nltk => "nltk",
            ProviderKind::Groq => "groq",
            ProviderKind::Openai => "openai",
            ProviderKind::AzureOpenai => "azure_openai",
        }
    }

    /// Id recorded on generated docs.
    pub fn provider_id(&self) -> &'static str {
        match self {
            ProviderKind::Nltk => "local",
            other => other.as_str(),
        }
    }

    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Nltk => None,
            ProviderKind::Groq => Some("llama-3.1-8b-instant"),
            ProviderKind::Openai => Some("gpt-4o-mini"),
            ProviderKind::AzureOpenai => Some("gpt-4"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nltk" | "local" => Ok(ProviderKind::Nltk),
            "groq" => Ok(ProviderKind::Groq),
            "openai" => Ok(ProviderKind::Openai),
            "azure_openai" | "azure" => Ok(ProviderKind::AzureOpenai),
            _ => Err(ConfigError::InvalidValue {
                option: "ai provider",
                value: s.to_string(),
                expected: "nltk, groq, openai, azure_openai",
            }),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStyle {
    #[default]
    Concise,
    Detailed,
}

impl DocStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStyle::Concise => "concise",
            DocStyle::Detailed => "detailed",
        }
    }
}

impl FromStr for DocStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concise" => Ok(DocStyle::Concise),
            "detailed" => Ok(DocStyle::Detailed),
            _ => Err(ConfigError::InvalidValue {
                option: "style",
                value: s.to_string(),
                expected: "concise, detailed",
            }),
        }
    }
}

/// How remote credentials are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    ApiKey,
    AzureCli,
    ManagedIdentity,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::ApiKey => "api_key",
            AuthMethod::AzureCli => "azure_cli",
            AuthMethod::ManagedIdentity => "managed_identity",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api_key" => Ok(AuthMethod::ApiKey),
            "azure_cli" => Ok(AuthMethod::AzureCli),
            "managed_identity" => Ok(AuthMethod::ManagedIdentity),
            _ => Err(ConfigError::InvalidValue {
                option: "auth method",
                value: s.to_string(),
                expected: "api_key, azure_cli, managed_identity",
            }),
        }
    }
}

/// Provider settings, built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    /// Whether any doc generation happens.
    pub enabled: bool,
    /// Whether a remote provider may be used.
    pub ai_enabled: bool,
    pub model: Option<String>,
    /// Azure resource endpoint.
    pub endpoint: Option<String>,
    /// Azure deployment name.
    pub deployment: Option<String>,
    pub api_version: String,
    pub auth_method: AuthMethod,
    pub api_key: Option<String>,
    /// Overrides the provider's API base URL.
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub style: DocStyle,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Nltk,
            enabled: true,
            ai_enabled: false,
            model: None,
            endpoint: None,
            deployment: None,
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            auth_method: AuthMethod::ApiKey,
            api_key: None,
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            style: DocStyle::Concise,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    /// True when a remote backend will be used.
    pub fn is_remote(&self) -> bool {
        self.ai_enabled && self.provider != ProviderKind::Nltk
    }

    pub fn provider_id(&self) -> &'static str {
        if self.is_remote() {
            self.provider.provider_id()
        } else {
            ProviderKind::Nltk.provider_id()
        }
    }

    /// Model name after applying the provider default.
    pub fn effective_model(&self) -> Option<&str> {
        self.model.as_deref().or_else(|| self.provider.default_model())
    }

    /// Azure deployment after falling back to the model name.
    pub fn effective_deployment(&self) -> Option<&str> {
        self.deployment.as_deref().or_else(|| self.effective_model())
    }

    /// Settings that change generated text.
    pub fn fingerprint(&self) -> String {
        if !self.is_remote() {
            return format!("{}:{}", self.provider_id(), self.style.as_str());
        }
        let deployment = match self.provider {
            ProviderKind::AzureOpenai => self.effective_deployment().unwrap_or("-"),
            _ => "-",
        };
        format!(
            "{}:{}:{}:{}:{}",
            self.provider_id(),
            self.effective_model().unwrap_or("-"),
            deployment,
            self.style.as_str(),
            self.max_tokens
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Overrides the platform cache directory.
    pub dir: Option<PathBuf>,
    /// Delete stale entries of processed files after the run.
    pub prune: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Render a unified diff, write nothing.
    #[default]
    Diff,
    /// Rewrite files in place.
    InPlace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(OutputFormat::Pretty),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                option: "format",
                value: s.to_string(),
                expected: "pretty, json",
            }),
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub repo_root: PathBuf,
    /// Explicit files; empty means a workspace walk.
    pub files: Vec<PathBuf>,
    pub selection: Option<LineRange>,
    pub provider: ProviderConfig,
    pub max_workers: usize,
    pub cache: CacheConfig,
    pub mode: OutputMode,
    pub format: OutputFormat,
    pub max_depth: usize,
    /// Glob patterns excluded from workspace walks.
    pub exclude: Vec<String>,
    pub clang_path: Option<PathBuf>,
    /// Draw a progress bar on stderr.
    pub progress: bool,
}

impl RunConfig {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            files: Vec::new(),
            selection: None,
            provider: ProviderConfig::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            cache: CacheConfig::default(),
            mode: OutputMode::Diff,
            format: OutputFormat::Pretty,
            max_depth: DEFAULT_MAX_DEPTH,
            exclude: Vec::new(),
            clang_path: None,
            progress: false,
        }
    }

    /// Check values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "max workers must be at least 1".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid(
                "max depth must be at least 1".to_string(),
            ));
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeout must be at least 1 second".to_string(),
            ));
        }
        for pattern in &self.exclude {
            globset::Glob::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("invalid exclude pattern {:?}: {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

/// On-disk YAML configuration. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub enable_ai: Option<bool>,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub auth_method: Option<AuthMethod>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub style: Option<DocStyle>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    /// Whether the doc cache is used.
    #[serde(default)]
    pub cache: Option<bool>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub clang_path: Option<PathBuf>,
}

impl ConfigFile {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(ConfigFile::default());
        }
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Find a config file in the repository root.
    pub fn discover(repo_root: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| repo_root.join(name))
            .find(|path| path.is_file())
    }

    /// Layer file values over the defaults in `config`.
    pub fn apply_to(self, config: &mut RunConfig) {
        let provider = &mut config.provider;
        if let Some(v) = self.enabled {
            provider.enabled = v;
        }
        if let Some(v) = self.enable_ai {
            provider.ai_enabled = v;
        }
        if let Some(v) = self.provider {
            provider.provider = v;
        }
        if self.model.is_some() {
            provider.model = self.model;
        }
        if self.endpoint.is_some() {
            provider.endpoint = self.endpoint;
        }
        if self.deployment.is_some() {
            provider.deployment = self.deployment;
        }
        if let Some(v) = self.api_version {
            provider.api_version = v;
        }
        if let Some(v) = self.auth_method {
            provider.auth_method = v;
        }
        if self.api_key.is_some() {
            provider.api_key = self.api_key;
        }
        if self.base_url.is_some() {
            provider.base_url = self.base_url;
        }
        if let Some(v) = self.max_tokens {
            provider.max_tokens = v;
        }
        if let Some(v) = self.style {
            provider.style = v;
        }
        if let Some(v) = self.timeout_secs {
            provider.timeout_secs = v;
        }
        if let Some(v) = self.max_workers {
            config.max_workers = v;
        }
        if let Some(v) = self.cache {
            config.cache.enabled = v;
        }
        if self.cache_dir.is_some() {
            config.cache.dir = self.cache_dir;
        }
        if let Some(v) = self.max_depth {
            config.max_depth = v;
        }
        config.exclude.extend(self.exclude);
        if self.clang_path.is_some() {
            config.clang_path = self.clang_path;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".codedocgen.yaml");
        fs::write(
            &path,
            "provider: azure_openai\nenable_ai: true\nauth_method: azure_cli\nendpoint: https://res.openai.azure.com\ndeployment: docs\nmax_workers: 2\ncache: true\nexclude:\n  - \"**/gen/**\"\n",
        )
        .unwrap();

        assert_eq!(ConfigFile::discover(dir.path()), Some(path.clone()));

        let file = ConfigFile::parse_file(&path).unwrap();
        let mut config = RunConfig::new(dir.path());
        file.apply_to(&mut config);

        assert_eq!(config.provider.provider, ProviderKind::AzureOpenai);
        assert_eq!(config.provider.auth_method, AuthMethod::AzureCli);
        assert!(config.provider.is_remote());
        assert_eq!(config.max_workers, 2);
        assert!(config.cache.enabled);
        assert_eq!(config.exclude, vec!["**/gen/**".to_string()]);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codedocgen.yaml");
        fs::write(&path, "providr: groq\n").unwrap();
        let err = ConfigFile::parse_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("nltk".parse::<ProviderKind>().unwrap(), ProviderKind::Nltk);
        assert_eq!(
            "azure_openai".parse::<ProviderKind>().unwrap(),
            ProviderKind::AzureOpenai
        );
        assert!("bard".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_fingerprint() {
        let local = ProviderConfig::default();
        assert_eq!(local.fingerprint(), "local:concise");

        // a remote provider without --enable-ai stays local
        let inactive = ProviderConfig {
            provider: ProviderKind::Openai,
            ..Default::default()
        };
        assert_eq!(inactive.provider_id(), "local");

        let remote = ProviderConfig {
            provider: ProviderKind::Openai,
            ai_enabled: true,
            ..Default::default()
        };
        assert_eq!(remote.fingerprint(), "openai:gpt-4o-mini:-:concise:512");

        let bigger = ProviderConfig {
            max_tokens: 1024,
            ..remote.clone()
        };
        assert_ne!(remote.fingerprint(), bigger.fingerprint());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = RunConfig::new(".");
        config.max_workers = 0;
        assert!(config.validate().is_err());
    }
}
