//! Doc comment synthesis.
//!
//! A [`Synthesizer`] turns a unit's structural facts into a [`GeneratedDoc`].
//! Two providers exist:
//! - `local`: offline heuristics over identifiers and body facts
//! - remote: OpenAI-compatible chat completion backends (Groq, OpenAI,
//!   Azure OpenAI)
//!
//! Both produce a language-neutral [`DocContent`] that is formatted by
//! [`render::render`], so output always matches the target doc syntax.

pub mod auth;
mod local;
mod remote;
pub mod render;

pub use auth::{AuthError, Credential, CredentialProvider};
pub use local::LocalSynthesizer;
pub use remote::{RemoteBackend, RemoteSynthesizer};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::DocumentableUnit;
use crate::config::ProviderConfig;

/// A rendered doc comment for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDoc {
    /// Comment text in the target syntax, without indentation.
    pub text: String,
    pub provider_id: String,
    pub signature_hash: String,
}

/// Language-neutral content of a doc comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocContent {
    pub summary: String,
    pub details: Option<String>,
    pub params: Vec<ParamDoc>,
    pub returns: Option<String>,
    pub throws: Vec<ThrowsDoc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDoc {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrowsDoc {
    pub name: String,
    pub description: String,
}

/// Errors that can occur while synthesizing a doc comment.
#[derive(Error, Debug, Clone)]
pub enum SynthesisError {
    #[error("{provider_id} failed for {unit}: {cause}")]
    Failed {
        unit: String,
        provider_id: String,
        cause: String,
    },
    #[error("{provider_id} timed out for {unit}")]
    Timeout { unit: String, provider_id: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl SynthesisError {
    pub fn failed(unit: &DocumentableUnit, provider_id: &str, cause: impl Into<String>) -> Self {
        SynthesisError::Failed {
            unit: unit.name_path.clone(),
            provider_id: provider_id.to_string(),
            cause: cause.into(),
        }
    }

    pub fn provider_id(&self) -> &str {
        match self {
            SynthesisError::Failed { provider_id, .. }
            | SynthesisError::Timeout { provider_id, .. } => provider_id,
            SynthesisError::Auth(e) => &e.provider_id,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SynthesisError::Auth(_))
    }
}

/// A documentation provider.
///
/// Implementations are shared across worker threads.
pub trait Synthesizer: Send + Sync {
    /// Identifier recorded in each generated doc (`local`, `groq`, ...).
    fn provider_id(&self) -> &str;

    /// Provider settings that affect output; part of every cache key.
    fn fingerprint(&self) -> String;

    /// Produce a doc comment for one unit.
    fn synthesize(&self, unit: &DocumentableUnit) -> Result<GeneratedDoc, SynthesisError>;
}

/// Build the synthesizer selected by the configuration.
pub fn build_synthesizer(config: &ProviderConfig) -> anyhow::Result<Box<dyn Synthesizer>> {
    if config.is_remote() {
        let credentials = auth::credential_provider(config);
        Ok(Box::new(RemoteSynthesizer::new(config, credentials)?))
    } else {
        Ok(Box::new(LocalSynthesizer::new(config.style)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DocStyle, ProviderKind};

    #[test]
    fn test_build_local_by_default() {
        let config = ProviderConfig::default();
        let synth = build_synthesizer(&config).unwrap();
        assert_eq!(synth.provider_id(), "local");
    }

    #[test]
    fn test_build_remote_when_enabled() {
        let config = ProviderConfig {
            provider: ProviderKind::Groq,
            ai_enabled: true,
            api_key: Some("test-key".to_string()),
            style: DocStyle::Concise,
            ..Default::default()
        };
        let synth = build_synthesizer(&config).unwrap();
        assert_eq!(synth.provider_id(), "groq");
        assert!(synth.fingerprint().starts_with("groq:"));
    }

    #[test]
    fn test_error_provider_id() {
        let err = SynthesisError::Timeout {
            unit: "sum".to_string(),
            provider_id: "openai".to_string(),
        };
        assert_eq!(err.provider_id(), "openai");
        assert!(!err.is_auth());
        assert_eq!(err.to_string(), "openai timed out for sum");
    }
}
