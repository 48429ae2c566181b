//! Remote chat-completion providers.
//!
//! Groq, OpenAI and Azure OpenAI all speak the same chat-completions
//! protocol; they differ only in URL and auth header. The completion is
//! asked for a small JSON object which is rendered locally, so the output
//! always has the target language's doc syntax.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::analysis::DocumentableUnit;
use crate::cache::signature_hash;
use crate::config::{DocStyle, ProviderConfig, ProviderKind};

use super::auth::{AuthError, Credential, CredentialProvider};
use super::render::{self, is_void};
use super::{DocContent, GeneratedDoc, ParamDoc, SynthesisError, Synthesizer, ThrowsDoc};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Longest body excerpt sent in a prompt.
const MAX_BODY_CHARS: usize = 6000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteBackend {
    Groq,
    OpenAi,
    Azure,
}

impl RemoteBackend {
    pub fn from_kind(kind: ProviderKind) -> Option<Self> {
        match kind {
            ProviderKind::Groq => Some(RemoteBackend::Groq),
            ProviderKind::Openai => Some(RemoteBackend::OpenAi),
            ProviderKind::AzureOpenai => Some(RemoteBackend::Azure),
            ProviderKind::Nltk => None,
        }
    }

    pub fn provider_id(&self) -> &'static str {
        match self {
            RemoteBackend::Groq => "groq",
            RemoteBackend::OpenAi => "openai",
            RemoteBackend::Azure => "azure_openai",
        }
    }
}

/// Synthesizer backed by a remote chat-completions endpoint.
///
/// Shared by all workers. Requests are driven on an owned tokio runtime.
pub struct RemoteSynthesizer {
    backend: RemoteBackend,
    url: String,
    model: Option<String>,
    max_tokens: u32,
    style: DocStyle,
    fingerprint: String,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    credentials: Box<dyn CredentialProvider>,
    credential: OnceCell<Result<Credential, AuthError>>,
    auth_failure: RwLock<Option<AuthError>>,
}

impl RemoteSynthesizer {
    pub fn new(
        config: &ProviderConfig,
        credentials: Box<dyn CredentialProvider>,
    ) -> anyhow::Result<Self> {
        let backend = RemoteBackend::from_kind(config.provider)
            .ok_or_else(|| anyhow::anyhow!("{} is not a remote provider", config.provider))?;

        let url = match backend {
            RemoteBackend::Groq | RemoteBackend::OpenAi => {
                let default = if backend == RemoteBackend::Groq {
                    GROQ_BASE_URL
                } else {
                    OPENAI_BASE_URL
                };
                let base = config.base_url.as_deref().unwrap_or(default);
                format!("{}/chat/completions", base.trim_end_matches('/'))
            }
            RemoteBackend::Azure => {
                let endpoint = config
                    .base_url
                    .clone()
                    .or_else(|| config.endpoint.clone())
                    .or_else(|| std::env::var("AZURE_OPENAI_ENDPOINT").ok())
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "azure_openai requires an endpoint (--azure-endpoint or AZURE_OPENAI_ENDPOINT)"
                        )
                    })?;
                let deployment = config
                    .effective_deployment()
                    .ok_or_else(|| anyhow::anyhow!("azure_openai requires a deployment"))?;
                format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    endpoint.trim_end_matches('/'),
                    deployment,
                    config.api_version
                )
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let runtime = tokio::runtime::Runtime::new()?;

        debug!(provider = backend.provider_id(), %url, "remote synthesizer ready");

        Ok(Self {
            backend,
            url,
            model: match backend {
                RemoteBackend::Azure => None,
                _ => config.effective_model().map(str::to_string),
            },
            max_tokens: config.max_tokens,
            style: config.style,
            fingerprint: config.fingerprint(),
            client,
            runtime,
            credentials,
            credential: OnceCell::new(),
            auth_failure: RwLock::new(None),
        })
    }

    fn recorded_auth_failure(&self) -> Option<AuthError> {
        self.auth_failure.read().ok().and_then(|slot| slot.clone())
    }

    fn record_auth_failure(&self, err: &AuthError) {
        if let Ok(mut slot) = self.auth_failure.write() {
            if slot.is_none() {
                warn!("{}", err);
                *slot = Some(err.clone());
            }
        }
    }

    fn resolve_credential(&self) -> Result<Credential, AuthError> {
        self.credential
            .get_or_init(|| self.credentials.credential())
            .clone()
    }

    fn request_for(&self, unit: &DocumentableUnit) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(self.style),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(unit),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.2,
        }
    }

    async fn send(
        &self,
        unit: &DocumentableUnit,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<String, SynthesisError> {
        let provider_id = self.backend.provider_id();
        let builder = self.client.post(&self.url).json(request);
        let builder = match (self.backend, credential) {
            (RemoteBackend::Azure, Credential::ApiKey(key)) => builder.header("api-key", key),
            (_, Credential::ApiKey(token)) | (_, Credential::Bearer(token)) => {
                builder.bearer_auth(token)
            }
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SynthesisError::Timeout {
                    unit: unit.name_path.clone(),
                    provider_id: provider_id.to_string(),
                }
            } else {
                SynthesisError::failed(unit, provider_id, format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AuthError::new(provider_id, format!("server returned {}", status)).into());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let excerpt: String = text.chars().take(200).collect();
            return Err(SynthesisError::failed(
                unit,
                provider_id,
                format!("server returned {}: {}", status, excerpt.trim()),
            ));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                SynthesisError::Timeout {
                    unit: unit.name_path.clone(),
                    provider_id: provider_id.to_string(),
                }
            } else {
                SynthesisError::failed(unit, provider_id, format!("invalid response body: {}", e))
            }
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SynthesisError::failed(unit, provider_id, "empty completion"))
    }
}

impl Synthesizer for RemoteSynthesizer {
    fn provider_id(&self) -> &str {
        self.backend.provider_id()
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn synthesize(&self, unit: &DocumentableUnit) -> Result<GeneratedDoc, SynthesisError> {
        if let Some(err) = self.recorded_auth_failure() {
            return Err(err.into());
        }

        let credential = self.resolve_credential().map_err(|e| {
            self.record_auth_failure(&e);
            SynthesisError::from(e)
        })?;

        let request = self.request_for(unit);
        debug!(unit = %unit.name_path, provider = self.provider_id(), "sending completion request");
        let completion = self
            .runtime
            .block_on(self.send(unit, &request, &credential))
            .map_err(|e| {
                if let SynthesisError::Auth(auth) = &e {
                    self.record_auth_failure(auth);
                }
                e
            })?;

        let content = parse_completion(unit, &completion)
            .map_err(|cause| SynthesisError::failed(unit, self.provider_id(), cause))?;

        Ok(GeneratedDoc {
            text: render::render(unit, &content),
            provider_id: self.provider_id().to_string(),
            signature_hash: signature_hash(unit),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// The JSON object a completion must contain.
#[derive(Debug, Deserialize)]
struct CompletionDoc {
    summary: String,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    params: HashMap<String, String>,
    #[serde(default)]
    returns: Option<String>,
    #[serde(default)]
    throws: Vec<ThrowsEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ThrowsEntry {
    Name(String),
    Described { name: String, description: String },
}

fn system_prompt(style: DocStyle) -> String {
    let detail = match style {
        DocStyle::Concise => "Keep the summary to one sentence and set details to null.",
        DocStyle::Detailed => "Add one or two sentences of details describing the behavior.",
    };
    format!(
        "You write documentation comments for source code. Reply with only a JSON object: \
         {{\"summary\": string, \"details\": string or null, \"params\": {{parameter name: description}}, \
         \"returns\": string or null, \"throws\": [exception type names]}}. \
         Describe what the code does, not how it is written. {}",
        detail
    )
}

fn user_prompt(unit: &DocumentableUnit) -> String {
    let params = if unit.parameters.is_empty() {
        "(none)".to_string()
    } else {
        unit.parameter_names().join(", ")
    };
    let body: String = unit.body_text.chars().take(MAX_BODY_CHARS).collect();
    format!(
        "Language: {}\nKind: {}\nName: {}\nParameters: {}\nSignature:\n{}\n\nBody:\n{}",
        unit.language.display_name(),
        unit.kind.as_str(),
        unit.name_path,
        params,
        unit.signature,
        body
    )
}

/// Slice the JSON object out of a completion, tolerating code fences.
fn strip_fences(completion: &str) -> &str {
    let text = completion.trim();
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

fn parse_completion(unit: &DocumentableUnit, completion: &str) -> Result<DocContent, String> {
    let doc: CompletionDoc = serde_json::from_str(strip_fences(completion))
        .map_err(|e| format!("malformed completion: {}", e))?;

    let summary = doc.summary.trim().to_string();
    if summary.is_empty() {
        return Err("completion has an empty summary".to_string());
    }

    let params = unit
        .parameters
        .iter()
        .map(|p| {
            let bare = p.name.trim_start_matches('*').trim_start_matches("...");
            let description = doc
                .params
                .get(&p.name)
                .or_else(|| doc.params.get(bare))
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| format!("The {} parameter.", bare));
            ParamDoc {
                name: p.name.clone(),
                description,
            }
        })
        .collect();

    let returns_void = unit.return_type.as_deref().map(is_void).unwrap_or(false);
    let returns = doc
        .returns
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty() && !returns_void);

    let throws = doc
        .throws
        .into_iter()
        .map(|t| match t {
            ThrowsEntry::Name(name) => ThrowsDoc {
                description: format!("Thrown when {} occurs.", name),
                name,
            },
            ThrowsEntry::Described { name, description } => ThrowsDoc { name, description },
        })
        .filter(|t| !t.name.trim().is_empty())
        .collect();

    Ok(DocContent {
        summary,
        details: doc.details.filter(|d| !d.trim().is_empty()),
        params,
        returns,
        throws,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{extract, Language};
    use crate::synth::auth::StaticCredential;
    use mockito::Matcher;
    use std::io::Write;
    use std::path::Path;

    fn sum_unit() -> DocumentableUnit {
        extract(
            Path::new("sum.js"),
            b"function sum(a, b) { return a + b; }\n",
            Language::JavaScriptTypeScript,
        )
        .unwrap()
        .remove(0)
    }

    fn completion_body(content: &str) -> String {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    fn openai_config(url: String) -> ProviderConfig {
        ProviderConfig {
            provider: ProviderKind::Openai,
            ai_enabled: true,
            base_url: Some(url),
            ..Default::default()
        }
    }

    fn synth(url: String) -> RemoteSynthesizer {
        RemoteSynthesizer::new(
            &openai_config(url),
            Box::new(StaticCredential(Credential::ApiKey("test-key".to_string()))),
        )
        .unwrap()
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_completion_fills_missing_params() {
        let unit = sum_unit();
        let content = parse_completion(
            &unit,
            r#"{"summary": "Adds two numbers.", "params": {"a": "First addend."}, "returns": "The sum.", "throws": ["RangeError"]}"#,
        )
        .unwrap();
        assert_eq!(content.params[0].description, "First addend.");
        assert_eq!(content.params[1].description, "The b parameter.");
        assert_eq!(content.returns.as_deref(), Some("The sum."));
        assert_eq!(content.throws[0].name, "RangeError");
    }

    #[test]
    fn test_remote_success() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body(
                "```json\n{\"summary\": \"Adds two numbers.\", \"params\": {\"a\": \"Left.\", \"b\": \"Right.\"}, \"returns\": \"Their sum.\"}\n```",
            ))
            .create();

        let doc = synth(server.url()).synthesize(&sum_unit()).unwrap();
        mock.assert();
        assert_eq!(doc.provider_id, "openai");
        assert_eq!(
            doc.text,
            "/**\n * Adds two numbers.\n *\n * @param a - Left.\n * @param b - Right.\n * @returns Their sum.\n */"
        );
    }

    #[test]
    fn test_remote_malformed_completion() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("Sure! Here is your doc comment."))
            .create();

        let err = synth(server.url()).synthesize(&sum_unit()).unwrap_err();
        assert!(matches!(err, SynthesisError::Failed { .. }));
        assert_eq!(err.provider_id(), "openai");
    }

    #[test]
    fn test_remote_empty_completion() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("   "))
            .create();

        let err = synth(server.url()).synthesize(&sum_unit()).unwrap_err();
        assert!(err.to_string().contains("empty completion"));
    }

    #[test]
    fn test_remote_timeout() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(completion_body("{\"summary\": \"Late.\"}").as_bytes())
            })
            .create();

        let config = ProviderConfig {
            timeout_secs: 1,
            ..openai_config(server.url())
        };
        let synth = RemoteSynthesizer::new(
            &config,
            Box::new(StaticCredential(Credential::ApiKey("test-key".to_string()))),
        )
        .unwrap();

        let err = synth.synthesize(&sum_unit()).unwrap_err();
        assert!(matches!(err, SynthesisError::Timeout { .. }), "got {:?}", err);
        assert_eq!(err.provider_id(), "openai");
        assert!(!err.is_auth());
    }

    #[test]
    fn test_remote_auth_failure_is_sticky() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("{\"error\": \"invalid api key\"}")
            .expect(1)
            .create();

        let synth = synth(server.url());
        let first = synth.synthesize(&sum_unit()).unwrap_err();
        assert!(first.is_auth());
        let second = synth.synthesize(&sum_unit()).unwrap_err();
        assert!(second.is_auth());
        mock.assert();
    }

    #[test]
    fn test_azure_url_and_api_key_header() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock(
                "POST",
                Matcher::Regex("^/openai/deployments/docs/chat/completions".to_string()),
            )
            .match_query(Matcher::UrlEncoded(
                "api-version".to_string(),
                "2024-02-01".to_string(),
            ))
            .match_header("api-key", "azure-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("{\"summary\": \"Adds two numbers.\"}"))
            .create();

        let config = ProviderConfig {
            provider: ProviderKind::AzureOpenai,
            ai_enabled: true,
            endpoint: Some(server.url()),
            deployment: Some("docs".to_string()),
            ..Default::default()
        };
        let synth = RemoteSynthesizer::new(
            &config,
            Box::new(StaticCredential(Credential::ApiKey("azure-key".to_string()))),
        )
        .unwrap();
        let doc = synth.synthesize(&sum_unit()).unwrap();
        mock.assert();
        assert_eq!(doc.provider_id, "azure_openai");
        assert!(doc.text.contains("@param a - The a parameter."));
    }
}
