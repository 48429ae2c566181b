//! Credentials for remote providers.
//!
//! A [`CredentialProvider`] hides how a credential is obtained. The remote
//! synthesizer asks for one credential per run and never inspects its origin.

use serde::Deserialize;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::{AuthMethod, ProviderConfig, ProviderKind};

const COGNITIVE_SERVICES_RESOURCE: &str = "https://cognitiveservices.azure.com";
const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("authentication failed for {provider_id}: {reason}")]
pub struct AuthError {
    pub provider_id: String,
    pub reason: String,
}

impl AuthError {
    pub fn new(provider_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            reason: reason.into(),
        }
    }
}

/// A resolved credential.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// A static key.
    ApiKey(String),
    /// An OAuth access token.
    Bearer(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(***)"),
            Credential::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Result<Credential, AuthError>;
}

/// Build the credential provider selected by the configuration.
pub fn credential_provider(config: &ProviderConfig) -> Box<dyn CredentialProvider> {
    let provider_id = config.provider.provider_id().to_string();
    match config.auth_method {
        AuthMethod::ApiKey => Box::new(ApiKeyCredential {
            provider_id,
            configured: config.api_key.clone(),
            env_var: api_key_env_var(config.provider),
        }),
        AuthMethod::AzureCli => Box::new(AzureCliCredential { provider_id }),
        AuthMethod::ManagedIdentity => Box::new(ManagedIdentityCredential {
            provider_id,
            timeout: Duration::from_secs(config.timeout_secs),
        }),
    }
}

/// Environment variable holding the API key for a provider.
pub fn api_key_env_var(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::Groq => "GROQ_API_KEY",
        ProviderKind::AzureOpenai => "AZURE_OPENAI_API_KEY",
        ProviderKind::Openai | ProviderKind::Nltk => "OPENAI_API_KEY",
    }
}

/// A credential known up front.
pub struct StaticCredential(pub Credential);

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Result<Credential, AuthError> {
        Ok(self.0.clone())
    }
}

/// API key from the config file, else from the provider's environment variable.
pub struct ApiKeyCredential {
    provider_id: String,
    configured: Option<String>,
    env_var: &'static str,
}

impl CredentialProvider for ApiKeyCredential {
    fn credential(&self) -> Result<Credential, AuthError> {
        let key = self
            .configured
            .clone()
            .or_else(|| std::env::var(self.env_var).ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        match key {
            Some(key) => Ok(Credential::ApiKey(key)),
            None => Err(AuthError::new(
                &self.provider_id,
                format!("no API key configured (set {} or api_key)", self.env_var),
            )),
        }
    }
}

/// Access token from a logged-in Azure CLI.
pub struct AzureCliCredential {
    provider_id: String,
}

#[derive(Deserialize)]
struct AzureCliToken {
    #[serde(rename = "accessToken")]
    access_token: String,
}

impl CredentialProvider for AzureCliCredential {
    fn credential(&self) -> Result<Credential, AuthError> {
        debug!("requesting token from azure cli");
        let output = Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                COGNITIVE_SERVICES_RESOURCE,
                "--output",
                "json",
            ])
            .output()
            .map_err(|e| AuthError::new(&self.provider_id, format!("cannot run az: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuthError::new(
                &self.provider_id,
                format!("az get-access-token failed: {}", stderr.trim()),
            ));
        }

        let token: AzureCliToken = serde_json::from_slice(&output.stdout).map_err(|e| {
            AuthError::new(&self.provider_id, format!("unexpected az output: {}", e))
        })?;
        Ok(Credential::Bearer(token.access_token))
    }
}

/// Access token from the instance metadata service.
pub struct ManagedIdentityCredential {
    provider_id: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ImdsToken {
    access_token: String,
}

impl ManagedIdentityCredential {
    async fn fetch(&self) -> Result<String, AuthError> {
        let fail = |reason: String| AuthError::new(&self.provider_id, reason);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| fail(format!("cannot build HTTP client: {}", e)))?;

        let mut query = vec![
            ("api-version", IMDS_API_VERSION.to_string()),
            ("resource", COGNITIVE_SERVICES_RESOURCE.to_string()),
        ];
        if let Ok(client_id) = std::env::var("AZURE_CLIENT_ID") {
            query.push(("client_id", client_id));
        }

        let response = client
            .get(IMDS_TOKEN_URL)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await
            .map_err(|e| fail(format!("managed identity endpoint unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(fail(format!(
                "managed identity token request returned {}",
                response.status()
            )));
        }

        let token: ImdsToken = response
            .json()
            .await
            .map_err(|e| fail(format!("unexpected token response: {}", e)))?;
        Ok(token.access_token)
    }
}

impl CredentialProvider for ManagedIdentityCredential {
    fn credential(&self) -> Result<Credential, AuthError> {
        debug!("requesting token from managed identity endpoint");
        let rt = tokio::runtime::Runtime::new().map_err(|e| {
            AuthError::new(&self.provider_id, format!("cannot start runtime: {}", e))
        })?;
        rt.block_on(self.fetch()).map(Credential::Bearer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_key_wins() {
        let provider = ApiKeyCredential {
            provider_id: "groq".to_string(),
            configured: Some(" key-123 ".to_string()),
            env_var: "CODEDOCGEN_TEST_UNSET_KEY",
        };
        assert_eq!(
            provider.credential().unwrap(),
            Credential::ApiKey("key-123".to_string())
        );
    }

    #[test]
    fn test_missing_key_is_auth_error() {
        let provider = ApiKeyCredential {
            provider_id: "openai".to_string(),
            configured: None,
            env_var: "CODEDOCGEN_TEST_UNSET_KEY",
        };
        let err = provider.credential().unwrap_err();
        assert_eq!(err.provider_id, "openai");
        assert!(err.reason.contains("CODEDOCGEN_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let cred = Credential::Bearer("secret-token".to_string());
        assert!(!format!("{:?}", cred).contains("secret"));
    }

    #[test]
    fn test_env_var_per_provider() {
        assert_eq!(api_key_env_var(ProviderKind::Groq), "GROQ_API_KEY");
        assert_eq!(
            api_key_env_var(ProviderKind::AzureOpenai),
            "AZURE_OPENAI_API_KEY"
        );
    }
}
