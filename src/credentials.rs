//! Credential files and environment keys.
//!
//! Credentials are loaded once, before the first file is touched. Anything
//! missing or malformed here is a configuration error and aborts the run.

use crate::error::OcrError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default path of the Google service-account key.
pub const DEFAULT_GOOGLE_CREDENTIALS: &str = "google_credentials.json";

/// Default path of the Azure credentials file.
pub const DEFAULT_AZURE_CREDENTIALS: &str = "azure_credentials.json";

/// Environment variable holding the Mistral API key.
pub const MISTRAL_API_KEY_ENV: &str = "MISTRAL_API_KEY";

/// Azure Computer Vision endpoint and subscription key.
///
/// ```json
/// { "endpoint": "https://<resource>.cognitiveservices.azure.com/", "key": "…" }
/// ```
#[derive(Clone, Deserialize)]
pub struct AzureCredentials {
    pub endpoint: String,
    pub key: String,
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl AzureCredentials {
    pub fn load(path: &Path) -> Result<Self, OcrError> {
        let creds: Self = read_json(path)?;
        if creds.endpoint.trim().is_empty() {
            return Err(invalid(path, "'endpoint' is empty"));
        }
        if creds.key.trim().is_empty() {
            return Err(invalid(path, "'key' is empty"));
        }
        if !creds.endpoint.starts_with("https://") && !creds.endpoint.starts_with("http://") {
            return Err(invalid(path, "'endpoint' must be an http(s) URL"));
        }
        debug!("Loaded Azure credentials for {}", creds.endpoint);
        Ok(creds)
    }

    /// Endpoint without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// The fields of a Google service-account key file this tool needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self, OcrError> {
        let key: Self = read_json(path)?;
        if key.client_email.trim().is_empty() {
            return Err(invalid(path, "'client_email' is empty"));
        }
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(invalid(path, "'private_key' is not a PEM private key"));
        }
        debug!("Loaded service account {}", key.client_email);
        Ok(key)
    }
}

/// Document AI processor coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAiSettings {
    pub project_id: String,
    /// Processor region, e.g. `us` or `eu`.
    pub location: String,
    pub processor_id: String,
}

impl DocumentAiSettings {
    /// Resolve settings, falling back to the service account's project for
    /// `project_id`.
    pub fn resolve(
        project_id: Option<String>,
        location: Option<String>,
        processor_id: Option<String>,
        key: &ServiceAccountKey,
    ) -> Result<Self, OcrError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let project_id = non_empty(project_id)
            .or_else(|| non_empty(key.project_id.clone()))
            .ok_or_else(|| OcrError::ProviderNotConfigured {
                provider: "document-ai".into(),
                hint: "Pass --project_id or set GOOGLE_CLOUD_PROJECT.".into(),
            })?;
        let processor_id =
            non_empty(processor_id).ok_or_else(|| OcrError::ProviderNotConfigured {
                provider: "document-ai".into(),
                hint: "Pass --processor_id or set DOCUMENT_AI_PROCESSOR_ID.".into(),
            })?;
        let location = non_empty(location).unwrap_or_else(|| "us".to_string());

        Ok(Self {
            project_id,
            location,
            processor_id,
        })
    }

    /// `projects/{p}/locations/{l}/processors/{id}`.
    pub fn processor_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/processors/{}",
            self.project_id, self.location, self.processor_id
        )
    }
}

/// Mistral API key from the environment.
pub fn mistral_api_key() -> Result<String, OcrError> {
    std::env::var(MISTRAL_API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| OcrError::MissingApiKey {
            provider: "mistral".into(),
            env_vars: MISTRAL_API_KEY_ENV.into(),
        })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, OcrError> {
    if !path.exists() {
        return Err(OcrError::MissingCredentials {
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|e| invalid(path, e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| invalid(path, e.to_string()))
}

fn invalid(path: &Path, detail: impl Into<String>) -> OcrError {
    OcrError::InvalidCredentials {
        path: PathBuf::from(path),
        detail: detail.into(),
    }
}
