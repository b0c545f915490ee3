//! Provider adapters.
//!
//! Every OCR service sits behind one capability, [`OcrProvider::submit`]:
//! bytes in, per-page `(text, raw JSON)` out. The adapter hides whether that
//! took one synchronous call, several chunked calls or an asynchronous job
//! that had to be polled. Adapters are chosen once at startup by
//! [`build_provider`] and held as `Arc<dyn OcrProvider>`.
//!
//! | Adapter | Whole PDF | Strategy |
//! |---|---|---|
//! | [`google_vision`] | yes | direct (`files:annotate`, 5-page chunks) |
//! | [`azure_read`] | yes | asynchronous job + polling |
//! | [`document_ai`] | yes | direct |
//! | [`mistral`] | yes | direct |
//! | [`vision_llm`] | no | one image per request |

pub mod azure_read;
pub mod document_ai;
pub mod google_auth;
pub mod google_vision;
pub mod http;
pub mod mistral;
pub mod vision_llm;

use crate::config::{LlmProviderSettings, ProviderKind, RunConfig};
use crate::credentials::{
    mistral_api_key, AzureCredentials, DocumentAiSettings, ServiceAccountKey,
    DEFAULT_AZURE_CREDENTIALS, DEFAULT_GOOGLE_CREDENTIALS,
};
use crate::error::OcrError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// One request's worth of input.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
    /// Human-readable name for logs, e.g. `scan.pdf` or `scan.pdf p3`.
    pub label: &'a str,
    /// Stem of the input file, used to name side outputs such as figures.
    pub stem: &'a str,
    /// Page number of the first page in `bytes` (1 for whole documents).
    pub first_page: usize,
}

/// Text and raw response for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOcr {
    pub text: String,
    pub raw: Value,
}

/// What a provider returned for one submission.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderResult {
    /// In page order. A single image yields exactly one entry.
    pub pages: Vec<PageOcr>,
    /// Response fields that are not tied to a page (job metadata, usage…).
    pub document: Option<Value>,
}

impl ProviderResult {
    pub fn single(text: impl Into<String>, raw: Value) -> Self {
        Self {
            pages: vec![PageOcr {
                text: text.into(),
                raw,
            }],
            document: None,
        }
    }
}

/// The single capability every provider exposes.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Name used in logs and output file names.
    fn name(&self) -> &str {
        self.kind().name()
    }

    /// Whether a whole PDF can be submitted in one call.
    fn supports_direct_pdf(&self) -> bool {
        self.kind().reads_pdf_natively()
    }

    async fn submit(&self, submission: &Submission<'_>) -> Result<ProviderResult, OcrError>;
}

/// Where credentials and provider coordinates come from.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub google_credentials: PathBuf,
    pub azure_credentials: PathBuf,
    pub project_id: Option<String>,
    pub location: Option<String>,
    pub processor_id: Option<String>,
    /// Model override for vision-LLM providers.
    pub model: Option<String>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            google_credentials: PathBuf::from(DEFAULT_GOOGLE_CREDENTIALS),
            azure_credentials: PathBuf::from(DEFAULT_AZURE_CREDENTIALS),
            project_id: None,
            location: None,
            processor_id: None,
            model: None,
        }
    }
}

/// Construct the adapter for `kind`, loading and validating its credentials.
///
/// Every error returned here is a configuration error: the run should stop
/// before any file is processed.
pub fn build_provider(
    kind: ProviderKind,
    options: &ProviderOptions,
    config: &RunConfig,
) -> Result<Arc<dyn OcrProvider>, OcrError> {
    let provider: Arc<dyn OcrProvider> = match kind {
        ProviderKind::Google => {
            let key = ServiceAccountKey::load(&options.google_credentials)?;
            Arc::new(google_vision::GoogleVisionProvider::new(key, config)?)
        }
        ProviderKind::Azure => {
            let creds = AzureCredentials::load(&options.azure_credentials)?;
            Arc::new(azure_read::AzureReadProvider::new(creds, config)?)
        }
        ProviderKind::DocumentAi => {
            let key = ServiceAccountKey::load(&options.google_credentials)?;
            let settings = DocumentAiSettings::resolve(
                options.project_id.clone(),
                options.location.clone(),
                options.processor_id.clone(),
                &key,
            )?;
            Arc::new(document_ai::DocumentAiProvider::new(key, settings, config)?)
        }
        ProviderKind::Mistral => {
            let api_key = mistral_api_key()?;
            Arc::new(mistral::MistralOcrProvider::new(api_key, config)?)
        }
        ProviderKind::Gemini | ProviderKind::OpenAi | ProviderKind::Anthropic => {
            let settings = LlmProviderSettings::defaults(kind)
                .ok_or_else(|| OcrError::Internal(format!("no LLM settings for {kind}")))?
                .with_model(options.model.clone());
            Arc::new(vision_llm::VisionLlmProvider::from_settings(settings, config)?)
        }
    };
    info!("Provider ready: {}", provider.name());
    Ok(provider)
}

/// Vision-LLM providers whose API key is present, in detection order.
pub fn detect_llm_providers() -> Vec<ProviderKind> {
    detect_llm_providers_with(|name| std::env::var(name).ok())
}

pub fn detect_llm_providers_with<F>(lookup: F) -> Vec<ProviderKind>
where
    F: Fn(&str) -> Option<String>,
{
    ProviderKind::LLM
        .into_iter()
        .filter_map(LlmProviderSettings::defaults)
        .filter(|s| s.api_key_with(&lookup).is_some())
        .map(|s| s.kind)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_only_keyed_llms() {
        let found = detect_llm_providers_with(|name| match name {
            "ANTHROPIC_API_KEY" => Some("sk-ant".into()),
            "GOOGLE_API_KEY" => Some("g".into()),
            _ => None,
        });
        assert_eq!(found, vec![ProviderKind::Gemini, ProviderKind::Anthropic]);
        assert!(detect_llm_providers_with(|_| None).is_empty());
    }

    #[test]
    fn missing_credentials_abort_before_any_file() {
        let options = ProviderOptions {
            azure_credentials: "/definitely/missing/azure.json".into(),
            google_credentials: "/definitely/missing/google.json".into(),
            ..Default::default()
        };
        let config = RunConfig::default();
        for kind in [ProviderKind::Azure, ProviderKind::Google, ProviderKind::DocumentAi] {
            let err = build_provider(kind, &options, &config).err().unwrap();
            assert!(matches!(err, OcrError::MissingCredentials { .. }), "{kind}: {err}");
            assert!(err.is_fatal_to_run());
        }
    }

    #[test]
    fn single_result_has_one_page() {
        let r = ProviderResult::single("", Value::Null);
        assert_eq!(r.pages.len(), 1);
        assert_eq!(r.pages[0].text, "");
    }
}
