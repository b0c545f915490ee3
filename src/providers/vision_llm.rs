//! Vision-LLM providers (Gemini, OpenAI, Anthropic) via `edgequake-llm`.
//!
//! Chat models cannot take a PDF, so they only ever see one image per
//! request: the extractor rasterises PDFs first and submits page by page.
//! Each request is a single user turn carrying the extraction prompt and the
//! image; the reply is cleaned by [`crate::pipeline::postprocess`].

use super::{OcrProvider, ProviderResult, Submission};
use crate::config::{LlmProviderSettings, ProviderKind, RunConfig};
use crate::error::OcrError;
use crate::pipeline::encode::to_image_data;
use crate::pipeline::postprocess::clean_llm_text;
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct VisionLlmProvider {
    settings: LlmProviderSettings,
    llm: Arc<dyn LLMProvider>,
    prompt: String,
    temperature: f32,
    max_tokens: usize,
}

impl std::fmt::Debug for VisionLlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionLlmProvider")
            .field("provider", &self.settings.kind)
            .field("model", &self.settings.effective_model())
            .finish_non_exhaustive()
    }
}

impl VisionLlmProvider {
    /// Check the API key and build the `edgequake-llm` client for `settings`.
    pub fn from_settings(
        settings: LlmProviderSettings,
        config: &RunConfig,
    ) -> Result<Self, OcrError> {
        let name = settings.kind.name();
        if settings.api_key().is_none() {
            return Err(OcrError::MissingApiKey {
                provider: name.to_string(),
                env_vars: settings.api_key_envs.join(" or "),
            });
        }
        let llm = ProviderFactory::create_llm_provider(name, settings.effective_model())
            .map_err(|e| OcrError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            })?;
        Ok(Self::with_llm(settings, llm, config))
    }

    /// Wrap an already-built LLM client.
    pub fn with_llm(
        settings: LlmProviderSettings,
        llm: Arc<dyn LLMProvider>,
        config: &RunConfig,
    ) -> Self {
        Self {
            settings,
            llm,
            prompt: config
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTRACTION_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl OcrProvider for VisionLlmProvider {
    fn kind(&self) -> ProviderKind {
        self.settings.kind
    }

    fn supports_direct_pdf(&self) -> bool {
        false
    }

    async fn submit(&self, sub: &Submission<'_>) -> Result<ProviderResult, OcrError> {
        if sub.mime_type == "application/pdf" {
            return Err(OcrError::Internal(format!(
                "{} cannot read PDFs; pages must be rasterised first",
                self.name()
            )));
        }

        let start = Instant::now();
        let messages = vec![ChatMessage::user_with_images(
            &self.prompt,
            vec![to_image_data(sub.bytes, sub.mime_type)],
        )];
        let response = self
            .llm
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| OcrError::ProviderReported {
                provider: self.name().to_string(),
                message: format!("{e}"),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            sub.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let text = clean_llm_text(&response.content);
        let raw = json!({
            "model": self.settings.effective_model(),
            "content": response.content,
            "prompt_tokens": response.prompt_tokens,
            "completion_tokens": response.completion_tokens,
        });
        Ok(ProviderResult::single(text, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_configuration_error() {
        let mut settings = LlmProviderSettings::defaults(ProviderKind::Anthropic).unwrap();
        settings.api_key_envs = vec!["OCR_EXTRACT_TEST_UNSET_KEY".into()];
        let err = VisionLlmProvider::from_settings(settings, &RunConfig::default())
            .err()
            .unwrap();
        match &err {
            OcrError::MissingApiKey { provider, env_vars } => {
                assert_eq!(provider, "anthropic");
                assert_eq!(env_vars, "OCR_EXTRACT_TEST_UNSET_KEY");
            }
            other => panic!("unexpected {other}"),
        }
        assert!(err.is_fatal_to_run());
    }
}
