//! Configuration types for an extraction run.
//!
//! All run behaviour is controlled through [`RunConfig`], built via its
//! [`RunConfigBuilder`]. Provider identity lives in [`ProviderKind`] and the
//! per-provider table of API-key variables and default models lives in
//! [`LlmProviderSettings`]. Both are plain values handed to adapter
//! constructors, so two adapters with different settings can coexist.

use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use ocr_extract::RunConfig;
/// use std::time::Duration;
///
/// let config = RunConfig::builder()
///     .force_pdf_to_images(true)
///     .poll_interval(Duration::from_secs(2))
///     .build()
///     .unwrap();
/// assert!(config.force_pdf_to_images);
/// ```
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Rasterise PDFs page by page even when the provider reads PDFs natively.
    pub force_pdf_to_images: bool,

    /// Rendering DPI used when rasterising PDF pages. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 4000.
    ///
    /// Keeps a large-format page (A0 poster) from producing an image that
    /// exceeds provider upload limits.
    pub max_rendered_pixels: u32,

    /// Asynchronous job polling behaviour.
    pub poll: PollConfig,

    /// Per-HTTP-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Prompt sent with every page to vision-LLM providers. If None, uses
    /// [`crate::prompts::DEFAULT_EXTRACTION_PROMPT`].
    pub prompt: Option<String>,

    /// Sampling temperature for vision-LLM providers. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens a vision LLM may generate per page. Default: 4000.
    pub max_tokens: usize,

    /// Directory for figures embedded in Mistral OCR responses. None = discard.
    pub images_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            force_pdf_to_images: false,
            dpi: 200,
            max_rendered_pixels: 4000,
            poll: PollConfig::default(),
            api_timeout_secs: 120,
            prompt: None,
            temperature: 0.1,
            max_tokens: 4000,
            images_dir: None,
        }
    }
}

impl RunConfig {
    /// Create a new builder for `RunConfig`.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn force_pdf_to_images(mut self, v: bool) -> Self {
        self.config.force_pdf_to_images = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll.interval = interval;
        self
    }

    /// `None` polls until the provider leaves its in-progress states.
    pub fn max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.config.poll.max_wait = max_wait;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.images_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RunConfig, OcrError> {
        let c = &self.config;
        if c.poll.interval.is_zero() {
            return Err(OcrError::InvalidConfig(
                "Poll interval must be greater than zero".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(OcrError::InvalidConfig(
                "API timeout must be at least 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(OcrError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

/// How an asynchronous provider job is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed delay between status checks. Default: 2 s.
    pub interval: Duration,
    /// Give up after waiting this long in total. Default: 600 s. None = never.
    pub max_wait: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Some(Duration::from_secs(600)),
        }
    }
}

// ── Providers ────────────────────────────────────────────────────────────

/// Every provider the tool can submit to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Google Cloud Vision `DOCUMENT_TEXT_DETECTION`.
    Google,
    /// Azure Computer Vision Read (asynchronous).
    Azure,
    /// Google Document AI processor.
    DocumentAi,
    /// Mistral `mistral-ocr-latest`.
    Mistral,
    /// Gemini vision model.
    Gemini,
    /// OpenAI vision model.
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic vision model.
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::Google,
        ProviderKind::Azure,
        ProviderKind::DocumentAi,
        ProviderKind::Mistral,
        ProviderKind::Gemini,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
    ];

    /// The vision-LLM providers, in auto-detection order.
    pub const LLM: [ProviderKind; 3] = [
        ProviderKind::Gemini,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
    ];

    /// Short name used on the command line and in output file names.
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Azure => "azure",
            ProviderKind::DocumentAi => "document-ai",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.name() == s).or(match s.as_str() {
            "docai" | "document_ai" => Some(ProviderKind::DocumentAi),
            "google-vision" | "gcp" => Some(ProviderKind::Google),
            _ => None,
        })
    }

    pub fn is_llm(self) -> bool {
        Self::LLM.contains(&self)
    }

    /// Whether the provider accepts a whole PDF in one request.
    pub fn reads_pdf_natively(self) -> bool {
        !self.is_llm()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// API-key variables and model choice for one vision-LLM provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmProviderSettings {
    pub kind: ProviderKind,
    /// Environment variables checked, in order, for the API key.
    pub api_key_envs: Vec<String>,
    /// Model used when the caller does not pick one.
    pub default_model: String,
    /// Caller-selected model, overriding `default_model`.
    pub model: Option<String>,
}

impl LlmProviderSettings {
    /// Built-in settings for `kind`. Returns None for non-LLM providers.
    pub fn defaults(kind: ProviderKind) -> Option<Self> {
        let (envs, model): (&[&str], &str) = match kind {
            ProviderKind::Gemini => (&["GEMINI_API_KEY", "GOOGLE_API_KEY"], "gemini-2.0-flash"),
            ProviderKind::OpenAi => (&["OPENAI_API_KEY"], "gpt-4o"),
            ProviderKind::Anthropic => (&["ANTHROPIC_API_KEY"], "claude-3-5-sonnet-20241022"),
            _ => return None,
        };
        Some(Self {
            kind,
            api_key_envs: envs.iter().map(|s| s.to_string()).collect(),
            default_model: model.to_string(),
            model: None,
        })
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    /// The model that will actually be requested.
    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.default_model)
    }

    /// First non-empty API key found via `lookup` (usually `std::env::var`).
    pub fn api_key_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key_envs
            .iter()
            .filter_map(|name| lookup(name))
            .find(|v| !v.trim().is_empty())
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(|name| std::env::var(name).ok())
    }
}
