//! # ocr-extract
//!
//! Extract plain text from PDFs and images with cloud OCR services and
//! vision LLMs, and write one `.txt` / `.json` pair per file and provider.
//!
//! ## Providers
//!
//! | Provider | Input | How |
//! |----------|-------|-----|
//! | `google` (Cloud Vision) | image, PDF | synchronous; PDFs in 5-page chunks |
//! | `azure` (Computer Vision Read) | image, PDF | asynchronous job, polled |
//! | `document-ai` (Document AI) | image, PDF | synchronous processor call |
//! | `mistral` (Mistral OCR) | image, PDF | synchronous |
//! | `gemini` / `openai` / `anthropic` | image | one chat request per image |
//!
//! Vision LLMs cannot read a PDF, so PDFs are rasterised with pdfium and sent
//! page by page. `--force_pdf_to_images` does the same for every provider.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input path
//!  │
//!  ├─ 1. Discover   walk directory, classify by extension, skip the rest
//!  ├─ 2. Render     (per-page strategy only) PDF → PNG pages via pdfium
//!  ├─ 3. Submit     provider adapter: direct, per page, or job + polling
//!  ├─ 4. Aggregate  join pages with "--- Page Break ---", build JSON envelope
//!  └─ 5. Write      <stem>_<provider>_<timestamp>.txt / .json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_extract::{
//!     build_provider, discover_inputs, Extractor, OutputWriter, PdfiumRasterizer,
//!     ProviderKind, ProviderOptions, RunConfig,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::default();
//!     let azure = build_provider(ProviderKind::Azure, &ProviderOptions::default(), &config)?;
//!     let extractor = Extractor::new(
//!         vec![azure],
//!         Arc::new(PdfiumRasterizer::new(&config)),
//!         OutputWriter::new("out")?,
//!         config,
//!     );
//!     let summary = extractor.run(&discover_inputs(Path::new("scans"))?).await?;
//!     eprintln!("{} written, {} failed", summary.succeeded(), summary.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-extract` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ocr-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{LlmProviderSettings, PollConfig, ProviderKind, RunConfig, RunConfigBuilder};
pub use error::{ErrorClass, OcrError, PageError};
pub use extract::{Extractor, JobReport, JobStatus, RunSummary};
pub use output::{OutputWriter, WrittenFiles};
pub use pipeline::aggregate::{Envelope, JobResult, Method, PAGE_BREAK};
pub use pipeline::input::{discover_inputs, Discovery, JobInput};
pub use pipeline::render::{PageImage, PdfiumRasterizer, Rasterizer};
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
pub use providers::{
    build_provider, detect_llm_providers, OcrProvider, PageOcr, ProviderOptions, ProviderResult,
    Submission,
};
