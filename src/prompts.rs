//! Prompts for vision-LLM text extraction.
//!
//! Callers can override the default via [`crate::config::RunConfig::prompt`]
//! (`--prompt` on the command line); the constant here is used only when no
//! override is provided.

/// Default instruction sent with every page image.
///
/// Plain text rather than Markdown: the output is meant to sit next to
/// what dedicated OCR services return.
pub const DEFAULT_EXTRACTION_PROMPT: &str = "Extract all text content from this document. \
Preserve formatting like line breaks where possible. Provide only the extracted text.";
