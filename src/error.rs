//! Error types for the ocr-extract library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`OcrError`] — the current unit of work cannot proceed. Depending on its
//!   [`ErrorClass`] that unit is the whole run (bad credentials, missing input
//!   directory) or a single `(file, provider)` pair (unsupported file, HTTP
//!   failure, failed asynchronous job).
//!
//! * [`PageError`] — **Non-fatal**: one page of a per-page submission failed
//!   but its siblings are fine. Stored in the JSON envelope's `failed_pages`
//!   so the output records exactly what is missing.

use std::path::PathBuf;
use thiserror::Error;

/// Which part of the run an [`OcrError`] is fatal to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credentials, CLI arguments, input root. Aborts the whole run.
    Configuration,
    /// A single input file could not be read, classified or rasterised.
    Input,
    /// The provider rejected, failed or never answered the request.
    Provider,
    /// The `.txt` / `.json` pair could not be persisted.
    Output,
}

/// All errors returned by the ocr-extract library.
///
/// Page-level failures use [`PageError`] and are stored in the envelope
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// A credentials file does not exist.
    #[error("Credentials file not found: '{path}'")]
    MissingCredentials { path: PathBuf },

    /// A credentials file exists but is not valid JSON or lacks a required key.
    #[error("Invalid credentials file '{path}': {detail}")]
    InvalidCredentials { path: PathBuf, detail: String },

    /// No API key found for a provider that reads its key from the environment.
    #[error("API key for provider '{provider}' not found.\nSet {env_vars} in the environment or in .env.")]
    MissingApiKey { provider: String, env_vars: String },

    /// A provider client could not be constructed.
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The input path is neither a file nor a directory.
    #[error("Input path '{path}' is not a valid file or directory")]
    InputPathInvalid { path: PathBuf },

    /// Discovery found nothing to process.
    #[error("No supported files (PDF or {extensions}) found in '{path}'")]
    NoSupportedFiles { path: PathBuf, extensions: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Extension is not in the image or PDF allow-list.
    #[error("Unsupported file type '{extension}' for '{path}'")]
    UnsupportedFileType { path: PathBuf, extension: String },

    /// Reading the input bytes failed mid-way.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    /// PDF could not be opened or a page could not be rendered.
    #[error("Rasterisation failed for '{path}': {detail}")]
    RasterisationFailed { path: PathBuf, detail: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The provider rejected the credentials (HTTP 401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// Non-success HTTP status other than an auth failure.
    #[error("Provider '{provider}' returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// Connection, TLS or DNS failure.
    #[error("Network error talking to '{provider}': {detail}")]
    Transport { provider: String, detail: String },

    /// The network layer gave up waiting for a response.
    #[error("Request to '{provider}' timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// A 2xx response whose body did not have the expected shape.
    #[error("Malformed response from '{provider}': {detail}")]
    MalformedResponse { provider: String, detail: String },

    /// The provider reported an error inside an otherwise successful response.
    #[error("Provider '{provider}' reported an error: {message}")]
    ProviderReported { provider: String, message: String },

    /// An asynchronous job finished in a non-success state.
    #[error("{provider} job for '{label}' failed with status '{status}'{}", message_suffix(.message))]
    JobFailed {
        provider: String,
        label: String,
        status: String,
        message: Option<String>,
    },

    /// An asynchronous job never left its in-progress states.
    #[error("{provider} job for '{label}' still '{last_status}' after {waited_secs}s ({checks} status checks)")]
    PollTimedOut {
        provider: String,
        label: String,
        last_status: String,
        waited_secs: u64,
        checks: u32,
    },

    /// Every page of a per-page submission failed.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    /// The provider ran but produced no pages at all.
    #[error("Provider '{provider}' produced no result for '{path}'")]
    NoResult { provider: String, path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" - {m}"))
        .unwrap_or_default()
}

impl OcrError {
    /// Classify this error by the scope it aborts.
    pub fn class(&self) -> ErrorClass {
        match self {
            OcrError::MissingCredentials { .. }
            | OcrError::InvalidCredentials { .. }
            | OcrError::MissingApiKey { .. }
            | OcrError::ProviderNotConfigured { .. }
            | OcrError::InputPathInvalid { .. }
            | OcrError::NoSupportedFiles { .. }
            | OcrError::InvalidConfig(_) => ErrorClass::Configuration,

            OcrError::FileNotFound { .. }
            | OcrError::PermissionDenied { .. }
            | OcrError::UnsupportedFileType { .. }
            | OcrError::ReadFailed { .. }
            | OcrError::PdfiumBindingFailed(_)
            | OcrError::RasterisationFailed { .. } => ErrorClass::Input,

            OcrError::Auth { .. }
            | OcrError::Http { .. }
            | OcrError::Transport { .. }
            | OcrError::Timeout { .. }
            | OcrError::MalformedResponse { .. }
            | OcrError::ProviderReported { .. }
            | OcrError::JobFailed { .. }
            | OcrError::PollTimedOut { .. }
            | OcrError::AllPagesFailed { .. }
            | OcrError::NoResult { .. } => ErrorClass::Provider,

            OcrError::OutputWriteFailed { .. } | OcrError::Internal(_) => ErrorClass::Output,
        }
    }

    /// True when the whole run must stop rather than move on to the next file.
    pub fn is_fatal_to_run(&self) -> bool {
        self.class() == ErrorClass::Configuration
    }
}

/// A non-fatal error for a single page.
///
/// Recorded in the envelope's `failed_pages` when per-page submission loses
/// one page. The file still succeeds unless ALL pages fail.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageError {
    /// The provider call for this page failed.
    #[error("Page {page}: submission failed: {detail}")]
    SubmitFailed { page: usize, detail: String },

    /// The provider answered but returned nothing for this page.
    #[error("Page {page}: provider returned no result")]
    NoResult { page: usize },
}

impl PageError {
    /// 1-based page number this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::SubmitFailed { page, .. } | PageError::NoResult { page } => *page,
        }
    }
}
