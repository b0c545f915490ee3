//! Pipeline stages for document text extraction.
//!
//! Each submodule implements exactly one step. Provider adapters live in
//! [`crate::providers`]; everything here is provider-agnostic.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ (provider) ──▶ poll ──▶ aggregate
//! (classify) (pdfium)  (base64)                 (async)   (merge)
//! ```
//!
//! 1. [`input`]  — discover and classify input files
//! 2. [`render`] — rasterise PDF pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`] — PNG-encode and base64-wrap page images for request bodies
//! 4. [`poll`]   — drive asynchronous provider jobs to a terminal state
//! 5. [`postprocess`] — cleanup rules for vision-LLM output
//! 6. [`aggregate`] — merge per-page results into text + JSON envelope

pub mod aggregate;
pub mod encode;
pub mod input;
pub mod poll;
pub mod postprocess;
pub mod render;
