//! Result aggregation: merge per-page provider results into one
//! [`JobResult`].
//!
//! The merged text joins page texts with [`PAGE_BREAK`]. Pages whose text is
//! empty or whitespace-only contribute no separator, and the final blob is
//! trimmed, so the text never starts or ends with a dangling separator. The
//! envelope keeps every page, empty ones included, in submission order with
//! the raw provider JSON stored verbatim.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Inserted between consecutive non-empty page texts.
pub const PAGE_BREAK: &str = "\n\n--- Page Break ---\n\n";

/// How the source reached the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// The file (image or whole PDF) was submitted as-is.
    Direct,
    /// The PDF was rasterised and each page submitted as an image.
    PdfConvertedToImages,
}

/// One page of provider output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number.
    pub page: usize,
    /// Recognised text; empty when the page had nothing detectable.
    pub text: String,
    /// Raw provider response for this page.
    pub response: Value,
}

/// JSON envelope written next to the merged text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub pages: Vec<PageText>,
    /// File name of the input, without directories.
    pub source_file: String,
    pub method: Method,
    pub provider: String,
    /// Provider-level response fields that do not belong to a single page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    /// Pages that were lost during per-page submission.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_pages: Vec<PageError>,
}

/// Everything the output writer persists for one (file, provider) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub text: String,
    pub envelope: Envelope,
}

/// Inputs to [`aggregate`] besides the pages themselves.
#[derive(Debug, Clone)]
pub struct AggregateContext<'a> {
    pub source_file: &'a Path,
    pub provider: &'a str,
    pub method: Method,
    pub document: Option<Value>,
    pub failed_pages: Vec<PageError>,
}

/// Merge `pages` into a [`JobResult`].
///
/// Returns `None` when there are no pages at all, which callers report as
/// "no result". A page list whose texts are all empty still yields
/// `Some` with empty merged text.
pub fn aggregate(pages: Vec<PageText>, ctx: AggregateContext<'_>) -> Option<JobResult> {
    if pages.is_empty() {
        return None;
    }

    let text = merge_text(pages.iter().map(|p| p.text.as_str()));

    Some(JobResult {
        text,
        envelope: Envelope {
            pages,
            source_file: ctx
                .source_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| ctx.source_file.display().to_string()),
            method: ctx.method,
            provider: ctx.provider.to_string(),
            document: ctx.document,
            failed_pages: ctx.failed_pages,
        },
    })
}

/// Join non-blank texts with [`PAGE_BREAK`] and trim the result.
pub fn merge_text<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    texts
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_BREAK)
        .trim()
        .to_string()
}
