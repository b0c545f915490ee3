//! Google Document AI `processors/*:process`.
//!
//! The whole file goes up in one synchronous call. The response carries one
//! `document.text` for the entire file plus a `pages` array whose
//! `layout.textAnchor.textSegments` index into that text; slicing the text by
//! those segments gives each page its own text.

use super::google_auth::{GoogleAuth, CLOUD_PLATFORM_SCOPE};
use super::http::{build_client, send_json};
use super::{OcrProvider, PageOcr, ProviderResult, Submission};
use crate::config::{ProviderKind, RunConfig};
use crate::credentials::{DocumentAiSettings, ServiceAccountKey};
use crate::error::OcrError;
use crate::pipeline::encode::to_base64;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const NAME: &str = "document-ai";

#[derive(Debug)]
pub struct DocumentAiProvider {
    client: reqwest::Client,
    auth: GoogleAuth,
    settings: DocumentAiSettings,
    timeout: Duration,
}

impl DocumentAiProvider {
    pub fn new(
        key: ServiceAccountKey,
        settings: DocumentAiSettings,
        config: &RunConfig,
    ) -> Result<Self, OcrError> {
        Ok(Self {
            client: build_client(config.api_timeout())?,
            auth: GoogleAuth::new(key, CLOUD_PLATFORM_SCOPE)?,
            settings,
            timeout: config.api_timeout(),
        })
    }

    fn process_url(&self) -> String {
        format!(
            "https://{}-documentai.googleapis.com/v1/{}:process",
            self.settings.location,
            self.settings.processor_name()
        )
    }
}

#[async_trait]
impl OcrProvider for DocumentAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DocumentAi
    }

    async fn submit(&self, sub: &Submission<'_>) -> Result<ProviderResult, OcrError> {
        let token = self.auth.access_token(&self.client, NAME, self.timeout).await?;
        let body = json!({
            "rawDocument": {
                "content": to_base64(sub.bytes),
                "mimeType": sub.mime_type,
            },
            "skipHumanReview": true,
        });
        debug!("{}: POST {}", sub.label, self.process_url());
        let resp = send_json(
            NAME,
            self.timeout,
            self.client.post(self.process_url()).bearer_auth(token).json(&body),
        )
        .await
        .map_err(|e| with_mime_hint(e, sub.mime_type))?;
        split_document(resp)
    }
}

/// A 400 mentioning the MIME type usually means the processor does not
/// accept this file type.
fn with_mime_hint(err: OcrError, mime: &str) -> OcrError {
    match err {
        OcrError::Http {
            provider,
            status: 400,
            body,
        } if body.to_lowercase().contains("mime") || body.to_lowercase().contains("file type") => {
            OcrError::Http {
                provider,
                status: 400,
                body: format!("{body}\nHint: the processor may not accept '{mime}'."),
            }
        }
        other => other,
    }
}

/// Turn a process response into per-page results.
fn split_document(mut resp: Value) -> Result<ProviderResult, OcrError> {
    let document = resp
        .get_mut("document")
        .ok_or_else(|| OcrError::MalformedResponse {
            provider: NAME.into(),
            detail: "response has no 'document'".into(),
        })?;
    let text = document
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let pages = match document.get_mut("pages").map(Value::take) {
        Some(Value::Array(pages)) if !pages.is_empty() => pages,
        _ => {
            // No layout information: treat the file as a single page.
            if let Some(obj) = document.as_object_mut() {
                obj.remove("pages");
            }
            return Ok(ProviderResult {
                pages: vec![PageOcr {
                    text,
                    raw: Value::Null,
                }],
                document: Some(resp),
            });
        }
    };
    if let Some(obj) = document.as_object_mut() {
        obj.remove("pages");
    }

    let chars: Vec<char> = text.chars().collect();
    let pages = pages
        .into_iter()
        .map(|page| PageOcr {
            text: anchor_text(&chars, page.pointer("/layout/textAnchor")),
            raw: page,
        })
        .collect();

    Ok(ProviderResult {
        pages,
        document: Some(resp),
    })
}

/// Concatenate the text segments of `anchor`.
///
/// Indices are serialised as strings (int64 in JSON) and `startIndex` is
/// omitted when it is zero.
fn anchor_text(chars: &[char], anchor: Option<&Value>) -> String {
    let segments = match anchor
        .and_then(|a| a.get("textSegments"))
        .and_then(Value::as_array)
    {
        Some(s) => s,
        None => return String::new(),
    };

    let mut out = String::new();
    for seg in segments {
        let start = index(seg.get("startIndex")).unwrap_or(0);
        let end = match index(seg.get("endIndex")) {
            Some(e) => e,
            None => continue,
        };
        if start > end || end > chars.len() {
            warn!(
                "Ignoring out-of-range text segment {}..{} (text has {} chars)",
                start,
                end,
                chars.len()
            );
            continue;
        }
        out.extend(&chars[start..end]);
    }
    out
}

fn index(v: Option<&Value>) -> Option<usize> {
    match v? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        _ => None,
    }
}
