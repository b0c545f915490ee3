//! Google Cloud Vision `DOCUMENT_TEXT_DETECTION`.
//!
//! Images go to `images:annotate`. PDFs go to `files:annotate` with the file
//! inline; that endpoint answers synchronously for at most five pages per
//! request, so the document is walked in five-page windows until the
//! reported `totalPages` is covered. Each page's `AnnotateImageResponse` is
//! kept verbatim as that page's raw JSON.

use super::google_auth::{GoogleAuth, CLOUD_PLATFORM_SCOPE};
use super::http::{build_client, send_json};
use super::{OcrProvider, PageOcr, ProviderResult, Submission};
use crate::config::{ProviderKind, RunConfig};
use crate::credentials::ServiceAccountKey;
use crate::error::OcrError;
use crate::pipeline::encode::to_base64;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const IMAGES_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";
const FILES_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/files:annotate";
const NAME: &str = "google";

/// Pages per synchronous `files:annotate` request.
pub const PAGES_PER_REQUEST: usize = 5;

#[derive(Debug)]
pub struct GoogleVisionProvider {
    client: reqwest::Client,
    auth: GoogleAuth,
    timeout: Duration,
}

impl GoogleVisionProvider {
    pub fn new(key: ServiceAccountKey, config: &RunConfig) -> Result<Self, OcrError> {
        Ok(Self {
            client: build_client(config.api_timeout())?,
            auth: GoogleAuth::new(key, CLOUD_PLATFORM_SCOPE)?,
            timeout: config.api_timeout(),
        })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, OcrError> {
        let token = self.auth.access_token(&self.client, NAME, self.timeout).await?;
        send_json(
            NAME,
            self.timeout,
            self.client.post(url).bearer_auth(token).json(body),
        )
        .await
    }

    async fn annotate_image(&self, sub: &Submission<'_>) -> Result<ProviderResult, OcrError> {
        let body = json!({
            "requests": [{
                "image": { "content": to_base64(sub.bytes) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
            }]
        });
        let resp = self.post(IMAGES_ANNOTATE_URL, &body).await?;
        let first = resp
            .pointer("/responses/0")
            .cloned()
            .ok_or_else(|| OcrError::MalformedResponse {
                provider: NAME.into(),
                detail: "no entry in 'responses'".into(),
            })?;
        check_error(&first)?;
        let text = full_text(&first);
        debug!("{}: {} chars", sub.label, text.len());
        Ok(ProviderResult::single(text, first))
    }

    async fn annotate_pdf(&self, sub: &Submission<'_>) -> Result<ProviderResult, OcrError> {
        let content = to_base64(sub.bytes);
        let mut pages = Vec::new();
        let mut total: Option<usize> = None;
        let mut start = 1usize;

        loop {
            let window: Vec<usize> = (start..start + PAGES_PER_REQUEST)
                .take_while(|p| total.map_or(true, |t| *p <= t))
                .collect();
            if window.is_empty() {
                break;
            }

            info!(
                "{}: requesting pages {}-{}",
                sub.label,
                window[0],
                window[window.len() - 1]
            );
            let mut request = json!({
                "inputConfig": { "content": content, "mimeType": "application/pdf" },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
            });
            // The first call omits `pages`: the API then returns the first five
            // pages whatever the document length, plus `totalPages`.
            if start > 1 {
                request["pages"] = json!(window);
            }
            let body = json!({ "requests": [request] });
            let resp = self.post(FILES_ANNOTATE_URL, &body).await?;
            let (chunk, reported_total) = parse_file_response(&resp)?;
            total = Some(reported_total.unwrap_or(start + chunk.len() - 1));
            let got = chunk.len();
            pages.extend(chunk);

            if got == 0 {
                break;
            }
            start += PAGES_PER_REQUEST;
        }

        Ok(ProviderResult {
            pages,
            document: total.map(|t| json!({ "totalPages": t })),
        })
    }
}

#[async_trait]
impl OcrProvider for GoogleVisionProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn submit(&self, sub: &Submission<'_>) -> Result<ProviderResult, OcrError> {
        if sub.mime_type == "application/pdf" {
            self.annotate_pdf(sub).await
        } else {
            self.annotate_image(sub).await
        }
    }
}

/// `fullTextAnnotation.text`, or empty when nothing was detected.
fn full_text(resp: &Value) -> String {
    resp.pointer("/fullTextAnnotation/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// An `error.message` inside a 200 response is still a failure.
fn check_error(resp: &Value) -> Result<(), OcrError> {
    match resp.pointer("/error/message").and_then(Value::as_str) {
        Some(msg) if !msg.is_empty() => Err(OcrError::ProviderReported {
            provider: NAME.into(),
            message: msg.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Per-page results and `totalPages` from a `files:annotate` response.
fn parse_file_response(resp: &Value) -> Result<(Vec<PageOcr>, Option<usize>), OcrError> {
    let file = resp
        .pointer("/responses/0")
        .ok_or_else(|| OcrError::MalformedResponse {
            provider: NAME.into(),
            detail: "no entry in 'responses'".into(),
        })?;
    check_error(file)?;

    let total = file
        .get("totalPages")
        .and_then(Value::as_u64)
        .map(|n| n as usize);

    let mut pages = Vec::new();
    for page in file
        .get("responses")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        check_error(page)?;
        pages.push(PageOcr {
            text: full_text(page),
            raw: page.clone(),
        });
    }
    Ok((pages, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_text_and_missing_annotation() {
        let resp = json!({ "fullTextAnnotation": { "text": "Hello\nWorld\n" } });
        assert_eq!(full_text(&resp), "Hello\nWorld\n");
        assert_eq!(full_text(&json!({})), "");
    }

    #[test]
    fn error_inside_200_is_reported() {
        let resp = json!({ "error": { "code": 3, "message": "Bad image data." } });
        match check_error(&resp).unwrap_err() {
            OcrError::ProviderReported { message, .. } => assert_eq!(message, "Bad image data."),
            other => panic!("unexpected {other}"),
        }
        assert!(check_error(&json!({ "error": {} })).is_ok());
    }

    #[test]
    fn file_response_pages_in_order() {
        let resp = json!({
            "responses": [{
                "totalPages": 7,
                "responses": [
                    { "fullTextAnnotation": { "text": "p1" }, "context": { "pageNumber": 1 } },
                    { "context": { "pageNumber": 2 } },
                    { "fullTextAnnotation": { "text": "p3" }, "context": { "pageNumber": 3 } },
                ]
            }]
        });
        let (pages, total) = parse_file_response(&resp).unwrap();
        assert_eq!(total, Some(7));
        let texts: Vec<&str> = pages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["p1", "", "p3"]);
        assert_eq!(pages[1].raw["context"]["pageNumber"], 2);
    }

    #[test]
    fn file_response_page_error_fails() {
        let resp = json!({
            "responses": [{ "responses": [{ "error": { "message": "page too large" } }] }]
        });
        assert!(parse_file_response(&resp).is_err());
        assert!(parse_file_response(&json!({})).is_err());
    }
}
