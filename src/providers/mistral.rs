//! Mistral OCR (`mistral-ocr-latest`).
//!
//! The file is sent inline as a `data:` URI, as a `document_url` for PDFs
//! and an `image_url` otherwise. The response already comes split into
//! pages of Markdown. When an images directory is configured the request sets
//! `include_image_base64`, so figures detected on a page come back inline and
//! are written to disk as `{stem}_page{NNN}_img{i}.{ext}`.

use super::http::{build_client, send_json};
use super::{OcrProvider, PageOcr, ProviderResult, Submission};
use crate::config::{ProviderKind, RunConfig};
use crate::error::OcrError;
use crate::pipeline::encode::{decode_data_uri, to_data_uri};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const OCR_URL: &str = "https://api.mistral.ai/v1/ocr";
const NAME: &str = "mistral";
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

pub struct MistralOcrProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    timeout: Duration,
    images_dir: Option<PathBuf>,
}

impl std::fmt::Debug for MistralOcrProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcrProvider")
            .field("model", &self.model)
            .field("images_dir", &self.images_dir)
            .finish_non_exhaustive()
    }
}

impl MistralOcrProvider {
    pub fn new(api_key: String, config: &RunConfig) -> Result<Self, OcrError> {
        Ok(Self {
            client: build_client(config.api_timeout())?,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            timeout: config.api_timeout(),
            images_dir: config.images_dir.clone(),
        })
    }
}

#[async_trait]
impl OcrProvider for MistralOcrProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mistral
    }

    async fn submit(&self, sub: &Submission<'_>) -> Result<ProviderResult, OcrError> {
        let body = request_body(
            &self.model,
            sub.bytes,
            sub.mime_type,
            self.images_dir.is_some(),
        );
        info!("{}: running Mistral OCR", sub.label);
        let resp = send_json(
            NAME,
            self.timeout,
            self.client
                .post(OCR_URL)
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;

        let result = split_pages(resp)?;
        info!("{}: recognised {} page(s)", sub.label, result.pages.len());

        if let Some(dir) = &self.images_dir {
            let n = dump_images(dir, sub.stem, &result.pages, sub.first_page)?;
            if n > 0 {
                info!("{}: {} inline image(s) written to {}", sub.label, n, dir.display());
            }
        }
        Ok(result)
    }
}

fn request_body(model: &str, bytes: &[u8], mime_type: &str, include_images: bool) -> Value {
    let uri = to_data_uri(bytes, mime_type);
    let document = if mime_type == "application/pdf" {
        json!({ "type": "document_url", "document_url": uri })
    } else {
        json!({ "type": "image_url", "image_url": uri })
    };
    json!({
        "model": model,
        "document": document,
        "include_image_base64": include_images,
    })
}

fn split_pages(mut resp: Value) -> Result<ProviderResult, OcrError> {
    let pages = match resp.get_mut("pages").map(Value::take) {
        Some(Value::Array(pages)) => pages,
        _ => {
            return Err(OcrError::MalformedResponse {
                provider: NAME.into(),
                detail: "response has no 'pages' array".into(),
            })
        }
    };
    if let Some(obj) = resp.as_object_mut() {
        obj.remove("pages");
    }

    let pages = pages
        .into_iter()
        .map(|page| PageOcr {
            text: page
                .get("markdown")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            raw: page,
        })
        .collect();
    Ok(ProviderResult {
        pages,
        document: Some(resp),
    })
}

/// Write every inline figure as `{stem}_page{NNN}_img{i}.{ext}`; returns the
/// count.
fn dump_images(
    dir: &Path,
    stem: &str,
    pages: &[PageOcr],
    first_page: usize,
) -> Result<usize, OcrError> {
    std::fs::create_dir_all(dir).map_err(|source| OcrError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut count = 0;
    for (p_idx, page) in pages.iter().enumerate() {
        let images = page
            .raw
            .get("images")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for (i_idx, img) in images.iter().enumerate() {
            let Some(uri) = img.get("image_base64").and_then(Value::as_str) else {
                continue;
            };
            let Some((mime, bytes)) = decode_data_uri(uri) else {
                warn!("Page {}: image {} is not a data URI, skipped", p_idx + first_page, i_idx + 1);
                continue;
            };
            let path = dir.join(image_file_name(stem, p_idx + first_page, i_idx + 1, &mime));
            std::fs::write(&path, bytes).map_err(|source| OcrError::OutputWriteFailed {
                path: path.clone(),
                source,
            })?;
            count += 1;
        }
    }
    Ok(count)
}

fn image_file_name(stem: &str, page: usize, index: usize, mime: &str) -> String {
    let ext = mime.split('/').nth(1).unwrap_or("bin");
    format!("{stem}_page{page:03}_img{index}.{ext}")
}
