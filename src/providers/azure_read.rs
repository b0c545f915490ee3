//! Azure Computer Vision Read v3.2.
//!
//! Read is asynchronous: the analyze call returns `202 Accepted` and an
//! `Operation-Location` header, and the result is collected by polling that
//! URL until its `status` leaves `notStarted` / `running`. Polling is driven
//! by [`crate::pipeline::poll::poll_job`]; this module only knows how to
//! submit, how to read one status body, and how to turn the final body into
//! pages.

use super::http::{build_client, read_json, send};
use super::{OcrProvider, PageOcr, ProviderResult, Submission};
use crate::config::{PollConfig, ProviderKind, RunConfig};
use crate::credentials::AzureCredentials;
use crate::error::OcrError;
use crate::pipeline::poll::{poll_job, JobSnapshot, JobState, PollableJob, Sleeper, TokioSleeper};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const NAME: &str = "azure";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

pub struct AzureReadProvider {
    client: reqwest::Client,
    creds: AzureCredentials,
    timeout: Duration,
    poll: PollConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for AzureReadProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureReadProvider")
            .field("creds", &self.creds)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl AzureReadProvider {
    pub fn new(creds: AzureCredentials, config: &RunConfig) -> Result<Self, OcrError> {
        Ok(Self {
            client: build_client(config.api_timeout())?,
            creds,
            timeout: config.api_timeout(),
            poll: config.poll,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the wall-clock sleeper used between status checks.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn analyze_url(&self) -> String {
        format!("{}/vision/v3.2/read/analyze", self.creds.base_url())
    }

    async fn start_job(&self, sub: &Submission<'_>) -> Result<String, OcrError> {
        let request = self
            .client
            .post(self.analyze_url())
            .header(KEY_HEADER, &self.creds.key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(sub.bytes.to_vec());
        let response = send(NAME, self.timeout, request).await?;

        let location = response
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| OcrError::MalformedResponse {
                provider: NAME.into(),
                detail: "analyze response has no Operation-Location header".into(),
            })?;
        info!(
            "{}: Read operation {} submitted, waiting for results",
            sub.label,
            operation_id(&location)
        );
        Ok(location)
    }
}

#[async_trait]
impl OcrProvider for AzureReadProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    async fn submit(&self, sub: &Submission<'_>) -> Result<ProviderResult, OcrError> {
        let location = self.start_job(sub).await?;
        let mut job = ReadJob {
            client: &self.client,
            url: location,
            key: &self.creds.key,
            timeout: self.timeout,
        };
        let outcome = poll_job(&mut job, &self.poll, self.sleeper.as_ref(), sub.label).await?;
        let body = outcome.into_result(NAME, sub.label)?;
        parse_read_result(body)
    }
}

/// One in-flight Read operation.
struct ReadJob<'a> {
    client: &'a reqwest::Client,
    url: String,
    key: &'a str,
    timeout: Duration,
}

#[async_trait]
impl PollableJob for ReadJob<'_> {
    async fn check_status(&mut self) -> Result<JobSnapshot, OcrError> {
        let request = self.client.get(&self.url).header(KEY_HEADER, self.key);
        let response = send(NAME, self.timeout, request).await?;
        let body = read_json(NAME, self.timeout, response).await?;
        snapshot(body)
    }
}

/// Interpret one status body.
fn snapshot(body: Value) -> Result<JobSnapshot, OcrError> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| OcrError::MalformedResponse {
            provider: NAME.into(),
            detail: "status body has no 'status'".into(),
        })?;
    let state = JobState::parse(status);
    let message = match state {
        JobState::Succeeded | JobState::NotStarted | JobState::Running => None,
        _ => failure_message(&body),
    };
    Ok(JobSnapshot {
        state,
        message,
        body,
    })
}

/// `message` and any `analyzeResult.errors`, joined.
fn failure_message(body: &Value) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(m) = body.get("message").and_then(Value::as_str) {
        parts.push(format!("Message: {m}"));
    }
    if let Some(errs) = body.pointer("/analyzeResult/errors").and_then(Value::as_array) {
        if !errs.is_empty() {
            parts.push(format!("API Errors: {}", Value::Array(errs.clone())));
        }
    }
    if let Some(m) = body.pointer("/error/message").and_then(Value::as_str) {
        parts.push(format!("Error: {m}"));
    }
    (!parts.is_empty()).then(|| parts.join(" - "))
}

/// Split a succeeded body into pages; what remains becomes `document`.
fn parse_read_result(mut body: Value) -> Result<ProviderResult, OcrError> {
    let read_results = body
        .pointer_mut("/analyzeResult/readResults")
        .map(Value::take)
        .and_then(|v| match v {
            Value::Array(a) => Some(a),
            _ => None,
        })
        .ok_or_else(|| OcrError::MalformedResponse {
            provider: NAME.into(),
            detail: "succeeded without analyzeResult.readResults".into(),
        })?;

    let pages = read_results
        .into_iter()
        .map(|page| PageOcr {
            text: page_text(&page),
            raw: page,
        })
        .collect();

    if let Some(analyze) = body.get_mut("analyzeResult").and_then(Value::as_object_mut) {
        analyze.remove("readResults");
    }
    Ok(ProviderResult {
        pages,
        document: Some(body),
    })
}

fn page_text(page: &Value) -> String {
    page.get("lines")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn operation_id(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}
