//! Asynchronous job polling.
//!
//! Some providers answer a submission with a job handle instead of a result.
//! [`poll_job`] drives that job through an explicit state machine:
//!
//! ```text
//! Submitted ──▶ Polling ──┬──▶ Succeeded  (result fetched exactly once)
//!                 ▲   │   ├──▶ Failed     (status + message + raw body)
//!                 └───┘   └──▶ TimedOut   (max_wait exceeded)
//!              (interval)
//! ```
//!
//! The wait between checks goes through a [`Sleeper`] so tests can script a
//! status sequence and assert on the number of checks without real delays.
//! Elapsed time is the sum of intervals slept, which makes `max_wait`
//! deterministic under test.

use crate::config::PollConfig;
use crate::error::OcrError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Status reported by a provider for an in-flight job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    /// Any status string the provider invents that is none of the above.
    Other(String),
}

impl JobState {
    /// Parse a provider status string (case-insensitive, `_`/`-` ignored).
    pub fn parse(status: &str) -> Self {
        let norm: String = status
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "notstarted" | "queued" | "pending" => JobState::NotStarted,
            "running" | "inprogress" | "processing" => JobState::Running,
            "succeeded" | "success" | "done" | "completed" => JobState::Succeeded,
            "failed" | "failure" | "error" => JobState::Failed,
            _ => JobState::Other(status.to_string()),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, JobState::NotStarted | JobState::Running)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::NotStarted => "notStarted",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Other(s) => s,
        }
    }
}

/// One status check's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub state: JobState,
    /// Provider diagnostic, if any.
    pub message: Option<String>,
    /// Raw status body.
    pub body: Value,
}

/// A submitted job that can be polled.
#[async_trait]
pub trait PollableJob: Send {
    /// Ask the provider for the current status.
    async fn check_status(&mut self) -> Result<JobSnapshot, OcrError>;

    /// Retrieve the final result once the job has succeeded.
    ///
    /// Providers whose status body already carries the result (Azure Read)
    /// can rely on this default.
    async fn fetch_result(&mut self, finished: JobSnapshot) -> Result<Value, OcrError> {
        Ok(finished.body)
    }
}

/// Injected delay between status checks.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Terminal state of a polled job.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded {
        result: Value,
        checks: u32,
    },
    Failed {
        status: String,
        message: Option<String>,
        details: Value,
        checks: u32,
    },
    TimedOut {
        last_status: String,
        waited: Duration,
        checks: u32,
    },
}

impl PollOutcome {
    pub fn checks(&self) -> u32 {
        match self {
            PollOutcome::Succeeded { checks, .. }
            | PollOutcome::Failed { checks, .. }
            | PollOutcome::TimedOut { checks, .. } => *checks,
        }
    }

    /// Convert to the provider's result, mapping failure and timeout to
    /// [`OcrError`] for the per-file boundary.
    pub fn into_result(self, provider: &str, label: &str) -> Result<Value, OcrError> {
        match self {
            PollOutcome::Succeeded { result, .. } => Ok(result),
            PollOutcome::Failed {
                status, message, ..
            } => Err(OcrError::JobFailed {
                provider: provider.to_string(),
                label: label.to_string(),
                status,
                message,
            }),
            PollOutcome::TimedOut {
                last_status,
                waited,
                checks,
            } => Err(OcrError::PollTimedOut {
                provider: provider.to_string(),
                label: label.to_string(),
                last_status,
                waited_secs: waited.as_secs(),
                checks,
            }),
        }
    }
}

/// Poll `job` until it leaves its in-progress states.
///
/// Transport errors from a status check propagate as `Err`; provider-reported
/// failure and timeout are returned as [`PollOutcome`] variants.
pub async fn poll_job<J>(
    job: &mut J,
    config: &PollConfig,
    sleeper: &dyn Sleeper,
    label: &str,
) -> Result<PollOutcome, OcrError>
where
    J: PollableJob + ?Sized,
{
    let mut checks: u32 = 0;
    let mut waited = Duration::ZERO;

    loop {
        let snapshot = job.check_status().await?;
        checks += 1;
        debug!(
            "{}: status check {} → {}",
            label,
            checks,
            snapshot.state.as_str()
        );

        if snapshot.state.is_in_progress() {
            if let Some(max) = config.max_wait {
                if waited + config.interval > max {
                    warn!(
                        "{}: giving up after {:?} ({} checks), still {}",
                        label,
                        waited,
                        checks,
                        snapshot.state.as_str()
                    );
                    return Ok(PollOutcome::TimedOut {
                        last_status: snapshot.state.as_str().to_string(),
                        waited,
                        checks,
                    });
                }
            }
            sleeper.sleep(config.interval).await;
            waited += config.interval;
            continue;
        }

        return match snapshot.state {
            JobState::Succeeded => {
                info!("{}: job succeeded after {} checks", label, checks);
                let result = job.fetch_result(snapshot).await?;
                Ok(PollOutcome::Succeeded { result, checks })
            }
            state => {
                warn!(
                    "{}: job ended with status '{}'{}",
                    label,
                    state.as_str(),
                    snapshot
                        .message
                        .as_deref()
                        .map(|m| format!(" - {m}"))
                        .unwrap_or_default()
                );
                Ok(PollOutcome::Failed {
                    status: state.as_str().to_string(),
                    message: snapshot.message,
                    details: snapshot.body,
                    checks,
                })
            }
        };
    }
}
