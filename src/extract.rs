//! Run orchestration: files × providers, one at a time.
//!
//! For each (file, provider) pair the [`Extractor`]:
//!
//! 1. classifies the file ([`JobInput::from_path`]),
//! 2. picks a strategy: the whole file in one submission when the provider
//!    reads it natively, otherwise rasterise the PDF and submit each page,
//! 3. aggregates the pages ([`aggregate`]),
//! 4. writes the `.txt` / `.json` pair ([`OutputWriter`]).
//!
//! Any error at any of those steps is caught at the pair boundary, logged,
//! reported to the progress callback and counted; the run moves on to the
//! next pair. Only configuration errors stop the run.

use crate::config::RunConfig;
use crate::error::{ErrorClass, OcrError, PageError};
use crate::output::{OutputWriter, WrittenFiles};
use crate::pipeline::aggregate::{aggregate, AggregateContext, JobResult, Method, PageText};
use crate::pipeline::input::{Discovery, JobInput};
use crate::pipeline::render::{rasterize_pdf, Rasterizer};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::providers::{OcrProvider, ProviderResult, Submission};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome of one (file, provider) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Written(WrittenFiles),
    /// Written, but some pages of a per-page submission were lost.
    Partial {
        files: WrittenFiles,
        failed_pages: Vec<usize>,
    },
    Failed { class: ErrorClass, message: String },
}

impl JobStatus {
    /// Paths of the output pair, if one was written.
    pub fn files(&self) -> Option<&WrittenFiles> {
        match self {
            JobStatus::Written(files) | JobStatus::Partial { files, .. } => Some(files),
            JobStatus::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub file: PathBuf,
    pub provider: String,
    pub status: JobStatus,
}

/// What happened over a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub reports: Vec<JobReport>,
    /// Unsupported files seen during discovery.
    pub skipped: Vec<PathBuf>,
}

impl RunSummary {
    /// Pairs with output written, partial ones included.
    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status.files().is_some())
            .count()
    }

    /// Pairs written with at least one page missing.
    pub fn partial(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, JobStatus::Partial { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Drives extraction for a fixed set of providers.
pub struct Extractor {
    providers: Vec<Arc<dyn OcrProvider>>,
    rasterizer: Arc<dyn Rasterizer>,
    writer: OutputWriter,
    config: RunConfig,
    progress: ProgressCallback,
}

impl Extractor {
    pub fn new(
        providers: Vec<Arc<dyn OcrProvider>>,
        rasterizer: Arc<dyn Rasterizer>,
        writer: OutputWriter,
        config: RunConfig,
    ) -> Self {
        Self {
            providers,
            rasterizer,
            writer,
            config,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn OcrProvider>] {
        &self.providers
    }

    /// Process every discovered file with every provider, in order.
    ///
    /// Returns `Err` only for errors that must stop the whole run.
    pub async fn run(&self, discovery: &Discovery) -> Result<RunSummary, OcrError> {
        let total = discovery.files.len() * self.providers.len();
        info!(
            "Processing {} file(s) with {} provider(s)",
            discovery.files.len(),
            self.providers.len()
        );
        self.progress.on_run_start(total);

        let mut summary = RunSummary {
            reports: Vec::with_capacity(total),
            skipped: discovery.skipped.clone(),
        };

        for file in &discovery.files {
            for provider in &self.providers {
                let report = self.run_one(file, provider.as_ref()).await?;
                summary.reports.push(report);
            }
        }

        info!(
            "Run complete: {} succeeded ({} partial), {} failed, {} skipped",
            summary.succeeded(),
            summary.partial(),
            summary.failed(),
            summary.skipped.len()
        );
        self.progress
            .on_run_complete(summary.succeeded(), summary.failed());
        Ok(summary)
    }

    async fn run_one(&self, file: &Path, provider: &dyn OcrProvider) -> Result<JobReport, OcrError> {
        let name = display_name(file);
        self.progress.on_file_start(&name, provider.name());
        let start = Instant::now();

        let status = match self.process_file(file, provider).await {
            Ok((written, result)) => {
                info!(
                    "{} via {}: {} page(s), {} chars in {:?}",
                    name,
                    provider.name(),
                    result.envelope.pages.len(),
                    result.text.chars().count(),
                    start.elapsed()
                );
                self.progress
                    .on_file_complete(&name, provider.name(), result.text.len());
                let failed_pages: Vec<usize> = result
                    .envelope
                    .failed_pages
                    .iter()
                    .map(PageError::page)
                    .collect();
                if failed_pages.is_empty() {
                    JobStatus::Written(written)
                } else {
                    warn!(
                        "{} via {}: written without page(s) {:?}",
                        name,
                        provider.name(),
                        failed_pages
                    );
                    JobStatus::Partial {
                        files: written,
                        failed_pages,
                    }
                }
            }
            Err(e) if e.is_fatal_to_run() => return Err(e),
            Err(e) => {
                error!("{} via {}: {}", name, provider.name(), e);
                self.progress
                    .on_file_error(&name, provider.name(), &e.to_string());
                JobStatus::Failed {
                    class: e.class(),
                    message: e.to_string(),
                }
            }
        };

        Ok(JobReport {
            file: file.to_path_buf(),
            provider: provider.name().to_string(),
            status,
        })
    }

    /// Extract `file` with `provider` and write the output pair.
    pub async fn process_file(
        &self,
        file: &Path,
        provider: &dyn OcrProvider,
    ) -> Result<(WrittenFiles, JobResult), OcrError> {
        let input = JobInput::from_path(file)?;
        let result = self.extract(&input, provider).await?;
        let written = self.writer.write(&input.stem(), provider.name(), &result)?;
        Ok((written, result))
    }

    /// Extract `input` with `provider` without writing anything.
    pub async fn extract(
        &self,
        input: &JobInput,
        provider: &dyn OcrProvider,
    ) -> Result<JobResult, OcrError> {
        let per_page =
            input.is_pdf() && (self.config.force_pdf_to_images || !provider.supports_direct_pdf());

        let (pages, method, document, failed_pages) = if per_page {
            let (pages, failed) = self.submit_pages(input, provider).await?;
            (pages, Method::PdfConvertedToImages, None, failed)
        } else {
            let (pages, document) = self.submit_whole(input, provider).await?;
            (pages, Method::Direct, document, Vec::new())
        };

        aggregate(
            pages,
            AggregateContext {
                source_file: &input.path,
                provider: provider.name(),
                method,
                document,
                failed_pages,
            },
        )
        .ok_or_else(|| OcrError::NoResult {
            provider: provider.name().to_string(),
            path: input.path.clone(),
        })
    }

    async fn submit_whole(
        &self,
        input: &JobInput,
        provider: &dyn OcrProvider,
    ) -> Result<(Vec<PageText>, Option<Value>), OcrError> {
        let bytes = input.read_bytes().await?;
        let label = input.file_name();
        let stem = input.stem();
        info!("{}: submitting whole file to {}", label, provider.name());

        let result = provider
            .submit(&Submission {
                bytes: &bytes,
                mime_type: input.mime_type,
                label: &label,
                stem: &stem,
                first_page: 1,
            })
            .await?;

        let pages = result
            .pages
            .into_iter()
            .enumerate()
            .map(|(i, p)| PageText {
                page: i + 1,
                text: p.text,
                response: p.raw,
            })
            .collect();
        Ok((pages, result.document))
    }

    async fn submit_pages(
        &self,
        input: &JobInput,
        provider: &dyn OcrProvider,
    ) -> Result<(Vec<PageText>, Vec<PageError>), OcrError> {
        let label = input.file_name();
        let stem = input.stem();
        info!("{}: converting PDF pages to images", label);
        let images = rasterize_pdf(&self.rasterizer, &input.path).await?;
        let total = images.len();

        let mut pages = Vec::with_capacity(total);
        let mut failed = Vec::new();

        for image in &images {
            let n = image.page_num;
            self.progress.on_page_start(n, total);
            let page_label = format!("{label} p{n}/{total}");

            match provider
                .submit(&Submission {
                    bytes: &image.bytes,
                    mime_type: image.mime_type,
                    label: &page_label,
                    stem: &stem,
                    first_page: n,
                })
                .await
            {
                Ok(result) => match single_page(result) {
                    Some((text, response)) => pages.push(PageText {
                        page: n,
                        text,
                        response,
                    }),
                    None => {
                        warn!("{}: provider returned no page", page_label);
                        let err = PageError::NoResult { page: n };
                        self.progress.on_page_error(n, total, &err.to_string());
                        failed.push(err);
                    }
                },
                Err(e) if e.is_fatal_to_run() => return Err(e),
                Err(e) => {
                    warn!("{}: {}", page_label, e);
                    self.progress.on_page_error(n, total, &e.to_string());
                    failed.push(PageError::SubmitFailed {
                        page: n,
                        detail: e.to_string(),
                    });
                }
            }
        }

        if total > 0 && pages.is_empty() {
            return Err(OcrError::AllPagesFailed {
                total,
                first_error: failed
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        Ok((pages, failed))
    }
}

/// Collapse the result of submitting one page image to `(text, response)`.
///
/// A provider that splits a single image into several entries has its texts
/// joined by newlines and its raw entries kept together.
fn single_page(result: ProviderResult) -> Option<(String, Value)> {
    let ProviderResult { mut pages, document } = result;
    match (pages.len(), document) {
        (0, _) => None,
        (1, None) => pages.pop().map(|p| (p.text, p.raw)),
        (_, document) => {
            let text = pages
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let raws: Vec<Value> = pages.into_iter().map(|p| p.raw).collect();
            let mut response = json!({ "pages": raws });
            if let Some(doc) = document {
                response["document"] = doc;
            }
            Some((text, response))
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::PageOcr;

    #[test]
    fn single_page_passthrough() {
        let r = ProviderResult::single("abc", json!({ "k": 1 }));
        assert_eq!(single_page(r), Some(("abc".to_string(), json!({ "k": 1 }))));
        assert_eq!(single_page(ProviderResult::default()), None);
    }

    #[test]
    fn single_page_with_document_is_wrapped() {
        let r = ProviderResult {
            pages: vec![PageOcr {
                text: "t".into(),
                raw: json!({ "page": 1 }),
            }],
            document: Some(json!({ "status": "succeeded" })),
        };
        let (text, response) = single_page(r).unwrap();
        assert_eq!(text, "t");
        assert_eq!(response["pages"][0]["page"], 1);
        assert_eq!(response["document"]["status"], "succeeded");
    }

    #[test]
    fn summary_counts() {
        let ok = JobReport {
            file: "a.png".into(),
            provider: "google".into(),
            status: JobStatus::Written(WrittenFiles {
                text: "a.txt".into(),
                json: "a.json".into(),
            }),
        };
        let bad = JobReport {
            file: "b.png".into(),
            provider: "google".into(),
            status: JobStatus::Failed {
                class: ErrorClass::Provider,
                message: "HTTP 500".into(),
            },
        };
        let s = RunSummary {
            reports: vec![ok, bad],
            skipped: vec!["c.docx".into()],
        };
        assert_eq!(s.succeeded(), 1);
        assert_eq!(s.failed(), 1);
        assert!(s.has_failures());
    }

    #[test]
    fn partial_counts_as_written_and_is_reported() {
        let partial = JobReport {
            file: "scan.pdf".into(),
            provider: "azure".into(),
            status: JobStatus::Partial {
                files: WrittenFiles {
                    text: "scan.txt".into(),
                    json: "scan.json".into(),
                },
                failed_pages: vec![2],
            },
        };
        assert!(partial.status.files().is_some());
        let s = RunSummary {
            reports: vec![partial],
            skipped: Vec::new(),
        };
        assert_eq!(s.succeeded(), 1);
        assert_eq!(s.partial(), 1);
        assert_eq!(s.failed(), 0);
    }
}
