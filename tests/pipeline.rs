//! Integration tests for the extraction pipeline.
//!
//! A scripted provider and rasteriser stand in for the network and pdfium,
//! so these run offline:
//!
//!   cargo test --test pipeline

use async_trait::async_trait;
use ocr_extract::{
    discover_inputs, Envelope, ErrorClass, Extractor, JobStatus, Method, OcrError, OcrProvider,
    OutputWriter, PageError, PageImage, PageOcr, ProviderKind, ProviderResult, Rasterizer,
    RunConfig, RunProgressCallback, Submission, PAGE_BREAK,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Echoes the submitted bytes back as text. A whole-document submission is
/// split into pages on form feeds.
struct EchoProvider {
    kind: ProviderKind,
    name: String,
    fail_on: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl EchoProvider {
    fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            fail_on: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every submission whose label contains `needle`.
    fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrProvider for EchoProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, sub: &Submission<'_>) -> Result<ProviderResult, OcrError> {
        self.calls.lock().unwrap().push(sub.label.to_string());

        if self.fail_on.iter().any(|n| sub.label.contains(n.as_str())) {
            return Err(OcrError::Http {
                provider: self.name.clone(),
                status: 500,
                body: "internal error".into(),
            });
        }

        let body = String::from_utf8_lossy(sub.bytes).into_owned();
        let pages = body
            .split('\u{c}')
            .enumerate()
            .map(|(i, text)| PageOcr {
                text: text.to_string(),
                raw: serde_json::json!({
                    "page": sub.first_page + i,
                    "mime": sub.mime_type,
                    "stem": sub.stem,
                }),
            })
            .collect();
        Ok(ProviderResult {
            pages,
            document: None,
        })
    }
}

/// Returns the configured page texts as "images".
struct ScriptedRasterizer {
    pages: Vec<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedRasterizer {
    fn new(pages: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            calls: AtomicUsize::new(0),
        })
    }
}

impl Rasterizer for ScriptedRasterizer {
    fn rasterize(&self, _pdf_path: &Path) -> Result<Vec<PageImage>, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .iter()
            .enumerate()
            .map(|(i, text)| PageImage {
                page_num: i + 1,
                bytes: text.as_bytes().to_vec(),
                mime_type: "image/png",
            })
            .collect())
    }
}

#[derive(Default)]
struct CountingProgress {
    total: AtomicUsize,
    pages: AtomicUsize,
    page_errors: Mutex<Vec<(usize, usize)>>,
    completes: AtomicUsize,
    errors: AtomicUsize,
    finished: AtomicUsize,
}

impl RunProgressCallback for CountingProgress {
    fn on_run_start(&self, total_jobs: usize) {
        self.total.store(total_jobs, Ordering::SeqCst);
    }
    fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
        self.pages.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_error(&self, page_num: usize, total_pages: usize, _error: &str) {
        self.page_errors.lock().unwrap().push((page_num, total_pages));
    }
    fn on_file_complete(&self, _file: &str, _provider: &str, _text_len: usize) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_error(&self, _file: &str, _provider: &str, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_run_complete(&self, _succeeded: usize, _failed: usize) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

fn extractor(
    provider: Arc<dyn OcrProvider>,
    rasterizer: Arc<dyn Rasterizer>,
    out: &Path,
    config: RunConfig,
) -> Extractor {
    Extractor::new(
        vec![provider],
        rasterizer,
        OutputWriter::new(out).unwrap(),
        config,
    )
}

fn output_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn forced() -> RunConfig {
    RunConfig::builder().force_pdf_to_images(true).build().unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn image_produces_single_page_without_separator() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let path = write_file(input.path(), "receipt.png", "TOTAL 12.50");

    let provider = Arc::new(EchoProvider::new(ProviderKind::Google));
    let rasterizer = ScriptedRasterizer::new(vec![]);
    let ex = extractor(provider.clone(), rasterizer.clone(), out.path(), RunConfig::default());

    let (written, result) =
        tokio_test::block_on(ex.process_file(&path, provider.as_ref())).unwrap();

    assert_eq!(result.text, "TOTAL 12.50");
    assert!(!result.text.contains(PAGE_BREAK.trim()));
    assert_eq!(result.envelope.pages.len(), 1);
    assert_eq!(result.envelope.method, Method::Direct);
    assert_eq!(result.envelope.pages[0].response["mime"], "image/png");
    assert_eq!(result.envelope.pages[0].response["stem"], "receipt");
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(provider.calls(), vec!["receipt.png".to_string()]);

    let name = written.text.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("receipt_google_"), "got {name}");
    assert!(name.ends_with(".txt"));
}

#[tokio::test]
async fn forced_pdf_is_submitted_page_by_page() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let path = write_file(input.path(), "report.pdf", "%PDF-1.7");

    let provider = Arc::new(EchoProvider::new(ProviderKind::Azure));
    let rasterizer = ScriptedRasterizer::new(vec!["one", "two", "three"]);
    let ex = extractor(provider.clone(), rasterizer.clone(), out.path(), forced());

    let (_, result) = ex.process_file(&path, provider.as_ref()).await.unwrap();

    assert_eq!(result.envelope.method, Method::PdfConvertedToImages);
    assert_eq!(result.envelope.pages.len(), 3);
    assert_eq!(result.text.matches("--- Page Break ---").count(), 2);
    assert_eq!(result.text, ["one", "two", "three"].join(PAGE_BREAK));
    assert_eq!(
        result
            .envelope
            .pages
            .iter()
            .map(|p| p.page)
            .collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(provider.calls().len(), 3);
    assert_eq!(provider.calls()[1], "report.pdf p2/3");
    assert_eq!(result.envelope.pages[1].response["stem"], "report");
    assert!(result.envelope.failed_pages.is_empty());
}

#[tokio::test]
async fn native_pdf_provider_gets_whole_file() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let path = write_file(input.path(), "letter.pdf", "Dear reader\u{c}Regards");

    let provider = Arc::new(EchoProvider::new(ProviderKind::Mistral));
    let rasterizer = ScriptedRasterizer::new(vec!["unused"]);
    let ex = extractor(provider.clone(), rasterizer.clone(), out.path(), RunConfig::default());

    let (_, result) = ex.process_file(&path, provider.as_ref()).await.unwrap();

    assert_eq!(result.envelope.method, Method::Direct);
    assert_eq!(result.envelope.pages.len(), 2);
    assert_eq!(result.text, format!("Dear reader{PAGE_BREAK}Regards"));
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(provider.calls(), vec!["letter.pdf".to_string()]);
}

#[tokio::test]
async fn vision_llm_always_rasterises_pdfs() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let path = write_file(input.path(), "slides.pdf", "%PDF-1.4");

    let provider = Arc::new(EchoProvider::new(ProviderKind::OpenAi));
    let rasterizer = ScriptedRasterizer::new(vec!["title", "agenda"]);
    let ex = extractor(provider.clone(), rasterizer.clone(), out.path(), RunConfig::default());

    let (_, result) = ex.process_file(&path, provider.as_ref()).await.unwrap();

    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.envelope.method, Method::PdfConvertedToImages);
    assert_eq!(result.envelope.pages.len(), 2);
}

#[tokio::test]
async fn blank_page_is_kept_without_extra_separator() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let path = write_file(input.path(), "form.pdf", "%PDF-1.7");

    let provider = Arc::new(EchoProvider::new(ProviderKind::Google));
    let rasterizer = ScriptedRasterizer::new(vec!["front", "", "back"]);
    let ex = extractor(provider.clone(), rasterizer, out.path(), forced());

    let (_, result) = ex.process_file(&path, provider.as_ref()).await.unwrap();

    assert_eq!(result.envelope.pages.len(), 3);
    assert_eq!(result.envelope.pages[1].text, "");
    assert_eq!(result.text, format!("front{PAGE_BREAK}back"));
}

#[tokio::test]
async fn failed_page_is_recorded_and_file_still_succeeds() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let path = write_file(input.path(), "scan.pdf", "%PDF-1.7");

    let provider = Arc::new(EchoProvider::new(ProviderKind::Azure).failing_on("p2/3"));
    let rasterizer = ScriptedRasterizer::new(vec!["a", "b", "c"]);
    let ex = extractor(provider.clone(), rasterizer, out.path(), forced());

    let (written, result) = ex.process_file(&path, provider.as_ref()).await.unwrap();

    assert_eq!(result.envelope.pages.len(), 2);
    assert_eq!(result.text, format!("a{PAGE_BREAK}c"));
    assert_eq!(result.envelope.failed_pages.len(), 1);
    assert_eq!(result.envelope.failed_pages[0].page(), 2);
    assert!(matches!(
        result.envelope.failed_pages[0],
        PageError::SubmitFailed { .. }
    ));

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&written.json).unwrap()).unwrap();
    assert_eq!(json["failed_pages"][0]["kind"], "submit_failed");
    assert_eq!(json["failed_pages"][0]["page"], 2);
}

#[tokio::test]
async fn lost_page_is_reported_and_file_marked_partial() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_file(input.path(), "scan.pdf", "%PDF-1.7");

    let provider = Arc::new(EchoProvider::new(ProviderKind::Azure).failing_on("p2/3"));
    let progress = Arc::new(CountingProgress::default());
    let ex = extractor(
        provider.clone(),
        ScriptedRasterizer::new(vec!["a", "b", "c"]),
        out.path(),
        forced(),
    )
    .with_progress(progress.clone());

    let discovery = discover_inputs(input.path()).unwrap();
    let summary = ex.run(&discovery).await.unwrap();

    assert_eq!(*progress.page_errors.lock().unwrap(), vec![(2, 3)]);
    assert_eq!(progress.pages.load(Ordering::SeqCst), 3);
    assert_eq!(progress.completes.load(Ordering::SeqCst), 1);
    assert_eq!(progress.errors.load(Ordering::SeqCst), 0);

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.partial(), 1);
    assert_eq!(summary.failed(), 0);
    match &summary.reports[0].status {
        JobStatus::Partial {
            files,
            failed_pages,
        } => {
            assert_eq!(failed_pages, &vec![2]);
            assert!(files.text.exists() && files.json.exists());
        }
        other => panic!("expected partial output, got {other:?}"),
    }
}

#[tokio::test]
async fn all_pages_failing_fails_the_file_and_writes_nothing() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_file(input.path(), "broken.pdf", "%PDF-1.7");

    let provider = Arc::new(EchoProvider::new(ProviderKind::Azure).failing_on("broken.pdf"));
    let rasterizer = ScriptedRasterizer::new(vec!["a", "b"]);
    let ex = extractor(provider.clone(), rasterizer, out.path(), forced());

    let discovery = discover_inputs(input.path()).unwrap();
    let summary = ex.run(&discovery).await.unwrap();

    assert_eq!(summary.failed(), 1);
    match &summary.reports[0].status {
        JobStatus::Failed { class, message } => {
            assert_eq!(*class, ErrorClass::Provider);
            assert!(message.contains("All 2 pages failed"), "got {message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(output_files(out.path()).is_empty());
}

#[tokio::test]
async fn one_failing_file_does_not_stop_the_run() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_file(input.path(), "a_bad.png", "unreadable");
    write_file(input.path(), "b_good.jpg", "hello");
    write_file(input.path(), "nested/c_good.pdf", "page one\u{c}page two");
    write_file(input.path(), "notes.docx", "ignored");

    let provider = Arc::new(EchoProvider::new(ProviderKind::Google).failing_on("a_bad"));
    let progress = Arc::new(CountingProgress::default());
    let ex = extractor(
        provider.clone(),
        ScriptedRasterizer::new(vec![]),
        out.path(),
        RunConfig::default(),
    )
    .with_progress(progress.clone());

    let discovery = discover_inputs(input.path()).unwrap();
    assert_eq!(discovery.files.len(), 3);
    assert_eq!(discovery.skipped.len(), 1);
    assert!(discovery.skipped[0].ends_with("notes.docx"));

    let summary = ex.run(&discovery).await.unwrap();

    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.has_failures());

    // Every file was attempted, in sorted order.
    assert_eq!(
        provider.calls(),
        vec!["a_bad.png", "b_good.jpg", "c_good.pdf"]
    );

    let files = output_files(out.path());
    assert_eq!(files.len(), 4, "got {files:?}");
    assert!(files.iter().any(|f| f.starts_with("b_good_google_") && f.ends_with(".txt")));
    assert!(files.iter().any(|f| f.starts_with("c_good_google_") && f.ends_with(".json")));
    assert!(!files.iter().any(|f| f.starts_with("a_bad")));

    assert_eq!(progress.total.load(Ordering::SeqCst), 3);
    assert_eq!(progress.completes.load(Ordering::SeqCst), 2);
    assert_eq!(progress.errors.load(Ordering::SeqCst), 1);
    assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_provider_runs_for_every_file() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_file(input.path(), "one.png", "1");
    write_file(input.path(), "two.png", "2");

    let gemini = Arc::new(EchoProvider::new(ProviderKind::Gemini));
    let anthropic = Arc::new(EchoProvider::new(ProviderKind::Anthropic));
    let providers: Vec<Arc<dyn OcrProvider>> = vec![gemini.clone(), anthropic.clone()];
    let ex = Extractor::new(
        providers,
        ScriptedRasterizer::new(vec![]),
        OutputWriter::new(out.path()).unwrap(),
        RunConfig::default(),
    );

    let summary = ex.run(&discover_inputs(input.path()).unwrap()).await.unwrap();

    assert_eq!(summary.succeeded(), 4);
    assert_eq!(gemini.calls().len(), 2);
    assert_eq!(anthropic.calls().len(), 2);
    let providers: Vec<&str> = summary.reports.iter().map(|r| r.provider.as_str()).collect();
    assert_eq!(providers, vec!["gemini", "anthropic", "gemini", "anthropic"]);
    assert_eq!(output_files(out.path()).len(), 8);
}

#[tokio::test]
async fn written_pair_reads_back() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let path = write_file(input.path(), "deep/dir/invoice.pdf", "%PDF-1.7");

    let provider = Arc::new(EchoProvider::new(ProviderKind::DocumentAi));
    let ex = extractor(
        provider.clone(),
        ScriptedRasterizer::new(vec!["Invoice #42", "Due: net 30"]),
        out.path(),
        forced(),
    );

    let (written, result) = ex.process_file(&path, provider.as_ref()).await.unwrap();

    let text = std::fs::read_to_string(&written.text).unwrap();
    assert_eq!(text, result.text);

    let envelope: Envelope =
        serde_json::from_slice(&std::fs::read(&written.json).unwrap()).unwrap();
    assert_eq!(envelope, result.envelope);
    assert_eq!(envelope.source_file, "invoice.pdf");
    assert_eq!(envelope.provider, "document-ai");
    assert_eq!(envelope.method, Method::PdfConvertedToImages);
    assert_eq!(envelope.pages[1].text, "Due: net 30");
    assert_eq!(envelope.pages[1].response["page"], 2);

    // Four-space indentation.
    let raw = std::fs::read_to_string(&written.json).unwrap();
    assert!(raw.contains("\n    \"pages\": ["), "got {raw}");
}

#[tokio::test]
async fn configuration_error_aborts_the_run() {
    struct Unconfigured;

    #[async_trait]
    impl OcrProvider for Unconfigured {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Mistral
        }
        async fn submit(&self, _sub: &Submission<'_>) -> Result<ProviderResult, OcrError> {
            Err(OcrError::MissingApiKey {
                provider: "mistral".into(),
                env_vars: "MISTRAL_API_KEY".into(),
            })
        }
    }

    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_file(input.path(), "a.png", "x");
    write_file(input.path(), "b.png", "y");

    let ex = extractor(
        Arc::new(Unconfigured),
        ScriptedRasterizer::new(vec![]),
        out.path(),
        RunConfig::default(),
    );
    let err = ex
        .run(&discover_inputs(input.path()).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::MissingApiKey { .. }));
    assert!(output_files(out.path()).is_empty());
}

#[test]
fn missing_input_path_is_rejected_early() {
    let err = discover_inputs(Path::new("/definitely/not/here")).unwrap_err();
    assert!(err.is_fatal_to_run());
    assert!(matches!(err, OcrError::InputPathInvalid { .. }));
}
