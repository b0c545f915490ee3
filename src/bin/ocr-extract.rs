//! CLI binary for ocr-extract.
//!
//! A thin shim over the library crate: maps CLI flags to `RunConfig` and
//! `ProviderOptions`, builds the providers, runs the extractor and prints a
//! summary.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ocr_extract::credentials::{DEFAULT_AZURE_CREDENTIALS, DEFAULT_GOOGLE_CREDENTIALS};
use ocr_extract::{
    build_provider, detect_llm_providers, discover_inputs, Extractor, JobStatus, OcrProvider,
    OutputWriter, PdfiumRasterizer, ProgressCallback, ProviderKind, ProviderOptions, RunConfig,
    RunProgressCallback, RunSummary,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over all (file, provider) jobs plus a log line
/// per finished job.
struct CliProgressCallback {
    bar: ProgressBar,
    job_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
    page_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} jobs  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            job_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
            page_errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.job_started
            .lock()
            .ok()
            .and_then(|mut g| g.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_jobs: usize) {
        self.bar.set_length(total_jobs as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting {total_jobs} extraction job(s)…"))
        ));
    }

    fn on_file_start(&self, file: &str, provider: &str) {
        if let Ok(mut started) = self.job_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("{file} via {provider}"));
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        self.bar
            .set_message(format!("page {page_num}/{total_pages}"));
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        self.page_errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "    {} Page {}/{}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&short_error(error)),
        ));
    }

    fn on_file_complete(&self, file: &str, provider: &str, text_len: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:<40} {:<12} {:<12} {}",
            green("✓"),
            file,
            provider,
            dim(&format!("{text_len:>7} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, file: &str, provider: &str, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        self.bar.println(format!(
            "  {} {:<40} {:<12} {}  {}",
            red("✗"),
            file,
            provider,
            red(&short_error(error)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, succeeded: usize, _failed: usize) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        let page_errors = self.page_errors.load(Ordering::SeqCst);
        if errors == 0 && page_errors == 0 {
            eprintln!("{} {} job(s) completed", green("✔"), bold(&succeeded.to_string()));
        } else {
            eprintln!(
                "{} {} job(s) completed  ({} failed, {} page(s) lost)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                red(&errors.to_string()),
                red(&page_errors.to_string()),
            );
        }
    }
}

fn skipped_line(path: &Path) -> String {
    format!(
        "  {} {}  {}",
        dim("–"),
        path.display(),
        dim("(unsupported, skipped)")
    )
}

/// First line of `error`, cut to 80 characters.
fn short_error(error: &str) -> String {
    let first_line = error.lines().next().unwrap_or(error);
    if first_line.chars().count() > 80 {
        let cut: String = first_line.chars().take(79).collect();
        format!("{cut}\u{2026}")
    } else {
        first_line.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One scanned image with Google Cloud Vision
  ocr-extract --api google scan.png out/

  # A directory of PDFs with Azure Read (asynchronous, polled)
  ocr-extract --api azure --azure_creds azure_credentials.json scans/ out/

  # Document AI with an explicit processor
  ocr-extract --api document-ai --processor_id abc123 --location eu scans/ out/

  # Mistral OCR, keeping inline figures
  ocr-extract --api mistral --images out/figures report.pdf out/

  # Every vision LLM whose API key is set, PDFs rasterised page by page
  ocr-extract --api llm-auto --dpi 200 scans/ out/

OUTPUT:
  One pair per (file, provider):
    <stem>_<provider>_<YYYYMMDD-HHMMSS>.txt    merged text, pages joined by
                                              "--- Page Break ---"
    <stem>_<provider>_<YYYYMMDD-HHMMSS>.json   { pages, source_file, method, provider }

ENVIRONMENT VARIABLES:
  GOOGLE_APPLICATION_CREDENTIALS  Service-account JSON for google / document-ai
  GOOGLE_CLOUD_PROJECT            Document AI project (else the key's project_id)
  DOCUMENT_AI_LOCATION            Document AI location (default: us)
  DOCUMENT_AI_PROCESSOR_ID        Document AI processor
  MISTRAL_API_KEY                 Mistral OCR
  GEMINI_API_KEY / GOOGLE_API_KEY Gemini
  OPENAI_API_KEY                  OpenAI
  ANTHROPIC_API_KEY               Anthropic
  PDFIUM_LIB_PATH                 Directory (or file) of libpdfium for rasterisation

  Variables may also be placed in a .env file in the working directory.
"#;

/// Extract text from PDFs and images with cloud OCR services and vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-extract",
    version,
    about = "Extract text from PDFs and images with cloud OCR and vision LLMs",
    long_about = "Send every supported file under INPUT_PATH to one OCR provider (or every \
vision LLM with a key) and write a plain-text file plus the raw JSON responses for each \
(file, provider) pair into OUTPUT_DIR.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// File or directory (searched recursively).
    input_path: PathBuf,

    /// Directory for the output files; created if missing.
    output_dir: PathBuf,

    /// OCR provider to use.
    #[arg(long, value_enum)]
    api: ApiArg,

    /// Google service-account JSON (google, document-ai).
    #[arg(
        long = "google_creds",
        env = "GOOGLE_APPLICATION_CREDENTIALS",
        default_value = DEFAULT_GOOGLE_CREDENTIALS
    )]
    google_creds: PathBuf,

    /// Azure credentials JSON with `endpoint` and `key`.
    #[arg(long = "azure_creds", default_value = DEFAULT_AZURE_CREDENTIALS)]
    azure_creds: PathBuf,

    /// Document AI project id. Defaults to the service account's project.
    #[arg(long = "project_id", env = "GOOGLE_CLOUD_PROJECT")]
    project_id: Option<String>,

    /// Document AI location.
    #[arg(long, env = "DOCUMENT_AI_LOCATION")]
    location: Option<String>,

    /// Document AI processor id.
    #[arg(long = "processor_id", env = "DOCUMENT_AI_PROCESSOR_ID")]
    processor_id: Option<String>,

    /// Rasterise PDFs and submit page by page even when the provider reads PDFs.
    #[arg(long = "force_pdf_to_images")]
    force_pdf_to_images: bool,

    /// Vision LLM model override (gemini, openai, anthropic).
    #[arg(long, env = "OCR_EXTRACT_MODEL")]
    model: Option<String>,

    /// Path to a text file with a custom extraction prompt for vision LLMs.
    #[arg(long)]
    prompt: Option<PathBuf>,

    /// Rendering DPI for rasterised PDF pages (72–400).
    #[arg(long, default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Seconds between status checks of asynchronous jobs.
    #[arg(long = "poll-interval", default_value_t = 2,
          value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: u64,

    /// Give up on an asynchronous job after this many seconds (0 = never).
    #[arg(long = "max-wait", default_value_t = 600)]
    max_wait: u64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long = "api-timeout", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    api_timeout: u64,

    /// Write Mistral inline figures into this directory.
    #[arg(long)]
    images: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ApiArg {
    Google,
    Azure,
    #[value(name = "document-ai", alias = "documentai")]
    DocumentAi,
    Mistral,
    Gemini,
    Openai,
    Anthropic,
    /// Every vision LLM whose API key is set.
    LlmAuto,
}

impl ApiArg {
    fn kinds(self) -> Result<Vec<ProviderKind>> {
        let kind = match self {
            ApiArg::Google => ProviderKind::Google,
            ApiArg::Azure => ProviderKind::Azure,
            ApiArg::DocumentAi => ProviderKind::DocumentAi,
            ApiArg::Mistral => ProviderKind::Mistral,
            ApiArg::Gemini => ProviderKind::Gemini,
            ApiArg::Openai => ProviderKind::OpenAi,
            ApiArg::Anthropic => ProviderKind::Anthropic,
            ApiArg::LlmAuto => {
                let found = detect_llm_providers();
                if found.is_empty() {
                    bail!(
                        "--api llm-auto found no vision LLM API key.\n\
                         Set GEMINI_API_KEY (or GOOGLE_API_KEY), OPENAI_API_KEY or ANTHROPIC_API_KEY."
                    );
                }
                return Ok(found);
            }
        };
        Ok(vec![kind])
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli).await?;

    let options = ProviderOptions {
        google_credentials: cli.google_creds.clone(),
        azure_credentials: cli.azure_creds.clone(),
        project_id: cli.project_id.clone(),
        location: cli.location.clone(),
        processor_id: cli.processor_id.clone(),
        model: cli.model.clone(),
    };

    // Credentials are checked before any file is touched.
    let providers = cli
        .api
        .kinds()?
        .into_iter()
        .map(|kind| {
            build_provider(kind, &options, &config)
                .with_context(|| format!("Failed to set up provider '{kind}'"))
        })
        .collect::<Result<Vec<Arc<dyn OcrProvider>>>>()?;

    let discovery = discover_inputs(&cli.input_path).context("Failed to read input path")?;
    // Printed directly: the progress bar raises the log filter to errors only.
    if !cli.quiet {
        for skipped in &discovery.skipped {
            eprintln!("{}", skipped_line(skipped));
        }
    }

    let writer = OutputWriter::new(&cli.output_dir).context("Failed to create output directory")?;

    let mut extractor = Extractor::new(
        providers,
        Arc::new(PdfiumRasterizer::new(&config)),
        writer,
        config,
    );
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        extractor = extractor.with_progress(cb);
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let summary = extractor.run(&discovery).await.context("Extraction aborted")?;

    if !cli.quiet {
        print_summary(&summary);
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Map CLI args to `RunConfig`.
async fn build_config(cli: &Cli) -> Result<RunConfig> {
    let mut builder = RunConfig::builder()
        .force_pdf_to_images(cli.force_pdf_to_images)
        .dpi(cli.dpi)
        .poll_interval(Duration::from_secs(cli.poll_interval))
        .max_wait((cli.max_wait > 0).then(|| Duration::from_secs(cli.max_wait)))
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt.trim().to_string());
    }
    if let Some(ref dir) = cli.images {
        builder = builder.images_dir(dir);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.reports {
        match &report.status {
            JobStatus::Written(files) => eprintln!(
                "  {} {}  →  {}",
                green("✓"),
                report.file.display(),
                bold(&files.text.display().to_string()),
            ),
            JobStatus::Partial {
                files,
                failed_pages,
            } => eprintln!(
                "  {} {}  →  {}\n      {}",
                cyan("⚠"),
                report.file.display(),
                bold(&files.text.display().to_string()),
                red(&format!(
                    "missing page(s) {}",
                    failed_pages
                        .iter()
                        .map(usize::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            ),
            JobStatus::Failed { class, message } => eprintln!(
                "  {} {} ({}, {:?})\n      {}",
                red("✗"),
                report.file.display(),
                report.provider,
                class,
                dim(message),
            ),
        }
    }

    let (ok, partial, failed, skipped) = (
        summary.succeeded(),
        summary.partial(),
        summary.failed(),
        summary.skipped.len(),
    );
    eprintln!(
        "{}  {} processed  {} partial  {} failed  {} skipped",
        if failed == 0 && partial == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        bold(&ok.to_string()),
        if partial == 0 {
            partial.to_string()
        } else {
            cyan(&partial.to_string())
        },
        if failed == 0 {
            failed.to_string()
        } else {
            red(&failed.to_string())
        },
        dim(&skipped.to_string()),
    );
}
