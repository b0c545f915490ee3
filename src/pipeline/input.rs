//! Input discovery and classification.
//!
//! Every file is classified by extension (case-insensitive) before any bytes
//! are read: images go to the provider as-is, PDFs are either submitted whole
//! or rasterised first. Anything else is reported and skipped without
//! stopping the run.

use crate::error::OcrError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Image extensions accepted as single-frame inputs.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "gif", "webp"];

/// The only paginated format.
pub const SUPPORTED_PDF_EXTENSION: &str = "pdf";

/// Whether a source is paginated.
///
/// Animated GIFs and multi-frame TIFFs are `Image`: providers read the first
/// frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    Pdf,
}

/// A classified input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInput {
    pub path: PathBuf,
    pub mime_type: &'static str,
    pub kind: DocumentKind,
}

impl JobInput {
    /// Classify `path` and confirm it exists and is readable.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, OcrError> {
        let path = path.as_ref().to_path_buf();
        let (kind, mime_type) = classify(&path).ok_or_else(|| OcrError::UnsupportedFileType {
            extension: extension_label(&path),
            path: path.clone(),
        })?;

        if !path.exists() {
            return Err(OcrError::FileNotFound { path });
        }
        match std::fs::File::open(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(OcrError::PermissionDenied { path });
            }
            Err(_) => return Err(OcrError::FileNotFound { path }),
        }

        debug!("Classified {} as {:?} ({})", path.display(), kind, mime_type);
        Ok(Self {
            path,
            mime_type,
            kind,
        })
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == DocumentKind::Pdf
    }

    /// File name without directories, e.g. `scan.pdf`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// File name without extension, e.g. `scan`.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Read the whole file into memory.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, OcrError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => OcrError::FileNotFound {
                    path: self.path.clone(),
                },
                std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
                    path: self.path.clone(),
                },
                _ => OcrError::ReadFailed {
                    path: self.path.clone(),
                    source,
                },
            })
    }
}

/// Classify a path by extension. None for unsupported types.
pub fn classify(path: &Path) -> Option<(DocumentKind, &'static str)> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    if ext == SUPPORTED_PDF_EXTENSION {
        return Some((DocumentKind::Pdf, "application/pdf"));
    }
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    };
    Some((DocumentKind::Image, mime))
}

pub fn is_supported(path: &Path) -> bool {
    classify(path).is_some()
}

fn extension_label(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_else(|| "(none)".to_string())
}

/// Human-readable allow-list for messages.
pub fn supported_extensions_label() -> String {
    SUPPORTED_IMAGE_EXTENSIONS
        .iter()
        .map(|e| format!(".{e}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of scanning the input path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Supported files in deterministic (sorted path) order.
    pub files: Vec<PathBuf>,
    /// Files that were seen but have an unsupported extension.
    pub skipped: Vec<PathBuf>,
}

/// Collect the files to process from a file or directory path.
///
/// Directories are walked recursively. A single unsupported file is
/// reported in `skipped`; an empty result is a fatal
/// [`OcrError::NoSupportedFiles`].
pub fn discover_inputs(input: &Path) -> Result<Discovery, OcrError> {
    let mut discovery = Discovery::default();

    if input.is_file() {
        if is_supported(input) {
            discovery.files.push(input.to_path_buf());
        } else {
            warn!(
                "Input file {} is not a supported type. Supported: {}, .pdf",
                input.display(),
                supported_extensions_label()
            );
            discovery.skipped.push(input.to_path_buf());
        }
    } else if input.is_dir() {
        info!("Scanning directory: {}", input.display());
        for entry in WalkDir::new(input)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Skipping unreadable directory entry: {}", err);
                    None
                }
            })
        {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            if is_supported(path) {
                discovery.files.push(path.to_path_buf());
            } else {
                debug!("Skipping unsupported file: {}", path.display());
                discovery.skipped.push(path.to_path_buf());
            }
        }
    } else {
        return Err(OcrError::InputPathInvalid {
            path: input.to_path_buf(),
        });
    }

    if discovery.files.is_empty() {
        return Err(OcrError::NoSupportedFiles {
            path: input.to_path_buf(),
            extensions: supported_extensions_label(),
        });
    }

    info!(
        "Found {} file(s) to process ({} skipped)",
        discovery.files.len(),
        discovery.skipped.len()
    );
    Ok(discovery)
}
