//! PDF rasterisation: render every page of a PDF to a PNG [`PageImage`].
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`rasterize_pdf`] moves the work onto tokio's blocking pool and awaits it
//! immediately, so pages are still produced strictly in order.
//!
//! Rendering sits behind the [`Rasterizer`] trait so the orchestration can be
//! exercised without a pdfium shared library present.

use crate::config::RunConfig;
use crate::error::OcrError;
use crate::pipeline::encode::encode_png;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One rasterised page, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based, contiguous.
    pub page_num: usize,
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`, e.g. `image/png`.
    pub mime_type: &'static str,
}

/// Converts a PDF file into page images, in page order.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>, OcrError>;
}

/// Run `rasterizer` on the blocking pool.
pub async fn rasterize_pdf(
    rasterizer: &Arc<dyn Rasterizer>,
    pdf_path: &Path,
) -> Result<Vec<PageImage>, OcrError> {
    let rasterizer = Arc::clone(rasterizer);
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&path))
        .await
        .map_err(|e| OcrError::Internal(format!("Render task panicked: {}", e)))?
}

/// [`Rasterizer`] backed by pdfium.
///
/// The library is located via `PDFIUM_LIB_PATH` (a directory or the library
/// file itself) and otherwise loaded from the system search path.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    fn bind(&self) -> Result<Pdfium, OcrError> {
        let bindings = match &self.library_path {
            Some(p) if p.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(p))
            }
            Some(p) => Pdfium::bind_to_library(p),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| OcrError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>, OcrError> {
        let pdfium = self.bind()?;

        let document =
            pdfium
                .load_pdf_from_file(pdf_path, None)
                .map_err(|e| OcrError::RasterisationFailed {
                    path: pdf_path.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut results = Vec::with_capacity(pages.len() as usize);

        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                OcrError::RasterisationFailed {
                    path: pdf_path.to_path_buf(),
                    detail: format!("page {}: {:?}", page_num, e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                image.width(),
                image.height()
            );

            let bytes = encode_png(&image).map_err(|e| OcrError::RasterisationFailed {
                path: pdf_path.to_path_buf(),
                detail: format!("page {}: PNG encoding failed: {}", page_num, e),
            })?;

            results.push(PageImage {
                page_num,
                bytes,
                mime_type: "image/png",
            });
        }

        Ok(results)
    }
}
