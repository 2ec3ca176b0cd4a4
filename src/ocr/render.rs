//! PDF rasterisation: render the first pages of a PDF to grayscale PNGs.
//!
//! pdfium wraps a C++ library with thread-local state, so the work runs
//! under `tokio::task::spawn_blocking` and never on a runtime worker.
//! The longest edge is capped so a poster-sized page at 300 DPI cannot
//! blow up memory.

use crate::error::OcrError;
use crate::pdf;
use async_trait::async_trait;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Longest rendered edge in pixels.
pub const MAX_RENDERED_EDGE: i32 = 4000;

/// Turns a PDF into page images on disk.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render at most `max_pages` pages of `pdf_path` into `out_dir` at `dpi`.
    ///
    /// Returns the image paths in page order. An empty vector means the PDF
    /// had no renderable pages.
    async fn rasterize(
        &self,
        pdf_path: &Path,
        out_dir: &Path,
        max_pages: usize,
        dpi: u32,
    ) -> Result<Vec<PathBuf>, OcrError>;
}

/// [`PageRasterizer`] backed by pdfium-render.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    /// Library location from `PDFIUM_LIB_PATH`, else the system library.
    pub fn from_env() -> Self {
        Self::new(pdf::library_path_from_env())
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn rasterize(
        &self,
        pdf_path: &Path,
        out_dir: &Path,
        max_pages: usize,
        dpi: u32,
    ) -> Result<Vec<PathBuf>, OcrError> {
        let library = self.library_path.clone();
        let pdf_path = pdf_path.to_path_buf();
        let out_dir = out_dir.to_path_buf();

        tokio::task::spawn_blocking(move || {
            rasterize_blocking(library.as_deref(), &pdf_path, &out_dir, max_pages, dpi)
        })
        .await
        .map_err(|e| OcrError::Rasterisation(format!("render task panicked: {e}")))?
    }
}

fn rasterize_blocking(
    library: Option<&Path>,
    pdf_path: &Path,
    out_dir: &Path,
    max_pages: usize,
    dpi: u32,
) -> Result<Vec<PathBuf>, OcrError> {
    let pdfium = pdf::bind_pdfium(library)
        .map_err(|e| OcrError::Rasterisation(format!("cannot bind pdfium: {e:?}")))?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| OcrError::Rasterisation(format!("cannot open {}: {e:?}", pdf_path.display())))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let to_render = total_pages.min(max_pages);
    info!("PDF loaded: {} pages, rendering {}", total_pages, to_render);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(MAX_RENDERED_EDGE)
        .set_maximum_height(MAX_RENDERED_EDGE);

    let mut paths = Vec::with_capacity(to_render);
    for idx in 0..to_render {
        let page = pages
            .get(idx as u16)
            .map_err(|e| OcrError::Rasterisation(format!("page {}: {e:?}", idx + 1)))?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| OcrError::Rasterisation(format!("page {}: {e:?}", idx + 1)))?;

        let image = bitmap.as_image().grayscale();
        let path = out_dir.join(format!("page-{}.png", idx + 1));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| OcrError::Rasterisation(format!("page {}: {e}", idx + 1)))?;
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        paths.push(path);
    }

    Ok(paths)
}
