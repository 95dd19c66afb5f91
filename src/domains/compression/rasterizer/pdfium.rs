//! PDF page rendering via Google PDFium.
//!
//! A fresh `Pdfium` binding is created per call because the upstream type is
//! `!Send`. The OS caches the dynamic library, so repeat loads are cheap.

use image::{DynamicImage, RgbImage};
use pdfium_render::prelude::*;

use super::{compute_render_dimensions, PageRaster};
use crate::errors::{DomainError, DomainResult};

/// Bind PDFium from an explicit path, next to the executable, or the system search path.
fn load_pdfium(library_path: Option<&str>) -> DomainResult<Pdfium> {
    if let Some(path) = library_path {
        log::debug!("Loading PDFium from {}", path);
        let bindings = Pdfium::bind_to_library(path).map_err(|e| {
            DomainError::ToolUnavailable(format!("Failed to load PDFium from {}: {}", path, e))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(|p| p.to_path_buf())) {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            log::debug!("Loaded PDFium next to executable in {}", exe_dir.display());
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| DomainError::ToolUnavailable(format!("PDFium library not found: {}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Render every page of `data` at `dpi`.
///
/// Returns `ToolUnavailable` when the library cannot be bound so the caller can
/// fall back, and `Extraction` for documents PDFium cannot open or draw.
pub fn render_pages(data: &[u8], dpi: u32, library_path: Option<&str>) -> DomainResult<Vec<PageRaster>> {
    let pdfium = load_pdfium(library_path)?;
    let document = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(|e| DomainError::Extraction(format!("Failed to load PDF: {}", e)))?;

    let pages = document.pages();
    let mut rasters = Vec::with_capacity(pages.len() as usize);

    for (index, page) in pages.iter().enumerate() {
        let (target_w, target_h) = compute_render_dimensions(page.width().value, page.height().value, dpi);

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32)
            .set_format(PdfBitmapFormat::BGRA);

        let bitmap = page.render_with_config(&config).map_err(|e| {
            DomainError::Extraction(format!("Rendering page {} failed: {}", index, e))
        })?;

        let width = bitmap.width().max(0) as u32;
        let height = bitmap.height().max(0) as u32;
        let raw = bitmap.as_raw_bytes();
        let image = bgra_to_rgb(width, height, &raw)
            .ok_or_else(|| DomainError::Extraction(format!("Page {} produced an empty bitmap", index)))?;

        log::debug!("Rendered page {} to {}x{}", index, width, height);
        rasters.push(PageRaster::new(index, DynamicImage::ImageRgb8(image)));
    }

    Ok(rasters)
}

/// Convert a BGRA bitmap with arbitrary row stride to packed RGB.
fn bgra_to_rgb(width: u32, height: u32, src: &[u8]) -> Option<RgbImage> {
    if width == 0 || height == 0 || src.is_empty() {
        return None;
    }
    let stride = src.len() / height as usize;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height as usize {
        let row = y * stride;
        for x in 0..width as usize {
            let idx = row + x * 4;
            let b = src.get(idx).copied().unwrap_or(255);
            let g = src.get(idx + 1).copied().unwrap_or(255);
            let r = src.get(idx + 2).copied().unwrap_or(255);
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    RgbImage::from_raw(width, height, pixels)
}
