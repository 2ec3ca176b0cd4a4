//! pdfium binding and PDF byte helpers shared by the text-layer reader and
//! the page rasterizer.
//!
//! pdfium is bound explicitly rather than through `Pdfium::default()` so a
//! missing library surfaces as an error instead of a panic. Set
//! `PDFIUM_LIB_PATH` to a directory containing the platform library (or to
//! the library file itself); otherwise the system library path is searched.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// True when `bytes` start with the `%PDF` magic.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.len() >= PDF_MAGIC.len() && &bytes[..PDF_MAGIC.len()] == PDF_MAGIC
}

/// The pdfium library location from `PDFIUM_LIB_PATH`, if set.
pub fn library_path_from_env() -> Option<PathBuf> {
    std::env::var_os(PDFIUM_LIB_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Bind pdfium from `library_path`, or from the system library when `None`.
pub fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, PdfiumError> {
    let bindings = match library_path {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))?
        }
        Some(path) => Pdfium::bind_to_library(path)?,
        None => Pdfium::bind_to_system_library()?,
    };
    debug!("pdfium bound ({:?})", library_path);
    Ok(Pdfium::new(bindings))
}

/// Decode a base64 payload, accepting a `data:...;base64,` prefix and
/// embedded whitespace.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
