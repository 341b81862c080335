use crate::document::page_size;
use crate::error::StampError;
use crate::types::Size;
use lopdf::Document as LoDocument;
use std::path::Path;

pub const PDF_MAGIC: &[u8] = b"%PDF-";
pub const DEFAULT_MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    pub first_page_size: Option<Size>,
}

/// Cheap checks that run before parsing. `max_bytes == 0` disables the size limit.
pub fn check_input_bytes(bytes: &[u8], max_bytes: usize) -> Result<(), StampError> {
    if bytes.is_empty() {
        return Err(StampError::EmptyInput);
    }
    if max_bytes > 0 && bytes.len() > max_bytes {
        return Err(StampError::InputTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(StampError::NotAPdf);
    }
    Ok(())
}

pub(crate) fn parse_pdf(bytes: &[u8]) -> Result<LoDocument, StampError> {
    LoDocument::load_mem(bytes).map_err(|err| StampError::Parse(err.to_string()))
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, StampError> {
    check_input_bytes(bytes, 0)?;
    let pdf = parse_pdf(bytes)?;
    let pages = pdf.get_pages();
    let first_page_size = pages
        .values()
        .next()
        .map(|page_id| page_size(&pdf, *page_id));

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        first_page_size,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, StampError> {
    let data = std::fs::read(path)?;
    inspect_pdf_bytes(&data)
}

pub fn require_stampable(report: &PdfInspectReport) -> Result<(), StampError> {
    if report.encrypted {
        return Err(StampError::Encrypted);
    }
    if report.page_count == 0 {
        return Err(StampError::NoPages);
    }
    Ok(())
}

/// Human-readable byte count, e.g. `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let mut text = format!("{:.2}", value);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    format!("{} {}", text, UNITS[unit])
}
