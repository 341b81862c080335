mod canvas;
mod content;
mod coords;
mod debug;
mod dispatch;
mod document;
mod error;
mod field;
mod fit;
mod fonts;
mod images;
mod metrics;
mod pdfinspect;
mod perf;
mod render;
mod types;

pub use canvas::{Canvas, Command};
pub use coords::{field_rect, to_document_space};
use debug::DebugLogger;
use dispatch::{DispatchContext, dispatch};
pub use dispatch::FieldOutcome;
pub use document::{PageInfo, SourceDocument};
pub use error::{FieldError, StampError};
pub use field::{
    CHECKED_TOKENS, FieldDescriptor, FieldInput, FieldKind, FieldSize, FieldValue, Position,
    parse_field_list,
};
pub use fieldstamp_integrity::{
    AuditAction, AuditRecord, IntegrityReport, audit_hash, hash_bytes, hash_file, hash_reader,
    verify, verify_file,
};
pub use fit::{
    FitPlan, FittedImage, MAX_FIT_PIXELS, decode_data_uri, fit_image, plan_fit, target_pixels,
};
pub use fonts::{
    FontFace, FontProgram, FontResources, FontSet, StandardFont, TrueTypeProgram, encode_winansi,
    encode_winansi_checked,
};
pub use images::EmbeddedFormat;
pub use metrics::{OverlayMetrics, PageMetrics};
pub use pdfinspect::{
    DEFAULT_MAX_INPUT_BYTES, PDF_MAGIC, PdfInspectReport, check_input_bytes, format_file_size,
    inspect_pdf_bytes, inspect_pdf_path, require_stampable,
};
use perf::{DEFAULT_PERF_LOG, PerfLogger};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
pub use types::{Color, Pt, Rect, Size};

/// Stamps field lists onto PDF documents. A `Stamper` holds configuration only; every call
/// loads, mutates and serializes its own document, so one instance can serve many threads.
pub struct Stamper {
    fonts: FontSet,
    max_input_bytes: usize,
    compress: bool,
    parallel_images: bool,
    debug: Option<Arc<DebugLogger>>,
    perf: Option<Arc<PerfLogger>>,
    next_call_id: AtomicU64,
}

#[derive(Clone)]
pub struct StamperBuilder {
    max_input_bytes: usize,
    compress: bool,
    parallel_images: bool,
    regular_font: Option<Vec<u8>>,
    bold_font: Option<Vec<u8>>,
    debug_path: Option<PathBuf>,
    perf_enabled: bool,
    perf_path: Option<PathBuf>,
}

/// The stamped document plus what happened to each field.
#[derive(Debug, Clone)]
pub struct OverlayOutput {
    pub bytes: Vec<u8>,
    /// One entry per input field, in input order.
    pub outcomes: Vec<FieldOutcome>,
    pub metrics: OverlayMetrics,
    /// Lowercase hex SHA-256 of `bytes`.
    pub output_hash: String,
}

impl OverlayOutput {
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FieldOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.succeeded)
    }

    pub fn verify(&self) -> IntegrityReport {
        verify(&self.output_hash, &self.bytes)
    }
}

impl Default for Stamper {
    fn default() -> Self {
        Self {
            fonts: FontSet::default(),
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            compress: true,
            parallel_images: true,
            debug: None,
            perf: None,
            next_call_id: AtomicU64::new(1),
        }
    }
}

impl Stamper {
    pub fn builder() -> StamperBuilder {
        StamperBuilder::new()
    }

    pub fn fonts(&self) -> &FontSet {
        &self.fonts
    }

    pub fn max_input_bytes(&self) -> usize {
        self.max_input_bytes
    }

    pub fn overlay(
        &self,
        source: &[u8],
        fields: &[FieldDescriptor],
    ) -> Result<OverlayOutput, StampError> {
        let inputs: Vec<FieldInput> = fields.iter().cloned().map(Ok).collect();
        self.overlay_inputs(source, &inputs)
    }

    /// Like `overlay`, but accepts entries that already failed validation so their
    /// outcomes keep the caller's indexes.
    pub fn overlay_inputs(
        &self,
        source: &[u8],
        fields: &[FieldInput],
    ) -> Result<OverlayOutput, StampError> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let result = self.run(call_id, source, fields);
        if let (Err(err), Some(debug)) = (&result, self.debug.as_deref()) {
            debug.log_value(&json!({
                "type": "overlay.error",
                "call_id": call_id,
                "code": err.as_code(),
                "message": err.to_string(),
            }));
        }
        self.emit_debug_summary("overlay");
        result
    }

    /// Parses a JSON field array (see `parse_field_list`) and stamps it.
    pub fn overlay_json(&self, source: &[u8], fields: &Value) -> Result<OverlayOutput, StampError> {
        let inputs = parse_field_list(fields)?;
        self.overlay_inputs(source, &inputs)
    }

    fn run(
        &self,
        call_id: u64,
        source: &[u8],
        fields: &[FieldInput],
    ) -> Result<OverlayOutput, StampError> {
        let perf = self.perf.as_deref();
        let t_total = std::time::Instant::now();

        let t_load = std::time::Instant::now();
        let mut doc = SourceDocument::load(source, self.max_input_bytes)?;
        if let Some(perf) = perf {
            perf.log_span_ms("load", call_id, t_load.elapsed().as_secs_f64() * 1000.0);
        }

        let ctx = DispatchContext {
            fonts: &self.fonts,
            parallel_images: self.parallel_images,
            call_id,
            debug: self.debug.as_deref(),
            perf,
        };
        let report = dispatch(&mut doc, fields, &ctx)?;

        let t_serialize = std::time::Instant::now();
        let bytes = doc.save(self.compress)?;
        if let Some(perf) = perf {
            perf.log_span_ms(
                "serialize",
                call_id,
                t_serialize.elapsed().as_secs_f64() * 1000.0,
            );
        }

        let t_hash = std::time::Instant::now();
        let output_hash = hash_bytes(&bytes);
        if let Some(perf) = perf {
            perf.log_span_ms("hash", call_id, t_hash.elapsed().as_secs_f64() * 1000.0);
        }

        let fields_applied = report.outcomes.iter().filter(|o| o.succeeded).count();
        let metrics = OverlayMetrics {
            pages: report.pages,
            fields_total: fields.len(),
            fields_applied,
            fields_failed: fields.len() - fields_applied,
            total_ms: t_total.elapsed().as_secs_f64() * 1000.0,
            output_bytes: bytes.len(),
        };
        if let Some(perf) = perf {
            perf.log_counts(
                "overlay",
                call_id,
                &[
                    ("pages_touched", metrics.pages.len() as u64),
                    ("fields", metrics.fields_total as u64),
                    ("applied", metrics.fields_applied as u64),
                    ("failed", metrics.fields_failed as u64),
                    ("output_bytes", metrics.output_bytes as u64),
                ],
            );
        }

        Ok(OverlayOutput {
            bytes,
            outcomes: report.outcomes,
            metrics,
            output_hash,
        })
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(context);
            logger.flush();
        }
        if let Some(perf) = self.perf.as_deref() {
            perf.flush();
        }
    }
}

impl Default for StamperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StamperBuilder {
    pub fn new() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            compress: true,
            parallel_images: true,
            regular_font: None,
            bold_font: None,
            debug_path: None,
            perf_enabled: false,
            perf_path: None,
        }
    }

    // 0 disables the limit.
    pub fn max_input_bytes(mut self, limit: usize) -> Self {
        self.max_input_bytes = limit;
        self
    }

    // Flate-compress streams when the document is saved.
    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    // Decode and fit image fields on the rayon pool.
    pub fn parallel_images(mut self, enabled: bool) -> Self {
        self.parallel_images = enabled;
        self
    }

    // TrueType face replacing Helvetica for text fields.
    pub fn regular_font_bytes(mut self, data: Vec<u8>) -> Self {
        self.regular_font = Some(data);
        self
    }

    // TrueType face replacing Helvetica-Bold for checkbox marks.
    pub fn bold_font_bytes(mut self, data: Vec<u8>) -> Self {
        self.bold_font = Some(data);
        self
    }

    // Enable debug logging to a JSONL file, one line per field and page.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    // Enable performance logging to a JSONL file for timing/counter inspection.
    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_enabled = true;
        self.perf_path = Some(path.into());
        self
    }

    // Toggle performance logging (uses default file when enabled and no path is set).
    pub fn perf_enabled(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<Stamper, StampError> {
        let mut fonts = FontSet::default();
        if let Some(data) = self.regular_font {
            fonts.regular = FontProgram::TrueType(Arc::new(TrueTypeProgram::parse(data)?));
        }
        if let Some(data) = self.bold_font {
            fonts.bold = FontProgram::TrueType(Arc::new(TrueTypeProgram::parse(data)?));
        }
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        let perf = if self.perf_enabled || self.perf_path.is_some() {
            let path = self
                .perf_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PERF_LOG));
            Some(Arc::new(PerfLogger::new(path)?))
        } else {
            None
        };
        Ok(Stamper {
            fonts,
            max_input_bytes: self.max_input_bytes,
            compress: self.compress,
            parallel_images: self.parallel_images,
            debug,
            perf,
            next_call_id: AtomicU64::new(1),
        })
    }
}

/// Stamps `fields` onto `source` with the default configuration.
pub fn overlay_fields(
    source: &[u8],
    fields: &[FieldDescriptor],
) -> Result<OverlayOutput, StampError> {
    Stamper::default().overlay(source, fields)
}

/// Stamps a JSON field array onto `source` with the default configuration.
pub fn overlay_json(source: &[u8], fields: &Value) -> Result<OverlayOutput, StampError> {
    Stamper::default().overlay_json(source, fields)
}
