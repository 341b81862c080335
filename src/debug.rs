use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSONL trace of what happened to each field. Shared by every call a `Stamper` runs.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    pub fn log_value(&self, value: &Value) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{value}");
        }
    }

    /// `page` is 1-based; `None` when the field never resolved to a page.
    pub fn log_field(
        &self,
        call_id: u64,
        index: usize,
        kind: &str,
        page: Option<usize>,
        status: &str,
        reason: Option<&str>,
    ) {
        self.log_value(&json!({
            "type": "overlay.field",
            "call_id": call_id,
            "index": index,
            "field_type": kind,
            "page": page,
            "status": status,
            "reason": reason,
        }));
        self.increment(&format!("overlay.field.{status}"), 1);
    }

    pub fn log_page(&self, call_id: u64, page_number: usize, fields: usize, content_bytes: usize) {
        self.log_value(&json!({
            "type": "overlay.page",
            "call_id": call_id,
            "page": page_number,
            "fields": fields,
            "content_bytes": content_bytes,
        }));
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counts: serde_json::Map<String, Value> = std::mem::take(&mut state.counters)
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect();
            let line = json!({
                "type": "debug.summary",
                "context": context,
                "counts": counts,
            });
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}
