#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    /// 1-based.
    pub page_number: usize,
    pub field_count: usize,
    pub command_count: usize,
    pub content_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayMetrics {
    /// Only pages that received at least one field.
    pub pages: Vec<PageMetrics>,
    pub fields_total: usize,
    pub fields_applied: usize,
    pub fields_failed: usize,
    pub total_ms: f64,
    pub output_bytes: usize,
}
