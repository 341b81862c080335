use crate::error::{FieldError, StampError};
use serde_json::Value;

/// Checkbox/radio values that count as "checked". Everything else, including a missing
/// value, `1` and `"yes"`, renders unchecked.
pub const CHECKED_TOKENS: [&str; 2] = ["checked", "true"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Checkbox,
    Radio,
    Signature,
    Image,
    Unknown(String),
}

impl FieldKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "text" => FieldKind::Text,
            "date" => FieldKind::Date,
            "checkbox" => FieldKind::Checkbox,
            "radio" => FieldKind::Radio,
            "signature" => FieldKind::Signature,
            "image" => FieldKind::Image,
            other => FieldKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Date => "date",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Radio => "radio",
            FieldKind::Signature => "signature",
            FieldKind::Image => "image",
            FieldKind::Unknown(raw) => raw.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Number(f64),
    Other,
}

impl FieldValue {
    pub fn is_checked(&self) -> bool {
        match self {
            FieldValue::Bool(flag) => *flag,
            FieldValue::Text(text) => CHECKED_TOKENS.contains(&text.as_str()),
            FieldValue::Number(_) | FieldValue::Other => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(text) => Some(FieldValue::Text(text.clone())),
            Value::Bool(flag) => Some(FieldValue::Bool(*flag)),
            Value::Number(n) => Some(
                n.as_f64()
                    .map(FieldValue::Number)
                    .unwrap_or(FieldValue::Other),
            ),
            Value::Array(_) | Value::Object(_) => Some(FieldValue::Other),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Top-left origin, y grows downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSize {
    pub width: f32,
    pub height: f32,
}

/// One annotation to stamp. Descriptors are read-only to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    pub position: Position,
    pub size: FieldSize,
    pub value: Option<FieldValue>,
    /// 1-based page number. `None` means page 1.
    pub page: Option<i64>,
}

/// A field list entry as received: either a usable descriptor or the reason it was rejected.
pub type FieldInput = Result<FieldDescriptor, FieldError>;

impl FieldDescriptor {
    pub fn new(kind: FieldKind, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            kind,
            position: Position { x, y },
            size: FieldSize { width, height },
            value: None,
            page: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn on_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn is_checked(&self) -> bool {
        self.value.as_ref().is_some_and(FieldValue::is_checked)
    }

    pub fn text_value(&self) -> Option<&str> {
        self.value.as_ref().and_then(FieldValue::as_text)
    }

    /// 0-based page index, or `PageOutOfRange` when the page does not exist.
    pub fn resolve_page_index(&self, page_count: usize) -> Result<usize, FieldError> {
        let page = self.page.unwrap_or(1);
        if page < 1 || page as u64 > page_count as u64 {
            return Err(FieldError::PageOutOfRange { page, page_count });
        }
        Ok((page - 1) as usize)
    }

    pub fn validate_geometry(&self) -> Result<(), FieldError> {
        let Position { x, y } = self.position;
        if !x.is_finite() || !y.is_finite() {
            return Err(FieldError::Geometry(format!(
                "position ({}, {}) is not finite",
                x, y
            )));
        }
        let FieldSize { width, height } = self.size;
        if !width.is_finite() || !height.is_finite() {
            return Err(FieldError::Geometry(format!(
                "size {}x{} is not finite",
                width, height
            )));
        }
        if width < 0.0 || height < 0.0 {
            return Err(FieldError::Geometry(format!(
                "size {}x{} is negative",
                width, height
            )));
        }
        Ok(())
    }

    pub fn from_json(value: &Value) -> Result<Self, FieldError> {
        let Some(obj) = value.as_object() else {
            return Err(FieldError::Descriptor("field must be an object".to_string()));
        };
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(FieldKind::parse)
            .ok_or_else(|| FieldError::Descriptor("type is required".to_string()))?;
        let (x, y) = number_pair(obj.get("position"), "x", "y").ok_or_else(|| {
            FieldError::Descriptor(
                "valid position object with x and y coordinates is required".to_string(),
            )
        })?;
        let (width, height) = number_pair(obj.get("size"), "width", "height").ok_or_else(|| {
            FieldError::Descriptor(
                "valid size object with width and height is required".to_string(),
            )
        })?;
        // Non-numeric pages fall back to page 1; numeric ones are range-checked at dispatch.
        let page = obj.get("page").and_then(Value::as_f64).map(|p| p.trunc() as i64);
        Ok(Self {
            kind,
            position: Position { x, y },
            size: FieldSize { width, height },
            value: obj.get("value").and_then(FieldValue::from_json),
            page,
        })
    }
}

fn number_pair(value: Option<&Value>, a: &str, b: &str) -> Option<(f32, f32)> {
    let obj = value?.as_object()?;
    let first = obj.get(a)?.as_f64()?;
    let second = obj.get(b)?.as_f64()?;
    Some((first as f32, second as f32))
}

/// Parses a JSON field array. Only a non-array payload is fatal; each bad entry is kept as
/// an `Err` at its index so it is reported instead of shifting later fields.
pub fn parse_field_list(value: &Value) -> Result<Vec<FieldInput>, StampError> {
    let Some(items) = value.as_array() else {
        return Err(StampError::InvalidConfiguration(
            "fields array is required".to_string(),
        ));
    };
    Ok(items.iter().map(FieldDescriptor::from_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checked_tokens_are_narrow() {
        for value in [json!("checked"), json!(true), json!("true")] {
            let field = FieldDescriptor::from_json(&json!({
                "type": "checkbox",
                "position": {"x": 0, "y": 0},
                "size": {"width": 10, "height": 10},
                "value": value,
            }))
            .expect("parse");
            assert!(field.is_checked(), "{value} should be checked");
        }
        for value in [
            json!(false),
            json!("unchecked"),
            json!("1"),
            json!(1),
            json!("yes"),
            json!(null),
        ] {
            let field = FieldDescriptor::from_json(&json!({
                "type": "radio",
                "position": {"x": 0, "y": 0},
                "size": {"width": 10, "height": 10},
                "value": value,
            }))
            .expect("parse");
            assert!(!field.is_checked(), "{value} should be unchecked");
        }
        let absent = FieldDescriptor::new(FieldKind::Checkbox, 0.0, 0.0, 10.0, 10.0);
        assert!(!absent.is_checked());
    }

    #[test]
    fn page_resolution_defaults_and_range_checks() {
        let base = FieldDescriptor::new(FieldKind::Text, 0.0, 0.0, 10.0, 10.0);
        assert_eq!(base.resolve_page_index(3), Ok(0));
        assert_eq!(base.clone().on_page(3).resolve_page_index(3), Ok(2));
        for page in [0, -2, 4, 999] {
            let err = base
                .clone()
                .on_page(page)
                .resolve_page_index(3)
                .expect_err("out of range");
            assert!(matches!(err, FieldError::PageOutOfRange { .. }));
            assert!(err.to_string().contains("range"));
        }
    }

    #[test]
    fn json_page_that_is_not_a_number_means_first_page() {
        let field = FieldDescriptor::from_json(&json!({
            "type": "text",
            "position": {"x": 1, "y": 2},
            "size": {"width": 3, "height": 4},
            "page": "two",
        }))
        .expect("parse");
        assert_eq!(field.page, None);
        assert_eq!(field.resolve_page_index(2), Ok(0));

        let field = FieldDescriptor::from_json(&json!({
            "type": "text",
            "position": {"x": 1, "y": 2},
            "size": {"width": 3, "height": 4},
            "page": 2.9,
        }))
        .expect("parse");
        assert_eq!(field.page, Some(2));
    }

    #[test]
    fn unknown_kinds_are_preserved() {
        let field = FieldDescriptor::from_json(&json!({
            "type": "stamp",
            "position": {"x": 1, "y": 2},
            "size": {"width": 3, "height": 4},
        }))
        .expect("parse");
        assert_eq!(field.kind, FieldKind::Unknown("stamp".to_string()));
        assert_eq!(field.kind.as_str(), "stamp");
    }

    #[test]
    fn parse_field_list_keeps_bad_entries_in_place() {
        let fields = parse_field_list(&json!([
            {
                "type": "text",
                "position": {"x": 1, "y": 2},
                "size": {"width": 3, "height": 4},
                "value": "a"
            },
            {"position": {"x": 1, "y": 2}, "size": {"width": 3, "height": 4}},
            {"type": "text", "position": {"x": "1", "y": 2}, "size": {"width": 3, "height": 4}},
            {"type": "text", "position": {"x": 1, "y": 2}},
        ]))
        .expect("array");
        assert_eq!(fields.len(), 4);
        assert!(fields[0].is_ok());
        assert!(matches!(&fields[1], Err(FieldError::Descriptor(m)) if m.contains("type")));
        assert!(matches!(&fields[2], Err(FieldError::Descriptor(m)) if m.contains("position")));
        assert!(matches!(&fields[3], Err(FieldError::Descriptor(m)) if m.contains("size")));

        let err = parse_field_list(&json!({"fields": []})).expect_err("not an array");
        assert_eq!(err.as_code(), "INVALID_CONFIGURATION");
    }

    #[test]
    fn geometry_validation_rejects_negative_and_non_finite() {
        let ok = FieldDescriptor::new(FieldKind::Text, -5.0, 900.0, 0.0, 0.0);
        assert!(ok.validate_geometry().is_ok());
        let negative = FieldDescriptor::new(FieldKind::Text, 0.0, 0.0, -1.0, 10.0);
        assert!(matches!(negative.validate_geometry(), Err(FieldError::Geometry(_))));
        let nan = FieldDescriptor::new(FieldKind::Text, f32::NAN, 0.0, 1.0, 10.0);
        assert!(matches!(nan.validate_geometry(), Err(FieldError::Geometry(_))));
    }
}
