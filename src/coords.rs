//! Web-space (top-left origin, y down) to document-space (bottom-left origin, y up).

use crate::field::FieldDescriptor;
use crate::types::{Pt, Rect};

/// Lower-left corner of a box given in web space.
///
/// Nothing is clamped: a box that falls outside the page yields an off-page rectangle.
pub fn to_document_space(x: f32, y: f32, height: f32, page_height: Pt) -> (Pt, Pt) {
    let x_doc = Pt::from_f32(x);
    let y_doc = page_height - Pt::from_f32(y) - Pt::from_f32(height);
    (x_doc, y_doc)
}

pub fn field_rect(field: &FieldDescriptor, page_height: Pt) -> Rect {
    let (x, y) = to_document_space(
        field.position.x,
        field.position.y,
        field.size.height,
        page_height,
    );
    Rect {
        x,
        y,
        width: Pt::from_f32(field.size.width),
        height: Pt::from_f32(field.size.height),
    }
}
