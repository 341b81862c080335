use crate::canvas::{Canvas, Command};
use crate::error::FieldError;
use crate::field::{FieldDescriptor, FieldKind};
use crate::fonts::{FontFace, FontResources, encode_winansi_checked};
use crate::types::{Color, Pt, Rect};

const TEXT_MAX_FONT_SIZE: i32 = 12;
const TEXT_PADDING_X: i32 = 5;
const TEXT_BORDER_GRAY: f32 = 0.5;
const TEXT_BORDER_WIDTH: f32 = 0.5;
const TOGGLE_BORDER_WIDTH: f32 = 1.5;
const CHECK_MARK: &str = "X";
const CHECK_MARK_SCALE: f32 = 0.8;
const RADIO_DOT_SCALE: f32 = 0.5;

/// What a descriptor asks to draw, decided before any drawing happens.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mark<'a> {
    Text(&'a str),
    Checkbox { checked: bool },
    Radio { checked: bool },
    /// A `data:image` URI for signature and image fields.
    Image(&'a str),
    /// Unknown types, empty text and non-image payloads leave the page untouched.
    Skip,
}

impl<'a> Mark<'a> {
    pub(crate) fn classify(field: &'a FieldDescriptor) -> Self {
        match &field.kind {
            FieldKind::Text | FieldKind::Date => match field.text_value() {
                Some(text) if !text.is_empty() => Mark::Text(text),
                _ => Mark::Skip,
            },
            FieldKind::Checkbox => Mark::Checkbox {
                checked: field.is_checked(),
            },
            FieldKind::Radio => Mark::Radio {
                checked: field.is_checked(),
            },
            FieldKind::Signature | FieldKind::Image => match field.text_value() {
                Some(uri) if uri.starts_with("data:image") => Mark::Image(uri),
                _ => Mark::Skip,
            },
            FieldKind::Unknown(_) => Mark::Skip,
        }
    }
}

/// Bordered white box with the value on a vertically centered baseline. Fails when the
/// value holds a character WinAnsiEncoding cannot carry.
pub(crate) fn render_text(rect: Rect, text: &str) -> Result<Vec<Command>, FieldError> {
    if let Err(ch) = encode_winansi_checked(text) {
        return Err(FieldError::Font(format!(
            "WinAnsiEncoding cannot encode '{}' (U+{:04X})",
            ch, ch as u32
        )));
    }
    let font_size = (rect.height * 0.5).min(Pt::from_i32(TEXT_MAX_FONT_SIZE));
    let baseline = rect.y + rect.height / 2.0 - font_size / 2.0;

    let mut canvas = Canvas::new();
    canvas.save_state();
    canvas.set_stroke_color(Color::gray(TEXT_BORDER_GRAY));
    canvas.set_fill_color(Color::WHITE);
    canvas.set_line_width(Pt::from_f32(TEXT_BORDER_WIDTH));
    canvas.rect(rect.x, rect.y, rect.width, rect.height);
    canvas.fill_stroke();
    canvas.set_fill_color(Color::BLACK);
    canvas.set_font(FontFace::Regular, font_size);
    canvas.draw_string(rect.x + Pt::from_i32(TEXT_PADDING_X), baseline, text);
    canvas.restore_state();
    Ok(canvas.finish())
}

/// Square box anchored at the lower-left corner. `mark_fonts` is `Some` when checked.
pub(crate) fn render_checkbox(rect: Rect, mark_fonts: Option<&FontResources>) -> Vec<Command> {
    let side = rect.width.min(rect.height);

    let mut canvas = Canvas::new();
    canvas.save_state();
    canvas.set_stroke_color(Color::BLACK);
    canvas.set_fill_color(Color::WHITE);
    canvas.set_line_width(Pt::from_f32(TOGGLE_BORDER_WIDTH));
    canvas.rect(rect.x, rect.y, side, side);
    canvas.fill_stroke();
    if let Some(fonts) = mark_fonts {
        let size = side * CHECK_MARK_SCALE;
        let glyph_width = fonts.text_width(FontFace::Bold, CHECK_MARK, size);
        let x = rect.x + side / 2.0 - glyph_width / 2.0;
        let y = rect.y + side / 2.0 - size / 2.0;
        canvas.set_fill_color(Color::BLACK);
        canvas.set_font(FontFace::Bold, size);
        canvas.draw_string(x, y, CHECK_MARK);
    }
    canvas.restore_state();
    canvas.finish()
}

pub(crate) fn render_radio(rect: Rect, checked: bool) -> Vec<Command> {
    let radius = rect.width.min(rect.height) / 2.0;
    let cx = rect.x + radius;
    let cy = rect.y + radius;

    let mut canvas = Canvas::new();
    canvas.save_state();
    canvas.set_stroke_color(Color::BLACK);
    canvas.set_fill_color(Color::WHITE);
    canvas.set_line_width(Pt::from_f32(TOGGLE_BORDER_WIDTH));
    canvas.circle(cx, cy, radius);
    canvas.fill_stroke();
    if checked {
        canvas.set_fill_color(Color::BLACK);
        canvas.circle(cx, cy, radius * RADIO_DOT_SCALE);
        canvas.fill();
    }
    canvas.restore_state();
    canvas.finish()
}

/// The fitted image already has the box's aspect, so it is stretched onto the full rect.
pub(crate) fn render_image(rect: Rect, resource_id: &str) -> Vec<Command> {
    let mut canvas = Canvas::new();
    canvas.draw_image(rect.x, rect.y, rect.width, rect.height, resource_id);
    canvas.finish()
}
