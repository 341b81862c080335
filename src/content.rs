use crate::canvas::Command;
use crate::fonts::{FontFace, encode_winansi};
use crate::types::{Color, Pt};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ResourceKey {
    Font(FontFace),
    Image(String),
}

/// Page-local resource names chosen by the serializer.
pub(crate) type ResourceNames = BTreeMap<ResourceKey, String>;

/// Resources a command list refers to, in first-use order.
pub(crate) fn referenced_resources(commands: &[Command]) -> Vec<ResourceKey> {
    let mut out: Vec<ResourceKey> = Vec::new();
    for cmd in commands {
        let key = match cmd {
            Command::SetFont { face, .. } => ResourceKey::Font(*face),
            Command::DrawImage { resource_id, .. } => ResourceKey::Image(resource_id.clone()),
            _ => continue,
        };
        if !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

/// Serializes commands into content-stream operators. Coordinates are already in document
/// space. Commands naming an unknown resource are dropped.
pub(crate) fn encode_commands(commands: &[Command], names: &ResourceNames) -> Vec<u8> {
    let mut out = String::new();
    let mut font: Option<(&str, Pt)> = None;
    for cmd in commands {
        match cmd {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::SetFillColor(color) => out.push_str(&color_op(*color, "rg")),
            Command::SetStrokeColor(color) => out.push_str(&color_op(*color, "RG")),
            Command::SetLineWidth(width) => out.push_str(&format!("{} w\n", fmt_pt(*width))),
            Command::SetFont { face, size } => {
                font = names
                    .get(&ResourceKey::Font(*face))
                    .map(|name| (name.as_str(), *size));
            }
            Command::Rect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\n",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(*y)));
            }
            Command::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} {} {} c\n",
                    fmt_pt(*x1),
                    fmt_pt(*y1),
                    fmt_pt(*x2),
                    fmt_pt(*y2),
                    fmt_pt(*x),
                    fmt_pt(*y),
                ));
            }
            Command::ClosePath => out.push_str("h\n"),
            Command::Fill => out.push_str("f\n"),
            Command::FillStroke => out.push_str("B\n"),
            Command::DrawString { x, y, text } => {
                let Some((resource, size)) = font else {
                    continue;
                };
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(size)));
                out.push_str(&format!("{} {} Td\n", fmt_pt(*x), fmt_pt(*y)));
                out.push_str(&format!("({}) Tj\n", escape_pdf_bytes(&encode_winansi(text))));
                out.push_str("ET\n");
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let Some(name) = names.get(&ResourceKey::Image(resource_id.clone())) else {
                    continue;
                };
                out.push_str("q\n");
                out.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(*y)
                ));
                out.push_str(&format!("/{} Do\n", name));
                out.push_str("Q\n");
            }
        }
    }
    out.into_bytes()
}

fn color_op(color: Color, op: &str) -> String {
    format!(
        "{} {} {} {}\n",
        fmt_unit(color.r),
        fmt_unit(color.g),
        fmt_unit(color.b),
        op
    )
}

// Literal string body; bytes outside printable ASCII use octal escapes.
fn escape_pdf_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            0x20..=0x7E => out.push(*b as char),
            other => out.push_str(&format!("\\{:03o}", other)),
        }
    }
    out
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn fmt_unit(value: f32) -> String {
    let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    format_milli((clamped as f64 * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;

    fn names() -> ResourceNames {
        let mut names = ResourceNames::new();
        names.insert(ResourceKey::Font(FontFace::Regular), "FSF1".to_string());
        names.insert(ResourceKey::Image("img0".to_string()), "FSIm1".to_string());
        names
    }

    #[test]
    fn formats_milli_values_without_trailing_zeros() {
        assert_eq!(format_milli(72_000), "72");
        assert_eq!(format_milli(-1_500), "-1.5");
        assert_eq!(format_milli(10_125), "10.125");
        assert_eq!(format_milli(0), "0");
        assert_eq!(fmt_unit(0.5), "0.5");
        assert_eq!(fmt_unit(3.0), "1");
    }

    #[test]
    fn text_uses_the_page_font_name() {
        let mut canvas = Canvas::new();
        canvas.set_font(FontFace::Regular, Pt::from_i32(10));
        canvas.draw_string(Pt::from_i32(55), Pt::from_i32(77), "a(b)\\");
        let out = String::from_utf8(encode_commands(&canvas.finish(), &names())).expect("utf8");
        assert_eq!(out, "BT\n/FSF1 10 Tf\n55 77 Td\n(a\\(b\\)\\\\) Tj\nET\n");
    }

    #[test]
    fn non_ascii_text_is_octal_escaped() {
        let mut canvas = Canvas::new();
        canvas.set_font(FontFace::Regular, Pt::from_i32(9));
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "caf\u{00E9}");
        let out = String::from_utf8(encode_commands(&canvas.finish(), &names())).expect("utf8");
        assert!(out.contains("(caf\\351) Tj"));
    }

    #[test]
    fn unresolved_resources_are_skipped() {
        let mut canvas = Canvas::new();
        canvas.set_font(FontFace::Bold, Pt::from_i32(9));
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "X");
        canvas.draw_image(Pt::ZERO, Pt::ZERO, Pt::from_i32(5), Pt::from_i32(5), "img9");
        let out = encode_commands(&canvas.finish(), &names());
        assert!(out.is_empty());
    }

    #[test]
    fn image_placement_uses_a_scaling_matrix() {
        let mut canvas = Canvas::new();
        canvas.draw_image(
            Pt::from_i32(10),
            Pt::from_f32(72.5),
            Pt::from_i32(100),
            Pt::from_i32(40),
            "img0",
        );
        let out = String::from_utf8(encode_commands(&canvas.finish(), &names())).expect("utf8");
        assert_eq!(out, "q\n100 0 0 40 10 72.5 cm\n/FSIm1 Do\nQ\n");
    }

    #[test]
    fn referenced_resources_are_deduplicated_in_order() {
        let mut canvas = Canvas::new();
        canvas.set_font(FontFace::Bold, Pt::from_i32(9));
        canvas.draw_image(Pt::ZERO, Pt::ZERO, Pt::ZERO, Pt::ZERO, "img0");
        canvas.set_font(FontFace::Bold, Pt::from_i32(12));
        canvas.set_font(FontFace::Regular, Pt::from_i32(12));
        assert_eq!(
            referenced_resources(&canvas.finish()),
            vec![
                ResourceKey::Font(FontFace::Bold),
                ResourceKey::Image("img0".to_string()),
                ResourceKey::Font(FontFace::Regular),
            ]
        );
    }
}
