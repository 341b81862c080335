use crate::error::StampError;
use crate::types::Pt;
use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    dictionary,
};
use std::sync::Arc;

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 255;

// Advance widths (1/1000 em) for codes 32..=126, from the standard Helvetica AFM files.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // sp - /
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0 - 9
    278, 278, 584, 584, 584, 556, 1015, // : - @
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A - M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N - Z
    278, 278, 278, 469, 556, 333, // [ - `
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a - m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n - z
    334, 260, 334, 584, // { - ~
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // sp - /
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0 - 9
    333, 333, 584, 584, 584, 611, 975, // : - @
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // A - M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N - Z
    333, 278, 333, 584, 556, 333, // [ - `
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // a - m
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // n - z
    389, 280, 389, 584, // { - ~
];

// Codes 127..=255 from the same AFM files, unassigned cp1252 slots at the bullet width.
const HELVETICA_HIGH_WIDTHS: [u16; 129] = [
    350, // 0x7F
    556, 350, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 350, 611, 350, // 0x80
    350, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 350, 500, 667, // 0x90
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 0xA0
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 0xB0
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 0xC0
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 0xD0
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278, // 0xE0
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500, // 0xF0
];

const HELVETICA_BOLD_HIGH_WIDTHS: [u16; 129] = [
    350, // 0x7F
    556, 350, 278, 556, 500, 1000, 556, 556, 333, 1000, 667, 333, 1000, 350, 611, 350, // 0x80
    350, 278, 278, 500, 500, 350, 556, 1000, 333, 1000, 556, 333, 944, 350, 500, 667, // 0x90
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 0xA0
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 0xB0
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 0xC0
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 0xD0
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278, // 0xE0
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556, // 0xF0
];

// cp1252 codes 0x80..=0x9F; zero marks an unassigned slot.
const WINANSI_HIGH: [u32; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039,
    0x0152, 0, 0x017D, 0, 0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, 0x02DC,
    0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FontFace {
    Regular,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
}

impl StandardFont {
    fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
        }
    }

    fn metrics(self) -> FontMetrics {
        let (ascii, high) = match self {
            StandardFont::Helvetica => (&HELVETICA_WIDTHS, &HELVETICA_HIGH_WIDTHS),
            StandardFont::HelveticaBold => (&HELVETICA_BOLD_WIDTHS, &HELVETICA_BOLD_HIGH_WIDTHS),
        };
        let mut widths = Vec::with_capacity((LAST_CHAR - FIRST_CHAR) as usize + 1);
        widths.extend_from_slice(ascii);
        widths.extend_from_slice(high);
        FontMetrics {
            widths,
            missing_width: 556,
        }
    }
}

/// A parsed TrueType program supplied by the caller.
#[derive(Debug)]
pub struct TrueTypeProgram {
    name: String,
    data: Vec<u8>,
    metrics: FontMetrics,
    ascent: i16,
    descent: i16,
    cap_height: i16,
    italic_angle: i16,
    bbox: (i16, i16, i16, i16),
}

impl TrueTypeProgram {
    pub fn parse(data: Vec<u8>) -> Result<Self, StampError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
            StampError::InvalidConfiguration(format!("font parse failed: {err}"))
        })?;
        if face.tables().cff.is_some() {
            return Err(StampError::InvalidConfiguration(
                "CFF-flavoured OpenType fonts are not supported, supply a TrueType face"
                    .to_string(),
            ));
        }
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;

        let mut widths = Vec::with_capacity((LAST_CHAR - FIRST_CHAR) as usize + 1);
        for code in FIRST_CHAR..=LAST_CHAR {
            let advance = winansi_to_char(code)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|gid| face.glyph_hor_advance(gid))
                .map(|adv| (adv as f32 * scale).round() as u16)
                .unwrap_or(0);
            widths.push(advance);
        }
        let missing_width = widths[0];

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let name = postscript_name(&face).unwrap_or_else(|| "EmbeddedFont".to_string());

        drop(face);
        Ok(Self {
            name,
            data,
            metrics: FontMetrics {
                widths,
                missing_width,
            },
            ascent,
            descent,
            cap_height,
            italic_angle,
            bbox,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub enum FontProgram {
    Standard(StandardFont),
    TrueType(Arc<TrueTypeProgram>),
}

/// The regular/bold pair a stamper uses for every call.
#[derive(Debug, Clone)]
pub struct FontSet {
    pub regular: FontProgram,
    pub bold: FontProgram,
}

impl Default for FontSet {
    fn default() -> Self {
        Self {
            regular: FontProgram::Standard(StandardFont::Helvetica),
            bold: FontProgram::Standard(StandardFont::HelveticaBold),
        }
    }
}

#[derive(Debug, Clone)]
struct FontMetrics {
    // Indexed by WinAnsi code minus FIRST_CHAR.
    widths: Vec<u16>,
    missing_width: u16,
}

impl FontMetrics {
    fn advance(&self, code: u8) -> u16 {
        if code < FIRST_CHAR {
            return self.missing_width;
        }
        self.widths
            .get((code - FIRST_CHAR) as usize)
            .copied()
            .unwrap_or(self.missing_width)
    }

    fn measure(&self, text: &str, size: Pt) -> Pt {
        let units: u32 = encode_winansi(text)
            .iter()
            .map(|code| self.advance(*code) as u32)
            .sum();
        Pt::from_f32(units as f32 * size.to_f32() / 1000.0)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EmbeddedFont {
    pub(crate) object_id: LoObjectId,
    metrics: FontMetrics,
}

/// Font handles for one overlay call. Each face is embedded once and shared by every field.
#[derive(Debug, Clone)]
pub struct FontResources {
    regular: EmbeddedFont,
    bold: EmbeddedFont,
}

impl FontResources {
    pub(crate) fn embed(doc: &mut LoDocument, set: &FontSet) -> Self {
        Self {
            regular: embed_program(doc, &set.regular),
            bold: embed_program(doc, &set.bold),
        }
    }

    pub(crate) fn handle(&self, face: FontFace) -> &EmbeddedFont {
        match face {
            FontFace::Regular => &self.regular,
            FontFace::Bold => &self.bold,
        }
    }

    pub fn object_id(&self, face: FontFace) -> LoObjectId {
        self.handle(face).object_id
    }

    pub fn text_width(&self, face: FontFace, text: &str, size: Pt) -> Pt {
        self.handle(face).metrics.measure(text, size)
    }
}

fn embed_program(doc: &mut LoDocument, program: &FontProgram) -> EmbeddedFont {
    match program {
        FontProgram::Standard(font) => {
            let object_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            EmbeddedFont {
                object_id,
                metrics: font.metrics(),
            }
        }
        FontProgram::TrueType(program) => {
            let file_id = doc.add_object(LoStream::new(
                dictionary! { "Length1" => program.data.len() as i64 },
                program.data.clone(),
            ));
            let (x_min, y_min, x_max, y_max) = program.bbox;
            let descriptor_id = doc.add_object(dictionary! {
                "Type" => "FontDescriptor",
                "FontName" => LoObject::Name(program.name().as_bytes().to_vec()),
                // Nonsymbolic: glyphs are addressed through WinAnsiEncoding.
                "Flags" => 32,
                "FontBBox" => vec![
                    (x_min as i64).into(),
                    (y_min as i64).into(),
                    (x_max as i64).into(),
                    (y_max as i64).into(),
                ],
                "ItalicAngle" => program.italic_angle as i64,
                "Ascent" => program.ascent as i64,
                "Descent" => program.descent as i64,
                "CapHeight" => program.cap_height as i64,
                "StemV" => 80,
                "FontFile2" => file_id,
            });
            let widths: Vec<LoObject> = program
                .metrics
                .widths
                .iter()
                .map(|w| LoObject::Integer(*w as i64))
                .collect();
            let object_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "TrueType",
                "BaseFont" => LoObject::Name(program.name().as_bytes().to_vec()),
                "FirstChar" => FIRST_CHAR as i64,
                "LastChar" => LAST_CHAR as i64,
                "Widths" => widths,
                "Encoding" => "WinAnsiEncoding",
                "FontDescriptor" => descriptor_id,
            });
            EmbeddedFont {
                object_id,
                metrics: program.metrics.clone(),
            }
        }
    }
}

/// Maps text to WinAnsi codes. Characters outside the encoding become `?`.
pub fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| winansi_code(ch).unwrap_or(b'?'))
        .collect()
}

/// Like [`encode_winansi`], but stops at the first character the encoding cannot carry.
pub fn encode_winansi_checked(text: &str) -> Result<Vec<u8>, char> {
    text.chars().map(|ch| winansi_code(ch).ok_or(ch)).collect()
}

fn winansi_code(ch: char) -> Option<u8> {
    match ch {
        '\u{0020}'..='\u{007E}' | '\u{00A0}'..='\u{00FF}' => Some(ch as u32 as u8),
        '\n' | '\r' | '\t' => Some(b' '),
        other => WINANSI_HIGH
            .iter()
            .position(|cp| *cp != 0 && *cp == other as u32)
            .map(|idx| 0x80 + idx as u8),
    }
}

fn winansi_to_char(code: u8) -> Option<char> {
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as char),
        0x80..=0x9F => match WINANSI_HIGH[(code - 0x80) as usize] {
            0 => None,
            cp => char::from_u32(cp),
        },
        _ => None,
    }
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    (value as f32 * scale).round() as i16
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;

    let mut fallback = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME => return Some(sanitize_name(&name)),
            name_id::FULL_NAME | name_id::FAMILY if fallback.is_none() => {
                fallback = Some(sanitize_name(&name));
            }
            _ => {}
        }
    }
    fallback
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_ascii_graphic() && !"()<>[]{}/%#".contains(*ch))
        .collect()
}
