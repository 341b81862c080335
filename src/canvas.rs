use crate::fonts::FontFace;
use crate::types::{Color, Pt};

// Bezier control-point factor for quarter circles.
const CIRCLE_KAPPA: f32 = 0.552_284_75;

/// Drawing primitives in document space. A field's command list is its rendered mark.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetFont { face: FontFace, size: Pt },
    Rect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    MoveTo {
        x: Pt,
        y: Pt,
    },
    CurveTo {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
        x: Pt,
        y: Pt,
    },
    ClosePath,
    Fill,
    FillStroke,
    // Baseline origin at (x, y).
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

/// Records commands for one field. Commands only reach a page once the whole field has
/// rendered, so a failing field leaves nothing behind.
#[derive(Debug, Default)]
pub struct Canvas {
    commands: Vec<Command>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_state(&mut self) {
        self.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        self.commands.push(Command::RestoreState);
    }

    pub fn set_fill_color(&mut self, color: Color) {
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = if width < Pt::ZERO { Pt::ZERO } else { width };
        self.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_font(&mut self, face: FontFace, size: Pt) {
        self.commands.push(Command::SetFont { face, size });
    }

    pub fn rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.commands.push(Command::Rect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.commands.push(Command::MoveTo { x, y });
    }

    pub fn curve_to(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt, x: Pt, y: Pt) {
        self.commands.push(Command::CurveTo {
            x1,
            y1,
            x2,
            y2,
            x,
            y,
        });
    }

    pub fn close_path(&mut self) {
        self.commands.push(Command::ClosePath);
    }

    /// Appends a closed circle path made of four cubic segments.
    pub fn circle(&mut self, cx: Pt, cy: Pt, radius: Pt) {
        let k = radius * CIRCLE_KAPPA;
        self.move_to(cx + radius, cy);
        self.curve_to(cx + radius, cy + k, cx + k, cy + radius, cx, cy + radius);
        self.curve_to(cx - k, cy + radius, cx - radius, cy + k, cx - radius, cy);
        self.curve_to(cx - radius, cy - k, cx - k, cy - radius, cx, cy - radius);
        self.curve_to(cx + k, cy - radius, cx + radius, cy - k, cx + radius, cy);
        self.close_path();
    }

    pub fn fill(&mut self) {
        self.commands.push(Command::Fill);
    }

    pub fn fill_stroke(&mut self) {
        self.commands.push(Command::FillStroke);
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
    ) {
        self.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    pub fn finish(self) -> Vec<Command> {
        self.commands
    }
}
