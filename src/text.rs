use crate::types::{FontId, TextRenderingMode};

/// One element of a kerned character sequence: either a codepoint to
/// draw or a TJ displacement in font units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CharItem {
    Codepoint(u32),
    Kern(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TextEvent {
    CharSpacing(f64),
    WordSpacing(f64),
    HorizontalScaling(f64),
    Leading(f64),
    Rise(f64),
    RenderMode(TextRenderingMode),
    Font { font: FontId, size: f64 },
    Translate { tx: f64, ty: f64 },
    TranslateAndSetLeading { tx: f64, ty: f64 },
    Matrix([f64; 6]),
    NextLine,
    Unicode(String),
    Kerned(Vec<CharItem>),
}

/// A structured text object. Events accumulate in call order and are
/// rendered into a single BT..ET block by the draw context.
#[derive(Debug, Clone, Default)]
pub struct PdfText {
    events: Vec<TextEvent>,
}

impl PdfText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn char_spacing(&mut self, spacing: f64) -> &mut Self {
        self.events.push(TextEvent::CharSpacing(spacing));
        self
    }

    pub fn word_spacing(&mut self, spacing: f64) -> &mut Self {
        self.events.push(TextEvent::WordSpacing(spacing));
        self
    }

    pub fn horizontal_scaling(&mut self, percent: f64) -> &mut Self {
        self.events.push(TextEvent::HorizontalScaling(percent));
        self
    }

    pub fn leading(&mut self, leading: f64) -> &mut Self {
        self.events.push(TextEvent::Leading(leading));
        self
    }

    pub fn rise(&mut self, rise: f64) -> &mut Self {
        self.events.push(TextEvent::Rise(rise));
        self
    }

    pub fn render_mode(&mut self, mode: TextRenderingMode) -> &mut Self {
        self.events.push(TextEvent::RenderMode(mode));
        self
    }

    pub fn font(&mut self, font: FontId, size: f64) -> &mut Self {
        self.events.push(TextEvent::Font { font, size });
        self
    }

    /// Td, a relative move of the text position.
    pub fn translate(&mut self, tx: f64, ty: f64) -> &mut Self {
        self.events.push(TextEvent::Translate { tx, ty });
        self
    }

    /// TD, a relative move that also sets the leading to -ty.
    pub fn translate_and_set_leading(&mut self, tx: f64, ty: f64) -> &mut Self {
        self.events.push(TextEvent::TranslateAndSetLeading { tx, ty });
        self
    }

    pub fn matrix(&mut self, m: [f64; 6]) -> &mut Self {
        self.events.push(TextEvent::Matrix(m));
        self
    }

    /// T*, move to the start of the next line.
    pub fn next_line(&mut self) -> &mut Self {
        self.events.push(TextEvent::NextLine);
        self
    }

    pub fn text(&mut self, utf8: &str) -> &mut Self {
        self.events.push(TextEvent::Unicode(utf8.to_string()));
        self
    }

    pub fn kerned_sequence(&mut self, items: Vec<CharItem>) -> &mut Self {
        self.events.push(TextEvent::Kerned(items));
        self
    }

    pub(crate) fn events(&self) -> &[TextEvent] {
        &self.events
    }
}
