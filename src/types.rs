use std::path::PathBuf;

/// A scalar clamped to [0, 1] at construction. NaN maps to 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitDouble(f64);

impl LimitDouble {
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return LimitDouble(0.0);
        }
        LimitDouble(value.clamp(0.0, 1.0))
    }

    pub fn v(self) -> f64 {
        self.0
    }
}

impl From<f64> for LimitDouble {
    fn from(value: f64) -> Self {
        LimitDouble::new(value)
    }
}

impl Default for LimitDouble {
    fn default() -> Self {
        LimitDouble(0.0)
    }
}

// Every resource type has its own id type so they can not be mixed up.
macro_rules! resource_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) u32);
    };
}

resource_id!(ImageId);
resource_id!(FontId);
resource_id!(IccColorId);
resource_id!(LabId);
resource_id!(SeparationId);
resource_id!(GstateId);
resource_id!(FunctionId);
resource_id!(ShadingId);
resource_id!(PatternId);
resource_id!(FormXObjectId);
resource_id!(AnnotationId);
resource_id!(OcgId);
resource_id!(PageId);
resource_id!(OutlineId);

/// One ≤255 glyph slice of a loaded font.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FontSubset {
    pub font: FontId,
    pub subset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceRgb {
    pub r: LimitDouble,
    pub g: LimitDouble,
    pub b: LimitDouble,
}

impl DeviceRgb {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: r.into(),
            g: g.into(),
            b: b.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceGray {
    pub v: LimitDouble,
}

impl DeviceGray {
    pub fn new(v: f64) -> Self {
        Self { v: v.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceCmyk {
    pub c: LimitDouble,
    pub m: LimitDouble,
    pub y: LimitDouble,
    pub k: LimitDouble,
}

impl DeviceCmyk {
    pub fn new(c: f64, m: f64, y: f64, k: f64) -> Self {
        Self {
            c: c.into(),
            m: m.into(),
            y: y.into(),
            k: k.into(),
        }
    }
}

/// A color in a caller supplied ICC based space.
#[derive(Debug, Clone, PartialEq)]
pub struct IccColor {
    pub space: IccColorId,
    pub values: Vec<f64>,
}

/// CIE L*a*b* coordinates in a registered Lab space. L is 0..100,
/// a and b live inside the range declared for the space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabColor {
    pub space: LabId,
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparationColor {
    pub id: SeparationId,
    pub value: LimitDouble,
}

/// White point and a/b ranges for a Lab color space object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabColorSpace {
    pub xw: f64,
    pub yw: f64,
    pub zw: f64,
    pub amin: f64,
    pub amax: f64,
    pub bmin: f64,
    pub bmax: f64,
}

impl LabColorSpace {
    /// D50 white point with the customary a/b range of [-128, 127].
    pub fn d50() -> Self {
        Self {
            xw: 0.9642,
            yw: 1.0,
            zw: 0.8249,
            amin: -128.0,
            amax: 127.0,
            bmin: -128.0,
            bmax: 127.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl PdfBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn a4() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 595.28,
            h: 841.89,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputColorspace {
    Rgb,
    Gray,
    Cmyk,
}

impl OutputColorspace {
    pub(crate) fn pdf_name(self) -> &'static str {
        match self {
            OutputColorspace::Rgb => "/DeviceRGB",
            OutputColorspace::Gray => "/DeviceGray",
            OutputColorspace::Cmyk => "/DeviceCMYK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCap {
    Butt = 0,
    Round = 1,
    ProjectingSquare = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineJoin {
    Miter = 0,
    Round = 1,
    Bevel = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRenderingMode {
    Fill = 0,
    Stroke = 1,
    FillStroke = 2,
    Invisible = 3,
    FillClip = 4,
    StrokeClip = 5,
    FillStrokeClip = 6,
    Clip = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Normal = 0,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

pub(crate) const BLEND_MODE_NAMES: [&str; 16] = [
    "Normal",
    "Multiply",
    "Screen",
    "Overlay",
    "Darken",
    "Lighten",
    "ColorDodge",
    "ColorBurn",
    "HardLight",
    "SoftLight",
    "Difference",
    "Exclusion",
    "Hue",
    "Saturation",
    "Color",
    "Luminosity",
];

impl BlendMode {
    pub(crate) fn pdf_name(self) -> &'static str {
        BLEND_MODE_NAMES[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingIntent {
    RelativeColorimetric = 0,
    AbsoluteColorimetric,
    Saturation,
    Perceptual,
}

pub(crate) const RENDERING_INTENT_NAMES: [&str; 4] = [
    "RelativeColorimetric",
    "AbsoluteColorimetric",
    "Saturation",
    "Perceptual",
];

impl RenderingIntent {
    pub(crate) fn pdf_name(self) -> &'static str {
        RENDERING_INTENT_NAMES[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFont {
    TimesRoman = 0,
    Helvetica,
    Courier,
    TimesBold,
    HelveticaBold,
    CourierBold,
    TimesItalic,
    HelveticaOblique,
    CourierOblique,
}

pub(crate) const BUILTIN_FONT_NAMES: [&str; 9] = [
    "Times-Roman",
    "Helvetica",
    "Courier",
    "Times-Bold",
    "Helvetica-Bold",
    "Courier-Bold",
    "Times-Italic",
    "Helvetica-Oblique",
    "Courier-Oblique",
];

impl BuiltinFont {
    pub(crate) fn pdf_name(self) -> &'static str {
        BUILTIN_FONT_NAMES[self as usize]
    }
}

/// Presentation style for moving to the page this transition is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStyle {
    Split = 0,
    Blinds,
    Box,
    Wipe,
    Dissolve,
    Glitter,
    Replace,
    Fly,
    Push,
    Cover,
    Uncover,
    Fade,
}

pub(crate) const TRANSITION_STYLE_NAMES: [&str; 12] = [
    "Split", "Blinds", "Box", "Wipe", "Dissolve", "Glitter", "R", "Fly", "Push", "Cover",
    "Uncover", "Fade",
];

impl TransitionStyle {
    pub(crate) fn pdf_name(self) -> &'static str {
        TRANSITION_STYLE_NAMES[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransition {
    pub style: TransitionStyle,
    pub duration: f64,
}

/// Entries for an /ExtGState dictionary. Unset fields are omitted from
/// the emitted object.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GraphicsState {
    pub line_width: Option<f64>,
    pub line_cap: Option<LineCap>,
    pub line_join: Option<LineJoin>,
    pub miter_limit: Option<f64>,
    pub rendering_intent: Option<RenderingIntent>,
    pub stroke_overprint: Option<bool>,
    pub fill_overprint: Option<bool>,
    pub overprint_mode: Option<i32>,
    pub flatness: Option<f64>,
    pub smoothness: Option<f64>,
    pub stroke_adjustment: Option<bool>,
    pub blend_mode: Option<BlendMode>,
    pub stroke_alpha: Option<LimitDouble>,
    pub fill_alpha: Option<LimitDouble>,
    pub alpha_is_shape: Option<bool>,
    pub text_knockout: Option<bool>,
}

/// A Type 2 exponential interpolation function between two device colors.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType2 {
    pub domain: [f64; 2],
    pub c0: Vec<f64>,
    pub c1: Vec<f64>,
    pub n: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingType2 {
    pub colorspace: OutputColorspace,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub function: FunctionId,
    pub extend0: bool,
    pub extend1: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingType3 {
    pub colorspace: OutputColorspace,
    pub x0: f64,
    pub y0: f64,
    pub r0: f64,
    pub x1: f64,
    pub y1: f64,
    pub r1: f64,
    pub function: FunctionId,
    pub extend0: bool,
    pub extend1: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Text { rect: PdfBox, contents: String },
    Link { rect: PdfBox, uri: String },
}

/// Paths to caller supplied ICC profiles. Fields left as None fall back
/// to the built in conversion math and no embedded profile object.
#[derive(Debug, Clone, Default)]
pub struct ColorProfiles {
    pub rgb: Option<PathBuf>,
    pub gray: Option<PathBuf>,
    pub cmyk: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub mediabox: PdfBox,
    pub cropbox: Option<PdfBox>,
    pub bleedbox: Option<PdfBox>,
    pub trimbox: Option<PdfBox>,
    pub artbox: Option<PdfBox>,
    pub title: String,
    pub author: String,
    pub language: Option<String>,
    pub output_colorspace: OutputColorspace,
    pub profiles: ColorProfiles,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            mediabox: PdfBox::a4(),
            cropbox: None,
            bleedbox: None,
            trimbox: None,
            artbox: None,
            title: String::new(),
            author: String::new(),
            language: None,
            output_colorspace: OutputColorspace::Rgb,
            profiles: ColorProfiles::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_double_clamps() {
        assert_eq!(LimitDouble::new(-1.0).v(), 0.0);
        assert_eq!(LimitDouble::new(2.0).v(), 1.0);
        assert_eq!(LimitDouble::new(f64::NAN).v(), 0.0);
        assert_eq!(LimitDouble::new(f64::INFINITY).v(), 1.0);
        assert_eq!(LimitDouble::new(f64::NEG_INFINITY).v(), 0.0);
        assert_eq!(LimitDouble::new(0.25).v(), 0.25);
    }

    #[test]
    fn device_colors_clamp_on_construction() {
        let c = DeviceRgb::new(1.5, -0.5, f64::NAN);
        assert_eq!(c.r.v(), 1.0);
        assert_eq!(c.g.v(), 0.0);
        assert_eq!(c.b.v(), 0.0);
    }

    #[test]
    fn name_tables_line_up_with_enums() {
        assert_eq!(BlendMode::Luminosity.pdf_name(), "Luminosity");
        assert_eq!(RenderingIntent::Perceptual.pdf_name(), "Perceptual");
        assert_eq!(BuiltinFont::CourierOblique.pdf_name(), "Courier-Oblique");
        assert_eq!(TransitionStyle::Replace.pdf_name(), "R");
    }
}
