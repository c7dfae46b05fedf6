//! Synthesizes PDF 1.7 documents from drawing commands. The crate
//! writes files from scratch: a document assembler owns the output
//! bytes and the cross reference bookkeeping, draw contexts record
//! content stream operators and the resources they touch, and the
//! registries convert colors, embed images and build subset fonts.

mod colorconvert;
mod document;
mod drawcontext;
mod error;
mod fontsub;
mod generator;
mod images;
mod text;
mod types;
mod utils;

pub use colorconvert::ColorConverter;
pub use document::PdfDocument;
pub use drawcontext::{DrawContext, GstateGuard, PageGuard, PdfGlyph};
pub use error::PlatenError;
pub use generator::{Generator, GeneratorGuard};
pub use text::{CharItem, PdfText};
pub use types::{
    Annotation, AnnotationId, BlendMode, BuiltinFont, ColorProfiles, DeviceCmyk, DeviceGray,
    DeviceRgb, DocumentOptions, FontId, FontSubset, FormXObjectId, FunctionId, FunctionType2,
    GraphicsState, GstateId, IccColor, IccColorId, ImageId, LabColor, LabColorSpace, LabId,
    LimitDouble, LineCap, LineJoin, OcgId, OutlineId, OutputColorspace, PageId, PageTransition,
    PatternId, PdfBox, RenderingIntent, SeparationColor, SeparationId, ShadingId, ShadingType2,
    ShadingType3, TextRenderingMode, TransitionStyle,
};
