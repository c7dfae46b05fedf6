use crate::document::PdfDocument;
use crate::drawcontext::{DrawContext, PageGuard};
use crate::error::PlatenError;
use crate::types::{
    Annotation, AnnotationId, DeviceCmyk, DocumentOptions, FontId, FunctionId, FunctionType2,
    GraphicsState, GstateId, IccColorId, ImageId, LabColorSpace, LabId, OcgId, OutlineId, PageId,
    SeparationId, ShadingId, ShadingType2, ShadingType3,
};
use std::fs::File;
use std::io::BufWriter;
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// Top level entry point bound to an output file. Hands out draw
/// contexts, forwards resource loading to the document assembler and
/// finalizes the file exactly once.
pub struct Generator {
    doc: PdfDocument<BufWriter<File>>,
}

impl Generator {
    pub fn new<P: AsRef<Path>>(path: P, options: DocumentOptions) -> Result<Self, PlatenError> {
        Ok(Self {
            doc: PdfDocument::open(path, options)?,
        })
    }

    pub fn page_context(&mut self) -> DrawContext<'_, BufWriter<File>> {
        self.doc.page_context()
    }

    /// A page context that finalizes itself on scope exit. Drop path
    /// failures are logged instead of propagated.
    pub fn guarded_page_context(&mut self) -> PageGuard<'_, BufWriter<File>> {
        self.doc.guarded_page_context()
    }

    pub fn form_xobject_context(&mut self, w: f64, h: f64) -> DrawContext<'_, BufWriter<File>> {
        self.doc.form_xobject_context(w, h)
    }

    pub fn pattern_context(&mut self, w: f64, h: f64) -> DrawContext<'_, BufWriter<File>> {
        self.doc.pattern_context(w, h)
    }

    pub fn load_image<P: AsRef<Path>>(&mut self, path: P) -> Result<ImageId, PlatenError> {
        self.doc.load_image(path)
    }

    pub fn image_size(&self, image: ImageId) -> Result<(u32, u32), PlatenError> {
        self.doc.image_size(image)
    }

    pub fn load_font<P: AsRef<Path>>(&mut self, path: P) -> Result<FontId, PlatenError> {
        self.doc.load_font(path)
    }

    pub fn load_font_bytes(&mut self, data: Vec<u8>) -> Result<FontId, PlatenError> {
        self.doc.load_font_bytes(data)
    }

    pub fn load_icc_profile(
        &mut self,
        contents: &[u8],
        channels: u32,
    ) -> Result<IccColorId, PlatenError> {
        self.doc.load_icc_profile(contents, channels)
    }

    pub fn create_separation(
        &mut self,
        name: &str,
        fallback: &DeviceCmyk,
    ) -> Result<SeparationId, PlatenError> {
        self.doc.create_separation(name, fallback)
    }

    pub fn add_lab_colorspace(&mut self, lab: &LabColorSpace) -> LabId {
        self.doc.add_lab_colorspace(lab)
    }

    pub fn add_graphics_state(&mut self, state: &GraphicsState) -> GstateId {
        self.doc.add_graphics_state(state)
    }

    pub fn add_function(&mut self, function: &FunctionType2) -> FunctionId {
        self.doc.add_function(function)
    }

    pub fn add_shading_axial(&mut self, shading: &ShadingType2) -> Result<ShadingId, PlatenError> {
        self.doc.add_shading_axial(shading)
    }

    pub fn add_shading_radial(&mut self, shading: &ShadingType3) -> Result<ShadingId, PlatenError> {
        self.doc.add_shading_radial(shading)
    }

    pub fn add_annotation(&mut self, annotation: &Annotation) -> AnnotationId {
        self.doc.add_annotation(annotation)
    }

    pub fn add_optional_content_group(&mut self, name: &str) -> OcgId {
        self.doc.add_optional_content_group(name)
    }

    pub fn add_outline(
        &mut self,
        title: &str,
        dest: PageId,
        parent: Option<OutlineId>,
    ) -> Result<OutlineId, PlatenError> {
        self.doc.add_outline(title, dest, parent)
    }

    pub fn glyph_advance(&self, font: FontId, pointsize: f64, codepoint: u32) -> Option<f64> {
        self.doc.glyph_advance(font, pointsize, codepoint)
    }

    pub fn utf8_text_width(
        &self,
        text: &str,
        font: FontId,
        pointsize: f64,
    ) -> Result<f64, PlatenError> {
        self.doc.utf8_text_width(text, font, pointsize)
    }

    pub fn page_count(&self) -> usize {
        self.doc.page_count()
    }

    pub fn is_finished(&self) -> bool {
        self.doc.is_finished()
    }

    /// Flushes pages, the page tree, the catalog, the cross reference
    /// table and the trailer. Calling twice is a DoubleFinalize error.
    pub fn finish(&mut self) -> Result<(), PlatenError> {
        self.doc.finish()
    }
}

/// Owns a generator and finalizes the document when the scope exits.
/// An error during drop finalization is logged and the output file is
/// left behind for inspection.
pub struct GeneratorGuard {
    generator: Generator,
}

impl GeneratorGuard {
    pub fn new<P: AsRef<Path>>(path: P, options: DocumentOptions) -> Result<Self, PlatenError> {
        Ok(Self {
            generator: Generator::new(path, options)?,
        })
    }

    pub fn finish(mut self) -> Result<(), PlatenError> {
        self.generator.finish()
    }
}

impl Drop for GeneratorGuard {
    fn drop(&mut self) {
        if !self.generator.is_finished() {
            if let Err(err) = self.generator.finish() {
                log::warn!("document finalization failed: {}", err);
            }
        }
    }
}

impl Deref for GeneratorGuard {
    type Target = Generator;

    fn deref(&self) -> &Self::Target {
        &self.generator
    }
}

impl DerefMut for GeneratorGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.generator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_pdf_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!(
            "platen_{tag}_{}_{}.pdf",
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn header_is_written_on_open() {
        let path = temp_pdf_path("open");
        let _generator = Generator::new(&path, DocumentOptions::default()).unwrap();
        // Nothing has been finalized, but the header must already be
        // on disk once the sink is flushed by dropping the generator.
        drop(_generator);
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7\n"));
        assert!(!bytes.ends_with(b"%%EOF\n"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn guard_finalizes_on_scope_exit() {
        let path = temp_pdf_path("guard");
        {
            let mut guard = GeneratorGuard::new(&path, DocumentOptions::default()).unwrap();
            let mut page = guard.guarded_page_context();
            page.set_fill_rgb(0.2, 0.2, 0.2).unwrap();
            page.rect(10.0, 10.0, 100.0, 100.0);
            page.fill();
        }
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.ends_with(b"%%EOF\n"));
        assert!(bytes
            .windows(12)
            .any(|w| w == b"/Type /Page\n"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn explicit_finish_then_guard_drop_is_quiet() {
        let path = temp_pdf_path("finish");
        let mut guard = GeneratorGuard::new(&path, DocumentOptions::default()).unwrap();
        let page = guard.guarded_page_context();
        page.finish().unwrap();
        guard.finish().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.ends_with(b"%%EOF\n"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn double_finish_surfaces_the_error() {
        let path = temp_pdf_path("double");
        let mut generator = Generator::new(&path, DocumentOptions::default()).unwrap();
        generator.finish().unwrap();
        assert!(matches!(
            generator.finish(),
            Err(PlatenError::DoubleFinalize)
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn pages_count_in_order_of_addition() {
        let path = temp_pdf_path("order");
        let mut generator = Generator::new(&path, DocumentOptions::default()).unwrap();
        for i in 0..3 {
            let mut page = generator.page_context();
            page.render_ascii_text_builtin(
                &format!("page {}", i),
                crate::types::BuiltinFont::Helvetica,
                12.0,
                10.0,
                10.0,
            );
            let id = page.finish_page().unwrap();
            assert_eq!(id, PageId(i));
        }
        assert_eq!(generator.page_count(), 3);
        generator.finish().unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
