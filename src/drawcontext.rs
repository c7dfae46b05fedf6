use crate::document::{PdfDocument, StructItem};
use crate::error::PlatenError;
use crate::text::{CharItem, PdfText, TextEvent};
use crate::types::{
    AnnotationId, BuiltinFont, DeviceCmyk, DeviceGray, DeviceRgb, FontId, FontSubset,
    FormXObjectId, GstateId, IccColorId, ImageId, LabColor, LimitDouble, LineCap, LineJoin, OcgId,
    OutputColorspace, PageId, PageTransition, PatternId, RenderingIntent, SeparationId, ShadingId,
};
use crate::utils::{escape_pdf_name, fmt_num};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::Write;
use std::ops::{Deref, DerefMut};

/// A glyph positioned by the caller, for externally shaped runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfGlyph {
    pub codepoint: u32,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ContextKind {
    Page,
    FormXObject { w: f64, h: f64 },
    TilingPattern { w: f64, h: f64 },
}

/// Records content stream operators for one page, form XObject or
/// tiling pattern, together with the set of resources the operators
/// referenced. Finalizing hands the resource dictionary and the stream
/// to the assembler in a single call and consumes the builder, so a
/// finalized context cannot be reused.
pub struct DrawContext<'a, W: Write> {
    doc: &'a mut PdfDocument<W>,
    kind: ContextKind,
    commands: String,
    used_images: BTreeSet<u32>,
    used_fonts: BTreeSet<u32>,
    used_subset_fonts: BTreeSet<FontSubset>,
    used_colorspaces: BTreeSet<u32>,
    used_gstates: BTreeSet<u32>,
    used_shadings: BTreeSet<u32>,
    used_patterns: BTreeSet<u32>,
    used_form_xobjects: BTreeSet<u32>,
    used_ocgs: BTreeSet<u32>,
    uses_all_separation: bool,
    marked_depth: u32,
    next_mcid: u32,
    annotations: Vec<u32>,
    transition: Option<PageTransition>,
    struct_items: Vec<StructItem>,
}

impl<'a, W: Write> DrawContext<'a, W> {
    pub(crate) fn new(doc: &'a mut PdfDocument<W>, kind: ContextKind) -> Self {
        Self {
            doc,
            kind,
            commands: String::new(),
            used_images: BTreeSet::new(),
            used_fonts: BTreeSet::new(),
            used_subset_fonts: BTreeSet::new(),
            used_colorspaces: BTreeSet::new(),
            used_gstates: BTreeSet::new(),
            used_shadings: BTreeSet::new(),
            used_patterns: BTreeSet::new(),
            used_form_xobjects: BTreeSet::new(),
            used_ocgs: BTreeSet::new(),
            uses_all_separation: false,
            marked_depth: 0,
            next_mcid: 0,
            annotations: Vec::new(),
            transition: None,
            struct_items: Vec::new(),
        }
    }

    /// The operators recorded so far, in emission order.
    pub fn command_bytes(&self) -> &str {
        &self.commands
    }

    // ----- graphics state stack -----

    /// q
    pub fn save_state(&mut self) {
        self.commands.push_str("q\n");
    }

    /// Q
    pub fn restore_state(&mut self) {
        self.commands.push_str("Q\n");
    }

    /// Emits q now and guarantees the matching Q on every exit path.
    pub fn state_scope(&mut self) -> GstateGuard<'_, 'a, W> {
        self.save_state();
        GstateGuard { ctx: self }
    }

    // ----- path construction -----

    pub fn move_to(&mut self, x: f64, y: f64) {
        let _ = writeln!(self.commands, "{} {} m", fmt_num(x), fmt_num(y));
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        let _ = writeln!(self.commands, "{} {} l", fmt_num(x), fmt_num(y));
    }

    pub fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        let _ = writeln!(
            self.commands,
            "{} {} {} {} {} {} c",
            fmt_num(x1),
            fmt_num(y1),
            fmt_num(x2),
            fmt_num(y2),
            fmt_num(x3),
            fmt_num(y3)
        );
    }

    /// v, the first control point coinciding with the current point.
    pub fn curve_to_v(&mut self, x2: f64, y2: f64, x3: f64, y3: f64) {
        let _ = writeln!(
            self.commands,
            "{} {} {} {} v",
            fmt_num(x2),
            fmt_num(y2),
            fmt_num(x3),
            fmt_num(y3)
        );
    }

    /// y, the second control point coinciding with the end point.
    pub fn curve_to_y(&mut self, x1: f64, y1: f64, x3: f64, y3: f64) {
        let _ = writeln!(
            self.commands,
            "{} {} {} {} y",
            fmt_num(x1),
            fmt_num(y1),
            fmt_num(x3),
            fmt_num(y3)
        );
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        let _ = writeln!(
            self.commands,
            "{} {} {} {} re",
            fmt_num(x),
            fmt_num(y),
            fmt_num(w),
            fmt_num(h)
        );
    }

    pub fn close_path(&mut self) {
        self.commands.push_str("h\n");
    }

    // ----- painting -----

    pub fn stroke(&mut self) {
        self.commands.push_str("S\n");
    }

    pub fn close_and_stroke(&mut self) {
        self.commands.push_str("s\n");
    }

    pub fn fill(&mut self) {
        self.commands.push_str("f\n");
    }

    pub fn fill_even_odd(&mut self) {
        self.commands.push_str("f*\n");
    }

    pub fn fill_stroke(&mut self) {
        self.commands.push_str("B\n");
    }

    pub fn fill_stroke_even_odd(&mut self) {
        self.commands.push_str("B*\n");
    }

    pub fn close_fill_stroke(&mut self) {
        self.commands.push_str("b\n");
    }

    pub fn close_fill_stroke_even_odd(&mut self) {
        self.commands.push_str("b*\n");
    }

    pub fn end_path(&mut self) {
        self.commands.push_str("n\n");
    }

    pub fn clip(&mut self) {
        self.commands.push_str("W\n");
    }

    pub fn clip_even_odd(&mut self) {
        self.commands.push_str("W*\n");
    }

    // ----- line and fill parameters -----

    pub fn set_line_width(&mut self, width: f64) -> Result<(), PlatenError> {
        if width < 0.0 {
            return Err(PlatenError::NegativeLineWidth);
        }
        let _ = writeln!(self.commands, "{} w", fmt_num(width));
        Ok(())
    }

    pub fn set_line_cap(&mut self, cap: LineCap) {
        let _ = writeln!(self.commands, "{} J", cap as i32);
    }

    pub fn set_line_join(&mut self, join: LineJoin) {
        let _ = writeln!(self.commands, "{} j", join as i32);
    }

    pub fn set_miter_limit(&mut self, miter_limit: f64) {
        let _ = writeln!(self.commands, "{} M", fmt_num(miter_limit));
    }

    pub fn set_dash(&mut self, dashes: &[f64], phase: f64) -> Result<(), PlatenError> {
        if dashes.is_empty() {
            return Err(PlatenError::ZeroLengthArray);
        }
        if dashes.iter().any(|d| *d < 0.0) {
            return Err(PlatenError::NegativeDash);
        }
        self.commands.push_str("[ ");
        for d in dashes {
            let _ = write!(self.commands, "{} ", fmt_num(*d));
        }
        let _ = writeln!(self.commands, "] {} d", fmt_num(phase));
        Ok(())
    }

    pub fn set_flatness(&mut self, flatness: f64) -> Result<(), PlatenError> {
        if !(0.0..=100.0).contains(&flatness) {
            return Err(PlatenError::InvalidFlatness);
        }
        let _ = writeln!(self.commands, "{} i", fmt_num(flatness));
        Ok(())
    }

    pub fn set_rendering_intent(&mut self, intent: RenderingIntent) {
        let _ = writeln!(self.commands, "/{} ri", intent.pdf_name());
    }

    // ----- transformation matrix -----

    pub fn concat_matrix(
        &mut self,
        m1: f64,
        m2: f64,
        m3: f64,
        m4: f64,
        m5: f64,
        m6: f64,
    ) -> Result<(), PlatenError> {
        // A matrix with an all-zero linear part collapses everything to
        // a point and is never intentional.
        if m1 == 0.0 && m2 == 0.0 && m3 == 0.0 && m4 == 0.0 {
            return Err(PlatenError::DegenerateMatrix);
        }
        let _ = writeln!(
            self.commands,
            "{} {} {} {} {} {} cm",
            fmt_num(m1),
            fmt_num(m2),
            fmt_num(m3),
            fmt_num(m4),
            fmt_num(m5),
            fmt_num(m6)
        );
        Ok(())
    }

    pub fn scale(&mut self, sx: f64, sy: f64) -> Result<(), PlatenError> {
        self.concat_matrix(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn translate(&mut self, tx: f64, ty: f64) -> Result<(), PlatenError> {
        self.concat_matrix(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn rotate(&mut self, angle: f64) -> Result<(), PlatenError> {
        let (sin, cos) = angle.sin_cos();
        self.concat_matrix(cos, sin, -sin, cos, 0.0, 0.0)
    }

    // ----- raw device color operators -----

    /// RG
    pub fn set_stroke_rgb(&mut self, r: f64, g: f64, b: f64) -> Result<(), PlatenError> {
        check_color_component(r)?;
        check_color_component(g)?;
        check_color_component(b)?;
        let _ = writeln!(
            self.commands,
            "{} {} {} RG",
            fmt_num(r),
            fmt_num(g),
            fmt_num(b)
        );
        Ok(())
    }

    /// rg
    pub fn set_fill_rgb(&mut self, r: f64, g: f64, b: f64) -> Result<(), PlatenError> {
        check_color_component(r)?;
        check_color_component(g)?;
        check_color_component(b)?;
        let _ = writeln!(
            self.commands,
            "{} {} {} rg",
            fmt_num(r),
            fmt_num(g),
            fmt_num(b)
        );
        Ok(())
    }

    /// G
    pub fn set_stroke_gray(&mut self, gray: f64) -> Result<(), PlatenError> {
        check_color_component(gray)?;
        let _ = writeln!(self.commands, "{} G", fmt_num(gray));
        Ok(())
    }

    /// g
    pub fn set_fill_gray(&mut self, gray: f64) -> Result<(), PlatenError> {
        check_color_component(gray)?;
        let _ = writeln!(self.commands, "{} g", fmt_num(gray));
        Ok(())
    }

    /// K
    pub fn set_stroke_cmyk(&mut self, c: f64, m: f64, y: f64, k: f64) -> Result<(), PlatenError> {
        for v in [c, m, y, k] {
            check_color_component(v)?;
        }
        let _ = writeln!(
            self.commands,
            "{} {} {} {} K",
            fmt_num(c),
            fmt_num(m),
            fmt_num(y),
            fmt_num(k)
        );
        Ok(())
    }

    /// k
    pub fn set_fill_cmyk(&mut self, c: f64, m: f64, y: f64, k: f64) -> Result<(), PlatenError> {
        for v in [c, m, y, k] {
            check_color_component(v)?;
        }
        let _ = writeln!(
            self.commands,
            "{} {} {} {} k",
            fmt_num(c),
            fmt_num(m),
            fmt_num(y),
            fmt_num(k)
        );
        Ok(())
    }

    fn select_stroke_space(&mut self, name: &str) {
        let _ = writeln!(self.commands, "{} CS", name);
    }

    fn select_fill_space(&mut self, name: &str) {
        let _ = writeln!(self.commands, "{} cs", name);
    }

    fn stroke_scn(&mut self, value: f64) {
        let _ = writeln!(self.commands, "{} SCN", fmt_num(value));
    }

    fn fill_scn(&mut self, value: f64) {
        let _ = writeln!(self.commands, "{} scn", fmt_num(value));
    }

    // ----- color selection with document space conversion -----

    pub fn set_stroke_color_rgb(&mut self, color: &DeviceRgb) -> Result<(), PlatenError> {
        match self.doc.options().output_colorspace {
            OutputColorspace::Rgb => self.set_stroke_rgb(color.r.v(), color.g.v(), color.b.v()),
            OutputColorspace::Gray => {
                let gray = self.doc.converter().to_gray(color);
                self.set_stroke_gray(gray.v.v())
            }
            OutputColorspace::Cmyk => {
                let cmyk = self.doc.converter().to_cmyk(color);
                self.set_stroke_cmyk(cmyk.c.v(), cmyk.m.v(), cmyk.y.v(), cmyk.k.v())
            }
        }
    }

    pub fn set_nonstroke_color_rgb(&mut self, color: &DeviceRgb) -> Result<(), PlatenError> {
        match self.doc.options().output_colorspace {
            OutputColorspace::Rgb => self.set_fill_rgb(color.r.v(), color.g.v(), color.b.v()),
            OutputColorspace::Gray => {
                let gray = self.doc.converter().to_gray(color);
                self.set_fill_gray(gray.v.v())
            }
            OutputColorspace::Cmyk => {
                let cmyk = self.doc.converter().to_cmyk(color);
                self.set_fill_cmyk(cmyk.c.v(), cmyk.m.v(), cmyk.y.v(), cmyk.k.v())
            }
        }
    }

    // Switching to gray is assumed to be acceptable in any output space.
    pub fn set_stroke_color_gray(&mut self, color: &DeviceGray) -> Result<(), PlatenError> {
        self.set_stroke_gray(color.v.v())
    }

    pub fn set_nonstroke_color_gray(&mut self, color: &DeviceGray) -> Result<(), PlatenError> {
        self.set_fill_gray(color.v.v())
    }

    pub fn set_stroke_color_cmyk(&mut self, color: &DeviceCmyk) -> Result<(), PlatenError> {
        match self.doc.options().output_colorspace {
            OutputColorspace::Cmyk => {
                self.set_stroke_cmyk(color.c.v(), color.m.v(), color.y.v(), color.k.v())
            }
            OutputColorspace::Rgb => {
                let rgb = self.doc.converter().cmyk_to_rgb(color);
                self.set_stroke_rgb(rgb.r.v(), rgb.g.v(), rgb.b.v())
            }
            OutputColorspace::Gray => {
                let rgb = self.doc.converter().cmyk_to_rgb(color);
                let gray = self.doc.converter().to_gray(&rgb);
                self.set_stroke_gray(gray.v.v())
            }
        }
    }

    pub fn set_nonstroke_color_cmyk(&mut self, color: &DeviceCmyk) -> Result<(), PlatenError> {
        match self.doc.options().output_colorspace {
            OutputColorspace::Cmyk => {
                self.set_fill_cmyk(color.c.v(), color.m.v(), color.y.v(), color.k.v())
            }
            OutputColorspace::Rgb => {
                let rgb = self.doc.converter().cmyk_to_rgb(color);
                self.set_fill_rgb(rgb.r.v(), rgb.g.v(), rgb.b.v())
            }
            OutputColorspace::Gray => {
                let rgb = self.doc.converter().cmyk_to_rgb(color);
                let gray = self.doc.converter().to_gray(&rgb);
                self.set_fill_gray(gray.v.v())
            }
        }
    }

    pub fn set_separation_stroke_color(
        &mut self,
        id: SeparationId,
        value: LimitDouble,
    ) -> Result<(), PlatenError> {
        let obj = self.doc.separation_object_number(id)?;
        self.used_colorspaces.insert(obj);
        self.select_stroke_space(&format!("/CSpace{}", obj));
        self.stroke_scn(value.v());
        Ok(())
    }

    pub fn set_separation_nonstroke_color(
        &mut self,
        id: SeparationId,
        value: LimitDouble,
    ) -> Result<(), PlatenError> {
        let obj = self.doc.separation_object_number(id)?;
        self.used_colorspaces.insert(obj);
        self.select_fill_space(&format!("/CSpace{}", obj));
        self.fill_scn(value.v());
        Ok(())
    }

    pub fn set_stroke_color_icc(
        &mut self,
        id: IccColorId,
        values: &[f64],
    ) -> Result<(), PlatenError> {
        let (obj, channels) = self.doc.icc_space(id)?;
        if values.len() != channels as usize {
            return Err(PlatenError::IncorrectColorChannelCount);
        }
        self.used_colorspaces.insert(obj);
        self.select_stroke_space(&format!("/CSpace{}", obj));
        for v in values {
            let _ = write!(self.commands, "{} ", fmt_num(*v));
        }
        self.commands.push_str("SCN\n");
        Ok(())
    }

    pub fn set_nonstroke_color_icc(
        &mut self,
        id: IccColorId,
        values: &[f64],
    ) -> Result<(), PlatenError> {
        let (obj, channels) = self.doc.icc_space(id)?;
        if values.len() != channels as usize {
            return Err(PlatenError::IncorrectColorChannelCount);
        }
        self.used_colorspaces.insert(obj);
        self.select_fill_space(&format!("/CSpace{}", obj));
        for v in values {
            let _ = write!(self.commands, "{} ", fmt_num(*v));
        }
        self.commands.push_str("scn\n");
        Ok(())
    }

    pub fn set_stroke_color_lab(&mut self, color: &LabColor) -> Result<(), PlatenError> {
        let obj = self.doc.lab_object_number(color.space)?;
        self.used_colorspaces.insert(obj);
        self.select_stroke_space(&format!("/CSpace{}", obj));
        let _ = writeln!(
            self.commands,
            "{} {} {} SCN",
            fmt_num(color.l),
            fmt_num(color.a),
            fmt_num(color.b)
        );
        Ok(())
    }

    pub fn set_nonstroke_color_lab(&mut self, color: &LabColor) -> Result<(), PlatenError> {
        let obj = self.doc.lab_object_number(color.space)?;
        self.used_colorspaces.insert(obj);
        self.select_fill_space(&format!("/CSpace{}", obj));
        let _ = writeln!(
            self.commands,
            "{} {} {} scn",
            fmt_num(color.l),
            fmt_num(color.a),
            fmt_num(color.b)
        );
        Ok(())
    }

    pub fn set_nonstroke_pattern(&mut self, id: PatternId) -> Result<(), PlatenError> {
        if self.kind != ContextKind::Page {
            return Err(PlatenError::PatternNotAccepted);
        }
        let obj = self.doc.pattern_object_number(id)?;
        self.used_patterns.insert(obj);
        self.select_fill_space("/Pattern");
        let _ = writeln!(self.commands, "/Pattern-{} scn", obj);
        Ok(())
    }

    /// Strokes with the all-ink separation at full strength. Only
    /// meaningful when the document registered a separation, which CMYK
    /// documents always do.
    pub fn set_all_stroke_color(&mut self) -> Result<(), PlatenError> {
        if self.doc.first_separation_object().is_none() {
            return Err(PlatenError::BadId);
        }
        self.uses_all_separation = true;
        self.select_stroke_space("/All");
        self.stroke_scn(1.0);
        Ok(())
    }

    // ----- external resources -----

    pub fn draw_image(&mut self, image: ImageId) -> Result<(), PlatenError> {
        let obj = self.doc.image_object_number(image)?;
        self.used_images.insert(obj);
        let _ = writeln!(self.commands, "/Image{} Do", obj);
        Ok(())
    }

    pub fn draw_form_xobject(&mut self, form: FormXObjectId) -> Result<(), PlatenError> {
        let obj = self.doc.form_xobject_object_number(form)?;
        self.used_form_xobjects.insert(obj);
        let _ = writeln!(self.commands, "/FXO{} Do", obj);
        Ok(())
    }

    pub fn set_graphics_state(&mut self, gstate: GstateId) -> Result<(), PlatenError> {
        let obj = self.doc.gstate_object_number(gstate)?;
        self.used_gstates.insert(obj);
        let _ = writeln!(self.commands, "/GS{} gs", obj);
        Ok(())
    }

    pub fn paint_shading(&mut self, shading: ShadingId) -> Result<(), PlatenError> {
        let obj = self.doc.shading_object_number(shading)?;
        self.used_shadings.insert(obj);
        let _ = writeln!(self.commands, "/SH{} sh", obj);
        Ok(())
    }

    // ----- marked content -----

    pub fn begin_marked_content(&mut self, tag: &str) {
        let _ = writeln!(self.commands, "/{} BMC", escape_pdf_name(tag));
        self.marked_depth += 1;
    }

    pub fn begin_optional_content(&mut self, ocg: OcgId) -> Result<(), PlatenError> {
        let obj = self.doc.ocg_object_number(ocg)?;
        self.used_ocgs.insert(obj);
        let _ = writeln!(self.commands, "/OC /oc{} BDC", obj);
        self.marked_depth += 1;
        Ok(())
    }

    /// Opens a structure item with a fresh marked content id. The
    /// element lands in the document's structure tree at finalization.
    pub fn begin_tagged_content(&mut self, role: &str) {
        let mcid = self.next_mcid;
        self.next_mcid += 1;
        let _ = writeln!(
            self.commands,
            "/{} << /MCID {} >> BDC",
            escape_pdf_name(role),
            mcid
        );
        self.struct_items.push(StructItem {
            role: role.to_string(),
            mcid,
        });
        self.marked_depth += 1;
    }

    pub fn end_marked_content(&mut self) -> Result<(), PlatenError> {
        if self.marked_depth == 0 {
            return Err(PlatenError::MarkedContentEndMismatch);
        }
        self.commands.push_str("EMC\n");
        self.marked_depth -= 1;
        Ok(())
    }

    // ----- page attributes -----

    pub fn annotate(&mut self, annotation: AnnotationId) -> Result<(), PlatenError> {
        if self.kind != ContextKind::Page {
            return Err(PlatenError::InvalidContextType);
        }
        let obj = self.doc.annotation_object_number(annotation)?;
        self.annotations.push(obj);
        Ok(())
    }

    pub fn set_page_transition(&mut self, transition: PageTransition) -> Result<(), PlatenError> {
        if self.kind != ContextKind::Page {
            return Err(PlatenError::InvalidContextType);
        }
        self.transition = Some(transition);
        Ok(())
    }

    // ----- text rendering -----

    /// Draws 7-bit ASCII with one of the built in Type 1 fonts. Bytes
    /// outside ASCII are replaced with spaces.
    pub fn render_ascii_text_builtin(
        &mut self,
        text: &str,
        font: BuiltinFont,
        pointsize: f64,
        x: f64,
        y: f64,
    ) {
        let font_obj = self.doc.builtin_font_object(font);
        self.used_fonts.insert(font_obj);
        let mut cleaned = String::with_capacity(text.len());
        for byte in text.bytes() {
            match byte {
                b'(' => cleaned.push_str("\\("),
                b')' => cleaned.push_str("\\)"),
                b'\\' => cleaned.push_str("\\\\"),
                0x80.. => cleaned.push(' '),
                _ => cleaned.push(byte as char),
            }
        }
        let _ = write!(
            self.commands,
            "BT\n  /Font{} {} Tf\n  {} {} Td\n  ({}) Tj\nET\n",
            font_obj,
            fmt_num(pointsize),
            fmt_num(x),
            fmt_num(y),
            cleaned
        );
    }

    /// Draws one glyph by its byte value, bypassing the subset mapping.
    /// A debugging aid and an escape hatch for custom layout.
    pub fn render_raw_glyph(
        &mut self,
        glyph: u8,
        font: FontId,
        pointsize: f64,
        x: f64,
        y: f64,
    ) -> Result<(), PlatenError> {
        let font_obj = self.doc.font_object_number(font)?;
        self.used_fonts.insert(font_obj);
        let _ = write!(
            self.commands,
            "BT\n  /Font{} {} Tf\n  {} {} Td\n  (\\{:03o}) Tj\nET\n",
            font_obj,
            fmt_num(pointsize),
            fmt_num(x),
            fmt_num(y),
            glyph
        );
        Ok(())
    }

    /// Draws a UTF-8 string at a baseline origin. Codepoints are mapped
    /// through the font's subset tables, switching subsets inside the
    /// text object as needed, with pairwise kerning values spliced into
    /// the TJ array.
    pub fn render_utf8_text(
        &mut self,
        text: &str,
        font: FontId,
        pointsize: f64,
        x: f64,
        y: f64,
    ) -> Result<(), PlatenError> {
        self.doc.font(font)?;
        if text.is_empty() {
            return Ok(());
        }
        let font_obj = self.doc.font_object_number(font)?;
        let mut out = String::new();
        let mut previous_subset: Option<FontSubset> = None;
        let mut previous_codepoint: Option<u32> = None;
        for c in text.chars() {
            let codepoint = c as u32;
            let glyph = self.doc.get_subset_glyph(font, codepoint)?;
            self.used_subset_fonts.insert(glyph.subset);
            match previous_subset {
                None => {
                    let _ = write!(
                        out,
                        "BT\n  /SFont{}-{} {} Tf\n  {} {} Td\n  [ <",
                        font_obj,
                        glyph.subset.subset,
                        fmt_num(pointsize),
                        fmt_num(x),
                        fmt_num(y)
                    );
                }
                Some(previous) if previous != glyph.subset => {
                    let _ = write!(
                        out,
                        "> ] TJ\n  /SFont{}-{} {} Tf\n  [ <",
                        font_obj,
                        glyph.subset.subset,
                        fmt_num(pointsize)
                    );
                }
                _ => {}
            }
            previous_subset = Some(glyph.subset);
            if let Some(previous) = previous_codepoint {
                if let Some(kern) = self.doc.font(font)?.kerning(previous, codepoint) {
                    let _ = write!(out, "> {} <", kern);
                }
            }
            let _ = write!(out, "{:02x}", glyph.glyph_byte);
            previous_codepoint = Some(codepoint);
        }
        out.push_str("> ] TJ\nET\n");
        self.commands.push_str(&out);
        Ok(())
    }

    /// Draws caller positioned glyphs, one Td/Tj pair per glyph.
    pub fn render_glyphs(
        &mut self,
        glyphs: &[PdfGlyph],
        font: FontId,
        pointsize: f64,
    ) -> Result<(), PlatenError> {
        if glyphs.is_empty() {
            return Ok(());
        }
        let font_obj = self.doc.font_object_number(font)?;
        let mut out = String::from("BT\n");
        let mut current_subset: Option<FontSubset> = None;
        let mut previous = (0.0, 0.0);
        for glyph in glyphs {
            let subset_glyph = self.doc.get_subset_glyph(font, glyph.codepoint)?;
            self.used_subset_fonts.insert(subset_glyph.subset);
            if current_subset != Some(subset_glyph.subset) {
                let _ = writeln!(
                    out,
                    "  /SFont{}-{} {} Tf",
                    font_obj,
                    subset_glyph.subset.subset,
                    fmt_num(pointsize)
                );
                current_subset = Some(subset_glyph.subset);
            }
            let _ = writeln!(
                out,
                "  {} {} Td",
                fmt_num(glyph.x - previous.0),
                fmt_num(glyph.y - previous.1)
            );
            previous = (glyph.x, glyph.y);
            let _ = writeln!(out, "  <{:02x}> Tj", subset_glyph.glyph_byte);
        }
        out.push_str("ET\n");
        self.commands.push_str(&out);
        Ok(())
    }

    /// Renders a structured text object as one BT..ET block.
    pub fn render_text(&mut self, text: &PdfText) -> Result<(), PlatenError> {
        let mut out = String::from("BT\n");
        let mut font_state: Option<(FontId, f64)> = None;
        let mut current_subset: Option<FontSubset> = None;
        for event in text.events() {
            match event {
                TextEvent::CharSpacing(v) => {
                    let _ = writeln!(out, "  {} Tc", fmt_num(*v));
                }
                TextEvent::WordSpacing(v) => {
                    let _ = writeln!(out, "  {} Tw", fmt_num(*v));
                }
                TextEvent::HorizontalScaling(v) => {
                    let _ = writeln!(out, "  {} Tz", fmt_num(*v));
                }
                TextEvent::Leading(v) => {
                    let _ = writeln!(out, "  {} TL", fmt_num(*v));
                }
                TextEvent::Rise(v) => {
                    let _ = writeln!(out, "  {} Ts", fmt_num(*v));
                }
                TextEvent::RenderMode(mode) => {
                    let _ = writeln!(out, "  {} Tr", *mode as i32);
                }
                TextEvent::Font { font, size } => {
                    self.doc.font(*font)?;
                    font_state = Some((*font, *size));
                    current_subset = None;
                }
                TextEvent::Translate { tx, ty } => {
                    let _ = writeln!(out, "  {} {} Td", fmt_num(*tx), fmt_num(*ty));
                }
                TextEvent::TranslateAndSetLeading { tx, ty } => {
                    let _ = writeln!(out, "  {} {} TD", fmt_num(*tx), fmt_num(*ty));
                }
                TextEvent::Matrix(m) => {
                    let _ = writeln!(
                        out,
                        "  {} {} {} {} {} {} Tm",
                        fmt_num(m[0]),
                        fmt_num(m[1]),
                        fmt_num(m[2]),
                        fmt_num(m[3]),
                        fmt_num(m[4]),
                        fmt_num(m[5])
                    );
                }
                TextEvent::NextLine => {
                    out.push_str("  T*\n");
                }
                TextEvent::Unicode(utf8) => {
                    let (font, size) = font_state.ok_or(PlatenError::FontNotSet)?;
                    let items = self.kerned_items(utf8, font)?;
                    self.serialize_charsequence(&mut out, &items, font, size, &mut current_subset)?;
                }
                TextEvent::Kerned(items) => {
                    let (font, size) = font_state.ok_or(PlatenError::FontNotSet)?;
                    self.serialize_charsequence(&mut out, items, font, size, &mut current_subset)?;
                }
            }
        }
        out.push_str("ET\n");
        self.commands.push_str(&out);
        Ok(())
    }

    fn kerned_items(&self, utf8: &str, font: FontId) -> Result<Vec<CharItem>, PlatenError> {
        let loaded = self.doc.font(font)?;
        let mut items = Vec::new();
        let mut previous: Option<u32> = None;
        for c in utf8.chars() {
            let codepoint = c as u32;
            if let Some(previous) = previous {
                if let Some(kern) = loaded.kerning(previous, codepoint) {
                    items.push(CharItem::Kern(kern));
                }
            }
            items.push(CharItem::Codepoint(codepoint));
            previous = Some(codepoint);
        }
        Ok(items)
    }

    fn serialize_charsequence(
        &mut self,
        out: &mut String,
        items: &[CharItem],
        font: FontId,
        size: f64,
        current_subset: &mut Option<FontSubset>,
    ) -> Result<(), PlatenError> {
        let font_obj = self.doc.font_object_number(font)?;
        let mut open = false;
        for item in items {
            match item {
                CharItem::Kern(v) => {
                    if !open {
                        out.push_str("  [ ");
                        open = true;
                    }
                    let _ = write!(out, "{} ", v);
                }
                CharItem::Codepoint(codepoint) => {
                    let glyph = self.doc.get_subset_glyph(font, *codepoint)?;
                    self.used_subset_fonts.insert(glyph.subset);
                    if *current_subset != Some(glyph.subset) {
                        if open {
                            out.push_str("] TJ\n");
                            open = false;
                        }
                        let _ = writeln!(
                            out,
                            "  /SFont{}-{} {} Tf",
                            font_obj,
                            glyph.subset.subset,
                            fmt_num(size)
                        );
                        *current_subset = Some(glyph.subset);
                    }
                    if !open {
                        out.push_str("  [ ");
                        open = true;
                    }
                    let _ = write!(out, "<{:02x}> ", glyph.glyph_byte);
                }
            }
        }
        if open {
            out.push_str("] TJ\n");
        }
        Ok(())
    }

    // ----- finalization -----

    fn build_resource_dict(&self) -> Result<String, PlatenError> {
        let mut resources = String::from("<<\n");
        if !self.used_images.is_empty() || !self.used_form_xobjects.is_empty() {
            resources.push_str("  /XObject <<\n");
            for obj in &self.used_images {
                let _ = writeln!(resources, "    /Image{} {} 0 R", obj, obj);
            }
            for obj in &self.used_form_xobjects {
                let _ = writeln!(resources, "    /FXO{} {} 0 R", obj, obj);
            }
            resources.push_str("  >>\n");
        }
        if !self.used_fonts.is_empty() || !self.used_subset_fonts.is_empty() {
            resources.push_str("  /Font <<\n");
            for obj in &self.used_fonts {
                let _ = writeln!(resources, "    /Font{} {} 0 R", obj, obj);
            }
            for subset in &self.used_subset_fonts {
                let font_obj = self.doc.font_object_number(subset.font)?;
                let subset_obj = self.doc.subset_font_object_number(*subset)?;
                let _ = writeln!(
                    resources,
                    "    /SFont{}-{} {} 0 R",
                    font_obj, subset.subset, subset_obj
                );
            }
            resources.push_str("  >>\n");
        }
        if self.uses_all_separation || !self.used_colorspaces.is_empty() {
            resources.push_str("  /ColorSpace <<\n");
            if self.uses_all_separation {
                let first = self
                    .doc
                    .first_separation_object()
                    .ok_or(PlatenError::BadId)?;
                let _ = writeln!(resources, "    /All {} 0 R", first);
            }
            for obj in &self.used_colorspaces {
                let _ = writeln!(resources, "    /CSpace{} {} 0 R", obj, obj);
            }
            resources.push_str("  >>\n");
        }
        if !self.used_gstates.is_empty() {
            resources.push_str("  /ExtGState <<\n");
            for obj in &self.used_gstates {
                let _ = writeln!(resources, "    /GS{} {} 0 R", obj, obj);
            }
            resources.push_str("  >>\n");
        }
        if !self.used_shadings.is_empty() {
            resources.push_str("  /Shading <<\n");
            for obj in &self.used_shadings {
                let _ = writeln!(resources, "    /SH{} {} 0 R", obj, obj);
            }
            resources.push_str("  >>\n");
        }
        if !self.used_patterns.is_empty() {
            resources.push_str("  /Pattern <<\n");
            for obj in &self.used_patterns {
                let _ = writeln!(resources, "    /Pattern-{} {} 0 R", obj, obj);
            }
            resources.push_str("  >>\n");
        }
        if !self.used_ocgs.is_empty() {
            resources.push_str("  /Properties <<\n");
            for obj in &self.used_ocgs {
                let _ = writeln!(resources, "    /oc{} {} 0 R", obj, obj);
            }
            resources.push_str("  >>\n");
        }
        resources.push_str(">>\n");
        Ok(resources)
    }

    /// Finalizes a page context: the resource dictionary and content
    /// stream become two indirect objects and the page is queued for
    /// the page tree.
    pub fn finish_page(self) -> Result<PageId, PlatenError> {
        if self.kind != ContextKind::Page {
            return Err(PlatenError::InvalidContextType);
        }
        if self.marked_depth != 0 {
            return Err(PlatenError::UnclosedMarkedContent);
        }
        let resources = self.build_resource_dict()?;
        let DrawContext {
            doc,
            commands,
            annotations,
            transition,
            struct_items,
            ..
        } = self;
        Ok(doc.add_page(resources, commands, annotations, transition, struct_items))
    }

    pub fn finish_form_xobject(self) -> Result<FormXObjectId, PlatenError> {
        let ContextKind::FormXObject { w, h } = self.kind else {
            return Err(PlatenError::InvalidContextType);
        };
        if self.marked_depth != 0 {
            return Err(PlatenError::UnclosedMarkedContent);
        }
        let resources = self.build_resource_dict()?;
        let dict = format!(
            "<<\n  /Type /XObject\n  /Subtype /Form\n  /BBox [ 0 0 {} {} ]\n  /Resources {}  /Length {}\n>>\n",
            fmt_num(w),
            fmt_num(h),
            resources,
            self.commands.len()
        );
        let DrawContext { doc, commands, .. } = self;
        Ok(doc.add_form_xobject(dict, commands))
    }

    pub fn finish_pattern(self) -> Result<PatternId, PlatenError> {
        let ContextKind::TilingPattern { w, h } = self.kind else {
            return Err(PlatenError::InvalidContextType);
        };
        if self.marked_depth != 0 {
            return Err(PlatenError::UnclosedMarkedContent);
        }
        let resources = self.build_resource_dict()?;
        let dict = format!(
            "<<\n  /Type /Pattern\n  /PatternType 1\n  /PaintType 1\n  /TilingType 1\n  /BBox [ 0 0 {} {} ]\n  /XStep {}\n  /YStep {}\n  /Resources {}  /Length {}\n>>\n",
            fmt_num(w),
            fmt_num(h),
            fmt_num(w),
            fmt_num(h),
            resources,
            self.commands.len()
        );
        let DrawContext { doc, commands, .. } = self;
        Ok(doc.add_pattern(dict, commands))
    }
}

impl<W: Write> PdfDocument<W> {
    pub fn page_context(&mut self) -> DrawContext<'_, W> {
        DrawContext::new(self, ContextKind::Page)
    }

    /// A page context that finalizes itself on scope exit. Drop path
    /// failures are logged instead of propagated.
    pub fn guarded_page_context(&mut self) -> PageGuard<'_, W> {
        PageGuard::new(DrawContext::new(self, ContextKind::Page))
    }

    pub fn form_xobject_context(&mut self, w: f64, h: f64) -> DrawContext<'_, W> {
        DrawContext::new(self, ContextKind::FormXObject { w, h })
    }

    pub fn pattern_context(&mut self, w: f64, h: f64) -> DrawContext<'_, W> {
        DrawContext::new(self, ContextKind::TilingPattern { w, h })
    }
}

/// Emits the matching Q when the scope ends, including early returns.
pub struct GstateGuard<'b, 'a, W: Write> {
    ctx: &'b mut DrawContext<'a, W>,
}

impl<W: Write> Drop for GstateGuard<'_, '_, W> {
    fn drop(&mut self) {
        self.ctx.restore_state();
    }
}

impl<'b, 'a, W: Write> Deref for GstateGuard<'b, 'a, W> {
    type Target = DrawContext<'a, W>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<W: Write> DerefMut for GstateGuard<'_, '_, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

/// Wraps a page context and finalizes it on scope exit if the caller
/// did not. Failures on the drop path are logged, not propagated.
pub struct PageGuard<'a, W: Write> {
    ctx: Option<DrawContext<'a, W>>,
}

impl<'a, W: Write> PageGuard<'a, W> {
    pub(crate) fn new(ctx: DrawContext<'a, W>) -> Self {
        Self { ctx: Some(ctx) }
    }

    pub fn finish(mut self) -> Result<PageId, PlatenError> {
        match self.ctx.take() {
            Some(ctx) => ctx.finish_page(),
            None => Err(PlatenError::DoubleFinalize),
        }
    }
}

impl<W: Write> Drop for PageGuard<'_, W> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            if let Err(err) = ctx.finish_page() {
                log::warn!("page finalization failed: {}", err);
            }
        }
    }
}

impl<'a, W: Write> Deref for PageGuard<'a, W> {
    type Target = DrawContext<'a, W>;

    fn deref(&self) -> &Self::Target {
        self.ctx.as_ref().expect("page context already finished")
    }
}

impl<'a, W: Write> DerefMut for PageGuard<'a, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx.as_mut().expect("page context already finished")
    }
}

fn check_color_component(value: f64) -> Result<(), PlatenError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(PlatenError::ColorOutOfRange);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PdfDocument;
    use crate::fontsub::LoadedFont;
    use crate::types::{DocumentOptions, PdfBox};

    fn test_doc() -> PdfDocument<Vec<u8>> {
        PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap()
    }

    #[test]
    fn stroked_line_operators() {
        let mut doc = test_doc();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        ctx.set_line_width(10.0).unwrap();
        ctx.set_stroke_rgb(1.0, 0.0, 0.0).unwrap();
        ctx.move_to(0.0, 0.0);
        ctx.line_to(100.0, 100.0);
        ctx.stroke();
        assert!(ctx
            .command_bytes()
            .contains("1 0 0 RG\n0 0 m\n100 100 l\nS\n"));
        assert!(ctx.command_bytes().starts_with("10 w\n"));
    }

    #[test]
    fn rotation_by_ninety_degrees_is_exact() {
        let mut doc = test_doc();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        ctx.rotate(std::f64::consts::FRAC_PI_2).unwrap();
        assert_eq!(ctx.command_bytes(), "0 1 -1 0 0 0 cm\n");
    }

    #[test]
    fn degenerate_matrix_is_rejected() {
        let mut doc = test_doc();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        assert!(matches!(
            ctx.concat_matrix(0.0, 0.0, 0.0, 0.0, 5.0, 5.0),
            Err(PlatenError::DegenerateMatrix)
        ));
        assert!(ctx.command_bytes().is_empty());
    }

    #[test]
    fn parameter_validation() {
        let mut doc = test_doc();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        assert!(matches!(
            ctx.set_fill_rgb(1.5, 0.0, 0.0),
            Err(PlatenError::ColorOutOfRange)
        ));
        assert!(matches!(
            ctx.set_line_width(-1.0),
            Err(PlatenError::NegativeLineWidth)
        ));
        assert!(matches!(
            ctx.set_dash(&[], 0.0),
            Err(PlatenError::ZeroLengthArray)
        ));
        assert!(matches!(
            ctx.set_dash(&[1.0, -2.0], 0.0),
            Err(PlatenError::NegativeDash)
        ));
        assert!(matches!(
            ctx.set_flatness(150.0),
            Err(PlatenError::InvalidFlatness)
        ));
    }

    #[test]
    fn state_scope_restores_on_every_exit() {
        let mut doc = test_doc();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        {
            let mut scope = ctx.state_scope();
            scope.rect(0.0, 0.0, 10.0, 10.0);
            scope.fill();
        }
        assert_eq!(ctx.command_bytes(), "q\n0 0 10 10 re\nf\nQ\n");
    }

    #[test]
    fn nonstroke_rgb_converts_to_document_space() {
        let mut opts = DocumentOptions::default();
        opts.output_colorspace = crate::types::OutputColorspace::Gray;
        let mut doc = PdfDocument::from_writer(Vec::new(), opts).unwrap();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        ctx.set_nonstroke_color_rgb(&DeviceRgb::new(1.0, 1.0, 1.0))
            .unwrap();
        assert_eq!(ctx.command_bytes(), "1 g\n");
    }

    #[test]
    fn separation_fill_records_colorspace() {
        let mut doc = test_doc();
        let sep = doc
            .create_separation("Gold", &DeviceCmyk::new(0.0, 0.2, 1.0, 0.0))
            .unwrap();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        ctx.set_separation_nonstroke_color(sep, LimitDouble::new(1.0))
            .unwrap();
        ctx.rect(10.0, 10.0, 50.0, 50.0);
        ctx.fill();
        let commands = ctx.command_bytes().to_string();
        let resources = ctx.build_resource_dict().unwrap();
        assert!(commands.contains(" cs\n1 scn\n"));
        let obj = doc.separation_object_number(sep).unwrap();
        assert!(commands.contains(&format!("/CSpace{} cs", obj)));
        assert!(resources.contains(&format!("/CSpace{} {} 0 R", obj, obj)));
    }

    #[test]
    fn all_separation_requires_a_registered_separation() {
        let mut doc = test_doc();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        assert!(matches!(
            ctx.set_all_stroke_color(),
            Err(PlatenError::BadId)
        ));

        let mut opts = DocumentOptions::default();
        opts.output_colorspace = crate::types::OutputColorspace::Cmyk;
        let mut cmyk_doc = PdfDocument::from_writer(Vec::new(), opts).unwrap();
        let mut ctx = DrawContext::new(&mut cmyk_doc, ContextKind::Page);
        ctx.set_all_stroke_color().unwrap();
        assert!(ctx.command_bytes().contains("/All CS\n1 SCN\n"));
        let resources = ctx.build_resource_dict().unwrap();
        assert!(resources.contains("/All "));
    }

    #[test]
    fn builtin_text_escapes_and_replaces_high_bytes() {
        let mut doc = test_doc();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        ctx.render_ascii_text_builtin("a(b)\\c\u{e4}", BuiltinFont::Helvetica, 12.0, 5.0, 5.0);
        let commands = ctx.command_bytes();
        // The non-ASCII a-umlaut is two UTF-8 bytes, each becoming a space.
        assert!(commands.contains("(a\\(b\\)\\\\c  ) Tj"));
        assert!(commands.contains("BT\n"));
        assert!(commands.contains("ET\n"));
        let resources = ctx.build_resource_dict().unwrap();
        assert!(resources.contains("/Font <<"));
    }

    #[test]
    fn kerned_utf8_text_splits_the_tj_array() {
        let mut doc = test_doc();
        let font = doc.register_synthetic_font(LoadedFont::synthetic(&[
            ('A' as u32, 36),
            ('f' as u32, 71),
        ]));
        doc.register_kerning_pair(font, 'A' as u32, 'f' as u32, -50);
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        ctx.render_utf8_text("Af", font, 12.0, 10.0, 100.0).unwrap();
        let commands = ctx.command_bytes();
        assert!(commands.contains("[ <41> -50 <66> ] TJ"), "{}", commands);
        assert!(commands.contains("12 Tf"));
        assert!(commands.contains("10 100 Td"));
        assert_eq!(commands.matches("BT").count(), 1);
        assert_eq!(commands.matches("ET").count(), 1);
    }

    #[test]
    fn utf8_hex_pairs_match_scalar_count() {
        let mut doc = test_doc();
        let font = doc.register_synthetic_font(LoadedFont::synthetic(&[
            ('h' as u32, 1),
            ('i' as u32, 2),
            (0x4E2D, 3),
        ]));
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        let text = "hi\u{4e2d}";
        ctx.render_utf8_text(text, font, 10.0, 0.0, 0.0).unwrap();
        let commands = ctx.command_bytes();
        let hex_digits: usize = commands
            .split('<')
            .skip(1)
            .map(|run| run.chars().take_while(|c| c.is_ascii_hexdigit()).count())
            .sum();
        assert_eq!(hex_digits / 2, text.chars().count());
    }

    #[test]
    fn marked_content_must_balance() {
        let mut doc = test_doc();
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        assert!(matches!(
            ctx.end_marked_content(),
            Err(PlatenError::MarkedContentEndMismatch)
        ));
        ctx.begin_marked_content("Artifact");
        assert!(matches!(
            ctx.finish_page(),
            Err(PlatenError::UnclosedMarkedContent)
        ));
    }

    #[test]
    fn patterns_rejected_outside_page_contexts() {
        let mut doc = test_doc();
        let mut pattern_ctx =
            DrawContext::new(&mut doc, ContextKind::TilingPattern { w: 4.0, h: 4.0 });
        pattern_ctx.set_fill_rgb(0.0, 1.0, 0.0).unwrap();
        pattern_ctx.rect(0.0, 0.0, 2.0, 2.0);
        pattern_ctx.fill();
        let pattern = pattern_ctx.finish_pattern().unwrap();

        let mut form_ctx =
            DrawContext::new(&mut doc, ContextKind::FormXObject { w: 10.0, h: 10.0 });
        assert!(matches!(
            form_ctx.set_nonstroke_pattern(pattern),
            Err(PlatenError::PatternNotAccepted)
        ));
        drop(form_ctx);

        let mut page_ctx = DrawContext::new(&mut doc, ContextKind::Page);
        page_ctx.set_nonstroke_pattern(pattern).unwrap();
        assert!(page_ctx.command_bytes().contains("/Pattern cs\n"));
        assert!(page_ctx.command_bytes().contains(" scn\n"));
    }

    #[test]
    fn empty_page_has_empty_resource_dict() {
        let mut doc = test_doc();
        let ctx = DrawContext::new(&mut doc, ContextKind::Page);
        let resources = ctx.build_resource_dict().unwrap();
        assert_eq!(resources, "<<\n>>\n");
    }

    #[test]
    fn finish_page_rejects_other_context_kinds() {
        let mut doc = test_doc();
        let ctx = DrawContext::new(&mut doc, ContextKind::FormXObject { w: 1.0, h: 1.0 });
        assert!(matches!(
            ctx.finish_page(),
            Err(PlatenError::InvalidContextType)
        ));
    }

    #[test]
    fn annotations_attach_to_pages_only() {
        let mut doc = test_doc();
        let annotation = doc.add_annotation(&crate::types::Annotation::Text {
            rect: PdfBox::new(0.0, 0.0, 10.0, 10.0),
            contents: "note".to_string(),
        });
        let mut form_ctx = DrawContext::new(&mut doc, ContextKind::FormXObject { w: 1.0, h: 1.0 });
        assert!(matches!(
            form_ctx.annotate(annotation),
            Err(PlatenError::InvalidContextType)
        ));
        drop(form_ctx);
        let mut page_ctx = DrawContext::new(&mut doc, ContextKind::Page);
        page_ctx.annotate(annotation).unwrap();
        page_ctx.finish_page().unwrap();
    }

    #[test]
    fn structured_text_object_serializes_state_operators() {
        let mut doc = test_doc();
        let font = doc.register_synthetic_font(LoadedFont::synthetic(&[
            ('a' as u32, 5),
            ('b' as u32, 6),
        ]));
        let mut text = PdfText::new();
        text.font(font, 14.0)
            .leading(16.0)
            .translate(72.0, 700.0)
            .text("ab")
            .next_line()
            .kerned_sequence(vec![
                CharItem::Codepoint('b' as u32),
                CharItem::Kern(120),
                CharItem::Codepoint('a' as u32),
            ]);
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        ctx.render_text(&text).unwrap();
        let commands = ctx.command_bytes();
        assert!(commands.starts_with("BT\n"));
        assert!(commands.ends_with("ET\n"));
        assert!(commands.contains("  16 TL\n"));
        assert!(commands.contains("  72 700 Td\n"));
        assert!(commands.contains("  T*\n"));
        assert!(commands.contains("<61> <62> "));
        assert!(commands.contains("<62> 120 <61> "));
    }

    #[test]
    fn text_without_font_fails() {
        let mut doc = test_doc();
        let mut text = PdfText::new();
        text.text("hello");
        let mut ctx = DrawContext::new(&mut doc, ContextKind::Page);
        assert!(matches!(
            ctx.render_text(&text),
            Err(PlatenError::FontNotSet)
        ));
    }
}
