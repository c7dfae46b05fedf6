use crate::colorconvert::{icc_channel_count, ColorConverter};
use crate::error::PlatenError;
use crate::fontsub::{self, FontSubsetter, GeneratedSubset, LoadedFont};
use crate::images::{load_image_file, RasterImage};
use crate::types::{
    Annotation, AnnotationId, BuiltinFont, DeviceCmyk, DocumentOptions, FontId, FontSubset,
    FormXObjectId, FunctionId, FunctionType2, GraphicsState, GstateId, IccColorId, ImageId,
    LabColorSpace, LabId, OcgId, OutlineId, OutputColorspace, PageId, PageTransition, PatternId,
    PdfBox, SeparationId, ShadingId, ShadingType2, ShadingType3,
};
use crate::utils::{
    current_date_string, escape_pdf_name, escape_pdf_string, flate_compress, fmt_num,
    utf8_to_pdfmetastr,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const PDF_HEADER: &[u8] = b"%PDF-1.7\n\xe5\xf6\xc4\xd6\n";

// Buffered indirect objects. Subset font objects stay delayed because
// their contents depend on which glyphs rendering ends up touching.
enum ObjectEntry {
    Full {
        dictionary: String,
        stream: Option<Vec<u8>>,
    },
    SubsetFontProgram {
        font: usize,
        subset: usize,
    },
    SubsetFontDescriptor {
        font: usize,
        subset: usize,
        program_obj: u32,
    },
    SubsetCidFont {
        font: usize,
        subset: usize,
        descriptor_obj: u32,
    },
    SubsetEncodingCmap {
        font: usize,
        subset: usize,
    },
    SubsetToUnicode {
        font: usize,
        subset: usize,
    },
    SubsetType0Font {
        font: usize,
        subset: usize,
        cid_obj: u32,
        encoding_obj: u32,
        tounicode_obj: u32,
    },
}

struct FontRecord {
    font: LoadedFont,
    subsetter: FontSubsetter,
    // Type 0 font object number per subset, in subset order.
    subset_fonts: Vec<u32>,
}

struct ImageRecord {
    size: (u32, u32),
    obj: u32,
}

struct IccInfo {
    object: u32,
    channels: u32,
}

struct OutlineRecord {
    title: String,
    dest: PageId,
    parent: Option<OutlineId>,
}

#[derive(Debug, Clone)]
pub(crate) struct StructItem {
    pub role: String,
    pub mcid: u32,
}

struct PageRecord {
    resource_obj: u32,
    content_obj: u32,
    annotations: Vec<u32>,
    transition: Option<PageTransition>,
    struct_items: Vec<StructItem>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SubsetGlyph {
    pub subset: FontSubset,
    pub glyph_byte: u8,
}

/// The document assembler. It owns the output sink, the indirect
/// object table and every resource registry. The header goes out when
/// the document is created; everything else is buffered and emitted by
/// `finish`, which writes objects, the cross reference table and the
/// trailer in one sequential pass.
pub struct PdfDocument<W: Write> {
    sink: W,
    offset: u64,
    opts: DocumentOptions,
    cm: ColorConverter,
    objects: Vec<ObjectEntry>,
    pages: Vec<PageRecord>,
    images: Vec<ImageRecord>,
    fonts: Vec<FontRecord>,
    builtin_fonts: HashMap<BuiltinFont, u32>,
    separations: Vec<u32>,
    icc_spaces: Vec<IccInfo>,
    lab_spaces: Vec<u32>,
    gstates: Vec<u32>,
    functions: Vec<u32>,
    shadings: Vec<u32>,
    patterns: Vec<u32>,
    form_xobjects: Vec<u32>,
    annotations: Vec<u32>,
    ocgs: Vec<(String, u32)>,
    outlines: Vec<OutlineRecord>,
    rgb_profile_obj: Option<u32>,
    gray_profile_obj: Option<u32>,
    cmyk_profile_obj: Option<u32>,
    finished: bool,
}

impl PdfDocument<BufWriter<File>> {
    /// Opens the output file and writes the PDF header immediately.
    pub fn open<P: AsRef<Path>>(path: P, opts: DocumentOptions) -> Result<Self, PlatenError> {
        let file = File::create(path.as_ref())?;
        Self::from_writer(BufWriter::new(file), opts)
    }
}

impl<W: Write> PdfDocument<W> {
    pub fn from_writer(mut sink: W, opts: DocumentOptions) -> Result<Self, PlatenError> {
        let cm = ColorConverter::new(&opts.profiles)?;
        sink.write_all(PDF_HEADER)?;
        let mut doc = Self {
            sink,
            offset: PDF_HEADER.len() as u64,
            opts,
            cm,
            objects: Vec::new(),
            pages: Vec::new(),
            images: Vec::new(),
            fonts: Vec::new(),
            builtin_fonts: HashMap::new(),
            separations: Vec::new(),
            icc_spaces: Vec::new(),
            lab_spaces: Vec::new(),
            gstates: Vec::new(),
            functions: Vec::new(),
            shadings: Vec::new(),
            patterns: Vec::new(),
            form_xobjects: Vec::new(),
            annotations: Vec::new(),
            ocgs: Vec::new(),
            outlines: Vec::new(),
            rgb_profile_obj: None,
            gray_profile_obj: None,
            cmyk_profile_obj: None,
            finished: false,
        };
        doc.generate_info_object();
        if doc.opts.output_colorspace == OutputColorspace::Cmyk {
            // The /All resource key resolves to the first separation, so
            // CMYK documents register the all-ink separation up front.
            doc.create_separation("All", &DeviceCmyk::new(1.0, 1.0, 1.0, 1.0))?;
        }
        if let Some(profile) = doc.cm.rgb_profile().map(<[u8]>::to_vec) {
            doc.rgb_profile_obj = Some(doc.store_icc_stream(&profile, 3)?);
        }
        if let Some(profile) = doc.cm.gray_profile().map(<[u8]>::to_vec) {
            doc.gray_profile_obj = Some(doc.store_icc_stream(&profile, 1)?);
        }
        if let Some(profile) = doc.cm.cmyk_profile().map(<[u8]>::to_vec) {
            doc.cmyk_profile_obj = Some(doc.store_icc_stream(&profile, 4)?);
        }
        Ok(doc)
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.opts
    }

    /// Consumes the document and hands back the sink, for callers that
    /// generate into memory.
    pub fn into_writer(self) -> W {
        self.sink
    }

    pub fn converter(&self) -> &ColorConverter {
        &self.cm
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn add_object(&mut self, entry: ObjectEntry) -> u32 {
        self.objects.push(entry);
        self.objects.len() as u32
    }

    fn add_full_object(&mut self, dictionary: String, stream: Option<Vec<u8>>) -> u32 {
        self.add_object(ObjectEntry::Full { dictionary, stream })
    }

    fn generate_info_object(&mut self) {
        let mut dict = String::from("<<\n");
        if !self.opts.title.is_empty() {
            let _ = writeln!(dict, "  /Title {}", utf8_to_pdfmetastr(&self.opts.title));
        }
        if !self.opts.author.is_empty() {
            let _ = writeln!(dict, "  /Author {}", utf8_to_pdfmetastr(&self.opts.author));
        }
        let _ = writeln!(
            dict,
            "  /Producer (platen {})",
            env!("CARGO_PKG_VERSION")
        );
        let date = current_date_string();
        let _ = writeln!(dict, "  /CreationDate {}", date);
        let _ = writeln!(dict, "  /ModDate {}", date);
        dict.push_str(">>\n");
        self.add_full_object(dict, None);
    }

    // ----- colors -----

    pub fn create_separation(
        &mut self,
        name: &str,
        fallback: &DeviceCmyk,
    ) -> Result<SeparationId, PlatenError> {
        let tint = self.add_function(&FunctionType2 {
            domain: [0.0, 1.0],
            c0: vec![0.0, 0.0, 0.0, 0.0],
            c1: vec![
                fallback.c.v(),
                fallback.m.v(),
                fallback.y.v(),
                fallback.k.v(),
            ],
            n: 1.0,
        });
        let fn_obj = self.functions[tint.0 as usize];
        let dict = format!(
            "[\n  /Separation\n    /{}\n    /DeviceCMYK\n    {} 0 R\n]\n",
            escape_pdf_name(name),
            fn_obj
        );
        let obj = self.add_full_object(dict, None);
        self.separations.push(obj);
        Ok(SeparationId(self.separations.len() as u32 - 1))
    }

    pub fn add_lab_colorspace(&mut self, lab: &LabColorSpace) -> LabId {
        let dict = format!(
            "[ /Lab\n  <<\n    /WhitePoint [ {} {} {} ]\n    /Range [ {} {} {} {} ]\n  >>\n]\n",
            fmt_num(lab.xw),
            fmt_num(lab.yw),
            fmt_num(lab.zw),
            fmt_num(lab.amin),
            fmt_num(lab.amax),
            fmt_num(lab.bmin),
            fmt_num(lab.bmax)
        );
        let obj = self.add_full_object(dict, None);
        self.lab_spaces.push(obj);
        LabId(self.lab_spaces.len() as u32 - 1)
    }

    pub fn load_icc_profile(
        &mut self,
        contents: &[u8],
        channels: u32,
    ) -> Result<IccColorId, PlatenError> {
        let found = icc_channel_count(contents)?;
        if found != channels {
            return Err(PlatenError::IncorrectColorChannelCount);
        }
        let stream_obj = self.store_icc_stream(contents, channels)?;
        let array = format!("[ /ICCBased {} 0 R ]\n", stream_obj);
        let object = self.add_full_object(array, None);
        self.icc_spaces.push(IccInfo { object, channels });
        Ok(IccColorId(self.icc_spaces.len() as u32 - 1))
    }

    fn store_icc_stream(&mut self, contents: &[u8], channels: u32) -> Result<u32, PlatenError> {
        let compressed = flate_compress(contents)?;
        let dict = format!(
            "<<\n  /Filter /FlateDecode\n  /Length {}\n  /N {}\n>>\n",
            compressed.len(),
            channels
        );
        Ok(self.add_full_object(dict, Some(compressed)))
    }

    // ----- graphics states, functions, shadings -----

    pub fn add_graphics_state(&mut self, state: &GraphicsState) -> GstateId {
        let mut dict = String::from("<<\n  /Type /ExtGState\n");
        if let Some(v) = state.line_width {
            let _ = writeln!(dict, "  /LW {}", fmt_num(v));
        }
        if let Some(v) = state.line_cap {
            let _ = writeln!(dict, "  /LC {}", v as i32);
        }
        if let Some(v) = state.line_join {
            let _ = writeln!(dict, "  /LJ {}", v as i32);
        }
        if let Some(v) = state.miter_limit {
            let _ = writeln!(dict, "  /ML {}", fmt_num(v));
        }
        if let Some(v) = state.rendering_intent {
            let _ = writeln!(dict, "  /RI /{}", v.pdf_name());
        }
        if let Some(v) = state.stroke_overprint {
            let _ = writeln!(dict, "  /OP {}", v);
        }
        if let Some(v) = state.fill_overprint {
            let _ = writeln!(dict, "  /op {}", v);
        }
        if let Some(v) = state.overprint_mode {
            let _ = writeln!(dict, "  /OPM {}", v);
        }
        if let Some(v) = state.flatness {
            let _ = writeln!(dict, "  /FL {}", fmt_num(v));
        }
        if let Some(v) = state.smoothness {
            let _ = writeln!(dict, "  /SM {}", fmt_num(v));
        }
        if let Some(v) = state.stroke_adjustment {
            let _ = writeln!(dict, "  /SA {}", v);
        }
        if let Some(v) = state.blend_mode {
            let _ = writeln!(dict, "  /BM /{}", v.pdf_name());
        }
        if let Some(v) = state.stroke_alpha {
            let _ = writeln!(dict, "  /CA {}", fmt_num(v.v()));
        }
        if let Some(v) = state.fill_alpha {
            let _ = writeln!(dict, "  /ca {}", fmt_num(v.v()));
        }
        if let Some(v) = state.alpha_is_shape {
            let _ = writeln!(dict, "  /AIS {}", v);
        }
        if let Some(v) = state.text_knockout {
            let _ = writeln!(dict, "  /TK {}", v);
        }
        dict.push_str(">>\n");
        let obj = self.add_full_object(dict, None);
        self.gstates.push(obj);
        GstateId(self.gstates.len() as u32 - 1)
    }

    pub fn add_function(&mut self, func: &FunctionType2) -> FunctionId {
        let mut dict = format!("<<\n  /FunctionType 2\n  /N {}\n", fmt_num(func.n));
        dict.push_str("  /Domain [ ");
        for d in func.domain {
            let _ = write!(dict, "{} ", fmt_num(d));
        }
        dict.push_str("]\n  /C0 [ ");
        for c in &func.c0 {
            let _ = write!(dict, "{} ", fmt_num(*c));
        }
        dict.push_str("]\n  /C1 [ ");
        for c in &func.c1 {
            let _ = write!(dict, "{} ", fmt_num(*c));
        }
        dict.push_str("]\n>>\n");
        let obj = self.add_full_object(dict, None);
        self.functions.push(obj);
        FunctionId(self.functions.len() as u32 - 1)
    }

    pub fn add_shading_axial(&mut self, shade: &ShadingType2) -> Result<ShadingId, PlatenError> {
        let fn_obj = self.function_object_number(shade.function)?;
        let dict = format!(
            "<<\n  /ShadingType 2\n  /ColorSpace {}\n  /Coords [ {} {} {} {} ]\n  /Function {} 0 R\n  /Extend [ {} {} ]\n>>\n",
            shade.colorspace.pdf_name(),
            fmt_num(shade.x0),
            fmt_num(shade.y0),
            fmt_num(shade.x1),
            fmt_num(shade.y1),
            fn_obj,
            shade.extend0,
            shade.extend1
        );
        let obj = self.add_full_object(dict, None);
        self.shadings.push(obj);
        Ok(ShadingId(self.shadings.len() as u32 - 1))
    }

    pub fn add_shading_radial(&mut self, shade: &ShadingType3) -> Result<ShadingId, PlatenError> {
        let fn_obj = self.function_object_number(shade.function)?;
        let dict = format!(
            "<<\n  /ShadingType 3\n  /ColorSpace {}\n  /Coords [ {} {} {} {} {} {} ]\n  /Function {} 0 R\n  /Extend [ {} {} ]\n>>\n",
            shade.colorspace.pdf_name(),
            fmt_num(shade.x0),
            fmt_num(shade.y0),
            fmt_num(shade.r0),
            fmt_num(shade.x1),
            fmt_num(shade.y1),
            fmt_num(shade.r1),
            fn_obj,
            shade.extend0,
            shade.extend1
        );
        let obj = self.add_full_object(dict, None);
        self.shadings.push(obj);
        Ok(ShadingId(self.shadings.len() as u32 - 1))
    }

    // ----- annotations, optional content, outlines -----

    pub fn add_annotation(&mut self, annotation: &Annotation) -> AnnotationId {
        let dict = match annotation {
            Annotation::Text { rect, contents } => format!(
                "<<\n  /Type /Annot\n  /Subtype /Text\n  /Rect [ {} {} {} {} ]\n  /Contents {}\n>>\n",
                fmt_num(rect.x),
                fmt_num(rect.y),
                fmt_num(rect.w),
                fmt_num(rect.h),
                utf8_to_pdfmetastr(contents)
            ),
            Annotation::Link { rect, uri } => format!(
                "<<\n  /Type /Annot\n  /Subtype /Link\n  /Rect [ {} {} {} {} ]\n  /Border [ 0 0 0 ]\n  /A <<\n    /S /URI\n    /URI ({})\n  >>\n>>\n",
                fmt_num(rect.x),
                fmt_num(rect.y),
                fmt_num(rect.w),
                fmt_num(rect.h),
                escape_pdf_string(uri)
            ),
        };
        let obj = self.add_full_object(dict, None);
        self.annotations.push(obj);
        AnnotationId(self.annotations.len() as u32 - 1)
    }

    pub fn add_optional_content_group(&mut self, name: &str) -> OcgId {
        let dict = format!(
            "<<\n  /Type /OCG\n  /Name {}\n>>\n",
            utf8_to_pdfmetastr(name)
        );
        let obj = self.add_full_object(dict, None);
        self.ocgs.push((name.to_string(), obj));
        OcgId(self.ocgs.len() as u32 - 1)
    }

    pub fn add_outline(
        &mut self,
        title: &str,
        dest: PageId,
        parent: Option<OutlineId>,
    ) -> Result<OutlineId, PlatenError> {
        if let Some(parent) = parent {
            if parent.0 as usize >= self.outlines.len() {
                return Err(PlatenError::BadId);
            }
        }
        if dest.0 as usize >= self.pages.len() {
            return Err(PlatenError::BadId);
        }
        self.outlines.push(OutlineRecord {
            title: title.to_string(),
            dest,
            parent,
        });
        Ok(OutlineId(self.outlines.len() as u32 - 1))
    }

    // ----- images -----

    pub fn load_image<P: AsRef<Path>>(&mut self, path: P) -> Result<ImageId, PlatenError> {
        let image = load_image_file(path.as_ref())?;
        match image {
            RasterImage::Rgb8 {
                width,
                height,
                pixels,
                alpha,
            } => self.process_rgb_image(width, height, &pixels, alpha.as_deref()),
            RasterImage::Gray8 {
                width,
                height,
                pixels,
                alpha,
            } => self.process_gray_image(width, height, &pixels, alpha.as_deref()),
            RasterImage::Mono1 {
                width,
                height,
                rows,
            } => self.process_mono_image(width, height, &rows),
            RasterImage::Jpeg {
                width,
                height,
                data,
            } => self.process_jpeg(width, height, data),
        }
    }

    pub fn image_size(&self, image: ImageId) -> Result<(u32, u32), PlatenError> {
        self.images
            .get(image.0 as usize)
            .map(|i| i.size)
            .ok_or(PlatenError::BadId)
    }

    fn register_image(&mut self, width: u32, height: u32, obj: u32) -> ImageId {
        self.images.push(ImageRecord {
            size: (width, height),
            obj,
        });
        ImageId(self.images.len() as u32 - 1)
    }

    fn emit_smask(&mut self, width: u32, height: u32, alpha: &[u8]) -> Result<u32, PlatenError> {
        let compressed = flate_compress(alpha)?;
        let dict = format!(
            "<<\n  /Type /XObject\n  /Subtype /Image\n  /ColorSpace /DeviceGray\n  /Width {}\n  /Height {}\n  /BitsPerComponent 8\n  /Length {}\n  /Filter /FlateDecode\n>>\n",
            width,
            height,
            compressed.len()
        );
        Ok(self.add_full_object(dict, Some(compressed)))
    }

    fn image_dict(
        colorspace: &str,
        width: u32,
        height: u32,
        bits: u32,
        length: usize,
        filter: &str,
        smask: Option<u32>,
    ) -> String {
        let mut dict = format!(
            "<<\n  /Type /XObject\n  /Subtype /Image\n  /ColorSpace {}\n  /Width {}\n  /Height {}\n  /BitsPerComponent {}\n  /Length {}\n  /Filter {}\n",
            colorspace, width, height, bits, length, filter
        );
        if let Some(smask) = smask {
            let _ = writeln!(dict, "  /SMask {} 0 R", smask);
        }
        dict.push_str(">>\n");
        dict
    }

    fn process_rgb_image(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
        alpha: Option<&[u8]>,
    ) -> Result<ImageId, PlatenError> {
        let smask = match alpha {
            Some(alpha) => Some(self.emit_smask(width, height, alpha)?),
            None => None,
        };
        // A caller supplied profile turns the device space into an
        // ICC based one.
        let (colorspace, converted) = match self.opts.output_colorspace {
            OutputColorspace::Rgb => (
                image_colorspace("/DeviceRGB", self.rgb_profile_obj),
                pixels.to_vec(),
            ),
            OutputColorspace::Gray => (
                image_colorspace("/DeviceGray", self.gray_profile_obj),
                self.cm.rgb_pixels_to_gray(pixels),
            ),
            OutputColorspace::Cmyk => (
                image_colorspace("/DeviceCMYK", self.cmyk_profile_obj),
                self.cm.rgb_pixels_to_cmyk(pixels),
            ),
        };
        let compressed = flate_compress(&converted)?;
        let dict = Self::image_dict(
            &colorspace,
            width,
            height,
            8,
            compressed.len(),
            "/FlateDecode",
            smask,
        );
        let obj = self.add_full_object(dict, Some(compressed));
        Ok(self.register_image(width, height, obj))
    }

    fn process_gray_image(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
        alpha: Option<&[u8]>,
    ) -> Result<ImageId, PlatenError> {
        let smask = match alpha {
            Some(alpha) => Some(self.emit_smask(width, height, alpha)?),
            None => None,
        };
        let compressed = flate_compress(pixels)?;
        let dict = Self::image_dict(
            &image_colorspace("/DeviceGray", self.gray_profile_obj),
            width,
            height,
            8,
            compressed.len(),
            "/FlateDecode",
            smask,
        );
        let obj = self.add_full_object(dict, Some(compressed));
        Ok(self.register_image(width, height, obj))
    }

    fn process_mono_image(
        &mut self,
        width: u32,
        height: u32,
        rows: &[u8],
    ) -> Result<ImageId, PlatenError> {
        let compressed = flate_compress(rows)?;
        let dict = Self::image_dict(
            "/DeviceGray",
            width,
            height,
            1,
            compressed.len(),
            "/FlateDecode",
            None,
        );
        let obj = self.add_full_object(dict, Some(compressed));
        Ok(self.register_image(width, height, obj))
    }

    fn process_jpeg(
        &mut self,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Result<ImageId, PlatenError> {
        let dict = Self::image_dict(
            "/DeviceRGB",
            width,
            height,
            8,
            data.len(),
            "/DCTDecode",
            None,
        );
        let obj = self.add_full_object(dict, Some(data));
        Ok(self.register_image(width, height, obj))
    }

    // ----- fonts -----

    pub fn load_font<P: AsRef<Path>>(&mut self, path: P) -> Result<FontId, PlatenError> {
        let data = std::fs::read(path.as_ref())?;
        self.load_font_bytes(data)
    }

    pub fn load_font_bytes(&mut self, data: Vec<u8>) -> Result<FontId, PlatenError> {
        let font = LoadedFont::parse(data)?;
        self.register_font(font)
    }

    fn register_font(&mut self, font: LoadedFont) -> Result<FontId, PlatenError> {
        self.fonts.push(FontRecord {
            font,
            subsetter: FontSubsetter::new(),
            subset_fonts: Vec::new(),
        });
        let index = self.fonts.len() - 1;
        self.allocate_subset_chain(index, 0);
        Ok(FontId(index as u32))
    }

    #[cfg(test)]
    pub(crate) fn register_synthetic_font(&mut self, font: LoadedFont) -> FontId {
        match self.register_font(font) {
            Ok(id) => id,
            Err(_) => unreachable!(),
        }
    }

    #[cfg(test)]
    pub(crate) fn register_kerning_pair(&mut self, font: FontId, left: u32, right: u32, v: i32) {
        self.fonts[font.0 as usize]
            .font
            .register_kerning_pair(left, right, v);
    }

    fn allocate_subset_chain(&mut self, font: usize, subset: usize) {
        let program_obj = self.add_object(ObjectEntry::SubsetFontProgram { font, subset });
        let descriptor_obj = self.add_object(ObjectEntry::SubsetFontDescriptor {
            font,
            subset,
            program_obj,
        });
        let cid_obj = self.add_object(ObjectEntry::SubsetCidFont {
            font,
            subset,
            descriptor_obj,
        });
        let encoding_obj = self.add_object(ObjectEntry::SubsetEncodingCmap { font, subset });
        let tounicode_obj = self.add_object(ObjectEntry::SubsetToUnicode { font, subset });
        let type0_obj = self.add_object(ObjectEntry::SubsetType0Font {
            font,
            subset,
            cid_obj,
            encoding_obj,
            tounicode_obj,
        });
        self.fonts[font].subset_fonts.push(type0_obj);
    }

    pub(crate) fn font(&self, font: FontId) -> Result<&LoadedFont, PlatenError> {
        self.fonts
            .get(font.0 as usize)
            .map(|r| &r.font)
            .ok_or(PlatenError::BadId)
    }

    /// Assigns the codepoint to a subset, opening a new subset and its
    /// delayed font objects when the current one is full.
    pub(crate) fn get_subset_glyph(
        &mut self,
        font: FontId,
        codepoint: u32,
    ) -> Result<SubsetGlyph, PlatenError> {
        let index = font.0 as usize;
        if index >= self.fonts.len() {
            return Err(PlatenError::BadId);
        }
        let allocation = self.fonts[index].subsetter.assign(codepoint);
        debug_assert!(
            self.fonts[index].subsetter.glyph_count(allocation.subset)
                <= crate::fontsub::MAX_SUBSET_SLOTS
        );
        let needed = allocation.subset as usize + 1;
        for subset in self.fonts[index].subset_fonts.len()..needed {
            self.allocate_subset_chain(index, subset);
        }
        Ok(SubsetGlyph {
            subset: FontSubset {
                font,
                subset: allocation.subset,
            },
            glyph_byte: allocation.glyph_byte,
        })
    }

    pub(crate) fn font_object_number(&self, font: FontId) -> Result<u32, PlatenError> {
        self.fonts
            .get(font.0 as usize)
            .and_then(|r| r.subset_fonts.first())
            .copied()
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn subset_font_object_number(
        &self,
        subset: FontSubset,
    ) -> Result<u32, PlatenError> {
        self.fonts
            .get(subset.font.0 as usize)
            .and_then(|r| r.subset_fonts.get(subset.subset as usize))
            .copied()
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn builtin_font_object(&mut self, font: BuiltinFont) -> u32 {
        if let Some(&obj) = self.builtin_fonts.get(&font) {
            return obj;
        }
        let dict = format!(
            "<<\n  /Type /Font\n  /Subtype /Type1\n  /BaseFont /{}\n>>\n",
            font.pdf_name()
        );
        let obj = self.add_full_object(dict, None);
        self.builtin_fonts.insert(font, obj);
        obj
    }

    /// Advance of a codepoint scaled to the point size, if the font
    /// maps it.
    pub fn glyph_advance(&self, font: FontId, pointsize: f64, codepoint: u32) -> Option<f64> {
        let record = self.fonts.get(font.0 as usize)?;
        let advance = record.font.advance(codepoint)?;
        Some(advance as f64 / record.font.units_per_em() as f64 * pointsize)
    }

    /// Width of a UTF-8 string, advances plus pairwise kerning.
    pub fn utf8_text_width(
        &self,
        text: &str,
        font: FontId,
        pointsize: f64,
    ) -> Result<f64, PlatenError> {
        let record = self.fonts.get(font.0 as usize).ok_or(PlatenError::BadId)?;
        let upem = record.font.units_per_em() as f64;
        let mut width = 0.0;
        let mut previous: Option<u32> = None;
        for c in text.chars() {
            let codepoint = c as u32;
            if let Some(previous) = previous {
                if let Some(kern) = record.font.kerning(previous, codepoint) {
                    width += kern as f64 / upem * pointsize;
                }
            }
            if let Some(advance) = record.font.advance(codepoint) {
                width += advance as f64 / upem * pointsize;
            }
            previous = Some(codepoint);
        }
        Ok(width)
    }

    // ----- object number lookups used by draw contexts -----

    pub(crate) fn image_object_number(&self, image: ImageId) -> Result<u32, PlatenError> {
        self.images
            .get(image.0 as usize)
            .map(|i| i.obj)
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn separation_object_number(
        &self,
        separation: SeparationId,
    ) -> Result<u32, PlatenError> {
        self.separations
            .get(separation.0 as usize)
            .copied()
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn first_separation_object(&self) -> Option<u32> {
        self.separations.first().copied()
    }

    pub(crate) fn icc_space(&self, icc: IccColorId) -> Result<(u32, u32), PlatenError> {
        self.icc_spaces
            .get(icc.0 as usize)
            .map(|i| (i.object, i.channels))
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn lab_object_number(&self, lab: LabId) -> Result<u32, PlatenError> {
        self.lab_spaces
            .get(lab.0 as usize)
            .copied()
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn gstate_object_number(&self, gstate: GstateId) -> Result<u32, PlatenError> {
        self.gstates
            .get(gstate.0 as usize)
            .copied()
            .ok_or(PlatenError::BadId)
    }

    fn function_object_number(&self, function: FunctionId) -> Result<u32, PlatenError> {
        self.functions
            .get(function.0 as usize)
            .copied()
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn shading_object_number(&self, shading: ShadingId) -> Result<u32, PlatenError> {
        self.shadings
            .get(shading.0 as usize)
            .copied()
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn pattern_object_number(&self, pattern: PatternId) -> Result<u32, PlatenError> {
        self.patterns
            .get(pattern.0 as usize)
            .copied()
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn form_xobject_object_number(
        &self,
        form: FormXObjectId,
    ) -> Result<u32, PlatenError> {
        self.form_xobjects
            .get(form.0 as usize)
            .copied()
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn annotation_object_number(
        &self,
        annotation: AnnotationId,
    ) -> Result<u32, PlatenError> {
        self.annotations
            .get(annotation.0 as usize)
            .copied()
            .ok_or(PlatenError::BadId)
    }

    pub(crate) fn ocg_object_number(&self, ocg: OcgId) -> Result<u32, PlatenError> {
        self.ocgs
            .get(ocg.0 as usize)
            .map(|(_, obj)| *obj)
            .ok_or(PlatenError::BadId)
    }

    // ----- page and context artifacts -----

    /// Accepts a finalized builder's two outputs, the resource
    /// dictionary and the content stream, as one call.
    pub(crate) fn add_page(
        &mut self,
        resources: String,
        content: String,
        annotations: Vec<u32>,
        transition: Option<PageTransition>,
        struct_items: Vec<StructItem>,
    ) -> PageId {
        let resource_obj = self.add_full_object(resources, None);
        let dict = format!("<<\n  /Length {}\n>>\n", content.len());
        let content_obj = self.add_full_object(dict, Some(content.into_bytes()));
        self.pages.push(PageRecord {
            resource_obj,
            content_obj,
            annotations,
            transition,
            struct_items,
        });
        PageId(self.pages.len() as u32 - 1)
    }

    pub(crate) fn add_form_xobject(&mut self, dictionary: String, stream: String) -> FormXObjectId {
        let obj = self.add_full_object(dictionary, Some(stream.into_bytes()));
        self.form_xobjects.push(obj);
        FormXObjectId(self.form_xobjects.len() as u32 - 1)
    }

    pub(crate) fn add_pattern(&mut self, dictionary: String, stream: String) -> PatternId {
        let obj = self.add_full_object(dictionary, Some(stream.into_bytes()));
        self.patterns.push(obj);
        PatternId(self.patterns.len() as u32 - 1)
    }

    // ----- finalization -----

    /// Writes pages, the page tree, outlines, the catalog, every
    /// buffered object, the cross reference table and the trailer.
    /// Finalizing twice is an error; a write failure poisons the
    /// document and leaves the partial file for the caller to remove.
    pub fn finish(&mut self) -> Result<(), PlatenError> {
        if self.finished {
            return Err(PlatenError::DoubleFinalize);
        }
        self.finished = true;
        let (page_objects, pages_root, page_records) = self.write_pages()?;
        let outline_root = self.create_outlines(&page_objects);
        let struct_root = self.create_structure_tree(&page_objects, &page_records);
        self.create_catalog(pages_root, outline_root, struct_root);
        let offsets = self.write_objects()?;
        self.write_cross_reference_and_trailer(&offsets)?;
        self.sink.flush()?;
        Ok(())
    }

    fn write_pages(&mut self) -> Result<(Vec<u32>, u32, Vec<PageRecord>), PlatenError> {
        // The page tree root lands right after all page objects. The
        // number is predicted here and checked after emission.
        let pages_root = (self.objects.len() + self.pages.len() + 1) as u32;
        let records = std::mem::take(&mut self.pages);
        let mut page_objects = Vec::with_capacity(records.len());
        for (index, page) in records.iter().enumerate() {
            let mut dict = format!("<<\n  /Type /Page\n  /Parent {} 0 R\n", pages_root);
            write_box(&mut dict, "MediaBox", &self.opts.mediabox);
            if let Some(b) = &self.opts.cropbox {
                write_box(&mut dict, "CropBox", b);
            }
            if let Some(b) = &self.opts.bleedbox {
                write_box(&mut dict, "BleedBox", b);
            }
            if let Some(b) = &self.opts.trimbox {
                write_box(&mut dict, "TrimBox", b);
            }
            if let Some(b) = &self.opts.artbox {
                write_box(&mut dict, "ArtBox", b);
            }
            let _ = writeln!(dict, "  /Contents {} 0 R", page.content_obj);
            let _ = writeln!(dict, "  /Resources {} 0 R", page.resource_obj);
            if !page.annotations.is_empty() {
                dict.push_str("  /Annots [ ");
                for obj in &page.annotations {
                    let _ = write!(dict, "{} 0 R ", obj);
                }
                dict.push_str("]\n");
            }
            if let Some(transition) = &page.transition {
                let _ = writeln!(
                    dict,
                    "  /Trans << /S /{} /D {} >>",
                    transition.style.pdf_name(),
                    fmt_num(transition.duration)
                );
            }
            if !page.struct_items.is_empty() {
                let _ = writeln!(dict, "  /StructParents {}", index);
            }
            dict.push_str(">>\n");
            page_objects.push(self.add_full_object(dict, None));
        }

        let mut tree = String::from("<<\n  /Type /Pages\n  /Kids [\n");
        for obj in &page_objects {
            let _ = writeln!(tree, "    {} 0 R", obj);
        }
        let _ = writeln!(tree, "  ]\n  /Count {}\n>>", page_objects.len());
        tree.push('\n');
        let actual = self.add_full_object(tree, None);
        if actual != pages_root {
            // The prediction drifting means objects were interleaved
            // during page emission, which is a bug in the assembler.
            debug_assert_eq!(actual, pages_root);
            return Err(PlatenError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "page tree object number drifted",
            )));
        }
        Ok((page_objects, pages_root, records))
    }

    fn create_outlines(&mut self, page_objects: &[u32]) -> Option<u32> {
        if self.outlines.is_empty() {
            return None;
        }
        let outlines = std::mem::take(&mut self.outlines);
        let base = self.objects.len() as u32 + 1;
        let root_obj = base + outlines.len() as u32;

        let mut children: HashMap<i64, Vec<usize>> = HashMap::new();
        for (index, outline) in outlines.iter().enumerate() {
            let key = outline.parent.map(|p| p.0 as i64).unwrap_or(-1);
            children.entry(key).or_default().push(index);
        }

        for (index, outline) in outlines.iter().enumerate() {
            let obj = base + index as u32;
            let parent_obj = outline
                .parent
                .map(|p| base + p.0)
                .unwrap_or(root_obj);
            let page_obj = page_objects
                .get(outline.dest.0 as usize)
                .copied()
                .unwrap_or(0);
            let mut dict = format!(
                "<<\n  /Title {}\n  /Parent {} 0 R\n  /Dest [ {} 0 R /XYZ null null null ]\n",
                utf8_to_pdfmetastr(&outline.title),
                parent_obj,
                page_obj
            );
            let siblings = &children[&outline.parent.map(|p| p.0 as i64).unwrap_or(-1)];
            let position = siblings.iter().position(|&i| i == index).unwrap_or(0);
            if position > 0 {
                let _ = writeln!(dict, "  /Prev {} 0 R", base + siblings[position - 1] as u32);
            }
            if position + 1 < siblings.len() {
                let _ = writeln!(dict, "  /Next {} 0 R", base + siblings[position + 1] as u32);
            }
            if let Some(kids) = children.get(&(index as i64)) {
                let _ = writeln!(dict, "  /First {} 0 R", base + kids[0] as u32);
                let _ = writeln!(
                    dict,
                    "  /Last {} 0 R",
                    base + *kids.last().unwrap_or(&kids[0]) as u32
                );
                let _ = writeln!(dict, "  /Count {}", kids.len());
            }
            dict.push_str(">>\n");
            self.add_full_object(dict, None);
        }

        let top = children.get(&-1).cloned().unwrap_or_default();
        let mut dict = String::from("<<\n  /Type /Outlines\n");
        if let (Some(first), Some(last)) = (top.first(), top.last()) {
            let _ = writeln!(dict, "  /First {} 0 R", base + *first as u32);
            let _ = writeln!(dict, "  /Last {} 0 R", base + *last as u32);
            let _ = writeln!(dict, "  /Count {}", top.len());
        }
        dict.push_str(">>\n");
        let actual = self.add_full_object(dict, None);
        debug_assert_eq!(actual, root_obj);
        Some(root_obj)
    }

    fn create_structure_tree(
        &mut self,
        page_objects: &[u32],
        page_records: &[PageRecord],
    ) -> Option<u32> {
        let total: usize = page_records.iter().map(|p| p.struct_items.len()).sum();
        if total == 0 {
            return None;
        }
        let base = self.objects.len() as u32 + 1;
        let parent_tree_obj = base + total as u32;
        let root_obj = parent_tree_obj + 1;

        let mut elem_objs: Vec<u32> = Vec::with_capacity(total);
        let mut nums: Vec<(usize, Vec<u32>)> = Vec::new();
        let mut next = base;
        for (page_index, page) in page_records.iter().enumerate() {
            if page.struct_items.is_empty() {
                continue;
            }
            let mut page_elems = Vec::with_capacity(page.struct_items.len());
            for item in &page.struct_items {
                let dict = format!(
                    "<<\n  /Type /StructElem\n  /S /{}\n  /P {} 0 R\n  /Pg {} 0 R\n  /K {}\n>>\n",
                    escape_pdf_name(&item.role),
                    root_obj,
                    page_objects.get(page_index).copied().unwrap_or(0),
                    item.mcid
                );
                let obj = self.add_full_object(dict, None);
                debug_assert_eq!(obj, next);
                next += 1;
                elem_objs.push(obj);
                page_elems.push(obj);
            }
            nums.push((page_index, page_elems));
        }

        let mut parent_tree = String::from("<<\n  /Nums [\n");
        for (page_index, elems) in &nums {
            let refs = elems
                .iter()
                .map(|o| format!("{} 0 R", o))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(parent_tree, "    {} [ {} ]", page_index, refs);
        }
        parent_tree.push_str("  ]\n>>\n");
        let actual = self.add_full_object(parent_tree, None);
        debug_assert_eq!(actual, parent_tree_obj);

        let kids = elem_objs
            .iter()
            .map(|o| format!("{} 0 R", o))
            .collect::<Vec<_>>()
            .join(" ");
        let root = format!(
            "<<\n  /Type /StructTreeRoot\n  /K [ {} ]\n  /ParentTree {} 0 R\n>>\n",
            kids, parent_tree_obj
        );
        let actual = self.add_full_object(root, None);
        debug_assert_eq!(actual, root_obj);
        Some(root_obj)
    }

    fn create_catalog(
        &mut self,
        pages_root: u32,
        outline_root: Option<u32>,
        struct_root: Option<u32>,
    ) {
        let mut dict = format!("<<\n  /Type /Catalog\n  /Pages {} 0 R\n", pages_root);
        if let Some(outlines) = outline_root {
            let _ = writeln!(dict, "  /Outlines {} 0 R", outlines);
        }
        if let Some(lang) = &self.opts.language {
            let _ = writeln!(dict, "  /Lang ({})", escape_pdf_string(lang));
        }
        if !self.ocgs.is_empty() {
            let refs = self
                .ocgs
                .iter()
                .map(|(_, obj)| format!("{} 0 R", obj))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(
                dict,
                "  /OCProperties << /OCGs [ {} ] /D << /BaseState /ON /Order [ {} ] >> >>",
                refs, refs
            );
        }
        if let Some(root) = struct_root {
            let _ = writeln!(
                dict,
                "  /StructTreeRoot {} 0 R\n  /MarkInfo << /Marked true >>",
                root
            );
        }
        dict.push_str(">>\n");
        self.add_full_object(dict, None);
    }

    fn write_objects(&mut self) -> Result<Vec<u64>, PlatenError> {
        let objects = std::mem::take(&mut self.objects);
        let mut offsets = Vec::with_capacity(objects.len());
        let mut generated: HashMap<(usize, usize), GeneratedSubset> = HashMap::new();
        for (index, entry) in objects.into_iter().enumerate() {
            offsets.push(self.offset);
            let number = (index + 1) as u32;
            let (dict, stream) = self.render_object(entry, &mut generated)?;
            self.write_finished_object(number, &dict, stream.as_deref())?;
        }
        Ok(offsets)
    }

    fn render_object(
        &self,
        entry: ObjectEntry,
        generated: &mut HashMap<(usize, usize), GeneratedSubset>,
    ) -> Result<(String, Option<Vec<u8>>), PlatenError> {
        match entry {
            ObjectEntry::Full { dictionary, stream } => Ok((dictionary, stream)),
            ObjectEntry::SubsetFontProgram { font, subset } => {
                let generated = self.generated_subset(generated, font, subset)?;
                let compressed = flate_compress(&generated.program)?;
                let dict = format!(
                    "<<\n  /Length {}\n  /Length1 {}\n  /Filter /FlateDecode\n>>\n",
                    compressed.len(),
                    generated.program.len()
                );
                Ok((dict, Some(compressed)))
            }
            ObjectEntry::SubsetFontDescriptor {
                font,
                subset,
                program_obj,
            } => {
                let record = self.fonts.get(font).ok_or(PlatenError::BadId)?;
                let scale = 1000.0 / record.font.units_per_em() as f64;
                let bbox = record.font.bbox();
                let mut flags = 4u32;
                if record.font.is_fixed_pitch() {
                    flags |= 1;
                }
                let dict = format!(
                    "<<\n  /Type /FontDescriptor\n  /FontName /{}+{}\n  /Flags {}\n  /FontBBox [ {} {} {} {} ]\n  /ItalicAngle {}\n  /Ascent {}\n  /Descent {}\n  /CapHeight {}\n  /StemV 80\n  /FontFile2 {} 0 R\n>>\n",
                    fontsub::subset_tag(subset as u32),
                    record.font.postscript_name(),
                    flags,
                    fmt_num(bbox.0 as f64 * scale),
                    fmt_num(bbox.1 as f64 * scale),
                    fmt_num(bbox.2 as f64 * scale),
                    fmt_num(bbox.3 as f64 * scale),
                    fmt_num(record.font.italic_angle()),
                    fmt_num(record.font.ascent() as f64 * scale),
                    fmt_num(record.font.descent() as f64 * scale),
                    fmt_num(record.font.cap_height() as f64 * scale),
                    program_obj
                );
                Ok((dict, None))
            }
            ObjectEntry::SubsetCidFont {
                font,
                subset,
                descriptor_obj,
            } => {
                let record = self.fonts.get(font).ok_or(PlatenError::BadId)?;
                let generated = self.generated_subset(generated, font, subset)?;
                let scale = 1000.0 / record.font.units_per_em() as f64;
                let widths = generated
                    .widths
                    .iter()
                    .map(|w| fmt_num(*w as f64 * scale))
                    .collect::<Vec<_>>()
                    .join(" ");
                let dict = format!(
                    "<<\n  /Type /Font\n  /Subtype /CIDFontType2\n  /BaseFont /{}+{}\n  /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >>\n  /FontDescriptor {} 0 R\n  /DW 0\n  /W [ 0 [ {} ] ]\n  /CIDToGIDMap /Identity\n>>\n",
                    fontsub::subset_tag(subset as u32),
                    record.font.postscript_name(),
                    descriptor_obj,
                    widths
                );
                Ok((dict, None))
            }
            ObjectEntry::SubsetEncodingCmap { font, subset } => {
                let generated = self.generated_subset(generated, font, subset)?;
                let name = format!("Platen-{}-{}", font, subset);
                let cmap = fontsub::encoding_cmap(&name, &generated.cids);
                let dict = format!(
                    "<<\n  /Type /CMap\n  /CMapName /{}\n  /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >>\n  /Length {}\n>>\n",
                    name,
                    cmap.len()
                );
                Ok((dict, Some(cmap.into_bytes())))
            }
            ObjectEntry::SubsetToUnicode { font, subset } => {
                let record = self.fonts.get(font).ok_or(PlatenError::BadId)?;
                let entries = record.subsetter.subset_entries(subset as u32);
                let cmap = fontsub::tounicode_cmap(&entries);
                let dict = format!("<<\n  /Length {}\n>>\n", cmap.len());
                Ok((dict, Some(cmap.into_bytes())))
            }
            ObjectEntry::SubsetType0Font {
                font,
                subset,
                cid_obj,
                encoding_obj,
                tounicode_obj,
            } => {
                let record = self.fonts.get(font).ok_or(PlatenError::BadId)?;
                let dict = format!(
                    "<<\n  /Type /Font\n  /Subtype /Type0\n  /BaseFont /{}+{}\n  /Encoding {} 0 R\n  /DescendantFonts [ {} 0 R ]\n  /ToUnicode {} 0 R\n>>\n",
                    fontsub::subset_tag(subset as u32),
                    record.font.postscript_name(),
                    encoding_obj,
                    cid_obj,
                    tounicode_obj
                );
                Ok((dict, None))
            }
        }
    }

    fn generated_subset<'a>(
        &self,
        cache: &'a mut HashMap<(usize, usize), GeneratedSubset>,
        font: usize,
        subset: usize,
    ) -> Result<&'a GeneratedSubset, PlatenError> {
        match cache.entry((font, subset)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let record = self.fonts.get(font).ok_or(PlatenError::BadId)?;
                let entries = record.subsetter.subset_entries(subset as u32);
                Ok(entry.insert(fontsub::generate_subset(&record.font, &entries)?))
            }
        }
    }

    fn write_finished_object(
        &mut self,
        number: u32,
        dictionary: &str,
        stream: Option<&[u8]>,
    ) -> Result<(), PlatenError> {
        let mut buf: Vec<u8> = Vec::with_capacity(
            dictionary.len() + stream.map(|s| s.len() + 32).unwrap_or(0) + 32,
        );
        buf.extend_from_slice(format!("{} 0 obj\n", number).as_bytes());
        buf.extend_from_slice(dictionary.as_bytes());
        if let Some(stream) = stream {
            if buf.last() != Some(&b'\n') {
                buf.push(b'\n');
            }
            buf.extend_from_slice(b"stream\n");
            buf.extend_from_slice(stream);
            if buf.last() != Some(&b'\n') {
                buf.push(b'\n');
            }
            buf.extend_from_slice(b"endstream\n");
        }
        if buf.last() != Some(&b'\n') {
            buf.push(b'\n');
        }
        buf.extend_from_slice(b"endobj\n");
        self.write_bytes(&buf)
    }

    fn write_cross_reference_and_trailer(&mut self, offsets: &[u64]) -> Result<(), PlatenError> {
        let xref_offset = self.offset;
        let mut buf = format!("xref\n0 {}\n", offsets.len() + 1);
        // Exactly 20 bytes per entry, the trailing space is significant.
        buf.push_str("0000000000 65535 f \n");
        for offset in offsets {
            let _ = writeln!(buf, "{:010} 00000 n ", offset);
        }
        let root = offsets.len();
        let _ = write!(
            buf,
            "trailer\n<<\n  /Size {}\n  /Root {} 0 R\n  /Info 1 0 R\n>>\nstartxref\n{}\n%%EOF\n",
            offsets.len() + 1,
            root,
            xref_offset
        );
        self.write_bytes(buf.as_bytes())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PlatenError> {
        self.sink.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(())
    }
}

fn image_colorspace(device: &str, profile_obj: Option<u32>) -> String {
    match profile_obj {
        Some(obj) => format!("[ /ICCBased {} 0 R ]", obj),
        None => device.to_string(),
    }
}

fn write_box(dict: &mut String, name: &str, b: &PdfBox) {
    let _ = writeln!(
        dict,
        "  /{} [ {} {} {} {} ]",
        name,
        fmt_num(b.x),
        fmt_num(b.y),
        fmt_num(b.w),
        fmt_num(b.h)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Annotation, BlendMode, LimitDouble};

    fn count_token(bytes: &[u8], token: &[u8]) -> usize {
        if token.is_empty() || bytes.len() < token.len() {
            return 0;
        }
        bytes.windows(token.len()).filter(|w| *w == token).count()
    }

    fn finished_document(opts: DocumentOptions) -> Vec<u8> {
        let mut doc = PdfDocument::from_writer(Vec::new(), opts).unwrap();
        doc.finish().unwrap();
        doc.sink
    }

    #[test]
    fn empty_document_layout() {
        let bytes = finished_document(DocumentOptions::default());

        assert!(bytes.starts_with(b"%PDF-1.7\n\xe5\xf6\xc4\xd6\n"));
        assert!(bytes.ends_with(b"%%EOF\n"));
        assert_eq!(count_token(&bytes, b"1 0 obj"), 1);
        assert_eq!(count_token(&bytes, b"2 0 obj"), 1);
        assert_eq!(count_token(&bytes, b"3 0 obj"), 1);
        assert_eq!(count_token(&bytes, b"4 0 obj"), 0);
        assert_eq!(count_token(&bytes, b"/Count 0"), 1);
        assert_eq!(count_token(&bytes, b"/Type /Catalog"), 1);
        assert_eq!(count_token(&bytes, b"/Size 4"), 1);
        assert_eq!(count_token(&bytes, b"xref\n0 4\n"), 1);
    }

    #[test]
    fn recorded_offsets_point_at_object_headers() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        doc.finish().unwrap();
        let bytes = doc.sink;

        let xref_pos = bytes
            .windows(5)
            .position(|w| w == b"xref\n")
            .expect("xref present");
        let table = &bytes[xref_pos..];
        let text = String::from_utf8_lossy(table);
        for (number, line) in text.lines().skip(3).take(3).enumerate() {
            let offset: usize = line[..10].parse().unwrap();
            let header = format!("{} 0 obj", number + 1);
            assert!(
                bytes[offset..].starts_with(header.as_bytes()),
                "object {} not at recorded offset {}",
                number + 1,
                offset
            );
        }
    }

    #[test]
    fn xref_entries_are_twenty_bytes() {
        let bytes = finished_document(DocumentOptions::default());
        let xref_pos = bytes.windows(5).position(|w| w == b"xref\n").unwrap();
        // Skip "xref\n0 4\n".
        let entries = &bytes[xref_pos + 9..];
        for i in 0..4 {
            let entry = &entries[i * 20..(i + 1) * 20];
            assert_eq!(entry.len(), 20);
            assert_eq!(entry[19], b'\n');
            assert_eq!(entry[18], b' ');
        }
        assert_eq!(&entries[..20], b"0000000000 65535 f \n");
    }

    #[test]
    fn double_finalize_is_an_error() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        doc.finish().unwrap();
        assert!(matches!(doc.finish(), Err(PlatenError::DoubleFinalize)));
    }

    #[test]
    fn info_object_carries_title_and_dates() {
        let mut opts = DocumentOptions::default();
        opts.title = "Test doc".to_string();
        opts.author = "Author".to_string();
        let bytes = finished_document(opts);

        assert_eq!(count_token(&bytes, b"/Title (Test doc)"), 1);
        assert_eq!(count_token(&bytes, b"/Author (Author)"), 1);
        assert_eq!(count_token(&bytes, b"/CreationDate (D:"), 1);
        assert_eq!(count_token(&bytes, b"/ModDate (D:"), 1);
        assert!(count_token(&bytes, b"/Producer (platen") == 1);
    }

    #[test]
    fn non_ascii_title_is_utf16_encoded() {
        let mut opts = DocumentOptions::default();
        opts.title = "r\u{f6}m".to_string();
        let bytes = finished_document(opts);
        assert_eq!(count_token(&bytes, b"/Title <FEFF007200F6006D>"), 1);
    }

    #[test]
    fn cmyk_documents_get_the_all_separation_first() {
        let mut opts = DocumentOptions::default();
        opts.output_colorspace = OutputColorspace::Cmyk;
        let mut doc = PdfDocument::from_writer(Vec::new(), opts).unwrap();
        assert!(doc.first_separation_object().is_some());
        doc.finish().unwrap();
        let bytes = doc.sink;
        assert_eq!(count_token(&bytes, b"/Separation"), 1);
        assert_eq!(count_token(&bytes, b"/All"), 1);
    }

    #[test]
    fn separation_emits_tint_function_and_array() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        let id = doc
            .create_separation("Gold", &DeviceCmyk::new(0.0, 0.2, 1.0, 0.0))
            .unwrap();
        assert_eq!(id, SeparationId(0));
        doc.finish().unwrap();
        let bytes = doc.sink;
        assert_eq!(count_token(&bytes, b"/Separation"), 1);
        assert_eq!(count_token(&bytes, b"/Gold"), 1);
        assert_eq!(count_token(&bytes, b"/FunctionType 2"), 1);
        assert_eq!(count_token(&bytes, b"/C1 [ 0 0.2 1 0 ]"), 1);
    }

    #[test]
    fn graphics_state_serializes_set_fields_only() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        let mut gs = GraphicsState::default();
        gs.blend_mode = Some(BlendMode::Multiply);
        gs.fill_alpha = Some(LimitDouble::new(0.5));
        gs.text_knockout = Some(true);
        doc.add_graphics_state(&gs);
        doc.finish().unwrap();
        let bytes = doc.sink;
        assert_eq!(count_token(&bytes, b"/BM /Multiply"), 1);
        assert_eq!(count_token(&bytes, b"/ca 0.5"), 1);
        assert_eq!(count_token(&bytes, b"/TK true"), 1);
        assert_eq!(count_token(&bytes, b"/LW"), 0);
        assert_eq!(count_token(&bytes, b"/CA"), 0);
    }

    #[test]
    fn icc_profile_objects_wrap_in_iccbased_arrays() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        let mut profile = vec![0u8; 132];
        profile[36..40].copy_from_slice(b"acsp");
        profile[16..20].copy_from_slice(b"CMYK");
        let id = doc.load_icc_profile(&profile, 4).unwrap();
        assert_eq!(doc.icc_space(id).unwrap().1, 4);
        assert!(matches!(
            doc.load_icc_profile(&profile, 3),
            Err(PlatenError::IncorrectColorChannelCount)
        ));
        doc.finish().unwrap();
        let bytes = doc.sink;
        assert_eq!(count_token(&bytes, b"[ /ICCBased"), 1);
        assert_eq!(count_token(&bytes, b"/N 4"), 1);
    }

    #[test]
    fn annotations_become_annot_objects() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        doc.add_annotation(&Annotation::Link {
            rect: PdfBox::new(10.0, 10.0, 100.0, 30.0),
            uri: "https://example.com/".to_string(),
        });
        doc.add_annotation(&Annotation::Text {
            rect: PdfBox::new(0.0, 0.0, 20.0, 20.0),
            contents: "note".to_string(),
        });
        doc.finish().unwrap();
        let bytes = doc.sink;
        assert_eq!(count_token(&bytes, b"/Subtype /Link"), 1);
        assert_eq!(count_token(&bytes, b"/URI (https://example.com/)"), 1);
        assert_eq!(count_token(&bytes, b"/Subtype /Text"), 1);
    }

    #[test]
    fn outline_tree_links_siblings() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        doc.add_page(
            "<<\n>>\n".to_string(),
            "q\nQ\n".to_string(),
            Vec::new(),
            None,
            Vec::new(),
        );
        let first = doc.add_outline("First", PageId(0), None).unwrap();
        doc.add_outline("Second", PageId(0), None).unwrap();
        doc.add_outline("Child", PageId(0), Some(first)).unwrap();
        assert!(matches!(
            doc.add_outline("Bad", PageId(9), None),
            Err(PlatenError::BadId)
        ));
        doc.finish().unwrap();
        let bytes = doc.sink;
        assert_eq!(count_token(&bytes, b"/Type /Outlines"), 1);
        assert_eq!(count_token(&bytes, b"/Title (First)"), 1);
        assert_eq!(count_token(&bytes, b"/Title (Child)"), 1);
        assert_eq!(count_token(&bytes, b"/Next"), 1);
        assert_eq!(count_token(&bytes, b"/Prev"), 1);
        // The first outline has one child.
        assert!(count_token(&bytes, b"/Count 1") >= 1);
    }

    #[test]
    fn builtin_fonts_are_deduplicated() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        let a = doc.builtin_font_object(BuiltinFont::Helvetica);
        let b = doc.builtin_font_object(BuiltinFont::Helvetica);
        let c = doc.builtin_font_object(BuiltinFont::Courier);
        assert_eq!(a, b);
        assert_ne!(a, c);
        doc.finish().unwrap();
        let bytes = doc.sink;
        assert_eq!(count_token(&bytes, b"/BaseFont /Helvetica\n"), 1);
        assert_eq!(count_token(&bytes, b"/BaseFont /Courier\n"), 1);
    }

    #[test]
    fn subset_glyph_assignment_allocates_chains() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        let font = doc.register_synthetic_font(LoadedFont::synthetic(&[
            ('A' as u32, 36),
            ('f' as u32, 71),
        ]));
        let first = doc.get_subset_glyph(font, 'A' as u32).unwrap();
        assert_eq!(first.subset.subset, 0);
        assert_eq!(first.glyph_byte, 0x41);
        let font_obj = doc.font_object_number(font).unwrap();
        assert_eq!(doc.subset_font_object_number(first.subset).unwrap(), font_obj);
    }

    #[test]
    fn page_transition_serializes() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        doc.add_page(
            "<<\n>>\n".to_string(),
            "q\nQ\n".to_string(),
            Vec::new(),
            Some(PageTransition {
                style: crate::types::TransitionStyle::Blinds,
                duration: 1.5,
            }),
            Vec::new(),
        );
        doc.finish().unwrap();
        let bytes = doc.sink;
        assert_eq!(count_token(&bytes, b"/Trans << /S /Blinds /D 1.5 >>"), 1);
    }

    #[test]
    fn pages_root_prediction_holds_for_many_pages() {
        let mut doc = PdfDocument::from_writer(Vec::new(), DocumentOptions::default()).unwrap();
        for _ in 0..20 {
            doc.add_page(
                "<<\n>>\n".to_string(),
                "q\nQ\n".to_string(),
                Vec::new(),
                None,
                Vec::new(),
            );
        }
        doc.finish().unwrap();
        let bytes = doc.sink;
        assert_eq!(count_token(&bytes, b"/Type /Page\n"), 20);
        assert_eq!(count_token(&bytes, b"/Type /Pages"), 1);
        assert_eq!(count_token(&bytes, b"/Count 20"), 1);
    }
}
