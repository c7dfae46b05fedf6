//! Font intake and subset bookkeeping. A loaded font keeps its raw
//! bytes plus a codepoint map; text rendering assigns codepoints to
//! subsets of at most 255 glyphs, and document finalization turns each
//! subset into a renumbered TrueType program with its CMaps.

use crate::error::PlatenError;
use std::collections::HashMap;
use std::fmt::Write as _;
use subsetter::GlyphRemapper;
use ttf_parser::{Face, GlyphId, Tag};

/// Slots per subset. Glyph bytes run 0..=254, with 0 reserved for notdef.
pub(crate) const MAX_SUBSET_SLOTS: usize = 255;

const REQUIRED_TABLES: [&[u8; 4]; 7] = [
    b"cmap", b"glyf", b"head", b"hhea", b"hmtx", b"loca", b"maxp",
];

pub(crate) struct LoadedFont {
    data: Vec<u8>,
    glyph_map: HashMap<u32, u16>,
    units_per_em: u16,
    postscript_name: String,
    bbox: (i16, i16, i16, i16),
    ascent: i16,
    descent: i16,
    cap_height: i16,
    italic_angle: f64,
    is_fixed_pitch: bool,
    kern_overrides: HashMap<(u32, u32), i32>,
}

impl LoadedFont {
    pub(crate) fn parse(data: Vec<u8>) -> Result<Self, PlatenError> {
        let face = Face::parse(&data, 0)
            .map_err(|e| PlatenError::InvalidFont(format!("parse failed: {}", e)))?;
        for tag in REQUIRED_TABLES {
            if face.raw_face().table(Tag::from_bytes(tag)).is_none() {
                return Err(PlatenError::InvalidFont(format!(
                    "missing required table {}",
                    String::from_utf8_lossy(tag)
                )));
            }
        }

        let mut glyph_map = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    if let Some(glyph) = subtable.glyph_index(cp) {
                        glyph_map.entry(cp).or_insert(glyph.0);
                    }
                });
            }
        }
        if glyph_map.is_empty() {
            return Err(PlatenError::InvalidFont(
                "font has no unicode cmap subtable".to_string(),
            ));
        }

        let postscript_name = face
            .names()
            .into_iter()
            .find(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME && n.is_unicode())
            .and_then(|n| n.to_string())
            .map(|n| pdf_safe_font_name(&n))
            .unwrap_or_else(|| "Embedded".to_string());

        let ascent = face.ascender();
        let bbox = face.global_bounding_box();
        Ok(Self {
            glyph_map,
            units_per_em: face.units_per_em(),
            postscript_name,
            bbox: (bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max),
            ascent,
            descent: face.descender(),
            cap_height: face.capital_height().filter(|&h| h > 0).unwrap_or(ascent),
            italic_angle: face.italic_angle().unwrap_or(0.0) as f64,
            is_fixed_pitch: face.is_monospaced(),
            kern_overrides: HashMap::new(),
            data,
        })
    }

    #[cfg(test)]
    pub(crate) fn synthetic(codepoints: &[(u32, u16)]) -> Self {
        Self {
            data: Vec::new(),
            glyph_map: codepoints.iter().copied().collect(),
            units_per_em: 1000,
            postscript_name: "Synthetic".to_string(),
            bbox: (0, -200, 1000, 800),
            ascent: 800,
            descent: -200,
            cap_height: 700,
            italic_angle: 0.0,
            is_fixed_pitch: false,
            kern_overrides: HashMap::new(),
        }
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    pub(crate) fn postscript_name(&self) -> &str {
        &self.postscript_name
    }

    pub(crate) fn bbox(&self) -> (i16, i16, i16, i16) {
        self.bbox
    }

    pub(crate) fn ascent(&self) -> i16 {
        self.ascent
    }

    pub(crate) fn descent(&self) -> i16 {
        self.descent
    }

    pub(crate) fn cap_height(&self) -> i16 {
        self.cap_height
    }

    pub(crate) fn italic_angle(&self) -> f64 {
        self.italic_angle
    }

    pub(crate) fn is_fixed_pitch(&self) -> bool {
        self.is_fixed_pitch
    }

    pub(crate) fn glyph_index(&self, codepoint: u32) -> Option<u16> {
        self.glyph_map.get(&codepoint).copied()
    }

    /// Pairwise kerning between two codepoints in font units. GPOS data
    /// is not consulted; callers needing shaped output drive the glyph
    /// based entry points with externally shaped runs.
    pub(crate) fn kerning(&self, left: u32, right: u32) -> Option<i32> {
        if let Some(&v) = self.kern_overrides.get(&(left, right)) {
            return if v != 0 { Some(v) } else { None };
        }
        let left_glyph = GlyphId(self.glyph_index(left)?);
        let right_glyph = GlyphId(self.glyph_index(right)?);
        let face = Face::parse(&self.data, 0).ok()?;
        let kern = face.tables().kern?;
        for subtable in kern.subtables {
            if !subtable.horizontal || subtable.variable {
                continue;
            }
            if let Some(v) = subtable.glyphs_kerning(left_glyph, right_glyph) {
                if v != 0 {
                    return Some(v as i32);
                }
            }
        }
        None
    }

    /// Horizontal advance for a codepoint in font units.
    pub(crate) fn advance(&self, codepoint: u32) -> Option<u16> {
        let glyph = GlyphId(self.glyph_index(codepoint)?);
        let face = Face::parse(&self.data, 0).ok()?;
        face.glyph_hor_advance(glyph)
    }

    #[cfg(test)]
    pub(crate) fn register_kerning_pair(&mut self, left: u32, right: u32, value: i32) {
        self.kern_overrides.insert((left, right), value);
    }
}

/// Strips characters that are not welcome inside a /BaseFont name.
fn pdf_safe_font_name(original: &str) -> String {
    original
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\\' && *c != '/')
        .collect()
}

/// Six letter uppercase prefix identifying a subset, per PDF 9.6.4.
pub(crate) fn subset_tag(subset_number: u32) -> String {
    let digits = format!("{:06}", subset_number % 1_000_000);
    digits
        .bytes()
        .map(|d| (b'A' + (d - b'0')) as char)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubsetAllocation {
    pub subset: u32,
    pub glyph_byte: u8,
}

struct SubsetPlan {
    // Slot index is the glyph byte; the value is the codepoint seated
    // there. Slot 0 is always notdef.
    slots: Vec<Option<u32>>,
}

impl SubsetPlan {
    fn new() -> Self {
        let mut slots = vec![None; MAX_SUBSET_SLOTS];
        slots[0] = Some(0);
        SubsetPlan { slots }
    }
}

/// Assigns codepoints to subsets. Codepoints that fit in a single byte
/// keep their own value as the glyph byte inside subset 0 so content
/// streams stay readable; everything else fills the remaining slots of
/// subset 0 from 0x7F up and then spills into overflow subsets in
/// insertion order.
pub(crate) struct FontSubsetter {
    assigned: HashMap<u32, SubsetAllocation>,
    subsets: Vec<SubsetPlan>,
}

impl FontSubsetter {
    pub(crate) fn new() -> Self {
        Self {
            assigned: HashMap::new(),
            subsets: vec![SubsetPlan::new()],
        }
    }

    pub(crate) fn subset_count(&self) -> usize {
        self.subsets.len()
    }

    pub(crate) fn assign(&mut self, codepoint: u32) -> SubsetAllocation {
        if let Some(&found) = self.assigned.get(&codepoint) {
            return found;
        }
        let allocation = self.place(codepoint);
        self.assigned.insert(codepoint, allocation);
        allocation
    }

    fn place(&mut self, codepoint: u32) -> SubsetAllocation {
        if (1..=0xFE).contains(&codepoint) {
            let slot = codepoint as usize;
            if self.subsets[0].slots[slot].is_none() {
                self.subsets[0].slots[slot] = Some(codepoint);
                return SubsetAllocation {
                    subset: 0,
                    glyph_byte: slot as u8,
                };
            }
        }
        // Wide codepoints take the slots above ASCII in subset 0 first.
        for slot in 0x7F..MAX_SUBSET_SLOTS {
            if self.subsets[0].slots[slot].is_none() {
                self.subsets[0].slots[slot] = Some(codepoint);
                return SubsetAllocation {
                    subset: 0,
                    glyph_byte: slot as u8,
                };
            }
        }
        let last = self.subsets.len() - 1;
        let start = if last == 0 { 1 } else { last };
        for index in start..self.subsets.len() {
            if let Some(slot) = self.subsets[index].slots.iter().position(|s| s.is_none()) {
                self.subsets[index].slots[slot] = Some(codepoint);
                return SubsetAllocation {
                    subset: index as u32,
                    glyph_byte: slot as u8,
                };
            }
        }
        let mut plan = SubsetPlan::new();
        plan.slots[1] = Some(codepoint);
        self.subsets.push(plan);
        SubsetAllocation {
            subset: (self.subsets.len() - 1) as u32,
            glyph_byte: 1,
        }
    }

    /// Occupied entries of one subset as (glyph byte, codepoint) pairs
    /// sorted by byte, notdef excluded.
    pub(crate) fn subset_entries(&self, subset: u32) -> Vec<(u8, u32)> {
        let Some(plan) = self.subsets.get(subset as usize) else {
            return Vec::new();
        };
        plan.slots
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(byte, cp)| cp.map(|cp| (byte as u8, cp)))
            .collect()
    }

    pub(crate) fn glyph_count(&self, subset: u32) -> usize {
        self.subsets
            .get(subset as usize)
            .map(|p| p.slots.iter().filter(|s| s.is_some()).count())
            .unwrap_or(0)
    }
}

pub(crate) struct GeneratedSubset {
    /// Renumbered TrueType program, uncompressed.
    pub program: Vec<u8>,
    /// Glyph byte to CID assignments for the encoding CMap.
    pub cids: Vec<(u8, u16)>,
    /// Advances in font units, indexed by CID.
    pub widths: Vec<u16>,
}

/// Builds the subset font program for one subset. Glyph indices are
/// renumbered 0..count-1 in glyph byte order.
pub(crate) fn generate_subset(
    font: &LoadedFont,
    entries: &[(u8, u32)],
) -> Result<GeneratedSubset, PlatenError> {
    let face = Face::parse(font.data(), 0)
        .map_err(|e| PlatenError::InvalidFont(format!("parse failed: {}", e)))?;
    let mut remapper = GlyphRemapper::new();
    remapper.remap(0);
    let mut cids = Vec::with_capacity(entries.len());
    for &(byte, codepoint) in entries {
        let old_gid = font.glyph_index(codepoint).unwrap_or(0);
        let cid = remapper.remap(old_gid);
        cids.push((byte, cid));
    }
    let widths = remapper
        .remapped_gids()
        .map(|gid| face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0))
        .collect();

    let subset = subsetter::subset(font.data(), 0, &remapper)
        .map_err(|e| PlatenError::InvalidFont(format!("subsetting failed: {:?}", e)))?;
    let program: &[u8] = subset.as_ref();
    Ok(GeneratedSubset {
        program: program.to_vec(),
        cids,
        widths,
    })
}

/// One byte CMap stream mapping glyph bytes to CIDs in the subset font.
pub(crate) fn encoding_cmap(cmap_name: &str, cids: &[(u8, u16)]) -> String {
    let mut out = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> def\n",
    );
    let _ = writeln!(out, "/CMapName /{} def", cmap_name);
    out.push_str("/CMapType 1 def\n1 begincodespacerange\n<00> <FF>\nendcodespacerange\n");
    // The CMap grammar allows at most 100 entries per block.
    for chunk in cids.chunks(100) {
        let _ = writeln!(out, "{} begincidchar", chunk.len());
        for &(byte, cid) in chunk {
            let _ = writeln!(out, "<{:02X}> {}", byte, cid);
        }
        out.push_str("endcidchar\n");
    }
    out.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    out
}

/// ToUnicode CMap for one subset, mapping glyph bytes back to the
/// codepoints they stand for.
pub(crate) fn tounicode_cmap(entries: &[(u8, u32)]) -> String {
    let mut out = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <00> <FF>\n\
         endcodespacerange\n",
    );
    for chunk in entries.chunks(100) {
        let _ = writeln!(out, "{} beginbfchar", chunk.len());
        for &(byte, codepoint) in chunk {
            let mut target = String::new();
            if let Some(c) = char::from_u32(codepoint) {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    let _ = write!(target, "{:04X}", unit);
                }
            } else {
                target.push_str("FFFD");
            }
            let _ = writeln!(out, "<{:02X}> <{}>", byte, target);
        }
        out.push_str("endbfchar\n");
    }
    out.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_keeps_its_own_byte() {
        let mut subsetter = FontSubsetter::new();
        let a = subsetter.assign('A' as u32);
        let f = subsetter.assign('f' as u32);
        assert_eq!(a, SubsetAllocation { subset: 0, glyph_byte: 0x41 });
        assert_eq!(f, SubsetAllocation { subset: 0, glyph_byte: 0x66 });
        // Repeat assignment is stable.
        assert_eq!(subsetter.assign('A' as u32), a);
    }

    #[test]
    fn wide_codepoints_fill_the_upper_slots() {
        let mut subsetter = FontSubsetter::new();
        let first = subsetter.assign(0x4E2D);
        let second = subsetter.assign(0x6587);
        assert_eq!(first.subset, 0);
        assert_eq!(first.glyph_byte, 0x7F);
        assert_eq!(second.glyph_byte, 0x80);
    }

    #[test]
    fn three_hundred_codepoints_need_at_least_two_subsets() {
        let mut subsetter = FontSubsetter::new();
        for i in 0..300u32 {
            subsetter.assign(0x4E00 + i);
        }
        assert!(subsetter.subset_count() >= 2);
        for subset in 0..subsetter.subset_count() as u32 {
            assert!(subsetter.glyph_count(subset) <= MAX_SUBSET_SLOTS);
        }
    }

    #[test]
    fn subset_entries_are_sorted_and_skip_notdef() {
        let mut subsetter = FontSubsetter::new();
        subsetter.assign('z' as u32);
        subsetter.assign('a' as u32);
        let entries = subsetter.subset_entries(0);
        assert_eq!(entries, vec![(0x61, 'a' as u32), (0x7A, 'z' as u32)]);
    }

    #[test]
    fn subset_tags_advance_alphabetically() {
        assert_eq!(subset_tag(0), "AAAAAA");
        assert_eq!(subset_tag(1), "AAAAAB");
        assert_eq!(subset_tag(10), "AAAABA");
    }

    #[test]
    fn encoding_cmap_lists_every_cid() {
        let cmap = encoding_cmap("Platen-0-0", &[(0x41, 1), (0x66, 2)]);
        assert!(cmap.contains("/CMapName /Platen-0-0 def"));
        assert!(cmap.contains("2 begincidchar"));
        assert!(cmap.contains("<41> 1"));
        assert!(cmap.contains("<66> 2"));
        assert!(cmap.contains("<00> <FF>"));
    }

    #[test]
    fn tounicode_cmap_round_trips_codepoints() {
        let cmap = tounicode_cmap(&[(0x41, 'A' as u32), (0x7F, 0x1F600)]);
        assert!(cmap.contains("<41> <0041>"));
        // Emoji outside the BMP becomes a surrogate pair.
        assert!(cmap.contains("<7F> <D83DDE00>"));
    }

    #[test]
    fn synthetic_kerning_overrides() {
        let mut font = LoadedFont::synthetic(&[('A' as u32, 36), ('f' as u32, 71)]);
        assert_eq!(font.kerning('A' as u32, 'f' as u32), None);
        font.register_kerning_pair('A' as u32, 'f' as u32, -50);
        assert_eq!(font.kerning('A' as u32, 'f' as u32), Some(-50));
    }
}
