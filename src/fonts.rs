use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use pdf_writer::{Name, Pdf, Rect, Ref};
use ttf_parser::Face;

use crate::error::RenderError;
use crate::model::RunStyle;

/// Small capitals are set as capitals at this fraction of the run size.
pub const SMALL_CAPS_SCALE: f32 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FaceStyle {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FaceStyle {
    pub fn of(style: RunStyle) -> Self {
        match (style.bold, style.italic) {
            (true, true) => FaceStyle::BoldItalic,
            (true, false) => FaceStyle::Bold,
            (false, true) => FaceStyle::Italic,
            (false, false) => FaceStyle::Regular,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StandardFamily {
    Times,
    Helvetica,
    Courier,
}

impl StandardFamily {
    pub fn base_font(self, style: FaceStyle) -> &'static str {
        use FaceStyle::*;
        match (self, style) {
            (StandardFamily::Times, Regular) => "Times-Roman",
            (StandardFamily::Times, Bold) => "Times-Bold",
            (StandardFamily::Times, Italic) => "Times-Italic",
            (StandardFamily::Times, BoldItalic) => "Times-BoldItalic",
            (StandardFamily::Helvetica, Regular) => "Helvetica",
            (StandardFamily::Helvetica, Bold) => "Helvetica-Bold",
            (StandardFamily::Helvetica, Italic) => "Helvetica-Oblique",
            (StandardFamily::Helvetica, BoldItalic) => "Helvetica-BoldOblique",
            (StandardFamily::Courier, Regular) => "Courier",
            (StandardFamily::Courier, Bold) => "Courier-Bold",
            (StandardFamily::Courier, Italic) => "Courier-Oblique",
            (StandardFamily::Courier, BoldItalic) => "Courier-BoldOblique",
        }
    }

    /// Map a typeface name onto a standard family; `false` when the match is only an approximation.
    fn for_typeface(name: &str) -> (Self, bool) {
        let lower = name.trim().to_lowercase();
        if lower.starts_with("times") {
            (StandardFamily::Times, true)
        } else if lower.starts_with("helvetica") || lower.starts_with("arial") {
            (StandardFamily::Helvetica, true)
        } else if lower.starts_with("courier") {
            (StandardFamily::Courier, true)
        } else if ["mono", "consol", "code", "typewriter"]
            .iter()
            .any(|k| lower.contains(k))
        {
            (StandardFamily::Courier, false)
        } else if ["sans", "grotesk", "gothic", "verdana", "calibri", "futura", "gill"]
            .iter()
            .any(|k| lower.contains(k))
        {
            (StandardFamily::Helvetica, false)
        } else {
            (StandardFamily::Times, false)
        }
    }
}

/// Which concrete face sets a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FaceRef {
    Standard(StandardFamily, FaceStyle),
    TrueType(FaceStyle),
}

// Advance widths at 1000 units/em for ASCII 32..=126, from the standard AFM files.
#[rustfmt::skip]
const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778,
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500,
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500,
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

#[rustfmt::skip]
const TIMES_ITALIC: [u16; 95] = [
    250, 333, 420, 500, 500, 833, 778, 214, 333, 333, 500, 675, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 675, 675, 675, 500,
    920, 611, 611, 667, 722, 611, 611, 722, 722, 333, 444, 667, 556, 833, 667, 722,
    611, 722, 611, 500, 556, 722, 611, 833, 611, 556, 556, 389, 278, 389, 422, 500,
    333, 500, 500, 444, 500, 444, 278, 500, 500, 278, 278, 444, 278, 722, 500, 500,
    500, 500, 389, 389, 278, 500, 444, 667, 444, 444, 389, 400, 275, 400, 541,
];

#[rustfmt::skip]
const TIMES_BOLD_ITALIC: [u16; 95] = [
    250, 389, 555, 500, 500, 833, 778, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    832, 667, 667, 667, 722, 667, 667, 722, 778, 389, 500, 667, 611, 889, 722, 722,
    611, 722, 667, 556, 611, 722, 667, 889, 667, 611, 611, 333, 278, 333, 570, 500,
    333, 500, 500, 444, 500, 444, 333, 500, 556, 278, 278, 500, 278, 778, 556, 500,
    500, 500, 389, 389, 278, 556, 444, 667, 500, 444, 389, 348, 220, 348, 570,
];

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

const COURIER_ADVANCE: f32 = 600.0;

/// Base letter for accented Latin-1 capitals and lower case, measured as the base glyph.
fn latin1_base(ch: char) -> Option<char> {
    Some(match ch {
        'À'..='Å' => 'A',
        'Ç' => 'C',
        'È'..='Ë' => 'E',
        'Ì'..='Ï' => 'I',
        'Ñ' => 'N',
        'Ò'..='Ö' | 'Ø' => 'O',
        'Ù'..='Ü' => 'U',
        'Ý' => 'Y',
        'à'..='å' => 'a',
        'ç' => 'c',
        'è'..='ë' => 'e',
        'ì'..='ï' => 'i',
        'ñ' => 'n',
        'ò'..='ö' | 'ø' => 'o',
        'ù'..='ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    })
}

fn standard_advance(family: StandardFamily, style: FaceStyle, ch: char) -> f32 {
    if family == StandardFamily::Courier {
        return COURIER_ADVANCE;
    }
    let table = match (family, style) {
        (StandardFamily::Times, FaceStyle::Regular) => &TIMES_ROMAN,
        (StandardFamily::Times, FaceStyle::Bold) => &TIMES_BOLD,
        (StandardFamily::Times, FaceStyle::Italic) => &TIMES_ITALIC,
        (StandardFamily::Times, FaceStyle::BoldItalic) => &TIMES_BOLD_ITALIC,
        (_, FaceStyle::Regular | FaceStyle::Italic) => &HELVETICA,
        (_, FaceStyle::Bold | FaceStyle::BoldItalic) => &HELVETICA_BOLD,
    };
    let times = family == StandardFamily::Times;
    let bold = matches!(style, FaceStyle::Bold | FaceStyle::BoldItalic);

    let ch = if ch == '\u{00A0}' { ' ' } else { ch };
    let ch = latin1_base(ch).unwrap_or(ch);
    if (' '..='~').contains(&ch) {
        return table[ch as usize - 32] as f32;
    }
    let w = match ch {
        '\u{2018}' | '\u{2019}' | '\u{201A}' => {
            if times {
                333
            } else if bold {
                278
            } else {
                222
            }
        }
        '\u{201C}' | '\u{201D}' | '\u{201E}' => match (times, bold) {
            (true, false) => 444,
            (true, true) => 500,
            (false, false) => 333,
            (false, true) => 500,
        },
        '\u{2013}' => {
            if times {
                500
            } else {
                556
            }
        }
        '\u{2014}' | '\u{2026}' | '\u{2030}' => 1000,
        '\u{2022}' => 350,
        '\u{2020}' | '\u{2021}' => {
            if times {
                500
            } else {
                556
            }
        }
        // not in WinAnsi: set as '?'
        c if char_to_winansi(c) == 0 => table['?' as usize - 32],
        _ => {
            if times {
                500
            } else {
                556
            }
        }
    };
    w as f32
}

/// Characters whose advances are read once at load time; others are looked up on demand.
const CACHED_RANGES: [(u32, u32); 2] = [(0x20, 0x250), (0x2000, 0x2070)];

#[derive(Clone)]
pub struct TrueTypeFace {
    pub(crate) name: String,
    pub(crate) data: Arc<Vec<u8>>,
    pub(crate) index: u32,
    units_per_em: f32,
    cached: Vec<f32>,
    missing_advance: f32,
}

impl fmt::Debug for TrueTypeFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrueTypeFace")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn font_family_name(face: &Face) -> Option<String> {
    // ID 1 (Family); the typographic family (16) merges optical sizes and widths.
    for name in face.names() {
        if name.name_id == ttf_parser::name_id::FAMILY
            && name.is_unicode()
            && let Some(s) = name.to_string()
        {
            return Some(s);
        }
    }
    None
}

fn glyph_advance_1000(face: &Face, units: f32, ch: char) -> Option<f32> {
    face.glyph_index(ch)
        .and_then(|gid| face.glyph_hor_advance(gid))
        .map(|adv| adv as f32 / units * 1000.0)
}

impl TrueTypeFace {
    pub fn from_bytes(name: &str, data: Vec<u8>, index: u32) -> Result<Self, RenderError> {
        let face = Face::parse(&data, index).map_err(|e| RenderError::Font {
            face: name.to_string(),
            message: e.to_string(),
        })?;
        let units = face.units_per_em() as f32;
        let missing_advance = face
            .glyph_hor_advance(ttf_parser::GlyphId(0))
            .map(|adv| adv as f32 / units * 1000.0)
            .unwrap_or(500.0);

        let mut cached = Vec::new();
        for (start, end) in CACHED_RANGES {
            for cp in start..end {
                let w = char::from_u32(cp)
                    .and_then(|ch| glyph_advance_1000(&face, units, ch))
                    .unwrap_or(missing_advance);
                cached.push(w);
            }
        }

        Ok(TrueTypeFace {
            name: name.replace(' ', ""),
            data: Arc::new(data),
            index,
            units_per_em: units,
            cached,
            missing_advance,
        })
    }

    fn advance_1000(&self, ch: char) -> f32 {
        let cp = ch as u32;
        let mut offset = 0;
        for (start, end) in CACHED_RANGES {
            if (start..end).contains(&cp) {
                return self.cached[offset + (cp - start) as usize];
            }
            offset += (end - start) as usize;
        }
        Face::parse(&self.data, self.index)
            .ok()
            .and_then(|face| glyph_advance_1000(&face, self.units_per_em, ch))
            .unwrap_or(self.missing_advance)
    }
}

/// Glyph metrics for one typeface family. Measurement never touches the
/// filesystem: standard families use built-in tables, TrueType families the
/// font bytes supplied at construction.
#[derive(Clone, Debug)]
pub struct FontBook {
    family: String,
    standard: StandardFamily,
    truetype: BTreeMap<FaceStyle, TrueTypeFace>,
}

impl FontBook {
    pub fn standard(family: &str) -> Self {
        let (standard, exact) = StandardFamily::for_typeface(family);
        if !exact {
            log::warn!(
                "Typeface {family:?} has no built-in metrics, setting in {}",
                standard.base_font(FaceStyle::Regular)
            );
        }
        FontBook {
            family: family.to_string(),
            standard,
            truetype: BTreeMap::new(),
        }
    }

    /// Measure and embed the family from TrueType/OpenType bytes. Styles not
    /// supplied fall back to the regular face.
    pub fn with_truetype(
        family: &str,
        faces: Vec<(FaceStyle, Vec<u8>, u32)>,
    ) -> Result<Self, RenderError> {
        let (standard, _) = StandardFamily::for_typeface(family);
        let mut truetype = BTreeMap::new();
        for (style, data, index) in faces {
            let name = match style {
                FaceStyle::Regular => family.to_string(),
                FaceStyle::Bold => format!("{family}-Bold"),
                FaceStyle::Italic => format!("{family}-Italic"),
                FaceStyle::BoldItalic => format!("{family}-BoldItalic"),
            };
            truetype.insert(style, TrueTypeFace::from_bytes(&name, data, index)?);
        }
        if !truetype.is_empty() && !truetype.contains_key(&FaceStyle::Regular) {
            return Err(RenderError::Font {
                face: family.to_string(),
                message: "no regular face supplied".into(),
            });
        }
        Ok(FontBook {
            family: family.to_string(),
            standard,
            truetype,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn is_embedded(&self) -> bool {
        !self.truetype.is_empty()
    }

    pub fn face_for(&self, style: RunStyle) -> FaceRef {
        let face_style = FaceStyle::of(style);
        if style.code {
            return FaceRef::Standard(StandardFamily::Courier, face_style);
        }
        if self.truetype.contains_key(&face_style) {
            FaceRef::TrueType(face_style)
        } else if self.truetype.contains_key(&FaceStyle::Regular) {
            FaceRef::TrueType(FaceStyle::Regular)
        } else {
            FaceRef::Standard(self.standard, face_style)
        }
    }

    pub(crate) fn truetype_face(&self, style: FaceStyle) -> Option<&TrueTypeFace> {
        self.truetype.get(&style)
    }

    pub fn advance_1000(&self, face: FaceRef, ch: char) -> f32 {
        match face {
            FaceRef::Standard(family, style) => standard_advance(family, style, ch),
            FaceRef::TrueType(style) => self
                .truetype
                .get(&style)
                .map(|f| f.advance_1000(ch))
                .unwrap_or_else(|| standard_advance(self.standard, style, ch)),
        }
    }

    /// Width of `text` in points. Small caps: lower case is measured as
    /// capitals at `SMALL_CAPS_SCALE`.
    pub fn measure(&self, text: &str, style: RunStyle, size: f32) -> f32 {
        let face = self.face_for(style);
        let mut width = 0.0;
        for ch in text.chars() {
            if style.small_caps && ch.is_lowercase() {
                for upper in ch.to_uppercase() {
                    width += self.advance_1000(face, upper) * size * SMALL_CAPS_SCALE / 1000.0;
                }
            } else {
                width += self.advance_1000(face, ch) * size / 1000.0;
            }
        }
        width
    }

    pub fn space_width(&self, style: RunStyle, size: f32) -> f32 {
        self.advance_1000(self.face_for(style), ' ') * size / 1000.0
    }
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("ttf" | "otf" | "ttc")
    )
}

fn is_font_collection(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ttc"))
}

/// Every font file under `dirs`, in sorted order so lookups are reproducible.
fn font_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut visited = BTreeSet::new();
    let mut stack: Vec<PathBuf> = dirs.iter().rev().cloned().collect();
    while let Some(dir) = stack.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();
        for path in paths.iter().rev() {
            if path.is_dir() {
                stack.push(path.clone());
            }
        }
        files.extend(paths.into_iter().filter(|p| is_font_file(p)));
    }
    files
}

/// Scan font directories for the family's four faces. Falls back to the
/// built-in standard metrics when no regular face is found.
pub fn load_family(dirs: &[PathBuf], family: &str) -> FontBook {
    let t0 = std::time::Instant::now();
    let wanted = family.trim().to_lowercase();
    let mut found: BTreeMap<FaceStyle, (PathBuf, u32)> = BTreeMap::new();
    let files = font_files(dirs);

    for path in &files {
        let Ok(file) = std::fs::File::open(path) else {
            continue;
        };
        let Ok(data) = (unsafe { Mmap::map(&file) }) else {
            continue;
        };
        let face_count = if is_font_collection(path) {
            ttf_parser::fonts_in_collection(&data).unwrap_or(1)
        } else {
            1
        };
        for index in 0..face_count {
            let Ok(face) = Face::parse(&data, index) else {
                continue;
            };
            if !font_family_name(&face).is_some_and(|n| n.to_lowercase() == wanted) {
                continue;
            }
            let style = match (face.is_bold(), face.is_italic()) {
                (true, true) => FaceStyle::BoldItalic,
                (true, false) => FaceStyle::Bold,
                (false, true) => FaceStyle::Italic,
                (false, false) => FaceStyle::Regular,
            };
            found.entry(style).or_insert((path.clone(), index));
        }
    }

    log::info!(
        "Font scan: {:.1}ms, {} files, {} faces of {family:?}",
        t0.elapsed().as_secs_f64() * 1000.0,
        files.len(),
        found.len(),
    );

    if !found.contains_key(&FaceStyle::Regular) {
        log::warn!("Font not found: {family:?} in {} dirs", dirs.len());
        return FontBook::standard(family);
    }

    let mut faces = Vec::new();
    for (style, (path, index)) in found {
        match std::fs::read(&path) {
            Ok(data) => faces.push((style, data, index)),
            Err(e) => log::warn!("Cannot read {}: {e}", path.display()),
        }
    }
    FontBook::with_truetype(family, faces).unwrap_or_else(|e| {
        log::warn!("{e}, using built-in metrics");
        FontBook::standard(family)
    })
}

/// Map a single Unicode char to its WinAnsi byte, or 0 if unmappable.
fn char_to_winansi(c: char) -> u8 {
    match c as u32 {
        0x0020..=0x007E => c as u8,
        0x00A0..=0x00FF => c as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => 0,
    }
}

/// Convert text to WinAnsi (Windows-1252) bytes; unmappable characters become `?`.
pub(crate) fn to_winansi_bytes(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match char_to_winansi(c) {
            0 => b'?',
            b => b,
        })
        .collect()
}

/// Encode text as big-endian 2-byte glyph IDs for CIDFont content streams.
pub(crate) fn encode_as_gids(text: &str, char_to_gid: &BTreeMap<char, u16>) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2);
    for ch in text.chars() {
        let gid = char_to_gid.get(&ch).copied().unwrap_or(0);
        out.push((gid >> 8) as u8);
        out.push((gid & 0xFF) as u8);
    }
    out
}

pub(crate) struct FontEntry {
    pub(crate) pdf_name: String,
    pub(crate) font_ref: Ref,
    pub(crate) char_to_gid: Option<BTreeMap<char, u16>>,
}

/// Embed a TrueType/OpenType face as a CIDFont (Type0 composite) with Identity-H encoding,
/// subset to the characters the document uses.
fn embed_truetype(
    pdf: &mut Pdf,
    font_ref: Ref,
    tt: &TrueTypeFace,
    used_chars: &BTreeSet<char>,
    alloc: &mut impl FnMut() -> Ref,
) -> Result<BTreeMap<char, u16>, RenderError> {
    let font_error = |message: String| RenderError::Font {
        face: tt.name.clone(),
        message,
    };
    let face = Face::parse(&tt.data, tt.index).map_err(|e| font_error(e.to_string()))?;

    let units = face.units_per_em() as f32;
    let ascent = face.ascender() as f32 / units * 1000.0;
    let descent = face.descender() as f32 / units * 1000.0;
    let cap_height = face
        .capital_height()
        .map(|h| h as f32 / units * 1000.0)
        .unwrap_or(700.0);
    let bb = face.global_bounding_box();
    let bbox = Rect::new(
        bb.x_min as f32 / units * 1000.0,
        bb.y_min as f32 / units * 1000.0,
        bb.x_max as f32 / units * 1000.0,
        bb.y_max as f32 / units * 1000.0,
    );

    // sorted chars give the same glyph numbering on every run
    let mut remapper = subsetter::GlyphRemapper::new();
    let mut char_to_gid = BTreeMap::new();
    let mut gid_widths: Vec<(u16, f32)> = Vec::new();
    for &ch in used_chars {
        if let Some(gid) = face.glyph_index(ch) {
            let new_gid = remapper.remap(gid.0);
            char_to_gid.insert(ch, new_gid);
            let w = face
                .glyph_hor_advance(gid)
                .map(|adv| adv as f32 / units * 1000.0)
                .unwrap_or(0.0);
            gid_widths.push((new_gid, w));
        }
    }
    gid_widths.sort_by_key(|&(gid, _)| gid);
    gid_widths.dedup_by_key(|&mut (gid, _)| gid);

    let subset_data = subsetter::subset(&tt.data, tt.index, &remapper).unwrap_or_else(|e| {
        log::warn!("Font subsetting failed for {}: {e}, embedding full font", tt.name);
        tt.data.to_vec()
    });
    let data_len =
        i32::try_from(subset_data.len()).map_err(|_| font_error("font too large".into()))?;

    let descriptor_ref = alloc();
    let data_ref = alloc();
    pdf.stream(data_ref, &subset_data)
        .pair(Name(b"Length1"), data_len);

    let ps_name = tt.name.as_bytes();
    pdf.font_descriptor(descriptor_ref)
        .name(Name(ps_name))
        .flags(pdf_writer::types::FontFlags::NON_SYMBOLIC)
        .bbox(bbox)
        .italic_angle(0.0)
        .ascent(ascent)
        .descent(descent)
        .cap_height(cap_height)
        .stem_v(80.0)
        .font_file2(data_ref);

    let cid_font_ref = alloc();
    let system_info = pdf_writer::types::SystemInfo {
        registry: pdf_writer::Str(b"Adobe"),
        ordering: pdf_writer::Str(b"Identity"),
        supplement: 0,
    };
    {
        let mut cid = pdf.cid_font(cid_font_ref);
        cid.subtype(pdf_writer::types::CidFontType::Type2);
        cid.base_font(Name(ps_name));
        cid.system_info(system_info);
        cid.font_descriptor(descriptor_ref);
        cid.default_width(0.0);
        cid.cid_to_gid_map_predefined(Name(b"Identity"));
        if !gid_widths.is_empty() {
            let mut w = cid.widths();
            for &(gid, width) in &gid_widths {
                w.consecutive(gid, [width]);
            }
        }
    }

    let tounicode_ref = alloc();
    let cmap_name = format!("{}-UTF16", tt.name);
    let mut cmap = pdf_writer::types::UnicodeCmap::new(
        Name(cmap_name.as_bytes()),
        pdf_writer::types::SystemInfo {
            registry: pdf_writer::Str(b"Adobe"),
            ordering: pdf_writer::Str(b"Identity"),
            supplement: 0,
        },
    );
    for (&ch, &new_gid) in &char_to_gid {
        cmap.pair(new_gid, ch);
    }
    let cmap_data = cmap.finish();
    pdf.stream(tounicode_ref, cmap_data.as_slice());

    pdf.type0_font(font_ref)
        .base_font(Name(ps_name))
        .encoding_predefined(Name(b"Identity-H"))
        .descendant_font(cid_font_ref)
        .to_unicode(tounicode_ref);

    Ok(char_to_gid)
}

pub(crate) fn register_font(
    pdf: &mut Pdf,
    book: &FontBook,
    face: FaceRef,
    pdf_name: String,
    alloc: &mut impl FnMut() -> Ref,
    used_chars: &BTreeSet<char>,
) -> Result<FontEntry, RenderError> {
    let t0 = std::time::Instant::now();
    let font_ref = alloc();

    let char_to_gid = match face {
        FaceRef::TrueType(style) => {
            let tt = book.truetype_face(style).ok_or_else(|| RenderError::Font {
                face: format!("{} {style:?}", book.family()),
                message: "face not loaded".into(),
            })?;
            Some(embed_truetype(pdf, font_ref, tt, used_chars, alloc)?)
        }
        FaceRef::Standard(family, style) => {
            pdf.type1_font(font_ref)
                .base_font(Name(family.base_font(style).as_bytes()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            None
        }
    };

    log::debug!(
        "register_font: {face:?} as /{pdf_name} → {:.1}ms",
        t0.elapsed().as_secs_f64() * 1000.0,
    );

    Ok(FontEntry {
        pdf_name,
        font_ref,
        char_to_gid,
    })
}
