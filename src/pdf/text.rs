use std::collections::{BTreeMap, BTreeSet};

use pdf_writer::{Content, Name, Str};

use crate::fonts::{FaceRef, FontBook, FontEntry, SMALL_CAPS_SCALE, encode_as_gids, to_winansi_bytes};
use crate::model::RunStyle;

/// Text drawn in one face at one size, `x` relative to the start of its line.
pub(super) struct Glyphs {
    pub(super) face: FaceRef,
    pub(super) text: String,
    pub(super) size: f32,
    pub(super) x: f32,
}

/// Split a styled run into drawable pieces. Small caps: lower case becomes
/// capitals at `SMALL_CAPS_SCALE`, matching how the run was measured.
pub(super) fn glyphs_for(
    book: &FontBook,
    text: &str,
    style: RunStyle,
    size: f32,
    x: f32,
    out: &mut Vec<Glyphs>,
) {
    let face = book.face_for(style);
    if !style.small_caps {
        out.push(Glyphs {
            face,
            text: text.to_string(),
            size,
            x,
        });
        return;
    }

    let plain = RunStyle {
        small_caps: false,
        ..style
    };
    let mut x = x;
    let mut current = String::new();
    let mut lower = false;
    let mut flush = |current: &mut String, lower: bool, x: &mut f32| {
        if current.is_empty() {
            return;
        }
        let size = if lower { size * SMALL_CAPS_SCALE } else { size };
        let width = book.measure(current, plain, size);
        out.push(Glyphs {
            face,
            text: std::mem::take(current),
            size,
            x: *x,
        });
        *x += width;
    };
    for ch in text.chars() {
        let is_lower = ch.is_lowercase();
        if is_lower != lower {
            flush(&mut current, lower, &mut x);
            lower = is_lower;
        }
        if is_lower {
            current.extend(ch.to_uppercase());
        } else {
            current.push(ch);
        }
    }
    flush(&mut current, lower, &mut x);
}

/// Characters used per face, so each font can be subset to what the document shows.
pub(super) fn collect_chars(
    lines: &[(f32, f32, Vec<Glyphs>)],
    used: &mut BTreeMap<FaceRef, BTreeSet<char>>,
) {
    for (_, _, glyphs) in lines {
        for g in glyphs {
            used.entry(g.face).or_default().extend(g.text.chars());
        }
    }
}

fn encode(text: &str, entry: &FontEntry) -> Vec<u8> {
    match entry.char_to_gid.as_ref() {
        Some(map) => encode_as_gids(text, map),
        None => to_winansi_bytes(text),
    }
}

/// Draw one line of glyph pieces with its start at (`x`, `y`) in page space.
pub(super) fn show_line(
    content: &mut Content,
    fonts: &BTreeMap<FaceRef, FontEntry>,
    x: f32,
    y: f32,
    glyphs: &[Glyphs],
) {
    if glyphs.is_empty() {
        return;
    }
    content.begin_text();
    let mut cur_font: Option<(FaceRef, f32)> = None;
    let mut td_x = 0.0_f32;
    let mut td_y = 0.0_f32;
    for g in glyphs {
        let Some(entry) = fonts.get(&g.face) else {
            continue;
        };
        if cur_font != Some((g.face, g.size)) {
            content.set_font(Name(entry.pdf_name.as_bytes()), g.size);
            cur_font = Some((g.face, g.size));
        }
        let gx = x + g.x;
        content.next_line(gx - td_x, y - td_y);
        td_x = gx;
        td_y = y;
        content.show(Str(&encode(&g.text, entry)));
    }
    content.end_text();
}
