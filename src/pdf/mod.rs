mod text;

use std::collections::{BTreeMap, BTreeSet};

use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref, TextStr};

use crate::error::RenderError;
use crate::fonts::{FaceRef, FontBook, FontEntry, register_font};
use crate::model::{AssembledPage, DocumentLayout, FolioPosition, PageSide, RunStyle};
use text::{Glyphs, collect_chars, glyphs_for, show_line};

/// Largest interior file the print service accepts.
pub const MAX_OUTPUT_BYTES: usize = 500 * 1024 * 1024;

/// Running heads and folios are set at this fraction of the body size.
const FURNITURE_SCALE: f32 = 0.9;

/// Turns a finished layout into document bytes.
pub trait RenderAdapter {
    fn render(&self, layout: &DocumentLayout) -> Result<Vec<u8>, RenderError>;
}

/// Writes PDF with the faces in its `FontBook`: standard faces as Type1 with
/// WinAnsi encoding, TrueType faces subset and embedded as CID fonts.
pub struct PdfRenderer {
    fonts: FontBook,
}

/// A line of glyphs at an absolute (x, baseline) position.
type DrawnLine = (f32, f32, Vec<Glyphs>);

impl PdfRenderer {
    pub fn new(fonts: FontBook) -> Self {
        PdfRenderer { fonts }
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    fn page_lines(&self, layout: &DocumentLayout, page: &AssembledPage) -> Vec<DrawnLine> {
        let g = &layout.geometry;
        let left = g.text_left(page.side);
        let top = g.height - g.margin_top;
        let mut drawn = Vec::with_capacity(page.page.lines.len() + 2);

        for placed in &page.page.lines {
            let mut glyphs = Vec::new();
            for run in &placed.line.runs {
                glyphs_for(
                    &self.fonts,
                    &run.text,
                    run.style,
                    run.font_size,
                    run.x,
                    &mut glyphs,
                );
            }
            drawn.push((left + placed.x, top - placed.baseline, glyphs));
        }

        let size = layout.font_size * FURNITURE_SCALE;
        let head_y = g.height - g.margin_top / 2.0 - size * 0.3;
        let foot_y = g.margin_bottom / 2.0 - size * 0.3;

        if let Some(head) = &page.running_head {
            let style = RunStyle::italic();
            let width = self.fonts.measure(head, style, size);
            let mut glyphs = Vec::new();
            glyphs_for(&self.fonts, head, style, size, 0.0, &mut glyphs);
            drawn.push((left + (g.text_width() - width) / 2.0, head_y, glyphs));
        }

        if let Some(folio) = &page.folio {
            let style = RunStyle::ROMAN;
            let width = self.fonts.measure(&folio.text, style, size);
            let (x, y) = match folio.position {
                FolioPosition::BottomCenter => (left + (g.text_width() - width) / 2.0, foot_y),
                FolioPosition::TopOutside => match page.side {
                    PageSide::Recto => (left + g.text_width() - width, head_y),
                    PageSide::Verso => (left, head_y),
                },
            };
            let mut glyphs = Vec::new();
            glyphs_for(&self.fonts, &folio.text, style, size, 0.0, &mut glyphs);
            drawn.push((x, y, glyphs));
        }

        drawn
    }
}

impl RenderAdapter for PdfRenderer {
    fn render(&self, layout: &DocumentLayout) -> Result<Vec<u8>, RenderError> {
        let t0 = std::time::Instant::now();
        let mut pdf = Pdf::new();
        let mut next_id = 1i32;
        let mut alloc = || {
            let r = Ref::new(next_id);
            next_id += 1;
            r
        };

        let catalog_id = alloc();
        let pages_id = alloc();
        let info_id = alloc();

        // Phase 1: position every glyph run
        let drawn: Vec<Vec<DrawnLine>> = layout
            .pages
            .iter()
            .map(|page| self.page_lines(layout, page))
            .collect();
        let t_layout = t0.elapsed();

        // Phase 2: register the faces in use, in a fixed order
        let mut used: BTreeMap<FaceRef, BTreeSet<char>> = BTreeMap::new();
        for lines in &drawn {
            collect_chars(lines, &mut used);
        }
        let mut fonts: BTreeMap<FaceRef, FontEntry> = BTreeMap::new();
        for (i, (face, chars)) in used.iter().enumerate() {
            let entry = register_font(
                &mut pdf,
                &self.fonts,
                *face,
                format!("F{}", i + 1),
                &mut alloc,
                chars,
            )?;
            fonts.insert(*face, entry);
        }
        let t_fonts = t0.elapsed();

        // Phase 3: pages and content streams
        let n = drawn.len();
        let page_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();
        let content_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();

        for (i, lines) in drawn.iter().enumerate() {
            let mut content = Content::new();
            for (x, y, glyphs) in lines {
                show_line(&mut content, &fonts, *x, *y, glyphs);
            }
            let raw = content.finish();
            let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
            pdf.stream(content_ids[i], &compressed)
                .filter(Filter::FlateDecode);
        }

        pdf.catalog(catalog_id).pages(pages_id);
        pdf.pages(pages_id)
            .kids(page_ids.iter().copied())
            .count(n as i32);
        pdf.document_info(info_id)
            .title(TextStr(&layout.title))
            .producer(TextStr(concat!("manuscript-pdf ", env!("CARGO_PKG_VERSION"))));

        let font_pairs: Vec<(&str, Ref)> = fonts
            .values()
            .map(|e| (e.pdf_name.as_str(), e.font_ref))
            .collect();
        let g = &layout.geometry;
        for i in 0..n {
            let mut page = pdf.page(page_ids[i]);
            page.media_box(Rect::new(0.0, 0.0, g.width, g.height))
                .parent(pages_id)
                .contents(content_ids[i]);
            let mut resources = page.resources();
            let mut page_fonts = resources.fonts();
            for (name, font_ref) in &font_pairs {
                page_fonts.pair(Name(name.as_bytes()), *font_ref);
            }
        }

        let bytes = pdf.finish();
        let t_total = t0.elapsed();

        log::info!(
            "Render phases: layout={:.1}ms, font_embed={:.1}ms, assembly={:.1}ms ({} pages, {} faces)",
            t_layout.as_secs_f64() * 1000.0,
            (t_fonts - t_layout).as_secs_f64() * 1000.0,
            (t_total - t_fonts).as_secs_f64() * 1000.0,
            n,
            fonts.len(),
        );

        if bytes.len() > MAX_OUTPUT_BYTES {
            return Err(RenderError::OutputTooLarge {
                bytes: bytes.len(),
                max: MAX_OUTPUT_BYTES,
            });
        }
        Ok(bytes)
    }
}
