mod lines;

use crate::assemble::FolioCounter;
use crate::error::LayoutError;
use crate::fonts::FontBook;
use crate::model::{
    BlockKind, ChapterMark, ContentBlock, Line, LineRole, MatterPart, Page, PageKind, PlacedLine,
    Region, RunStyle, TextRun,
};
use crate::params::{ChapterStart, FormattingParameters};
use lines::{Measure, break_lines};

/// Tolerance for accumulated float error when testing whether a line fits.
const FIT_EPSILON: f32 = 0.01;

/// Title pages start this far down the text block.
const TITLE_SINK: f32 = 0.25;

struct MeasuredLine {
    role: LineRole,
    x: f32,
    font_size: f32,
    line: Line,
}

/// A block after line breaking, ready for vertical placement.
struct Prepared {
    source_index: usize,
    /// `None` for blocks that stay in whatever region is current (scene and page breaks).
    region: Option<Region>,
    lines: Vec<MeasuredLine>,
    space_before: f32,
    space_after: f32,
    new_page: bool,
    chapter_start: bool,
    keep_with_next: bool,
    splittable: bool,
    sink: bool,
    mark: Option<String>,
}

impl Prepared {
    fn height(&self, count: usize) -> f32 {
        self.lines[..count].iter().map(|l| l.line.advance).sum()
    }
}

struct Setting {
    role: LineRole,
    font_size: f32,
    advance: f32,
    left: f32,
    width: f32,
    first_indent: f32,
    centred: bool,
}

fn set_lines(
    runs: &[TextRun],
    fonts: &FontBook,
    setting: &Setting,
    source_index: usize,
) -> Result<Vec<MeasuredLine>, LayoutError> {
    let first_width = setting.width - setting.first_indent;
    if setting.width <= 0.0 || first_width <= 0.0 {
        return Err(LayoutError::UnbreakableContent {
            block_index: source_index,
            detail: format!(
                "no width left for text ({:.1}pt measure, {:.1}pt indent)",
                setting.width, setting.first_indent
            ),
        });
    }
    let measure = Measure {
        font_size: setting.font_size,
        advance: setting.advance,
        first_width,
        width: setting.width,
    };
    let lines = break_lines(runs, fonts, &measure, source_index);
    Ok(lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let indent = if i == 0 { setting.first_indent } else { 0.0 };
            let available = if i == 0 { first_width } else { setting.width };
            let centring = if setting.centred {
                ((available - line.width) / 2.0).max(0.0)
            } else {
                0.0
            };
            MeasuredLine {
                role: setting.role,
                x: setting.left + indent + centring,
                font_size: setting.font_size,
                line,
            }
        })
        .collect())
}

fn with_style(runs: &[TextRun], apply: impl Fn(&mut RunStyle)) -> Vec<TextRun> {
    runs.iter()
        .map(|r| {
            let mut style = r.style;
            apply(&mut style);
            TextRun {
                text: r.text.clone(),
                style,
            }
        })
        .collect()
}

/// Phase 1: break every block into measured lines.
fn prepare(
    blocks: &[ContentBlock],
    params: &FormattingParameters,
    fonts: &FontBook,
) -> Result<Vec<Prepared>, LayoutError> {
    let width = params.geometry.text_width();
    let mut prepared = Vec::with_capacity(blocks.len());
    // first paragraph after a heading or a break is set flush
    let mut indent_next = false;

    for block in blocks {
        let index = block.source_index;
        let mut p = Prepared {
            source_index: index,
            region: Some(block.region()),
            lines: Vec::new(),
            space_before: 0.0,
            space_after: 0.0,
            new_page: block.hints.starts_new_page,
            chapter_start: false,
            keep_with_next: false,
            splittable: false,
            sink: false,
            mark: None,
        };
        let body = |role: LineRole, left: f32, measure: f32, first_indent: f32| Setting {
            role,
            font_size: params.font_size,
            advance: params.leading,
            left,
            width: measure,
            first_indent,
            centred: false,
        };
        let display = |role: LineRole, font_size: f32, advance: f32| Setting {
            role,
            font_size,
            advance,
            left: 0.0,
            width,
            first_indent: 0.0,
            centred: true,
        };

        match block.kind {
            BlockKind::Paragraph
            | BlockKind::FrontMatterPage(MatterPart::Text)
            | BlockKind::BackMatterPage(MatterPart::Text) => {
                let indent = if indent_next && !block.hints.list_item && !block.hints.starts_new_page
                {
                    params.paragraph_indent
                } else {
                    0.0
                };
                p.lines = set_lines(
                    &block.runs,
                    fonts,
                    &body(LineRole::Body, 0.0, width, indent),
                    index,
                )?;
                p.space_before = params.paragraph_spacing;
                p.space_after = params.paragraph_spacing;
                p.splittable = true;
                if !p.lines.is_empty() {
                    indent_next = true;
                }
            }
            BlockKind::BlockQuote => {
                let qi = params.block_quote_indent;
                p.lines = set_lines(
                    &block.runs,
                    fonts,
                    &body(LineRole::Quote, qi, width - 2.0 * qi, 0.0),
                    index,
                )?;
                p.space_before = params.paragraph_spacing;
                p.space_after = params.paragraph_spacing;
                p.splittable = true;
                if !p.lines.is_empty() {
                    indent_next = true;
                }
            }
            BlockKind::ChapterHeading { number } => {
                let label = match number {
                    Some(n) if !params.chapter_label.is_empty() => Some(
                        params
                            .chapter_label
                            .render(&[("number", n.to_string().as_str())]),
                    ),
                    None if !params.chapter_label.is_empty()
                        && !params.chapter_label.uses("number") =>
                    {
                        Some(params.chapter_label.render(&[]))
                    }
                    _ => None,
                }
                .filter(|l| !l.trim().is_empty());

                if let Some(label) = &label {
                    let runs = [TextRun {
                        text: label.clone(),
                        style: RunStyle::ROMAN,
                    }];
                    p.lines = set_lines(
                        &runs,
                        fonts,
                        &display(
                            LineRole::ChapterLabel,
                            params.section_heading_size,
                            params.section_heading_leading,
                        ),
                        index,
                    )?;
                }
                p.lines.extend(set_lines(
                    &block.runs,
                    fonts,
                    &display(
                        LineRole::ChapterHeading,
                        params.chapter_heading_size,
                        params.chapter_heading_leading,
                    ),
                    index,
                )?);

                let title = block.plain_text().trim().to_string();
                p.mark = Some(match (title.is_empty(), label, number) {
                    (false, _, _) => title,
                    (true, Some(label), _) => label.trim().to_string(),
                    (true, None, Some(n)) => n.to_string(),
                    (true, None, None) => String::new(),
                });
                p.space_before = params.chapter_space_before;
                p.space_after = params.heading_space_after;
                p.chapter_start = true;
                p.keep_with_next = true;
                indent_next = false;
            }
            BlockKind::SectionHeading => {
                let runs = with_style(&block.runs, |s| s.bold = true);
                p.lines = set_lines(
                    &runs,
                    fonts,
                    &display(
                        LineRole::SectionHeading,
                        params.section_heading_size,
                        params.section_heading_leading,
                    ),
                    index,
                )?;
                p.space_before = params.section_space_before;
                p.space_after = params.heading_space_after;
                p.keep_with_next = true;
                indent_next = false;
            }
            BlockKind::FrontMatterPage(MatterPart::Heading)
            | BlockKind::BackMatterPage(MatterPart::Heading) => {
                p.lines = set_lines(
                    &block.runs,
                    fonts,
                    &display(
                        LineRole::MatterHeading,
                        params.chapter_heading_size,
                        params.chapter_heading_leading,
                    ),
                    index,
                )?;
                if block.region() == Region::Back {
                    p.mark = Some(block.plain_text().trim().to_string());
                }
                p.space_before = params.chapter_space_before;
                p.space_after = params.heading_space_after;
                p.new_page = true;
                p.keep_with_next = true;
                indent_next = false;
            }
            BlockKind::FrontMatterPage(MatterPart::TitlePage)
            | BlockKind::BackMatterPage(MatterPart::TitlePage) => {
                p.lines = set_lines(
                    &block.runs,
                    fonts,
                    &display(
                        LineRole::TitlePage,
                        params.chapter_heading_size,
                        params.chapter_heading_leading,
                    ),
                    index,
                )?;
                p.new_page = true;
                p.sink = true;
                indent_next = false;
            }
            BlockKind::SceneBreak => {
                let runs = [TextRun {
                    text: params.scene_break_glyph.clone(),
                    style: RunStyle::ROMAN,
                }];
                p.region = None;
                p.lines = set_lines(
                    &runs,
                    fonts,
                    &display(LineRole::SceneBreak, params.font_size, params.leading),
                    index,
                )?;
                p.space_before = params.leading / 2.0;
                p.space_after = params.leading / 2.0;
                indent_next = false;
            }
            BlockKind::PageBreak => {
                p.region = None;
                p.new_page = true;
                indent_next = false;
            }
        }
        prepared.push(p);
    }
    Ok(prepared)
}

/// Baseline within a line box: the em box is centred in the advance, with
/// the baseline at 80% of the em.
fn baseline_offset(advance: f32, font_size: f32) -> f32 {
    advance / 2.0 + font_size * 0.3
}

/// Phase 2 state: the open page and the vertical offset from the top of its text block.
struct Cursor<'a> {
    params: &'a FormattingParameters,
    height: f32,
    pages: Vec<Page>,
    page: Page,
    y: f32,
    prev_after: f32,
    folios: FolioCounter,
}

impl<'a> Cursor<'a> {
    fn new(params: &'a FormattingParameters) -> Self {
        Cursor {
            params,
            height: params.geometry.text_height(),
            pages: Vec::new(),
            page: Page::new(PageKind::Body),
            y: 0.0,
            prev_after: 0.0,
            folios: FolioCounter::new(params.continue_folios),
        }
    }

    /// Close the open page if it has content; an empty page is never emitted.
    fn close_page(&mut self) {
        if self.page.is_empty() {
            return;
        }
        let kind = self.page.kind;
        let page = std::mem::replace(&mut self.page, Page::new(kind));
        self.folios.next(page.kind);
        self.pages.push(page);
        self.y = 0.0;
        self.prev_after = 0.0;
    }

    fn enter_region(&mut self, region: Region) {
        let current = self.page.kind.region();
        if current == Some(region) {
            return;
        }
        self.close_page();
        // a body whose folios restart must keep odd folios on recto pages;
        // the blank counts with the front matter
        let next_physical = self.pages.len() + 1;
        if current == Some(Region::Front)
            && region == Region::Body
            && self.folios.peek(PageKind::Body) as usize % 2 != next_physical % 2
        {
            self.folios.next(PageKind::Blank);
            self.pages.push(Page::new(PageKind::Blank));
        }
        self.page.kind = PageKind::for_region(region);
    }

    fn start_chapter(&mut self) {
        match self.params.chapter_start {
            ChapterStart::Continuous => {}
            ChapterStart::AlwaysNewPage => self.close_page(),
            ChapterStart::AlwaysOdd => {
                self.close_page();
                if self.folios.peek(self.page.kind) % 2 == 0 {
                    self.folios.next(PageKind::Blank);
                    self.pages.push(Page::new(PageKind::Blank));
                }
            }
        }
    }

    fn fits(&self, y: f32, height: f32) -> bool {
        y + height <= self.height + FIT_EPSILON
    }

    fn lines_that_fit(&self, block: &Prepared, from: usize, start_y: f32) -> usize {
        let mut y = start_y;
        let mut count = 0;
        for measured in &block.lines[from..] {
            if !self.fits(y, measured.line.advance) {
                break;
            }
            y += measured.line.advance;
            count += 1;
        }
        count
    }

    fn gap_before(&self, block: &Prepared) -> f32 {
        if self.page.is_empty() {
            0.0
        } else {
            self.prev_after.max(block.space_before)
        }
    }

    /// Move a heading forward unless it fits together with the opening
    /// fragment `split_point` would accept from what follows.
    fn keep_with_next(&mut self, block: &Prepared, next: &Prepared) {
        if self.page.is_empty() {
            return;
        }
        let start = self.y + self.gap_before(block);
        let height = block.height(block.lines.len());
        let next_y = start + height + block.space_after.max(next.space_before);
        let k = self.lines_that_fit(next, 0, next_y);
        if !self.fits(start, height) || self.split_point(next, next.lines.len(), k) == 0 {
            self.close_page();
        }
    }

    /// How many of the `n` remaining lines go on the open page, given that `k` fit.
    fn split_point(&self, block: &Prepared, n: usize, k: usize) -> usize {
        let at_top = self.page.is_empty();
        if k >= n {
            return n;
        }
        if !block.splittable {
            return if at_top { k } else { 0 };
        }
        let m = self.params.widow_orphan_lines;
        let mut a = k;
        // too few lines would be left for the next page: move more forward
        if n - a < m {
            a = n.saturating_sub(m);
        }
        // too few lines would stay behind: move the whole block forward
        if a < m && !at_top {
            a = 0;
        }
        if a == 0 && at_top {
            a = k;
        }
        a
    }

    fn place(&mut self, block: &Prepared, next: Option<&Prepared>) -> Result<(), LayoutError> {
        if let Some(region) = block.region {
            self.enter_region(region);
        }
        if block.chapter_start {
            self.start_chapter();
        }
        if block.new_page {
            self.close_page();
        }
        if block.lines.is_empty() {
            return Ok(());
        }
        if block.keep_with_next
            && let Some(next) = next
            && !next.new_page
            && !next.chapter_start
            && next.region.is_none_or(|r| Some(r) == block.region)
        {
            self.keep_with_next(block, next);
        }

        let total = block.lines.len();
        let mut from = 0;
        while from < total {
            let at_top = self.page.is_empty();
            let mut start_y = if from == 0 {
                self.y + self.gap_before(block)
            } else {
                self.y
            };
            if block.sink && at_top && from == 0 {
                let sunk = self.height * TITLE_SINK;
                if self.lines_that_fit(block, 0, sunk) == total {
                    start_y = sunk;
                }
            }

            let n = total - from;
            let k = self.lines_that_fit(block, from, start_y);
            let take = self.split_point(block, n, k);
            if take == 0 {
                if at_top {
                    return Err(LayoutError::UnbreakableContent {
                        block_index: block.source_index,
                        detail: format!(
                            "a {:.1}pt line does not fit the {:.1}pt text block",
                            block.lines[from].line.advance, self.height
                        ),
                    });
                }
                self.close_page();
                continue;
            }

            let mut y = start_y;
            for measured in &block.lines[from..from + take] {
                self.page.lines.push(PlacedLine {
                    source_index: block.source_index,
                    role: measured.role,
                    x: measured.x,
                    baseline: y + baseline_offset(measured.line.advance, measured.font_size),
                    line: measured.line.clone(),
                });
                y += measured.line.advance;
            }
            self.y = y;
            if from == 0
                && let Some(title) = &block.mark
            {
                self.page.chapter_marks.push(ChapterMark {
                    source_index: block.source_index,
                    title: title.clone(),
                });
            }

            from += take;
            if from < total {
                self.close_page();
            }
        }
        self.prev_after = block.space_after;
        Ok(())
    }
}

/// Flow content blocks onto pages. Pages come back without folios or running
/// heads; the result depends only on the arguments.
pub fn paginate(
    blocks: &[ContentBlock],
    params: &FormattingParameters,
    fonts: &FontBook,
) -> Result<Vec<Page>, LayoutError> {
    let prepared = prepare(blocks, params, fonts)?;

    let mut cursor = Cursor::new(params);
    for (i, block) in prepared.iter().enumerate() {
        let next = prepared[i + 1..].iter().find(|b| !b.lines.is_empty() || b.new_page);
        cursor.place(block, next)?;
    }
    cursor.close_page();

    log::debug!(
        "Paginated {} blocks onto {} pages ({} blank)",
        blocks.len(),
        cursor.pages.len(),
        cursor
            .pages
            .iter()
            .filter(|p| p.kind == PageKind::Blank)
            .count()
    );
    Ok(cursor.pages)
}
