use crate::error::LayoutError;
use crate::model::{
    AssembledPage, DocumentLayout, Folio, FolioPosition, FolioStyle, LineRole, Page, PageKind,
    PageSide, Region,
};
use crate::params::FormattingParameters;

/// Print-on-demand limits for a perfect-bound interior.
pub const MAX_PAGES: usize = 828;
pub const MIN_PAGES: usize = 24;

/// Folio sequence shared by the flow engine (to predict chapter-start parity)
/// and the assembler (to number pages), so both always agree.
#[derive(Clone, Debug)]
pub(crate) struct FolioCounter {
    continue_folios: bool,
    front: u32,
    body: Option<u32>,
    last_region: Option<Region>,
}

impl FolioCounter {
    pub(crate) fn new(continue_folios: bool) -> Self {
        FolioCounter {
            continue_folios,
            front: 0,
            body: None,
            last_region: None,
        }
    }

    /// Number the next physical page. A blank page belongs to the region of
    /// the page before it.
    pub(crate) fn next(&mut self, kind: PageKind) -> (Region, u32) {
        let region = kind
            .region()
            .or(self.last_region)
            .unwrap_or(Region::Body);
        self.last_region = Some(region);
        let number = match region {
            Region::Front => {
                self.front += 1;
                self.front
            }
            // back matter continues the body sequence
            Region::Body | Region::Back => {
                let start = if self.continue_folios { self.front } else { 0 };
                let n = self.body.unwrap_or(start) + 1;
                self.body = Some(n);
                n
            }
        };
        (region, number)
    }

    pub(crate) fn peek(&self, kind: PageKind) -> u32 {
        self.clone().next(kind).1
    }
}

fn roman(mut n: u32) -> String {
    const NUMERALS: [(u32, &str); 13] = [
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut out = String::new();
    for &(value, glyphs) in &NUMERALS {
        while n >= value {
            out.push_str(glyphs);
            n -= value;
        }
    }
    out
}

pub fn format_folio(number: u32, style: FolioStyle) -> String {
    match style {
        FolioStyle::Arabic => number.to_string(),
        FolioStyle::LowerRoman => roman(number),
        FolioStyle::UpperRoman => roman(number).to_uppercase(),
    }
}

/// Annotate paginated pages with folios and running heads. Page content and
/// order are left exactly as the flow engine produced them.
pub fn assemble(pages: Vec<Page>, params: &FormattingParameters) -> DocumentLayout {
    let title = params.book_title.clone().unwrap_or_default();
    let author = params.author_name.clone().unwrap_or_default();
    let mut folios = FolioCounter::new(params.continue_folios);
    let mut chapter: Option<String> = None;
    let mut assembled = Vec::with_capacity(pages.len());

    for (i, page) in pages.into_iter().enumerate() {
        let number = i + 1;
        let side = PageSide::of(number);
        let (region, folio_number) = folios.next(page.kind);
        if let Some(mark) = page.chapter_marks.last() {
            chapter = Some(mark.title.clone());
        }

        let blank = page.kind == PageKind::Blank;
        // back matter headings open like chapters
        let opening = page.opens_chapter()
            || page.lines.iter().any(|l| l.role == LineRole::MatterHeading);
        let title_page = page.lines.iter().any(|l| l.role == LineRole::TitlePage);

        let folio = (!blank && !title_page).then(|| {
            let style = match region {
                Region::Front => params.front_matter_folio_style,
                Region::Body | Region::Back => params.folio_style,
            };
            Folio {
                number: folio_number,
                text: format_folio(folio_number, style),
                // an opening page has no head, so its folio drops to the foot
                position: if opening {
                    FolioPosition::BottomCenter
                } else {
                    params.folio_position
                },
            }
        });

        let running_head = if blank || opening || region == Region::Front {
            None
        } else {
            let template = match side {
                PageSide::Recto => &params.running_head_recto,
                PageSide::Verso => &params.running_head_verso,
            };
            let text = template.render(&[
                ("title", title.as_str()),
                ("author", author.as_str()),
                ("chapter", chapter.as_deref().unwrap_or("")),
            ]);
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        };

        assembled.push(AssembledPage {
            number,
            side,
            page,
            folio_number,
            folio,
            running_head,
        });
    }

    DocumentLayout {
        title,
        geometry: params.geometry,
        typeface: params.body_font.clone(),
        font_size: params.font_size,
        page_count: assembled.len(),
        pages: assembled,
    }
}

/// Print checks on the finished layout.
pub fn preflight(layout: &DocumentLayout) -> Result<(), LayoutError> {
    if layout.page_count == 0 {
        return Err(LayoutError::EmptyDocument);
    }
    if layout.page_count > MAX_PAGES {
        return Err(LayoutError::PageLimitExceeded {
            pages: layout.page_count,
            max: MAX_PAGES,
        });
    }
    if layout.page_count < MIN_PAGES {
        log::warn!(
            "Interior has {} pages, below the {MIN_PAGES}-page print minimum",
            layout.page_count
        );
    }
    Ok(())
}
