mod common;

use manuscript_pdf::assemble::{MAX_PAGES, assemble, format_folio, preflight};
use manuscript_pdf::model::{FolioPosition, FolioStyle, LineRole, PageKind, PageSide};
use manuscript_pdf::{LayoutError, flow};
use serde_json::{Value, json};

/// Title page, a contents page, then two chapters long enough to need running heads.
fn book() -> Value {
    let mut blocks = vec![
        common::title_page("The Lighthouse Keeper"),
        common::front_heading("Contents"),
        common::front_text("Landfall. The Reef."),
    ];
    blocks.extend(common::chapter_blocks(1, 20, 60));
    blocks.extend(common::chapter_blocks(2, 20, 60));
    blocks.push(common::back_heading("About the Author"));
    blocks.push(common::back_text(&common::words(50, 9)));
    common::manuscript(blocks)
}

#[test]
fn roman_numerals() {
    assert_eq!(format_folio(4, FolioStyle::LowerRoman), "iv");
    assert_eq!(format_folio(9, FolioStyle::LowerRoman), "ix");
    assert_eq!(format_folio(14, FolioStyle::UpperRoman), "XIV");
    assert_eq!(format_folio(1994, FolioStyle::UpperRoman), "MCMXCIV");
    assert_eq!(format_folio(12, FolioStyle::Arabic), "12");
}

#[test]
fn assembling_twice_gives_the_same_layout() {
    let doc = book();
    let (manuscript, _) = manuscript_pdf::read_manuscript(&common::bytes(&doc)).unwrap();
    let params = manuscript_pdf::resolve_parameters(&manuscript, &common::fields(json!({}))).unwrap();
    let pages = flow::paginate(&manuscript.blocks, &params, &common::fonts()).unwrap();

    let first = assemble(pages.clone(), &params);
    let second = assemble(pages.clone(), &params);
    assert_eq!(first, second);

    // annotation only: page content and order are untouched
    let contents: Vec<_> = first.pages.iter().map(|p| p.page.clone()).collect();
    assert_eq!(contents, pages);
}

#[test]
fn front_matter_and_body_are_numbered_separately() {
    let layout = common::typeset(&book(), json!({}));

    let title = &layout.pages[0];
    assert_eq!(title.page.kind, PageKind::FrontMatter);
    assert!(title.folio.is_none());
    assert!(title.running_head.is_none());

    let contents = &layout.pages[1];
    assert_eq!(contents.folio.as_ref().unwrap().text, "ii");
    assert!(contents.running_head.is_none());

    let opening = &layout.pages[2];
    assert!(opening.page.opens_chapter());
    assert_eq!(opening.folio_number, 1);
    assert_eq!(opening.folio.as_ref().unwrap().text, "1");
    assert!(opening.running_head.is_none());

    // back matter continues the body sequence
    let body_and_back: Vec<u32> = layout.pages[2..].iter().map(|p| p.folio_number).collect();
    let expected: Vec<u32> = (1..=body_and_back.len() as u32).collect();
    assert_eq!(body_and_back, expected);
}

#[test]
fn continue_folios_runs_on_from_front_matter() {
    let layout = common::typeset(&book(), json!({ "continue_folios": true }));
    let numbers: Vec<u32> = layout.pages.iter().map(|p| p.folio_number).collect();
    let expected: Vec<u32> = (1..=layout.page_count as u32).collect();
    assert_eq!(numbers, expected);
    assert_eq!(layout.pages[2].folio.as_ref().unwrap().text, "3");
}

#[test]
fn running_heads_follow_page_side_and_chapter() {
    let layout = common::typeset(
        &book(),
        json!({ "book_title": "Salt and Iron", "folio_position": "top-outside" }),
    );

    let mut chapter: Option<String> = None;
    let mut checked = 0;
    for page in &layout.pages {
        if let Some(mark) = page.page.chapter_marks.last() {
            chapter = Some(mark.title.clone());
        }
        let blank = page.page.kind == PageKind::Blank;
        let opening = page.page.opens_chapter()
            || page.page.lines.iter().any(|l| l.role == LineRole::MatterHeading);
        if blank || page.page.kind == PageKind::FrontMatter || opening {
            assert!(page.running_head.is_none(), "page {}", page.number);
            continue;
        }
        let expected = match page.side {
            PageSide::Verso => "Salt and Iron".to_string(),
            PageSide::Recto => chapter.clone().unwrap(),
        };
        assert_eq!(page.running_head.as_deref(), Some(expected.as_str()), "page {}", page.number);
        assert_eq!(page.folio.as_ref().unwrap().position, FolioPosition::TopOutside);
        checked += 1;
    }
    assert!(checked >= 4);
}

#[test]
fn chapter_openings_put_the_folio_at_the_foot() {
    let layout = common::typeset(&book(), json!({ "folio_position": "top-outside" }));
    for page in layout.pages.iter().filter(|p| p.page.opens_chapter()) {
        assert_eq!(page.folio.as_ref().unwrap().position, FolioPosition::BottomCenter);
    }
}

#[test]
fn blank_pages_have_no_furniture() {
    let layout = common::typeset(&book(), json!({ "chapter_start": "always-odd" }));
    let blanks: Vec<_> = layout
        .pages
        .iter()
        .filter(|p| p.page.kind == PageKind::Blank)
        .collect();
    for blank in &blanks {
        assert!(blank.folio.is_none());
        assert!(blank.running_head.is_none());
        assert!(blank.page.lines.is_empty());
    }
    for page in layout.pages.iter().filter(|p| p.page.opens_chapter()) {
        assert_eq!(page.folio_number % 2, 1);
    }
}

#[test]
fn empty_template_means_no_running_head() {
    let layout = common::typeset(
        &book(),
        json!({ "running_head_verso": "", "running_head_recto": "{author}" }),
    );
    for page in &layout.pages {
        match page.side {
            PageSide::Verso => assert!(page.running_head.is_none()),
            PageSide::Recto => {
                if page.running_head.is_some() {
                    assert_eq!(page.running_head.as_deref(), Some("Ada Lindqvist"));
                }
            }
        }
    }
    assert!(layout.pages.iter().any(|p| p.running_head.is_some()));
}

#[test]
fn body_opens_on_a_recto_after_odd_front_matter() {
    let mut blocks = vec![common::title_page("The Lighthouse Keeper")];
    blocks.extend(common::chapter_blocks(1, 20, 60));
    blocks.extend(common::chapter_blocks(2, 20, 60));
    let doc = common::manuscript(blocks);

    for rule in ["always-odd", "always-new-page", "continuous"] {
        let layout = common::typeset(&doc, json!({ "chapter_start": rule }));
        assert_eq!(layout.pages[1].page.kind, PageKind::Blank, "{rule}");
        assert!(layout.pages[1].folio.is_none());

        let opening = &layout.pages[2];
        assert!(opening.page.opens_chapter());
        assert_eq!(opening.folio_number, 1);
        assert_eq!(opening.side, PageSide::Recto);

        for page in layout.pages[2..].iter().filter(|p| p.page.kind != PageKind::Blank) {
            let expected = if page.folio_number % 2 == 1 {
                PageSide::Recto
            } else {
                PageSide::Verso
            };
            assert_eq!(page.side, expected, "{rule}: page {}", page.number);
            if page.side == PageSide::Verso && page.running_head.is_some() {
                assert_eq!(page.running_head.as_deref(), Some("The Lighthouse Keeper"));
            }
        }
    }

    // continued folios already agree with the physical page
    let layout = common::typeset(&doc, json!({ "continue_folios": true, "chapter_start": "continuous" }));
    assert_eq!(layout.pages[1].page.kind, PageKind::Body);
    assert_eq!(layout.pages[1].folio_number, 2);
    assert_eq!(layout.pages[1].side, PageSide::Verso);
}

#[test]
fn page_sides_alternate_from_recto() {
    let layout = common::typeset(&book(), json!({}));
    for page in &layout.pages {
        let expected = if page.number % 2 == 1 {
            PageSide::Recto
        } else {
            PageSide::Verso
        };
        assert_eq!(page.side, expected);
    }
    assert_eq!(layout.page_count, layout.pages.len());
}

#[test]
fn preflight_enforces_page_limits() {
    let mut layout = common::typeset(&book(), json!({}));
    // short books pass with a warning
    assert!(layout.page_count < 24);
    assert!(preflight(&layout).is_ok());

    let page = layout.pages[3].clone();
    layout.pages = vec![page; MAX_PAGES + 1];
    layout.page_count = layout.pages.len();
    assert_eq!(
        preflight(&layout),
        Err(LayoutError::PageLimitExceeded {
            pages: MAX_PAGES + 1,
            max: MAX_PAGES,
        })
    );
}
