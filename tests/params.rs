mod common;

use manuscript_pdf::ConfigError;
use manuscript_pdf::model::{FolioPosition, FolioStyle};
use manuscript_pdf::params::{ChapterStart, FormattingParameters, resolve};
use serde_json::json;

fn resolve_value(value: serde_json::Value) -> Result<FormattingParameters, ConfigError> {
    resolve(&common::fields(value))
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn empty_record_gives_defaults() {
    let p = resolve_value(json!({})).unwrap();
    assert_eq!(p, FormattingParameters::default());
    assert_close(p.geometry.width, 432.0);
    assert_close(p.geometry.height, 648.0);
    assert_eq!(p.widow_orphan_lines, 2);
    assert_eq!(p.chapter_start, ChapterStart::AlwaysOdd);
    assert_eq!(p.folio_style, FolioStyle::Arabic);
    assert_eq!(p.front_matter_folio_style, FolioStyle::LowerRoman);
}

#[test]
fn nulls_and_blanks_count_as_absent() {
    let p = resolve_value(json!({ "font_size": null, "Body Font": "  ", "leading": "" })).unwrap();
    assert_eq!(p, FormattingParameters::default());
}

#[test]
fn parses_units() {
    let p = resolve_value(json!({
        "trim_size": "5.5x8.5",
        "margin_top": "18mm",
        "margin_bottom": "0.8in",
        "margin_inside": 1,
        "margin_outside": "36pt",
        "font_size": 12,
        "leading": "16pt",
    }))
    .unwrap();
    assert_close(p.geometry.width, 396.0);
    assert_close(p.geometry.height, 612.0);
    assert_close(p.geometry.margin_top, 18.0 * 72.0 / 25.4);
    assert_close(p.geometry.margin_bottom, 57.6);
    // bare numbers are inches for geometry
    assert_close(p.geometry.margin_inside, 72.0);
    assert_close(p.geometry.margin_outside, 36.0);
    // and points for type
    assert_close(p.font_size, 12.0);
    assert_close(p.leading, 16.0);
}

#[test]
fn normalises_field_names_and_aliases() {
    let p = resolve_value(json!({
        "Trim": "6 x 9",
        "Font": "Helvetica",
        "Chapter-Start": "Always New Page",
        "Folio Style": "UPPER_ROMAN",
        "Title": "Salt and Iron",
        "Continue Folios": "yes",
        "Shipping Notes": "ignored",
    }))
    .unwrap();
    assert_eq!(p.body_font, "Helvetica");
    assert_eq!(p.chapter_start, ChapterStart::AlwaysNewPage);
    assert_eq!(p.folio_style, FolioStyle::UpperRoman);
    assert_eq!(p.book_title.as_deref(), Some("Salt and Iron"));
    assert!(p.continue_folios);
}

#[test]
fn rejects_negative_margin() {
    let err = resolve_value(json!({ "margin_inside": "-0.5in" })).unwrap_err();
    assert!(
        matches!(err, ConfigError::InvalidMeasurement { ref field, .. } if field == "margin_inside"),
        "{err:?}"
    );
}

#[test]
fn rejects_margins_that_consume_the_page() {
    let err = resolve_value(json!({ "trim_width": "4in", "margin_inside": "2in", "margin_outside": "2in" }))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMeasurement { ref field, .. } if field == "margin_inside"));

    let err = resolve_value(json!({ "trim_height": "3in", "margin_top": "2in", "margin_bottom": "1in" }))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMeasurement { ref field, .. } if field == "margin_top"));

    let err = resolve_value(json!({ "trim_height": "2in", "margin_top": "0.9in", "margin_bottom": "0.9in", "leading": "20pt" }))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMeasurement { ref field, .. } if field == "leading"));
}

#[test]
fn every_line_and_indent_must_fit_the_text_block() {
    // default text block: 324pt wide, 540pt tall
    let err = resolve_value(json!({ "chapter_heading_leading": "2000pt" })).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMeasurement { ref field, .. } if field == "chapter_heading_leading"));

    let err = resolve_value(json!({ "trim_height": "3in", "margin_top": "0.5in", "margin_bottom": "0.5in", "section_heading_leading": "150pt" }))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMeasurement { ref field, .. } if field == "section_heading_leading"));

    let err = resolve_value(json!({ "paragraph_indent": "400pt" })).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMeasurement { ref field, .. } if field == "paragraph_indent"));

    let err = resolve_value(json!({ "block_quote_indent": "162pt" })).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMeasurement { ref field, .. } if field == "block_quote_indent"));

    let p = resolve_value(json!({ "block_quote_indent": "160pt", "chapter_heading_leading": "540pt" })).unwrap();
    assert_eq!(p.block_quote_indent, 160.0);
}

#[test]
fn rejects_bad_sizes_and_counts() {
    for value in [json!(0), json!("-11pt"), json!("eleven"), json!(true)] {
        let err = resolve_value(json!({ "font_size": value })).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMeasurement { .. }), "{err:?}");
    }
    for value in [json!(0), json!(1.5), json!("two")] {
        let err = resolve_value(json!({ "widow_orphan_lines": value })).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMeasurement { .. }), "{err:?}");
    }
    assert_eq!(
        resolve_value(json!({ "widow_orphan_lines": "3" })).unwrap().widow_orphan_lines,
        3
    );
}

#[test]
fn zero_spacing_is_allowed() {
    let p = resolve_value(json!({ "paragraph_indent": 0, "paragraph_spacing": "0pt" })).unwrap();
    assert_eq!(p.paragraph_indent, 0.0);
    assert_eq!(p.paragraph_spacing, 0.0);

    let err = resolve_value(json!({ "paragraph_spacing": "-2pt" })).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMeasurement { .. }));
}

#[test]
fn rejects_unknown_choices() {
    let err = resolve_value(json!({ "chapter_start": "sometimes" })).unwrap_err();
    assert_eq!(
        err,
        ConfigError::InvalidEnum {
            field: "chapter_start".into(),
            value: "sometimes".into(),
            expected: "always-odd, always-new-page or continuous",
        }
    );
    assert!(resolve_value(json!({ "folio_position": "margin" })).is_err());
    assert!(resolve_value(json!({ "continue_folios": "perhaps" })).is_err());

    let p = resolve_value(json!({ "folio_position": "Top Outside" })).unwrap();
    assert_eq!(p.folio_position, FolioPosition::TopOutside);
}

#[test]
fn running_head_templates_accept_known_tokens_only() {
    let p = resolve_value(json!({ "running_head_verso": "{author} / {title}" })).unwrap();
    assert_eq!(
        p.running_head_verso.render(&[("title", "Salt"), ("author", "Moreau")]),
        "Moreau / Salt"
    );
    assert!(p.running_head_verso.uses("author"));
    assert!(!p.running_head_verso.uses("chapter"));

    let err = resolve_value(json!({ "running_head_recto": "{publisher}" })).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnum { ref field, .. } if field == "running_head_recto"));

    let err = resolve_value(json!({ "chapter_label": "Part {title}" })).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnum { .. }));
    let p = resolve_value(json!({ "chapter_label": "Chapter {number}" })).unwrap();
    assert_eq!(p.chapter_label.render(&[("number", "7")]), "Chapter 7");
}

#[test]
fn manuscript_fills_missing_title_and_author() {
    let p = resolve_value(json!({ "author": "Pen Name" }))
        .unwrap()
        .with_manuscript_defaults("From Manuscript", Some("Real Name"));
    assert_eq!(p.book_title.as_deref(), Some("From Manuscript"));
    assert_eq!(p.author_name.as_deref(), Some("Pen Name"));
}
