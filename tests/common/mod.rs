#![allow(dead_code)]

use std::path::PathBuf;

use manuscript_pdf::model::{DocumentLayout, LineRole, Page, PlacedLine};
use manuscript_pdf::{FontBook, FormattingParameters};
use serde_json::{Map, Value, json};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A schema 1.0 manuscript artifact around `blocks`.
pub fn manuscript(blocks: Vec<Value>) -> Value {
    json!({
        "schema_version": "1.0",
        "artifact_type": "manuscript",
        "title": "The Lighthouse Keeper",
        "author": "Ada Lindqvist",
        "body": blocks,
    })
}

pub fn bytes(doc: &Value) -> Vec<u8> {
    serde_json::to_vec(doc).unwrap()
}

pub fn paragraph(text: &str) -> Value {
    json!({ "type": "paragraph", "text": text })
}

pub fn chapter(number: u32, title: &str) -> Value {
    json!({ "type": "chapter_heading", "text": title, "meta": { "chapter_number": number } })
}

pub fn section(title: &str) -> Value {
    json!({ "type": "section_heading", "text": title })
}

pub fn blockquote(text: &str) -> Value {
    json!({ "type": "blockquote", "text": text })
}

pub fn scene_break() -> Value {
    json!({ "type": "scene_break" })
}

pub fn page_break() -> Value {
    json!({ "type": "page_break" })
}

pub fn title_page(text: &str) -> Value {
    json!({ "type": "title_page", "text": text })
}

pub fn front_heading(text: &str) -> Value {
    json!({ "type": "front_matter_heading", "text": text })
}

pub fn front_text(text: &str) -> Value {
    json!({ "type": "front_matter_text", "text": text })
}

pub fn back_heading(text: &str) -> Value {
    json!({ "type": "back_matter_heading", "text": text })
}

pub fn back_text(text: &str) -> Value {
    json!({ "type": "back_matter_text", "text": text })
}

const VOCABULARY: &[&str] = &[
    "the", "keeper", "climbed", "stairs", "before", "dawn", "while", "gulls", "circled",
    "over", "grey", "water", "and", "lamp", "burned", "steadily", "against", "fog", "rolling",
    "in", "from", "northern", "reef", "where", "ships", "had", "foundered", "long", "ago",
];

/// `n` deterministic filler words, varied by `seed`.
pub fn words(n: usize, seed: usize) -> String {
    (0..n)
        .map(|i| VOCABULARY[(i * 7 + seed * 3) % VOCABULARY.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

/// A chapter of `paragraphs` paragraphs of `len` words each.
pub fn chapter_blocks(number: u32, paragraphs: usize, len: usize) -> Vec<Value> {
    let mut blocks = vec![chapter(number, &format!("Chapter Title {number}"))];
    blocks.extend((0..paragraphs).map(|i| paragraph(&words(len, i + number as usize))));
    blocks
}

pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("fields must be an object, got {other}"),
    }
}

pub fn params(value: Value) -> FormattingParameters {
    manuscript_pdf::params::resolve(&fields(value)).expect("valid parameters")
}

pub fn fonts() -> FontBook {
    FontBook::standard("Times")
}

/// Parse, resolve and typeset with built-in Times metrics.
pub fn typeset(doc: &Value, metadata: Value) -> DocumentLayout {
    let (manuscript, _) = manuscript_pdf::read_manuscript(&bytes(doc)).expect("parse");
    let params = manuscript_pdf::resolve_parameters(&manuscript, &fields(metadata)).unwrap();
    manuscript_pdf::typeset(&manuscript, &params, &fonts()).expect("typeset")
}

/// Metadata giving a text block exactly `lines` body lines tall.
pub fn lines_per_page(lines: usize) -> Value {
    let leading = 14.0;
    let margins = 54.0;
    json!({
        "trim_height": format!("{}pt", lines as f64 * leading + 2.0 * margins),
        "margin_top": "54pt",
        "margin_bottom": "54pt",
        "leading": "14pt",
    })
}

pub fn is_text_line(line: &PlacedLine) -> bool {
    matches!(line.role, LineRole::Body | LineRole::Quote)
}

/// Words of body and quote lines across `pages`, in reading order.
pub fn body_words<'a>(pages: impl IntoIterator<Item = &'a Page>) -> Vec<String> {
    pages
        .into_iter()
        .flat_map(|p| p.lines.iter())
        .filter(|l| is_text_line(l))
        .flat_map(|l| l.line.words())
        .collect()
}

/// Output directory: tests/output/<name>/
pub fn output_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("tests/output").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Scratch directory under tests/output, emptied first.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("tests/output/scratch").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
