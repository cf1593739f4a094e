pub mod policy;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::model::{
    ArtifactWarning, BlockHints, BlockKind, ContentBlock, Manuscript, MatterPart, RunStyle,
    Severity, TextRun,
};

/// The one manuscript schema version this pipeline generation reads.
pub const SCHEMA_VERSION: &str = "1.0";

const ARTIFACT_TYPE: &str = "manuscript";

#[derive(Deserialize)]
struct RawBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    marks: Vec<RawMark>,
    #[serde(default)]
    meta: RawMeta,
}

#[derive(Deserialize)]
struct RawMark {
    #[serde(rename = "type")]
    kind: String,
    start: usize,
    end: usize,
}

#[derive(Deserialize, Default)]
struct RawMeta {
    #[serde(default)]
    chapter_number: Option<u32>,
    #[serde(default)]
    starts_new_page: bool,
}

#[derive(Deserialize)]
struct RawWarning {
    code: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .or_else(|| obj.get("metadata").and_then(|m| m.get(key)))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn check_version(root: &Map<String, Value>) -> Result<(), ParseError> {
    let found = match root.get("schema_version") {
        None | Some(Value::Null) => {
            return Err(ParseError::MissingRequiredField("schema_version".into()));
        }
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    };
    if found != SCHEMA_VERSION {
        return Err(ParseError::UnsupportedVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(())
}

fn check_artifact_type(root: &Map<String, Value>) -> Result<(), ParseError> {
    match root.get("artifact_type") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(s)) if s == ARTIFACT_TYPE => Ok(()),
        Some(Value::String(s)) => Err(ParseError::UnexpectedArtifactType(s.clone())),
        Some(other) => Err(ParseError::UnexpectedArtifactType(other.to_string())),
    }
}

fn apply_mark(style: &mut RunStyle, kind: &str) {
    match kind {
        "italic" => style.italic = true,
        "bold" => style.bold = true,
        "smallcaps" => style.small_caps = true,
        "code" => style.code = true,
        _ => {}
    }
}

/// Split `text` at every mark boundary; each span gets the union of the marks covering it.
/// Offsets are in characters, not bytes.
fn apply_marks(text: &str, marks: &[RawMark], base: RunStyle, source_index: usize) -> Vec<TextRun> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    let mut spans: Vec<(usize, usize, &str)> = Vec::with_capacity(marks.len());
    for mark in marks {
        if !matches!(mark.kind.as_str(), "italic" | "bold" | "smallcaps" | "code") {
            log::warn!(
                "body[{source_index}]: ignoring unknown mark type {:?}",
                mark.kind
            );
            continue;
        }
        let (start, end) = (mark.start.min(len), mark.end.min(len));
        if start != mark.start || end != mark.end {
            log::warn!(
                "body[{source_index}]: {} mark {}..{} clamped to text length {len}",
                mark.kind,
                mark.start,
                mark.end
            );
        }
        if start < end {
            spans.push((start, end, mark.kind.as_str()));
        }
    }

    let mut cuts: Vec<usize> = vec![0, len];
    cuts.extend(spans.iter().flat_map(|&(s, e, _)| [s, e]));
    cuts.sort_unstable();
    cuts.dedup();

    let mut runs: Vec<TextRun> = Vec::new();
    for pair in cuts.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let mut style = base;
        for &(s, e, kind) in &spans {
            if s <= from && to <= e {
                apply_mark(&mut style, kind);
            }
        }
        let piece: String = chars[from..to].iter().collect();
        match runs.last_mut() {
            Some(last) if last.style == style => last.text.push_str(&piece),
            _ => runs.push(TextRun { text: piece, style }),
        }
    }
    runs
}

fn convert_block(source_index: usize, raw: RawBlock) -> Option<ContentBlock> {
    let mut hints = BlockHints {
        starts_new_page: raw.meta.starts_new_page,
        list_item: false,
    };
    let mut base = RunStyle::ROMAN;

    let kind = match raw.kind.as_str() {
        "chapter_heading" => BlockKind::ChapterHeading {
            number: raw.meta.chapter_number,
        },
        "section_heading" => BlockKind::SectionHeading,
        "paragraph" => BlockKind::Paragraph,
        // footnotes are set inline, as ordinary paragraphs
        "footnote" => BlockKind::Paragraph,
        "list_item" => {
            hints.list_item = true;
            BlockKind::Paragraph
        }
        // verse has no layout of its own and is set as a block quote
        "blockquote" | "poem" | "verse" => BlockKind::BlockQuote,
        "epigraph" => {
            base = RunStyle::italic();
            BlockKind::BlockQuote
        }
        "title_page" => BlockKind::FrontMatterPage(MatterPart::TitlePage),
        "front_matter_heading" => BlockKind::FrontMatterPage(MatterPart::Heading),
        "front_matter_text" => BlockKind::FrontMatterPage(MatterPart::Text),
        "back_matter_heading" => BlockKind::BackMatterPage(MatterPart::Heading),
        "back_matter_text" => BlockKind::BackMatterPage(MatterPart::Text),
        "scene_break" => BlockKind::SceneBreak,
        "page_break" => BlockKind::PageBreak,
        "image_placeholder" | "table_placeholder" => {
            log::warn!(
                "body[{source_index}]: skipping {} (cannot be typeset)",
                raw.kind
            );
            return None;
        }
        other => {
            log::warn!("body[{source_index}]: unknown block type {other:?}, setting as paragraph");
            BlockKind::Paragraph
        }
    };

    let mut runs = apply_marks(&raw.text, &raw.marks, base, source_index);
    if hints.list_item {
        runs.insert(
            0,
            TextRun {
                text: "\u{2022} ".into(),
                style: base,
            },
        );
    }

    Some(ContentBlock {
        kind,
        runs,
        hints,
        source_index,
    })
}

fn parse_severity(value: Option<&str>) -> Severity {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("high") => Severity::High,
        Some("medium") => Severity::Medium,
        _ => Severity::Low,
    }
}

fn parse_warnings(root: &Map<String, Value>) -> Vec<ArtifactWarning> {
    let Some(Value::Array(items)) = root.get("analysis").and_then(|a| a.get("warnings")) else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match RawWarning::deserialize(item) {
            Ok(w) => Some(ArtifactWarning {
                code: w.code,
                severity: parse_severity(w.severity.as_deref()),
                message: w.message,
            }),
            Err(e) => {
                log::warn!("analysis.warnings[{i}] ignored: {e}");
                None
            }
        })
        .collect()
}

/// Parse a manuscript artifact into its ordered content blocks.
pub fn parse(raw: &[u8]) -> Result<Manuscript, ParseError> {
    let root: Value =
        serde_json::from_slice(raw).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    let Value::Object(root) = root else {
        return Err(ParseError::MalformedJson(
            "top-level value is not an object".into(),
        ));
    };

    check_version(&root)?;
    check_artifact_type(&root)?;

    let title =
        text_field(&root, "title").ok_or_else(|| ParseError::MissingRequiredField("title".into()))?;
    let author = text_field(&root, "author");

    let body = root
        .get("body")
        .or_else(|| root.get("content").and_then(|c| c.get("blocks")))
        .filter(|v| !v.is_null())
        .ok_or_else(|| ParseError::MissingRequiredField("body".into()))?;
    let Value::Array(items) = body else {
        return Err(ParseError::MalformedJson("`body` is not a list".into()));
    };

    let mut blocks = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if item.get("type").is_none_or(Value::is_null) {
            return Err(ParseError::MissingRequiredField(format!(
                "body[{index}].type"
            )));
        }
        let raw = RawBlock::deserialize(item)
            .map_err(|e| ParseError::MalformedJson(format!("body[{index}]: {e}")))?;
        if let Some(block) = convert_block(index, raw) {
            blocks.push(block);
        }
    }

    let warnings = parse_warnings(&root);

    log::debug!(
        "Parsed manuscript {title:?}: {} blocks ({} in artifact), {} warnings",
        blocks.len(),
        items.len(),
        warnings.len()
    );

    Ok(Manuscript {
        title,
        author,
        blocks,
        warnings,
    })
}
