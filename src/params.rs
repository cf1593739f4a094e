use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::model::{FolioPosition, FolioStyle, PageGeometry};

const INCH: f32 = 72.0;
const MM: f32 = 72.0 / 25.4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChapterStart {
    AlwaysOdd,
    AlwaysNewPage,
    Continuous,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Piece {
    Text(String),
    Token(String),
}

/// `{token}` substitution template, e.g. `"{title}"` or `"Chapter {number}"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    fn parse(
        field: &str,
        raw: &str,
        allowed: &[&str],
        expected: &'static str,
    ) -> Result<Self, ConfigError> {
        let mut pieces = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                break;
            };
            let name = rest[open + 1..close].trim();
            if !allowed.contains(&name) {
                return Err(ConfigError::InvalidEnum {
                    field: field.to_string(),
                    value: raw.to_string(),
                    expected,
                });
            }
            if open > 0 {
                pieces.push(Piece::Text(rest[..open].to_string()));
            }
            pieces.push(Piece::Token(name.to_string()));
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Text(rest.to_string()));
        }
        Ok(Template { pieces })
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn uses(&self, token: &str) -> bool {
        self.pieces
            .iter()
            .any(|p| matches!(p, Piece::Token(t) if t == token))
    }

    /// Substitute tokens; unknown or missing values render as empty text.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(t) => out.push_str(t),
                Piece::Token(name) => {
                    if let Some((_, value)) = vars.iter().find(|(k, _)| k == name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

/// Fully resolved layout options. All lengths are in points.
#[derive(Clone, Debug, PartialEq)]
pub struct FormattingParameters {
    pub geometry: PageGeometry,
    pub book_title: Option<String>,
    pub author_name: Option<String>,
    pub body_font: String,
    pub font_size: f32,
    pub leading: f32,
    pub paragraph_spacing: f32,
    pub paragraph_indent: f32,
    pub block_quote_indent: f32,
    pub chapter_heading_size: f32,
    pub chapter_heading_leading: f32,
    pub chapter_space_before: f32,
    pub heading_space_after: f32,
    pub section_heading_size: f32,
    pub section_heading_leading: f32,
    pub section_space_before: f32,
    pub chapter_label: Template,
    pub scene_break_glyph: String,
    pub running_head_verso: Template,
    pub running_head_recto: Template,
    pub folio_style: FolioStyle,
    pub front_matter_folio_style: FolioStyle,
    pub folio_position: FolioPosition,
    pub continue_folios: bool,
    pub widow_orphan_lines: usize,
    pub chapter_start: ChapterStart,
}

impl Default for FormattingParameters {
    fn default() -> Self {
        FormattingParameters {
            geometry: PageGeometry {
                width: 6.0 * INCH,
                height: 9.0 * INCH,
                margin_top: 0.75 * INCH,
                margin_bottom: 0.75 * INCH,
                margin_inside: 0.875 * INCH,
                margin_outside: 0.625 * INCH,
            },
            book_title: None,
            author_name: None,
            body_font: "Times".to_string(),
            font_size: 11.0,
            leading: 14.0,
            paragraph_spacing: 0.0,
            paragraph_indent: 18.0,
            block_quote_indent: 24.0,
            chapter_heading_size: 20.0,
            chapter_heading_leading: 26.0,
            chapter_space_before: 72.0,
            heading_space_after: 24.0,
            section_heading_size: 13.0,
            section_heading_leading: 18.0,
            section_space_before: 18.0,
            chapter_label: Template { pieces: Vec::new() },
            scene_break_glyph: "* * *".to_string(),
            running_head_verso: Template {
                pieces: vec![Piece::Token("title".into())],
            },
            running_head_recto: Template {
                pieces: vec![Piece::Token("chapter".into())],
            },
            folio_style: FolioStyle::Arabic,
            front_matter_folio_style: FolioStyle::LowerRoman,
            folio_position: FolioPosition::BottomCenter,
            continue_folios: false,
            widow_orphan_lines: 2,
            chapter_start: ChapterStart::AlwaysOdd,
        }
    }
}

impl FormattingParameters {
    /// Fill title and author from the manuscript when the metadata record left them out.
    pub fn with_manuscript_defaults(mut self, title: &str, author: Option<&str>) -> Self {
        if self.book_title.is_none() {
            self.book_title = Some(title.to_string());
        }
        if self.author_name.is_none() {
            self.author_name = author.map(str::to_string);
        }
        self
    }
}

const KNOWN_FIELDS: &[&str] = &[
    "trim_size",
    "trim_width",
    "trim_height",
    "margin_top",
    "margin_bottom",
    "margin_inside",
    "margin_outside",
    "book_title",
    "author_name",
    "body_font",
    "font_size",
    "leading",
    "paragraph_spacing",
    "paragraph_indent",
    "block_quote_indent",
    "chapter_heading_size",
    "chapter_heading_leading",
    "chapter_space_before",
    "heading_space_after",
    "section_heading_size",
    "section_heading_leading",
    "section_space_before",
    "chapter_label",
    "scene_break_glyph",
    "running_head_verso",
    "running_head_recto",
    "folio_style",
    "front_matter_folio_style",
    "folio_position",
    "continue_folios",
    "widow_orphan_lines",
    "chapter_start",
];

fn normalise_key(key: &str) -> String {
    let key: String = key
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    match key.as_str() {
        "font" | "typeface" => "body_font".into(),
        "trim" => "trim_size".into(),
        "title" => "book_title".into(),
        "author" => "author_name".into(),
        _ => key,
    }
}

fn normalise_choice(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '_' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone, Copy)]
enum Bare {
    Inches,
    Points,
}

impl Bare {
    fn scale(self) -> f32 {
        match self {
            Bare::Inches => INCH,
            Bare::Points => 1.0,
        }
    }
}

fn parse_length(text: &str, bare: Bare) -> Option<f32> {
    let text = text.trim().to_ascii_lowercase();
    let (number, scale) = if let Some(n) = text.strip_suffix("in").or(text.strip_suffix('"')) {
        (n, INCH)
    } else if let Some(n) = text.strip_suffix("pt") {
        (n, 1.0)
    } else if let Some(n) = text.strip_suffix("mm") {
        (n, MM)
    } else {
        (text.as_str(), bare.scale())
    };
    number.trim().parse::<f32>().ok().map(|v| v * scale)
}

fn parse_folio_style(v: &str) -> Option<FolioStyle> {
    match v {
        "arabic" => Some(FolioStyle::Arabic),
        "lower-roman" => Some(FolioStyle::LowerRoman),
        "upper-roman" => Some(FolioStyle::UpperRoman),
        _ => None,
    }
}

fn parse_folio_position(v: &str) -> Option<FolioPosition> {
    match v {
        "bottom-center" | "bottom-centre" => Some(FolioPosition::BottomCenter),
        "top-outside" => Some(FolioPosition::TopOutside),
        _ => None,
    }
}

fn parse_chapter_start(v: &str) -> Option<ChapterStart> {
    match v {
        "always-odd" => Some(ChapterStart::AlwaysOdd),
        "always-new-page" => Some(ChapterStart::AlwaysNewPage),
        "continuous" => Some(ChapterStart::Continuous),
        _ => None,
    }
}

/// Record fields keyed by normalised name. Nulls and blank strings count as
/// absent, except for running head templates.
struct Fields<'a> {
    map: BTreeMap<String, &'a Value>,
}

impl<'a> Fields<'a> {
    fn new(raw: &'a Map<String, Value>) -> Self {
        let mut map = BTreeMap::new();
        for (key, value) in raw {
            let key = normalise_key(key);
            let blank = match value {
                Value::Null => true,
                // an empty running head template switches the head off
                Value::String(s) => s.trim().is_empty() && !key.starts_with("running_head_"),
                _ => false,
            };
            if blank {
                continue;
            }
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                log::debug!("Ignoring unrecognised metadata field {key:?}");
                continue;
            }
            map.insert(key, value);
        }
        Fields { map }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).copied()
    }

    fn measure(&self, key: &str, bare: Bare) -> Result<Option<f32>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64().map(|v| v as f32 * bare.scale()),
            Value::String(s) => parse_length(s, bare),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| ConfigError::InvalidMeasurement {
            field: key.to_string(),
            value: display_value(value),
            reason: "not a measurement",
        })
    }

    /// A strictly positive length.
    fn size(&self, key: &str, bare: Bare, default: f32) -> Result<f32, ConfigError> {
        let Some(v) = self.measure(key, bare)? else {
            return Ok(default);
        };
        check_size(key, v)
    }

    /// A length that may be zero.
    fn spacing(&self, key: &str, default: f32) -> Result<f32, ConfigError> {
        let Some(v) = self.measure(key, Bare::Points)? else {
            return Ok(default);
        };
        let reason = if !v.is_finite() {
            "must be a finite number"
        } else if v < 0.0 {
            "must not be negative"
        } else {
            return Ok(v);
        };
        Err(ConfigError::InvalidMeasurement {
            field: key.to_string(),
            value: v.to_string(),
            reason,
        })
    }

    fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
    }

    fn template(
        &self,
        key: &str,
        allowed: &[&str],
        expected: &'static str,
        default: Template,
    ) -> Result<Template, ConfigError> {
        match self.text(key) {
            Some(raw) => Template::parse(key, &raw, allowed, expected),
            None => Ok(default),
        }
    }

    fn choice<T>(
        &self,
        key: &str,
        expected: &'static str,
        parse: fn(&str) -> Option<T>,
        default: T,
    ) -> Result<T, ConfigError> {
        let Some(raw) = self.text(key) else {
            return Ok(default);
        };
        parse(&normalise_choice(&raw)).ok_or(ConfigError::InvalidEnum {
            field: key.to_string(),
            value: raw,
            expected,
        })
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match normalise_choice(s).as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed.ok_or_else(|| ConfigError::InvalidEnum {
            field: key.to_string(),
            value: display_value(value),
            expected: "true or false",
        })
    }

    fn count(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n.is_finite() && n >= 1.0 && n.fract() == 0.0 => Ok(n as usize),
            _ => Err(ConfigError::InvalidMeasurement {
                field: key.to_string(),
                value: display_value(value),
                reason: "must be a whole number of at least 1",
            }),
        }
    }
}

fn check_size(field: &str, v: f32) -> Result<f32, ConfigError> {
    let reason = if !v.is_finite() {
        "must be a finite number"
    } else if v <= 0.0 {
        "must be positive"
    } else {
        return Ok(v);
    };
    Err(ConfigError::InvalidMeasurement {
        field: field.to_string(),
        value: v.to_string(),
        reason,
    })
}

/// Every line advance must fit an empty text block and every indent must
/// leave some measure, so pagination can always place a line.
fn check_fits_text_block(params: &FormattingParameters) -> Result<(), ConfigError> {
    let height = params.geometry.text_height();
    for (field, advance) in [
        ("chapter_heading_leading", params.chapter_heading_leading),
        ("section_heading_leading", params.section_heading_leading),
    ] {
        if advance > height {
            return Err(ConfigError::InvalidMeasurement {
                field: field.into(),
                value: format!("{advance} in a {height}pt text block"),
                reason: "text block is shorter than one line",
            });
        }
    }

    let width = params.geometry.text_width();
    for (field, indent, taken) in [
        ("paragraph_indent", params.paragraph_indent, params.paragraph_indent),
        ("block_quote_indent", params.block_quote_indent, 2.0 * params.block_quote_indent),
    ] {
        if taken >= width {
            return Err(ConfigError::InvalidMeasurement {
                field: field.into(),
                value: format!("{indent} on a {width}pt measure"),
                reason: "indent leaves no room for text",
            });
        }
    }
    Ok(())
}

fn parse_trim(value: &Value) -> Option<(f32, f32)> {
    let Value::String(s) = value else {
        return None;
    };
    let s = s.to_ascii_lowercase().replace('\u{00d7}', "x");
    let (w, h) = s.split_once('x')?;
    Some((parse_length(w, Bare::Inches)?, parse_length(h, Bare::Inches)?))
}

/// Resolve the Book Metadata record into validated parameters.
pub fn resolve(raw: &Map<String, Value>) -> Result<FormattingParameters, ConfigError> {
    let fields = Fields::new(raw);
    let defaults = FormattingParameters::default();
    let mut geometry = defaults.geometry;

    if let Some(value) = fields.get("trim_size") {
        let (w, h) = parse_trim(value).ok_or_else(|| ConfigError::InvalidMeasurement {
            field: "trim_size".into(),
            value: display_value(value),
            reason: "expected WIDTH x HEIGHT",
        })?;
        geometry.width = check_size("trim_size", w)?;
        geometry.height = check_size("trim_size", h)?;
    }
    geometry.width = fields.size("trim_width", Bare::Inches, geometry.width)?;
    geometry.height = fields.size("trim_height", Bare::Inches, geometry.height)?;
    geometry.margin_top = fields.size("margin_top", Bare::Inches, geometry.margin_top)?;
    geometry.margin_bottom = fields.size("margin_bottom", Bare::Inches, geometry.margin_bottom)?;
    geometry.margin_inside = fields.size("margin_inside", Bare::Inches, geometry.margin_inside)?;
    geometry.margin_outside =
        fields.size("margin_outside", Bare::Inches, geometry.margin_outside)?;

    if geometry.text_width() <= 0.0 {
        return Err(ConfigError::InvalidMeasurement {
            field: "margin_inside".into(),
            value: format!(
                "{} + {} on a {}pt page",
                geometry.margin_inside, geometry.margin_outside, geometry.width
            ),
            reason: "margins leave no usable text width",
        });
    }
    if geometry.text_height() <= 0.0 {
        return Err(ConfigError::InvalidMeasurement {
            field: "margin_top".into(),
            value: format!(
                "{} + {} on a {}pt page",
                geometry.margin_top, geometry.margin_bottom, geometry.height
            ),
            reason: "margins leave no usable text height",
        });
    }

    let leading = fields.size("leading", Bare::Points, defaults.leading)?;
    if geometry.text_height() < leading {
        return Err(ConfigError::InvalidMeasurement {
            field: "leading".into(),
            value: leading.to_string(),
            reason: "text block is shorter than one line",
        });
    }

    const HEAD_TOKENS: &str = "tokens {title}, {author}, {chapter}";
    let params = FormattingParameters {
        geometry,
        book_title: fields.text("book_title"),
        author_name: fields.text("author_name"),
        body_font: fields.text("body_font").unwrap_or(defaults.body_font),
        font_size: fields.size("font_size", Bare::Points, defaults.font_size)?,
        leading,
        paragraph_spacing: fields.spacing("paragraph_spacing", defaults.paragraph_spacing)?,
        paragraph_indent: fields.spacing("paragraph_indent", defaults.paragraph_indent)?,
        block_quote_indent: fields.spacing("block_quote_indent", defaults.block_quote_indent)?,
        chapter_heading_size: fields.size(
            "chapter_heading_size",
            Bare::Points,
            defaults.chapter_heading_size,
        )?,
        chapter_heading_leading: fields.size(
            "chapter_heading_leading",
            Bare::Points,
            defaults.chapter_heading_leading,
        )?,
        chapter_space_before: fields
            .spacing("chapter_space_before", defaults.chapter_space_before)?,
        heading_space_after: fields.spacing("heading_space_after", defaults.heading_space_after)?,
        section_heading_size: fields.size(
            "section_heading_size",
            Bare::Points,
            defaults.section_heading_size,
        )?,
        section_heading_leading: fields.size(
            "section_heading_leading",
            Bare::Points,
            defaults.section_heading_leading,
        )?,
        section_space_before: fields
            .spacing("section_space_before", defaults.section_space_before)?,
        chapter_label: fields.template(
            "chapter_label",
            &["number"],
            "token {number}",
            defaults.chapter_label,
        )?,
        scene_break_glyph: fields
            .text("scene_break_glyph")
            .unwrap_or(defaults.scene_break_glyph),
        running_head_verso: fields.template(
            "running_head_verso",
            &["title", "author", "chapter"],
            HEAD_TOKENS,
            defaults.running_head_verso,
        )?,
        running_head_recto: fields.template(
            "running_head_recto",
            &["title", "author", "chapter"],
            HEAD_TOKENS,
            defaults.running_head_recto,
        )?,
        folio_style: fields.choice(
            "folio_style",
            "arabic, lower-roman or upper-roman",
            parse_folio_style,
            defaults.folio_style,
        )?,
        front_matter_folio_style: fields.choice(
            "front_matter_folio_style",
            "arabic, lower-roman or upper-roman",
            parse_folio_style,
            defaults.front_matter_folio_style,
        )?,
        folio_position: fields.choice(
            "folio_position",
            "bottom-center or top-outside",
            parse_folio_position,
            defaults.folio_position,
        )?,
        continue_folios: fields.flag("continue_folios", defaults.continue_folios)?,
        widow_orphan_lines: fields.count("widow_orphan_lines", defaults.widow_orphan_lines)?,
        chapter_start: fields.choice(
            "chapter_start",
            "always-odd, always-new-page or continuous",
            parse_chapter_start,
            defaults.chapter_start,
        )?,
    };

    check_fits_text_block(&params)?;

    log::debug!(
        "Resolved parameters: trim {:.1}x{:.1}pt, text block {:.1}x{:.1}pt, {} {}/{}pt, chapters {:?}",
        params.geometry.width,
        params.geometry.height,
        params.geometry.text_width(),
        params.geometry.text_height(),
        params.body_font,
        params.font_size,
        params.leading,
        params.chapter_start
    );

    Ok(params)
}
