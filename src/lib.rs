pub mod assemble;
pub mod error;
pub mod flow;
pub mod fonts;
pub mod job;
pub mod manuscript;
pub mod model;
pub mod params;
pub mod pdf;

pub use error::{ConfigError, Error, LayoutError, ParseError, RenderError, StoreError};
pub use fonts::FontBook;
pub use model::{DocumentLayout, Manuscript};
pub use params::FormattingParameters;
pub use pdf::{PdfRenderer, RenderAdapter};

use std::path::{Path, PathBuf};
use std::time::Instant;

use manuscript::policy::{self, ProcessingDecision};
use serde_json::{Map, Value};

/// A rendered interior and what the run learned about it.
#[derive(Debug)]
pub struct Interior {
    pub pdf: Vec<u8>,
    pub page_count: usize,
    pub degradations: Vec<String>,
}

/// Parse a manuscript artifact and apply the analysis warning policy.
/// Returns the manuscript and the degradations it will be typeset with.
pub fn read_manuscript(raw: &[u8]) -> Result<(Manuscript, Vec<String>), ParseError> {
    let manuscript = manuscript::parse(raw)?;
    match policy::evaluate(&manuscript.warnings) {
        ProcessingDecision::Proceed => Ok((manuscript, Vec::new())),
        ProcessingDecision::Degrade(notes) => {
            for note in &notes {
                log::warn!("Degraded: {note}");
            }
            Ok((manuscript, notes))
        }
        ProcessingDecision::Fail(reason) => Err(ParseError::Rejected(reason)),
    }
}

/// Resolve the Book Metadata fields, filling title and author from the manuscript.
pub fn resolve_parameters(
    manuscript: &Manuscript,
    fields: &Map<String, Value>,
) -> Result<FormattingParameters, ConfigError> {
    params::resolve(fields)
        .map(|p| p.with_manuscript_defaults(&manuscript.title, manuscript.author.as_deref()))
}

/// Metrics for the body typeface: scanned from `font_dirs` when given,
/// built-in standard metrics otherwise.
pub fn font_book(family: &str, font_dirs: &[PathBuf]) -> FontBook {
    if font_dirs.is_empty() {
        FontBook::standard(family)
    } else {
        fonts::load_family(font_dirs, family)
    }
}

/// The pure core: paginate, assemble and preflight. Same inputs, same layout.
pub fn typeset(
    manuscript: &Manuscript,
    params: &FormattingParameters,
    fonts: &FontBook,
) -> Result<DocumentLayout, LayoutError> {
    let t0 = Instant::now();

    let pages = flow::paginate(&manuscript.blocks, params, fonts)?;
    let t_paginate = t0.elapsed();

    let layout = assemble::assemble(pages, params);
    assemble::preflight(&layout)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: paginate={:.1}ms, assemble={:.1}ms ({} pages)",
        t_paginate.as_secs_f64() * 1000.0,
        (t_total - t_paginate).as_secs_f64() * 1000.0,
        layout.page_count,
    );

    Ok(layout)
}

/// Manuscript bytes and metadata fields in, PDF bytes out.
pub fn format_interior(
    raw: &[u8],
    fields: &Map<String, Value>,
    font_dirs: &[PathBuf],
) -> Result<Interior, Error> {
    let t0 = Instant::now();

    let (manuscript, degradations) = read_manuscript(raw)?;
    let t_parse = t0.elapsed();

    let params = resolve_parameters(&manuscript, fields)?;
    let fonts = font_book(&params.body_font, font_dirs);
    let t_resolve = t0.elapsed();

    let layout = typeset(&manuscript, &params, &fonts)?;
    let t_layout = t0.elapsed();

    let pdf = PdfRenderer::new(fonts).render(&layout)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: parse={:.1}ms, resolve={:.1}ms, layout={:.1}ms, render={:.1}ms, total={:.1}ms (output {} bytes)",
        t_parse.as_secs_f64() * 1000.0,
        (t_resolve - t_parse).as_secs_f64() * 1000.0,
        (t_layout - t_resolve).as_secs_f64() * 1000.0,
        (t_total - t_layout).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        pdf.len(),
    );

    Ok(Interior {
        pdf,
        page_count: layout.page_count,
        degradations,
    })
}

/// Read the metadata record file: a JSON object of Book Metadata fields.
pub fn read_metadata(path: &Path) -> Result<Map<String, Value>, Error> {
    let bytes = std::fs::read(path)?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::InvalidRecord {
            record: path.display().to_string(),
            message: "expected a JSON object of fields".into(),
        }
        .into()),
        Err(e) => Err(StoreError::InvalidRecord {
            record: path.display().to_string(),
            message: e.to_string(),
        }
        .into()),
    }
}

pub fn format_interior_file(
    input: &Path,
    metadata: Option<&Path>,
    output: &Path,
    font_dirs: &[PathBuf],
) -> Result<Interior, Error> {
    let raw = std::fs::read(input)?;
    let fields = match metadata {
        Some(path) => read_metadata(path)?,
        None => Map::new(),
    };
    let interior = format_interior(&raw, &fields, font_dirs)?;
    std::fs::write(output, &interior.pdf)?;
    Ok(interior)
}
