use crate::model::ArtifactWarning;

/// Warning codes that make a manuscript unprintable.
pub const FAIL_CODES: &[&str] = &["DETECTED_IMAGES", "DETECTED_TABLES"];

/// Warning codes that are typeset anyway, with reduced fidelity.
pub const DEGRADE_CODES: &[&str] = &[
    "DETECTED_FOOTNOTES",
    "POEM_LIKE_BLOCKS",
    "UNICODE_RISK",
    "EXCESSIVE_WHITESPACE",
    "CENTERED_TEXT_BLOCKS",
    "OCR_ARTIFACTS",
    "FORMATTING_INCONSISTENCY",
];

pub const PROCEED_CODES: &[&str] = &["LOW_CHAPTER_CONFIDENCE"];

/// Above this many degradations the result would not be worth printing.
pub const MAX_DEGRADATIONS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessingDecision {
    Proceed,
    Degrade(Vec<String>),
    Fail(String),
}

fn degradation_note(code: &str) -> &'static str {
    match code {
        "DETECTED_FOOTNOTES" => "footnotes rendered inline",
        "POEM_LIKE_BLOCKS" => "poetry rendered as blockquotes",
        "UNICODE_RISK" => "non-standard characters may render incorrectly",
        "EXCESSIVE_WHITESPACE" => "extra spacing normalised",
        "CENTERED_TEXT_BLOCKS" => "centred text rendered left-aligned",
        "OCR_ARTIFACTS" => "OCR errors may affect quality",
        _ => "inconsistent formatting normalised",
    }
}

/// Decide whether a manuscript with these analysis warnings should be typeset.
pub fn evaluate(warnings: &[ArtifactWarning]) -> ProcessingDecision {
    if let Some(fatal) = warnings
        .iter()
        .find(|w| FAIL_CODES.contains(&w.code.as_str()))
    {
        let detail = fatal.message.as_deref().unwrap_or("unsupported content");
        return ProcessingDecision::Fail(format!("{}: {detail}", fatal.code));
    }

    let mut degradations = Vec::new();
    for warning in warnings {
        let code = warning.code.as_str();
        if DEGRADE_CODES.contains(&code) {
            degradations.push(format!("{code}: {}", degradation_note(code)));
        } else if !PROCEED_CODES.contains(&code) {
            log::warn!("Unknown analysis warning {code:?}, proceeding anyway");
        }
    }

    if degradations.len() > MAX_DEGRADATIONS {
        return ProcessingDecision::Fail(format!(
            "too many degradations ({} > {MAX_DEGRADATIONS})",
            degradations.len()
        ));
    }
    if degradations.is_empty() {
        ProcessingDecision::Proceed
    } else {
        ProcessingDecision::Degrade(degradations)
    }
}
