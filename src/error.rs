use thiserror::Error;

/// Failures while reading the manuscript artifact.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("manuscript is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("unsupported manuscript schema version {found:?} (supported: {supported})")]
    UnsupportedVersion { found: String, supported: &'static str },

    #[error("manuscript is missing required field `{0}`")]
    MissingRequiredField(String),

    #[error("expected a manuscript artifact, got artifact_type {0:?}")]
    UnexpectedArtifactType(String),

    #[error("manuscript rejected: {0}")]
    Rejected(String),
}

/// Invalid formatting parameters from the Book Metadata record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid measurement for `{field}` ({value}): {reason}")]
    InvalidMeasurement {
        field: String,
        value: String,
        reason: &'static str,
    },

    #[error("invalid value {value:?} for `{field}` (expected {expected})")]
    InvalidEnum {
        field: String,
        value: String,
        expected: &'static str,
    },
}

/// Pagination could not produce a complete layout.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("block {block_index} cannot be placed: {detail}")]
    UnbreakableContent { block_index: usize, detail: String },

    #[error("manuscript produced no pages")]
    EmptyDocument,

    #[error("layout has {pages} pages (print limit is {max})")]
    PageLimitExceeded { pages: usize, max: usize },
}

/// Failure surfaced from the render adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("font embedding failed for {face}: {message}")]
    Font { face: String, message: String },

    #[error("rendered PDF is {bytes} bytes (limit {max})")]
    OutputTooLarge { bytes: usize, max: usize },
}

/// Failure talking to the manuscript record store or the artifact store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record {record}: {message}")]
    InvalidRecord { record: String, message: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
