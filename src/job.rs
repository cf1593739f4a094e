//! Job orchestration: fetch a manuscript and its Book Metadata record, typeset
//! it, upload the interior and keep the record's status fields current.
//!
//! The stores sit behind traits so the record system and the object store can
//! be swapped out. `MemoryStore` and `DirectoryStore` are the two bundled
//! implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, StoreError};

pub const ARTIFACT_FILE: &str = "interior.pdf";
pub const ARTIFACT_TYPE: &str = "interior_pdf";
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// The record system holding manuscripts, their metadata and job status.
pub trait DataStore {
    fn fetch_manuscript(&self, job_id: &str) -> Result<Vec<u8>, StoreError>;
    fn fetch_parameters(&self, job_id: &str) -> Result<Map<String, Value>, StoreError>;
    fn report_status(&self, job_id: &str, update: &StatusUpdate) -> Result<(), StoreError>;
}

/// Object storage for finished interiors.
pub trait ArtifactStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<StoredArtifact, StoreError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredArtifact {
    pub url: String,
    pub key: String,
}

/// Summary written to the record's operator notes on completion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionNotes {
    pub page_count: usize,
    pub duration_seconds: f64,
    pub degradations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    Processing,
    Complete {
        artifact: StoredArtifact,
        notes: CompletionNotes,
    },
    Failed {
        message: String,
    },
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Status::Processing => "Processing",
            Status::Complete { .. } => "Complete",
            Status::Failed { .. } => "Failed",
        }
    }
}

/// Which record field a status is written to. The legacy `Statuses` field is
/// still present on old records but has no field name here, so it is never
/// written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusField {
    Canonical,
    LegacyIgnored,
}

impl StatusField {
    pub fn record_field(self) -> Option<&'static str> {
        match self {
            StatusField::Canonical => Some("Status"),
            StatusField::LegacyIgnored => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StatusField::Canonical => "Status",
            StatusField::LegacyIgnored => "Statuses",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatusUpdate {
    pub status: Status,
    pub worker_version: String,
    /// When the status was reached; written as `Started At` or `Finished At`.
    pub at: DateTime<Utc>,
    field: StatusField,
}

impl StatusUpdate {
    pub fn new(status: Status, worker_version: impl Into<String>) -> Self {
        StatusUpdate::at(status, worker_version, Utc::now())
    }

    pub fn at(status: Status, worker_version: impl Into<String>, at: DateTime<Utc>) -> Self {
        StatusUpdate {
            status,
            worker_version: worker_version.into(),
            at,
            field: StatusField::Canonical,
        }
    }

    pub fn field(&self) -> StatusField {
        self.field
    }

    /// Record fields to write, in a fixed order.
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        let mut fields = Vec::new();
        if let Some(name) = self.field.record_field() {
            fields.push((name, Value::from(self.status.name())));
        }
        let stamp_field = match self.status {
            Status::Processing => "Started At",
            Status::Complete { .. } | Status::Failed { .. } => "Finished At",
        };
        fields.push((
            stamp_field,
            Value::from(self.at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ));
        fields.push(("Worker Version", Value::from(self.worker_version.as_str())));

        match &self.status {
            Status::Processing => {}
            Status::Complete { artifact, notes } => {
                fields.push(("Artifact URL", Value::from(artifact.url.as_str())));
                fields.push(("Artifact Key", Value::from(artifact.key.as_str())));
                fields.push(("Artifact Type", Value::from(ARTIFACT_TYPE)));
                let summary = serde_json::to_string_pretty(notes).unwrap_or_default();
                fields.push(("Operator Notes", Value::from(format!("Interior PDF: {summary}"))));
            }
            Status::Failed { message } => {
                fields.push(("Error Log", Value::from(message.as_str())));
            }
        }
        fields
    }
}

#[derive(Clone, Debug)]
pub struct JobConfig {
    pub artifact_prefix: String,
    pub public_base_url: Option<String>,
    pub font_dirs: Vec<PathBuf>,
    pub worker_version: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            artifact_prefix: "services".into(),
            public_base_url: None,
            font_dirs: Vec::new(),
            worker_version: concat!("manuscript-pdf ", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl JobConfig {
    pub fn artifact_key(&self, job_id: &str) -> String {
        let prefix = self.artifact_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{job_id}/{ARTIFACT_FILE}")
        } else {
            format!("{prefix}/{job_id}/{ARTIFACT_FILE}")
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobOutcome {
    pub artifact: StoredArtifact,
    pub page_count: usize,
    pub degradations: Vec<String>,
}

pub struct Job<'a> {
    data: &'a dyn DataStore,
    artifacts: &'a dyn ArtifactStore,
    config: JobConfig,
}

impl<'a> Job<'a> {
    pub fn new(data: &'a dyn DataStore, artifacts: &'a dyn ArtifactStore, config: JobConfig) -> Self {
        Job {
            data,
            artifacts,
            config,
        }
    }

    fn report(&self, job_id: &str, status: Status) -> Result<(), StoreError> {
        let update = StatusUpdate::new(status, self.config.worker_version.as_str());
        self.data.report_status(job_id, &update)
    }

    /// Run one job to completion. Failures are reported on the record and
    /// returned; nothing is retried.
    pub fn run(&self, job_id: &str) -> Result<JobOutcome, Error> {
        log::info!("Job {job_id}: processing");
        let started = Instant::now();

        let result = self
            .report(job_id, Status::Processing)
            .map_err(Error::from)
            .and_then(|()| self.execute(job_id, started));

        match result {
            Ok(outcome) => {
                log::info!(
                    "Job {job_id}: complete ({} pages, {})",
                    outcome.page_count,
                    outcome.artifact.key
                );
                Ok(outcome)
            }
            Err(e) => {
                log::error!("Job {job_id}: failed: {e}");
                let failed = Status::Failed {
                    message: e.to_string(),
                };
                if let Err(report_err) = self.report(job_id, failed) {
                    log::error!("Job {job_id}: could not record failure: {report_err}");
                }
                Err(e)
            }
        }
    }

    fn execute(&self, job_id: &str, started: Instant) -> Result<JobOutcome, Error> {
        let raw = self.data.fetch_manuscript(job_id)?;
        let fields = self.data.fetch_parameters(job_id)?;

        let interior = crate::format_interior(&raw, &fields, &self.config.font_dirs)?;

        let key = self.config.artifact_key(job_id);
        let artifact = self.artifacts.put(&key, &interior.pdf, PDF_CONTENT_TYPE)?;

        let notes = CompletionNotes {
            page_count: interior.page_count,
            duration_seconds: started.elapsed().as_secs_f64(),
            degradations: interior.degradations.clone(),
        };
        self.report(
            job_id,
            Status::Complete {
                artifact: artifact.clone(),
                notes,
            },
        )?;

        Ok(JobOutcome {
            artifact,
            page_count: interior.page_count,
            degradations: interior.degradations,
        })
    }
}

#[derive(Debug, Default)]
struct MemoryRecord {
    manuscript: Vec<u8>,
    parameters: Map<String, Value>,
    fields: Map<String, Value>,
    history: Vec<StatusUpdate>,
}

/// In-process store for tests and embedding. Safe to share between threads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, MemoryRecord>>,
    objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn insert_job(&self, job_id: &str, manuscript: Vec<u8>, parameters: Map<String, Value>) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(
            job_id.to_string(),
            MemoryRecord {
                manuscript,
                parameters,
                ..MemoryRecord::default()
            },
        );
    }

    /// Current record fields written by status reports.
    pub fn record(&self, job_id: &str) -> Option<Map<String, Value>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(job_id).map(|r| r.fields.clone())
    }

    pub fn status_history(&self, job_id: &str) -> Vec<StatusUpdate> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .get(job_id)
            .map(|r| r.history.clone())
            .unwrap_or_default()
    }

    /// Stored object bytes and content type.
    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.get(key).cloned()
    }
}

impl DataStore for MemoryStore {
    fn fetch_manuscript(&self, job_id: &str) -> Result<Vec<u8>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .get(job_id)
            .map(|r| r.manuscript.clone())
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    fn fetch_parameters(&self, job_id: &str) -> Result<Map<String, Value>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .get(job_id)
            .map(|r| r.parameters.clone())
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    fn report_status(&self, job_id: &str, update: &StatusUpdate) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        for (name, value) in update.fields() {
            record.fields.insert(name.to_string(), value);
        }
        record.history.push(update.clone());
        Ok(())
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<StoredArtifact, StoreError> {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(StoredArtifact {
            url: format!("memory://{key}"),
            key: key.to_string(),
        })
    }
}

/// File-system store. Layout under `root`:
///
/// ```text
/// <job>/manuscript.json   manuscript artifact
/// <job>/metadata.json     Book Metadata fields (optional)
/// <job>/record.json       status fields, merged on every report
/// artifacts/<key>         uploaded interiors
/// ```
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    public_url: Option<String>,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>, public_url: Option<String>) -> Self {
        DirectoryStore {
            root: root.into(),
            public_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, job_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !job_id.is_empty()
            && job_id != "."
            && job_id != ".."
            && !job_id.contains(['/', '\\']);
        if !valid {
            return Err(StoreError::InvalidRecord {
                record: job_id.to_string(),
                message: "job id must be a single path component".into(),
            });
        }
        Ok(self.root.join(job_id))
    }

    fn read_object(path: &Path) -> Result<Map<String, Value>, StoreError> {
        let bytes = std::fs::read(path)?;
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::InvalidRecord {
                record: path.display().to_string(),
                message: "expected a JSON object".into(),
            }),
            Err(e) => Err(StoreError::InvalidRecord {
                record: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }
}

impl DataStore for DirectoryStore {
    fn fetch_manuscript(&self, job_id: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.job_dir(job_id)?.join("manuscript.json");
        if !path.is_file() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        Ok(std::fs::read(path)?)
    }

    fn fetch_parameters(&self, job_id: &str) -> Result<Map<String, Value>, StoreError> {
        let dir = self.job_dir(job_id)?;
        if !dir.is_dir() {
            return Err(StoreError::NotFound(dir.display().to_string()));
        }
        let path = dir.join("metadata.json");
        if !path.is_file() {
            log::debug!("No metadata record for {job_id}, using defaults");
            return Ok(Map::new());
        }
        Self::read_object(&path)
    }

    fn report_status(&self, job_id: &str, update: &StatusUpdate) -> Result<(), StoreError> {
        let dir = self.job_dir(job_id)?;
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("record.json");
        let mut record = if path.is_file() {
            Self::read_object(&path)?
        } else {
            Map::new()
        };
        for (name, value) in update.fields() {
            record.insert(name.to_string(), value);
        }
        let text = serde_json::to_string_pretty(&Value::Object(record)).map_err(|e| {
            StoreError::InvalidRecord {
                record: path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        std::fs::write(&path, text)?;
        Ok(())
    }
}

impl ArtifactStore for DirectoryStore {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<StoredArtifact, StoreError> {
        if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
            return Err(StoreError::InvalidRecord {
                record: key.to_string(),
                message: "artifact key has an empty or relative component".into(),
            });
        }
        let path = self.root.join("artifacts").join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;

        let url = match &self.public_url {
            Some(base) => format!("{}/{key}", base.trim_end_matches('/')),
            None => {
                let absolute = std::fs::canonicalize(&path).unwrap_or(path);
                format!("file://{}", absolute.display())
            }
        };
        Ok(StoredArtifact {
            url,
            key: key.to_string(),
        })
    }
}
