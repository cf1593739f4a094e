mod common;

use manuscript_pdf::job::{
    ArtifactStore, CompletionNotes, DirectoryStore, Job, JobConfig, MemoryStore, PDF_CONTENT_TYPE,
    Status, StatusField, StatusUpdate, StoredArtifact,
};
use manuscript_pdf::{ConfigError, Error, ParseError, StoreError};
use chrono::{DateTime, TimeZone, Utc};
use rayon::prelude::*;
use serde_json::{Map, Value, json};

fn book() -> Value {
    let mut blocks = common::chapter_blocks(1, 8, 50);
    blocks.extend(common::chapter_blocks(2, 8, 50));
    common::manuscript(blocks)
}

fn timestamp(record: &Map<String, Value>, field: &str) -> DateTime<Utc> {
    let text = record[field].as_str().unwrap();
    assert!(text.ends_with('Z'), "{field} is not UTC: {text}");
    DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
}

fn history(store: &MemoryStore, job: &str) -> Vec<&'static str> {
    store
        .status_history(job)
        .iter()
        .map(|u| u.status.name())
        .collect()
}

#[test]
fn completed_job_records_artifact_and_notes() {
    common::init_logging();
    let store = MemoryStore::new();
    store.insert_job("job-1", common::bytes(&book()), Map::new());

    let outcome = Job::new(&store, &store, JobConfig::default())
        .run("job-1")
        .unwrap();
    assert_eq!(outcome.artifact.key, "services/job-1/interior.pdf");
    assert!(outcome.page_count >= 2);

    assert_eq!(history(&store, "job-1"), vec!["Processing", "Complete"]);

    let record = store.record("job-1").unwrap();
    assert_eq!(record["Status"], json!("Complete"));
    assert_eq!(record["Artifact Key"], json!("services/job-1/interior.pdf"));
    assert_eq!(record["Artifact URL"], json!("memory://services/job-1/interior.pdf"));
    assert_eq!(record["Artifact Type"], json!("interior_pdf"));
    assert!(record["Worker Version"].as_str().unwrap().starts_with("manuscript-pdf "));
    assert!(!record.contains_key("Statuses"));
    assert!(!record.contains_key("Error Log"));
    assert!(timestamp(&record, "Started At") <= timestamp(&record, "Finished At"));

    let notes = record["Operator Notes"].as_str().unwrap();
    let summary: Value = serde_json::from_str(notes.strip_prefix("Interior PDF: ").unwrap()).unwrap();
    assert_eq!(summary["page_count"], json!(outcome.page_count));
    assert_eq!(summary["degradations"], json!([]));

    let (pdf, content_type) = store.object("services/job-1/interior.pdf").unwrap();
    assert_eq!(content_type, PDF_CONTENT_TYPE);
    assert!(pdf.starts_with(b"%PDF-"));
}

#[test]
fn degradations_reach_the_operator_notes() {
    let mut doc = book();
    doc["analysis"] = json!({ "warnings": [ { "code": "DETECTED_FOOTNOTES" } ] });
    let store = MemoryStore::new();
    store.insert_job("job-2", common::bytes(&doc), Map::new());

    let outcome = Job::new(&store, &store, JobConfig::default())
        .run("job-2")
        .unwrap();
    assert_eq!(outcome.degradations.len(), 1);

    let record = store.record("job-2").unwrap();
    let notes = record["Operator Notes"].as_str().unwrap();
    assert!(notes.contains("DETECTED_FOOTNOTES"));
}

#[test]
fn rejected_manuscript_is_reported_failed() {
    let mut doc = book();
    doc["analysis"] = json!({ "warnings": [ { "code": "DETECTED_TABLES", "message": "4 tables" } ] });
    let store = MemoryStore::new();
    store.insert_job("job-3", common::bytes(&doc), Map::new());

    let err = Job::new(&store, &store, JobConfig::default())
        .run("job-3")
        .unwrap_err();
    assert!(matches!(err, Error::Parse(ParseError::Rejected(_))), "{err:?}");

    assert_eq!(history(&store, "job-3"), vec!["Processing", "Failed"]);
    let record = store.record("job-3").unwrap();
    assert_eq!(record["Status"], json!("Failed"));
    assert_eq!(record["Error Log"], json!(err.to_string()));
    assert!(timestamp(&record, "Started At") <= timestamp(&record, "Finished At"));
    assert!(!record.contains_key("Artifact URL"));
    assert!(!record.contains_key("Statuses"));
    assert!(store.object("services/job-3/interior.pdf").is_none());
}

#[test]
fn invalid_metadata_fails_the_job() {
    let store = MemoryStore::new();
    store.insert_job(
        "job-4",
        common::bytes(&book()),
        common::fields(json!({ "margin_outside": "-1in" })),
    );

    let err = Job::new(&store, &store, JobConfig::default())
        .run("job-4")
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::InvalidMeasurement { ref field, .. }) if field == "margin_outside"
    ));
    let record = store.record("job-4").unwrap();
    assert!(record["Error Log"].as_str().unwrap().contains("margin_outside"));
}

#[test]
fn unknown_job_is_not_found() {
    let store = MemoryStore::new();
    let err = Job::new(&store, &store, JobConfig::default())
        .run("missing")
        .unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::NotFound(_))));
    assert!(store.record("missing").is_none());
}

#[test]
fn legacy_status_field_is_never_written() {
    assert_eq!(StatusField::Canonical.record_field(), Some("Status"));
    assert_eq!(StatusField::LegacyIgnored.record_field(), None);
    assert_eq!(StatusField::LegacyIgnored.name(), "Statuses");

    let statuses = [
        Status::Processing,
        Status::Complete {
            artifact: StoredArtifact {
                url: "memory://k".into(),
                key: "k".into(),
            },
            notes: CompletionNotes {
                page_count: 3,
                duration_seconds: 0.5,
                degradations: vec![],
            },
        },
        Status::Failed {
            message: "boom".into(),
        },
    ];
    for status in statuses {
        let update = StatusUpdate::new(status, "test");
        assert_eq!(update.field(), StatusField::Canonical);
        let names: Vec<&str> = update.fields().iter().map(|(n, _)| *n).collect();
        assert_eq!(names[0], "Status");
        assert!(names.contains(&"Worker Version"));
        assert!(!names.contains(&"Statuses"));
    }
}

#[test]
fn status_times_are_written_as_utc() {
    let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
    let started = StatusUpdate::at(Status::Processing, "test", at);
    let fields = started.fields();
    assert_eq!(fields[1], ("Started At", json!("2026-03-14T09:26:53.000Z")));
    assert!(fields.iter().all(|(n, _)| *n != "Finished At"));

    let failed = StatusUpdate::at(
        Status::Failed {
            message: "boom".into(),
        },
        "test",
        at,
    );
    let fields = failed.fields();
    assert_eq!(fields[1], ("Finished At", json!("2026-03-14T09:26:53.000Z")));
    assert!(fields.iter().all(|(n, _)| *n != "Started At"));
}

#[test]
fn custom_prefix_changes_the_artifact_key() {
    let config = JobConfig {
        artifact_prefix: "/interiors/".into(),
        ..JobConfig::default()
    };
    assert_eq!(config.artifact_key("b-17"), "interiors/b-17/interior.pdf");

    let bare = JobConfig {
        artifact_prefix: String::new(),
        ..JobConfig::default()
    };
    assert_eq!(bare.artifact_key("b-17"), "b-17/interior.pdf");
}

#[test]
fn directory_store_round_trip() {
    common::init_logging();
    let root = common::scratch_dir("directory_store");
    let job_dir = root.join("job-7");
    std::fs::create_dir_all(&job_dir).unwrap();
    std::fs::write(job_dir.join("manuscript.json"), common::bytes(&book())).unwrap();
    std::fs::write(job_dir.join("metadata.json"), br#"{ "Chapter Start": "always-new-page" }"#).unwrap();
    std::fs::write(
        job_dir.join("record.json"),
        br#"{ "Title": "Salt and Iron", "Statuses": "Legacy value" }"#,
    )
    .unwrap();

    let store = DirectoryStore::new(&root, Some("https://cdn.example.com/books/".into()));
    let outcome = Job::new(&store, &store, JobConfig::default())
        .run("job-7")
        .unwrap();
    assert_eq!(
        outcome.artifact.url,
        "https://cdn.example.com/books/services/job-7/interior.pdf"
    );

    let stored = std::fs::read(root.join("artifacts/services/job-7/interior.pdf")).unwrap();
    assert!(stored.starts_with(b"%PDF-"));

    let record: Value =
        serde_json::from_slice(&std::fs::read(job_dir.join("record.json")).unwrap()).unwrap();
    assert_eq!(record["Status"], json!("Complete"));
    assert_eq!(record["Title"], json!("Salt and Iron"));
    assert!(record["Finished At"].is_string());
    // the legacy field is left exactly as found
    assert_eq!(record["Statuses"], json!("Legacy value"));
}

#[test]
fn directory_store_without_metadata_uses_defaults() {
    let root = common::scratch_dir("directory_store_defaults");
    std::fs::create_dir_all(root.join("job-8")).unwrap();
    std::fs::write(root.join("job-8/manuscript.json"), common::bytes(&book())).unwrap();

    let store = DirectoryStore::new(&root, None);
    let outcome = Job::new(&store, &store, JobConfig::default())
        .run("job-8")
        .unwrap();
    assert!(outcome.artifact.url.starts_with("file://"));
    assert!(outcome.artifact.url.ends_with("services/job-8/interior.pdf"));
}

#[test]
fn directory_store_rejects_path_escapes() {
    let root = common::scratch_dir("directory_store_escape");
    let store = DirectoryStore::new(&root, None);
    let err = Job::new(&store, &store, JobConfig::default())
        .run("../outside")
        .unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::InvalidRecord { .. })));

    let err = store.put("a/../../b.pdf", b"%PDF-", PDF_CONTENT_TYPE).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord { .. }));
}

#[test]
fn jobs_run_in_parallel_without_interference() {
    common::init_logging();
    let store = MemoryStore::new();
    let ids: Vec<String> = (0..8).map(|i| format!("parallel-{i}")).collect();
    for id in &ids {
        store.insert_job(id, common::bytes(&book()), Map::new());
    }

    let outcomes: Vec<_> = ids
        .par_iter()
        .map(|id| Job::new(&store, &store, JobConfig::default()).run(id))
        .collect();
    assert!(outcomes.iter().all(|o| o.is_ok()));

    let first = store.object("services/parallel-0/interior.pdf").unwrap().0;
    for id in &ids {
        assert_eq!(history(&store, id), vec!["Processing", "Complete"]);
        let (pdf, _) = store.object(&format!("services/{id}/interior.pdf")).unwrap();
        assert_eq!(pdf, first);
    }
}
