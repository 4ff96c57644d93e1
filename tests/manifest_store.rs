//! Integration coverage for the manifest as the crate's public surface sees
//! it: multiple cases under one output root, concurrent appenders, and the
//! raw/parsed read paths agreeing with each other.

use docket::core::manifest::{ManifestLine, ManifestStore, MANIFEST_FILE_NAME};
use tempfile::tempdir;

#[test]
fn manifest_lives_at_the_documented_path() {
    let dir = tempdir().unwrap();
    let store = ManifestStore::new(dir.path());
    store
        .append("alpha", &ManifestLine::CaseStatus("NEW".to_string()))
        .unwrap();
    let expected = dir.path().join("alpha").join(MANIFEST_FILE_NAME);
    assert!(expected.exists());
}

#[test]
fn two_cases_keep_independent_manifests() {
    let dir = tempdir().unwrap();
    let store = ManifestStore::new(dir.path());
    store
        .append("alpha", &ManifestLine::CaseStatus("PROCESSING".to_string()))
        .unwrap();
    store
        .append("beta", &ManifestLine::CaseStatus("NEW".to_string()))
        .unwrap();

    let alpha = store.read("alpha").unwrap();
    let beta = store.read("beta").unwrap();
    assert_eq!(alpha, vec![ManifestLine::CaseStatus("PROCESSING".to_string())]);
    assert_eq!(beta, vec![ManifestLine::CaseStatus("NEW".to_string())]);
}

#[test]
fn appender_and_append_share_the_same_file() {
    let dir = tempdir().unwrap();
    let store = ManifestStore::new(dir.path());
    {
        let mut appender = store.appender("alpha").unwrap();
        appender
            .append(&ManifestLine::File {
                name: "a.pdf".to_string(),
                status: "IN_PROGRESS".to_string(),
                score: None,
                duration: None,
            })
            .unwrap();
    }
    store
        .append(
            "alpha",
            &ManifestLine::File {
                name: "a.pdf".to_string(),
                status: "SUCCESS".to_string(),
                score: Some("95".to_string()),
                duration: Some("42".to_string()),
            },
        )
        .unwrap();

    let raw = store.read_raw("alpha").unwrap();
    assert_eq!(raw.len(), 2);
    assert!(raw[1].starts_with("FILE|a.pdf|SUCCESS|95|42"));
}

#[test]
fn artifact_and_error_lines_round_trip() {
    let dir = tempdir().unwrap();
    let store = ManifestStore::new(dir.path());
    store
        .append(
            "alpha",
            &ManifestLine::Artifact {
                kind: "complaint".to_string(),
                path: "complaint.html".to_string(),
            },
        )
        .unwrap();
    store
        .append(
            "alpha",
            &ManifestLine::Error {
                scope: "render".to_string(),
                message: "renderer exited 1".to_string(),
            },
        )
        .unwrap();

    let lines = store.read("alpha").unwrap();
    assert_eq!(
        lines,
        vec![
            ManifestLine::Artifact {
                kind: "complaint".to_string(),
                path: "complaint.html".to_string(),
            },
            ManifestLine::Error {
                scope: "render".to_string(),
                message: "renderer exited 1".to_string(),
            },
        ]
    );
}
