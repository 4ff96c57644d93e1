//! Integration coverage for `CaseModel::list`/`get` against a real input and
//! output root laid out the way the engine expects, exercised from outside
//! the crate.

use docket::core::case_model::{CaseModel, CaseStatus, FileStatus};
use docket::core::manifest::{ManifestLine, ManifestStore};
use std::fs;
use tempfile::tempdir;

#[test]
fn list_returns_every_case_directory_sorted() {
    let root = tempdir().unwrap();
    let input_root = root.path().join("in");
    fs::create_dir_all(input_root.join("zeta")).unwrap();
    fs::create_dir_all(input_root.join("alpha")).unwrap();
    fs::write(input_root.join("zeta").join("z.pdf"), b"x").unwrap();
    fs::write(input_root.join("alpha").join("a.pdf"), b"x").unwrap();

    let model = CaseModel::new(&input_root, root.path().join("out"));
    let cases = model.list().unwrap();
    let ids: Vec<&str> = cases.iter().map(|c| c.case_id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "zeta"]);
}

#[test]
fn list_on_absent_input_root_is_empty_not_an_error() {
    let root = tempdir().unwrap();
    let model = CaseModel::new(root.path().join("missing-in"), root.path().join("out"));
    assert!(model.list().unwrap().is_empty());
}

#[test]
fn multi_file_case_reflects_mixed_outcomes() {
    let root = tempdir().unwrap();
    let input_root = root.path().join("in");
    let output_root = root.path().join("out");
    fs::create_dir_all(input_root.join("alpha")).unwrap();
    fs::write(input_root.join("alpha").join("a.pdf"), b"x").unwrap();
    fs::write(input_root.join("alpha").join("b.docx"), b"x").unwrap();
    fs::create_dir_all(output_root.join("alpha")).unwrap();

    let manifest = ManifestStore::new(&output_root);
    manifest
        .append("alpha", &ManifestLine::CaseStatus("PROCESSING".to_string()))
        .unwrap();
    manifest
        .append(
            "alpha",
            &ManifestLine::File {
                name: "a.pdf".to_string(),
                status: "SUCCESS".to_string(),
                score: Some("92".to_string()),
                duration: Some("300".to_string()),
            },
        )
        .unwrap();
    manifest
        .append(
            "alpha",
            &ManifestLine::File {
                name: "b.docx".to_string(),
                status: "FAILED".to_string(),
                score: None,
                duration: Some("50".to_string()),
            },
        )
        .unwrap();
    manifest
        .append(
            "alpha",
            &ManifestLine::Error {
                scope: "file:b.docx".to_string(),
                message: "extractor crashed".to_string(),
            },
        )
        .unwrap();

    let model = CaseModel::new(&input_root, &output_root);
    let case = model.get("alpha").unwrap();
    assert_eq!(case.status, CaseStatus::Processing);
    assert_eq!(case.files.len(), 2);
    let a = case.files.iter().find(|f| f.file_name == "a.pdf").unwrap();
    let b = case.files.iter().find(|f| f.file_name == "b.docx").unwrap();
    assert_eq!(a.status, FileStatus::Success);
    assert_eq!(b.status, FileStatus::Failed);
    assert_eq!(case.errors.len(), 1);
    assert_eq!(case.quality_aggregate(), Some(92.0));
}

#[test]
fn complete_case_carries_artifacts() {
    let root = tempdir().unwrap();
    let input_root = root.path().join("in");
    let output_root = root.path().join("out");
    fs::create_dir_all(input_root.join("alpha")).unwrap();
    fs::write(input_root.join("alpha").join("a.pdf"), b"x").unwrap();
    fs::create_dir_all(output_root.join("alpha")).unwrap();
    fs::write(output_root.join("alpha").join("hydrated.json"), "{}").unwrap();

    let manifest = ManifestStore::new(&output_root);
    manifest
        .append("alpha", &ManifestLine::CaseStatus("PENDING_REVIEW".to_string()))
        .unwrap();
    manifest
        .append(
            "alpha",
            &ManifestLine::HydratedJson("hydrated.json".to_string()),
        )
        .unwrap();
    manifest
        .append(
            "alpha",
            &ManifestLine::Artifact {
                kind: "complaint".to_string(),
                path: "complaint.html".to_string(),
            },
        )
        .unwrap();
    manifest
        .append("alpha", &ManifestLine::CaseStatus("COMPLETE".to_string()))
        .unwrap();

    let model = CaseModel::new(&input_root, &output_root);
    let case = model.get("alpha").unwrap();
    assert_eq!(case.status, CaseStatus::Complete);
    assert_eq!(case.artifacts.len(), 1);
    assert_eq!(case.hydrated_path.as_deref(), Some("hydrated.json"));
}
