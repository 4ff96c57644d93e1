//! Translates file-system mutations under the input root into push-channel
//! hints. Read-only: the watcher never mutates state; it only debounces
//! bursts of `notify` events per case and emits `case_added`/
//! `case_removed`.
//!
//! Built on the `notify` crate. The fallback polling path, used when the OS
//! watcher fails to initialize, is a plain scan run on an interval as an
//! async tick loop.

use crate::core::engine::Engine;
use crate::core::push::PushEvent;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Runs the watcher until the process shuts down. Spawns the OS-level
/// `notify` watcher on a background thread (its callback is synchronous)
/// bridged into an async debounce loop; falls back to periodic full scans
/// if the OS watcher fails to initialize (e.g. unsupported filesystem).
pub async fn run(engine: Engine) {
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<PathBuf>();

    let watcher = spawn_os_watcher(&engine.config.input_root, raw_tx);
    match watcher {
        Ok(_guard_that_must_stay_alive) => {
            tracing::info!(root = %engine.config.input_root.display(), "file watcher initialized");
            let debounce = Duration::from_millis(engine.config.debounce_ms);
            debounce_loop(engine, &mut raw_rx, debounce).await;
        }
        Err(err) => {
            tracing::warn!(error = %err, "OS file watcher failed to initialize, falling back to periodic scan");
            fallback_poll_loop(engine).await;
        }
    }
}

fn spawn_os_watcher(
    input_root: &Path,
    raw_tx: mpsc::UnboundedSender<PathBuf>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            if matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_)
            ) {
                for path in event.paths {
                    let _ = raw_tx.send(path);
                }
            }
        }
    })?;
    watcher.watch(input_root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Coalesces raw path events into one rescan per `case_id` every debounce
/// window, so a burst of events from one file drop yields a single rescan.
async fn debounce_loop(
    engine: Engine,
    raw_rx: &mut mpsc::UnboundedReceiver<PathBuf>,
    debounce: Duration,
) {
    let mut pending: HashMap<String, Instant> = HashMap::new();
    let mut known_cases: HashSet<String> = known_case_ids(&engine.config.input_root);
    let mut tick = tokio::time::interval(debounce.max(Duration::from_millis(10)));

    loop {
        tokio::select! {
            maybe_path = raw_rx.recv() => {
                match maybe_path {
                    Some(path) => {
                        if let Some(case_id) = case_id_for_path(&engine.config.input_root, &path) {
                            pending.insert(case_id, Instant::now());
                        }
                    }
                    None => break,
                }
            }
            _ = tick.tick() => {
                let ready: Vec<String> = pending
                    .iter()
                    .filter(|(_, seen)| seen.elapsed() >= debounce)
                    .map(|(id, _)| id.clone())
                    .collect();
                for case_id in ready {
                    pending.remove(&case_id);
                    reconcile_case_presence(&engine, &mut known_cases, &case_id);
                }
            }
        }
    }
}

fn reconcile_case_presence(engine: &Engine, known_cases: &mut HashSet<String>, case_id: &str) {
    let still_present = engine.config.case_input_dir(case_id).is_dir();
    let was_known = known_cases.contains(case_id);
    match (was_known, still_present) {
        (false, true) => {
            known_cases.insert(case_id.to_string());
            engine.push.publish(PushEvent::CaseAdded {
                case_id: case_id.to_string(),
            });
        }
        (true, false) => {
            known_cases.remove(case_id);
            engine.push.publish(PushEvent::CaseRemoved {
                case_id: case_id.to_string(),
            });
        }
        // Already known and still present, or already absent and still
        // absent: no transition to announce. A file added/removed inside an
        // already-known case is picked up by the next poll/process call.
        _ => {}
    }
}

async fn fallback_poll_loop(engine: Engine) {
    let mut known_cases = known_case_ids(&engine.config.input_root);
    loop {
        tokio::time::sleep(FALLBACK_POLL_INTERVAL).await;
        let current = known_case_ids(&engine.config.input_root);
        for added in current.difference(&known_cases) {
            engine.push.publish(PushEvent::CaseAdded {
                case_id: added.clone(),
            });
        }
        for removed in known_cases.difference(&current) {
            engine.push.publish(PushEvent::CaseRemoved {
                case_id: removed.clone(),
            });
        }
        known_cases = current;
    }
}

fn known_case_ids(input_root: &Path) -> HashSet<String> {
    let Ok(entries) = std::fs::read_dir(input_root) else {
        return HashSet::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect()
}

/// Maps an arbitrary changed path back to the case_id it belongs to (the
/// first path component under `input_root`).
fn case_id_for_path(input_root: &Path, changed: &Path) -> Option<String> {
    let relative = changed.strip_prefix(input_root).ok()?;
    relative
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_id_for_path_takes_first_component() {
        let root = Path::new("/input");
        let changed = Path::new("/input/alpha/notes.docx");
        assert_eq!(case_id_for_path(root, changed), Some("alpha".to_string()));
    }

    #[test]
    fn case_id_for_path_outside_root_is_none() {
        let root = Path::new("/input");
        let changed = Path::new("/elsewhere/alpha/notes.docx");
        assert_eq!(case_id_for_path(root, changed), None);
    }

    #[test]
    fn known_case_ids_lists_only_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();
        std::fs::write(dir.path().join("not-a-case.txt"), b"x").unwrap();
        let ids = known_case_ids(dir.path());
        assert_eq!(ids, HashSet::from(["alpha".to_string()]));
    }
}
