//! Debounced filesystem watcher feeding the ingester.
//!
//! Each qualifying event spawns an independent ingest task after a short
//! settle delay, so an editor's multi-step save sequence lands as one
//! ingest. There is no global queue; the database serializes the final
//! insert/delete pair.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use agent_mem_core::Settings;

use crate::errors::KnowledgeResult;
use crate::ingest::Ingester;
use crate::models::IngestStatus;

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);
const SETTLE_DELAY: Duration = Duration::from_millis(100);
/// Sweep expired debounce entries once the map grows past this.
const DEBOUNCE_SWEEP_LEN: usize = 4096;

/// Watch the configured roots and ingest qualifying changes until the
/// event source closes.
pub async fn run_watcher(settings: Settings, ingester: Arc<Ingester>) -> KnowledgeResult<()> {
    let mut roots: Vec<PathBuf> = settings
        .watcher
        .roots
        .iter()
        .chain(settings.watcher.extra_roots.iter())
        .map(PathBuf::from)
        .collect();
    if roots.is_empty() {
        let cwd = std::env::current_dir()?;
        warn!("no watcher roots configured, defaulting to {}", cwd.display());
        roots.push(cwd);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Event>();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })?;

    for root in &roots {
        if !root.exists() {
            warn!("watch root missing, skipping: {}", root.display());
            continue;
        }
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("watching {}", root.display());
    }

    let mut debounce: HashMap<PathBuf, Instant> = HashMap::new();
    while let Some(event) = rx.recv().await {
        if !is_relevant(&event.kind) {
            continue;
        }
        for path in event.paths {
            if path.is_dir() {
                // Recursive mode already covers newly created subtrees.
                continue;
            }
            if should_ignore_file(&settings, &path) {
                continue;
            }

            let now = Instant::now();
            if let Some(last) = debounce.get(&path) {
                if now.duration_since(*last) < DEBOUNCE_WINDOW {
                    debug!("debounced {}", path.display());
                    continue;
                }
            }
            debounce.insert(path.clone(), now);
            if debounce.len() > DEBOUNCE_SWEEP_LEN {
                debounce.retain(|_, seen| now.duration_since(*seen) < DEBOUNCE_WINDOW);
            }

            let ingester = ingester.clone();
            tokio::spawn(async move {
                tokio::time::sleep(SETTLE_DELAY).await;
                let machine_id = std::env::var("HOST_ID")
                    .unwrap_or_else(|_| "agent-mem-watcher".to_string());
                match ingester.ingest_file(&path, None, &machine_id).await {
                    Ok(outcome) if outcome.status == IngestStatus::Skipped => {
                        debug!(
                            "skipped {}: {}",
                            path.display(),
                            outcome.reason.unwrap_or_default()
                        );
                    }
                    Ok(outcome) => {
                        info!(
                            "ingested {} as {}",
                            path.display(),
                            outcome.id.unwrap_or_default()
                        );
                    }
                    Err(err) => {
                        warn!("ingest failed for {}: {err}", path.display());
                    }
                }
            });
        }
    }
    Ok(())
}

/// Creates and content modifications qualify; removes and renames do not —
/// the next write re-triggers, deletions never evict knowledge.
fn is_relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Name(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

fn should_ignore_file(settings: &Settings, path: &Path) -> bool {
    let Some(basename) = path.file_name().and_then(|name| name.to_str()) else {
        return true;
    };
    if basename.starts_with('.') {
        return true;
    }
    for component in path.components() {
        if let Some(part) = component.as_os_str().to_str() {
            if settings.watcher.ignore_dirs.iter().any(|d| d == part) {
                return true;
            }
        }
    }
    let ext = basename
        .rfind('.')
        .map(|idx| &basename[idx..])
        .unwrap_or("");
    !settings.watcher.extensions.iter().any(|e| e == ext)
}
