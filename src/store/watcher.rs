use std::path::PathBuf;

use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::SessionStoreHandle;
use crate::core::Session;

/// Watches the sessions directory for JSON documents written by other
/// processes (an external agent run being monitored) and feeds them into
/// the store as external sessions.
///
/// Files belonging to sessions this store already owns are ignored, so
/// the store's own saves do not echo back as external updates.
pub struct SessionDirWatcher {
    _watcher: RecommendedWatcher,
}

impl SessionDirWatcher {
    pub fn spawn(sessions_dir: PathBuf, store: SessionStoreHandle) -> Result<Self> {
        std::fs::create_dir_all(&sessions_dir)?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => tracing::warn!("Session directory watch error: {}", e),
            })?;
        watcher.watch(&sessions_dir, RecursiveMode::NonRecursive)?;

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }
                for path in event.paths {
                    if path.extension().map_or(true, |e| e != "json") {
                        continue;
                    }
                    Self::ingest(&store, &path).await;
                }
            }
            tracing::debug!("Session directory watcher stopped");
        });

        Ok(Self { _watcher: watcher })
    }

    async fn ingest(store: &SessionStoreHandle, path: &std::path::Path) {
        // Only canonical <uuid>.json files are of interest.
        let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            return;
        };

        match store.session(id).await {
            Ok(Some(existing)) if !existing.is_external_process => return,
            Err(_) => return,
            _ => {}
        }

        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) => {
                tracing::debug!("Could not read {}: {}", path.display(), e);
                return;
            }
        };
        match serde_json::from_str::<Session>(&json) {
            Ok(session) => {
                tracing::info!("Discovered external session {} ({})", session.name, id);
                let _ = store.upsert_external(session).await;
            }
            Err(e) => {
                // Another process may still be mid-write; a later Modify
                // event will retry.
                tracing::debug!("Skipping unparseable session {}: {}", path.display(), e);
            }
        }
    }
}
