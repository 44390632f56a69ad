use std::path::PathBuf;

use tokio::fs;
use uuid::Uuid;

use crate::core::{Session, SessionSummary};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("session not found: {0}")]
    NotFound(Uuid),
}

/// One pretty-printed JSON document per session, named by the lowercase
/// canonical UUID. The earlier desktop app wrote uppercase-UUID filenames;
/// those are migrated to the canonical name whenever the directory is
/// scanned.
pub struct SessionPersistence {
    sessions_dir: PathBuf,
}

impl SessionPersistence {
    pub fn new(sessions_dir: PathBuf) -> Self {
        Self { sessions_dir }
    }

    pub fn sessions_dir(&self) -> &PathBuf {
        &self.sessions_dir
    }

    async fn ensure_dir(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.sessions_dir).await?;
        Ok(())
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", id))
    }

    pub async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        self.ensure_dir().await?;
        let path = self.session_path(session.id);
        let json = serde_json::to_string_pretty(session)?;
        fs::write(path, json).await?;
        Ok(())
    }

    pub async fn load(&self, id: Uuid) -> Result<Session, PersistenceError> {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(PersistenceError::NotFound(id));
        }
        let json = fs::read_to_string(path).await?;
        let session: Session = serde_json::from_str(&json)?;
        Ok(session)
    }

    /// Load every readable session, newest first. Corrupt or unreadable
    /// files are skipped with a warning; one bad document must not take
    /// the whole store down.
    pub async fn load_all(&self) -> Result<Vec<Session>, PersistenceError> {
        self.ensure_dir().await?;
        self.migrate_legacy_filenames().await?;

        let mut sessions = Vec::new();
        let mut entries = fs::read_dir(&self.sessions_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().map_or(false, |e| e == "json") {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(json) => match serde_json::from_str::<Session>(&json) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        tracing::warn!("Skipping corrupt session {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Skipping unreadable session {}: {}", path.display(), e);
                }
            }
        }

        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    pub async fn load_all_summaries(&self) -> Result<Vec<SessionSummary>, PersistenceError> {
        let sessions = self.load_all().await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), PersistenceError> {
        let path = self.session_path(id);
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    pub async fn exists(&self, id: Uuid) -> bool {
        self.session_path(id).exists()
    }

    /// Rename legacy uppercase-UUID filenames to the lowercase canonical
    /// form. Idempotent: a second scan finds nothing to do.
    async fn migrate_legacy_filenames(&self) -> Result<(), PersistenceError> {
        let mut entries = fs::read_dir(&self.sessions_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().map_or(false, |e| e == "json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let lower = stem.to_lowercase();
            if lower == stem || Uuid::parse_str(stem).is_err() {
                continue;
            }

            let target = self.sessions_dir.join(format!("{}.json", lower));
            if target.exists() {
                // Canonical file already present; the legacy copy loses.
                fs::remove_file(&path).await?;
                tracing::info!("Dropped duplicate legacy session file {}", path.display());
            } else {
                fs::rename(&path, &target).await?;
                tracing::info!(
                    "Migrated legacy session file {} -> {}",
                    path.display(),
                    target.display()
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentType, SessionStatus};

    fn persistence() -> (tempfile::TempDir, SessionPersistence) {
        let dir = tempfile::tempdir().unwrap();
        let persistence = SessionPersistence::new(dir.path().to_path_buf());
        (dir, persistence)
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let (_dir, persistence) = persistence();
        let mut session = Session::new("round trip".into(), AgentType::Codex);
        session.working_directory = Some("/tmp/work".into());

        persistence.save(&session).await.unwrap();
        let loaded = persistence.load(session.id).await.unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.name, "round trip");
        assert_eq!(loaded.working_directory.as_deref(), Some("/tmp/work"));
    }

    #[tokio::test]
    async fn load_missing_session_is_not_found() {
        let (_dir, persistence) = persistence();
        let err = persistence.load(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, persistence) = persistence();
        let session = Session::new("gone".into(), AgentType::ClaudeCode);
        persistence.save(&session).await.unwrap();

        persistence.delete(session.id).await.unwrap();
        assert!(!persistence.exists(session.id).await);
        persistence.delete(session.id).await.unwrap();
    }

    #[tokio::test]
    async fn load_all_sorts_newest_first_and_skips_corrupt_files() {
        let (dir, persistence) = persistence();

        let mut older = Session::new("older".into(), AgentType::ClaudeCode);
        older.started_at = chrono::Utc::now() - chrono::Duration::hours(2);
        let newer = Session::new("newer".into(), AgentType::ClaudeCode);
        persistence.save(&older).await.unwrap();
        persistence.save(&newer).await.unwrap();

        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let sessions = persistence.load_all().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].name, "newer");
        assert_eq!(sessions[1].name, "older");
    }

    #[tokio::test]
    async fn uppercase_filenames_are_migrated_to_lowercase() {
        let (dir, persistence) = persistence();
        let mut session = Session::new("legacy".into(), AgentType::ClaudeCode);
        session.status = SessionStatus::Completed;

        let legacy_path = dir
            .path()
            .join(format!("{}.json", session.id.to_string().to_uppercase()));
        std::fs::write(&legacy_path, serde_json::to_string_pretty(&session).unwrap()).unwrap();

        let sessions = persistence.load_all().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(!legacy_path.exists());
        assert!(persistence.exists(session.id).await);

        // Second scan is a no-op.
        let sessions = persistence.load_all().await.unwrap();
        assert_eq!(sessions.len(), 1);
    }
}
