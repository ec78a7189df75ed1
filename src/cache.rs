//! Local JSON cache for onboarding state.
//!
//! Holds the profile draft the user typed before their profile row existed,
//! plus a pointer to an interview session to resume. Read once at startup;
//! every mutation rewrites the whole file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::profile::model::ProfileDraft;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    draft: ProfileDraft,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resume_session_id: Option<Uuid>,
}

pub struct DraftCache {
    path: PathBuf,
    contents: CacheFile,
}

impl DraftCache {
    /// Load the cache file, starting empty when it does not exist yet.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ConfigError::InvalidValue {
                    key: path.display().to_string(),
                    message: format!("cache file unreadable: {e}"),
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        debug!(path = %path.display(), "Draft cache loaded");
        Ok(Self { path, contents })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn draft(&self) -> &ProfileDraft {
        &self.contents.draft
    }

    pub fn resume_session_id(&self) -> Option<Uuid> {
        self.contents.resume_session_id
    }

    /// Replace the stored draft.
    pub async fn set_draft(&mut self, draft: ProfileDraft) -> Result<(), ConfigError> {
        self.contents.draft = draft;
        self.persist().await
    }

    /// Remember the session to resume after a restart.
    pub async fn set_resume_session(&mut self, session_id: Uuid) -> Result<(), ConfigError> {
        self.contents.resume_session_id = Some(session_id);
        self.persist().await
    }

    /// Drop the resume pointer once the interview is finished.
    pub async fn clear_resume_session(&mut self) -> Result<(), ConfigError> {
        self.contents.resume_session_id = None;
        self.persist().await
    }

    async fn persist(&self) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(&self.contents).map_err(|e| {
            ConfigError::InvalidValue {
                key: self.path.display().to_string(),
                message: format!("cache serialization failed: {e}"),
            }
        })?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DraftCache::load(dir.path().join("cache.json")).await.unwrap();
        assert!(cache.draft().name.is_none());
        assert!(cache.resume_session_id().is_none());
    }

    #[tokio::test]
    async fn draft_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = DraftCache::load(&path).await.unwrap();
        cache
            .set_draft(ProfileDraft {
                name: Some("Alex".into()),
                dream: Some("Run a marathon".into()),
                category: Some("wellness".into()),
                stuck_point: None,
            })
            .await
            .unwrap();

        let reloaded = DraftCache::load(&path).await.unwrap();
        assert_eq!(reloaded.draft().name.as_deref(), Some("Alex"));
        assert_eq!(reloaded.draft().dream.as_deref(), Some("Run a marathon"));
    }

    #[tokio::test]
    async fn resume_pointer_set_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let session_id = Uuid::new_v4();

        let mut cache = DraftCache::load(&path).await.unwrap();
        cache.set_resume_session(session_id).await.unwrap();

        let mut reloaded = DraftCache::load(&path).await.unwrap();
        assert_eq!(reloaded.resume_session_id(), Some(session_id));

        reloaded.clear_resume_session().await.unwrap();
        let cleared = DraftCache::load(&path).await.unwrap();
        assert!(cleared.resume_session_id().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(matches!(
            DraftCache::load(&path).await,
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
