//! On-disk tier for normalized sessions

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::model::{Session, SessionKey};

/// JSON files of normalized sessions, one per key.
///
/// Files are written to a temporary name and renamed into place, so a reader
/// never observes a half-written session.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }

    /// Read a stored session.
    ///
    /// Returns `Ok(None)` when nothing usable is stored: no file, a file older
    /// than `max_age`, or a corrupt file (which is deleted).
    pub async fn read(&self, key: &SessionKey, max_age: Option<Duration>) -> Result<Option<Session>> {
        let path = self.path_for(key);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::storage(path, e)),
        };

        if let Some(max_age) = max_age {
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .unwrap_or_default();
            if age > max_age {
                debug!(key = %key, age_secs = age.as_secs(), "Ignoring stale disk entry");
                return Ok(None);
            }
        }

        let bytes = tokio::fs::read(&path).await.map_err(|e| SessionError::storage(path.clone(), e))?;

        match serde_json::from_slice::<Session>(&bytes) {
            Ok(session) if session.key == key.canonical() => Ok(Some(session)),
            Ok(session) => {
                warn!(path = %path.display(), found = %session.key, "Disk entry holds another session, discarding");
                self.discard(&path).await;
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt disk entry, discarding");
                self.discard(&path).await;
                Ok(None)
            }
        }
    }

    /// Persist a session, replacing any previous file for its key.
    pub async fn write(&self, session: &Session) -> Result<PathBuf> {
        let path = self.path_for(&session.key);
        let tmp = path.with_extension("json.tmp");

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SessionError::storage(self.dir.clone(), e))?;

        let bytes = serde_json::to_vec(session).map_err(|e| {
            SessionError::storage(tmp.clone(), std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| SessionError::storage(tmp.clone(), e))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| SessionError::storage(path.clone(), e))?;

        debug!(key = %session.key, path = %path.display(), bytes = bytes.len(), "Session written to disk");
        Ok(path)
    }

    /// Delete the stored file for `key`; returns whether one existed.
    pub async fn remove(&self, key: &SessionKey) -> Result<bool> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::storage(path, e)),
        }
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to delete disk entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::bahrain_race;

    #[tokio::test]
    async fn write_then_read_returns_equal_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().join("sessions"));
        let session = bahrain_race().session();

        let path = store.write(&session).await.unwrap();
        assert!(path.ends_with("2024-bahrain-r.json"));
        assert!(!path.with_extension("json.tmp").exists());

        let read = store.read(&session.key, None).await.unwrap();
        assert_eq!(read.as_ref(), Some(&session));

        assert!(store.remove(&session.key).await.unwrap());
        assert!(!store.remove(&session.key).await.unwrap());
        assert_eq!(store.read(&session.key, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_files_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        let key = bahrain_race().key().clone();
        let path = store.path_for(&key);
        std::fs::write(&path, b"{\"key\": 42").unwrap();

        assert_eq!(store.read(&key, None).await.unwrap(), None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn stale_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        let session = bahrain_race().session();
        store.write(&session).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let stale = store.read(&session.key, Some(Duration::from_millis(1))).await.unwrap();
        assert_eq!(stale, None);
        let fresh = store.read(&session.key, Some(Duration::from_secs(3600))).await.unwrap();
        assert!(fresh.is_some());
    }
}
