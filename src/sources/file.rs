//! Directory-backed source for exported session data

use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::error::SessionError;
use crate::model::SessionKey;
use crate::source::{RawSessionBundle, RawSessionSource};

/// Source that reads one JSON bundle per session from a directory tree.
///
/// Layout: `<root>/<season>/<event>/<session code>.json`, for example
/// `data/2024/bahrain/r.json` or `data/2024/round-1/q.json`.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the bundle for `key` is expected at.
    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        let key = key.canonical();
        self.root
            .join(key.season.to_string())
            .join(key.event.to_string())
            .join(format!("{}.json", key.session.code()))
    }
}

#[async_trait::async_trait]
impl RawSessionSource for FileSource {
    async fn fetch(&self, key: &SessionKey) -> Result<RawSessionBundle, SessionError> {
        let path = self.path_for(key);
        trace!(path = %path.display(), "Reading session bundle");

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::not_found(key));
            }
            Err(e) => {
                return Err(SessionError::source_unavailable_with_source(
                    format!("cannot read {}", path.display()),
                    e,
                ));
            }
        };

        let bundle: RawSessionBundle = serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::malformed(path.display().to_string(), e.to_string()))?;

        debug!(
            key = %key,
            laps = bundle.laps.len(),
            telemetry = bundle.telemetry.len(),
            "Read session bundle from disk"
        );
        Ok(bundle)
    }

    fn name(&self) -> &str {
        "file"
    }
}
