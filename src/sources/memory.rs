//! In-process source for embedding and fixtures

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::SessionError;
use crate::model::SessionKey;
use crate::source::{RawSessionBundle, RawSessionSource};

/// Source serving bundles registered at runtime.
#[derive(Debug, Default)]
pub struct MemorySource {
    sessions: RwLock<HashMap<SessionKey, RawSessionBundle>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the bundle for a key.
    pub fn insert(&self, key: SessionKey, bundle: RawSessionBundle) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.canonical(), bundle);
    }

    pub fn remove(&self, key: &SessionKey) -> Option<RawSessionBundle> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner).remove(&key.canonical())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl RawSessionSource for MemorySource {
    async fn fetch(&self, key: &SessionKey) -> Result<RawSessionBundle, SessionError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.canonical())
            .cloned()
            .ok_or_else(|| SessionError::not_found(key))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
