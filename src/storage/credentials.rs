use std::sync::Arc;

use super::{KeyValueStore, VersionedCache};
use crate::errors::{Result, TrendsError};

const SESSION_ID: VersionedCache<String> = VersionedCache::new("poe_session_id", "v1");

/// Holds the POESESSID used for trade API access.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn session_id(&self) -> Result<Option<String>> {
        let stored = SESSION_ID.load(self.store.as_ref()).await?;
        Ok(stored.filter(|s| !s.trim().is_empty()))
    }

    /// Like `session_id`, but a missing credential is an error.
    pub async fn require_session_id(&self) -> Result<String> {
        self.session_id()
            .await?
            .ok_or(TrendsError::MissingCredential)
    }

    // Saving an empty value clears the credential
    pub async fn save_session_id(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return self.clear().await;
        }
        SESSION_ID
            .save(self.store.as_ref(), &session_id.to_string())
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        SESSION_ID.clear(self.store.as_ref()).await
    }
}
