use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use super::KeyValueStore;
use crate::errors::Result;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: &'a str,
    value: &'a T,
    timestamp: i64,
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: String,
    value: T,
}

/// A typed value stored under one key with a version tag.
///
/// Entries written under another version (or that fail to decode) read as
/// absent, so bumping the version invalidates what older builds stored.
pub struct VersionedCache<T> {
    key: &'static str,
    version: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> VersionedCache<T> {
    pub const fn new(key: &'static str, version: &'static str) -> Self {
        Self {
            key,
            version,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub async fn load(&self, store: &dyn KeyValueStore) -> Result<Option<T>> {
        let Some(raw) = store.get(self.key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) if envelope.version == self.version => Ok(Some(envelope.value)),
            Ok(envelope) => {
                tracing::debug!(
                    "Ignoring {} cached under version {} (want {})",
                    self.key,
                    envelope.version,
                    self.version
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Error reading cached {}: {}", self.key, e);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, store: &dyn KeyValueStore, value: &T) -> Result<()> {
        let envelope = EnvelopeRef {
            version: self.version,
            value,
            timestamp: Utc::now().timestamp_millis(),
        };
        store.set(self.key, &serde_json::to_string(&envelope)?).await
    }

    pub async fn clear(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.remove(self.key).await
    }
}
