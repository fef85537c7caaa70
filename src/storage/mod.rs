mod cache;
mod credentials;
mod database;
mod memory;

use async_trait::async_trait;

use crate::errors::Result;

pub use cache::VersionedCache;
pub use credentials::CredentialStore;
pub use database::{SqliteStore, DEFAULT_DATABASE_URL};
pub use memory::MemoryStore;

/// Persistent string key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}
