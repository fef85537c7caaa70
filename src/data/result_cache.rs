use crate::errors::Result;
use crate::jobs::merge::merge;
use crate::models::GapRecord;
use crate::storage::{KeyValueStore, VersionedCache};

const BATCH_RESULTS: VersionedCache<Vec<GapRecord>> =
    VersionedCache::new("poe_batch_results", "v1");

pub async fn load_results(store: &dyn KeyValueStore) -> Result<Vec<GapRecord>> {
    Ok(BATCH_RESULTS.load(store).await?.unwrap_or_default())
}

/// Merges `incoming` into the saved results and returns the new list.
pub async fn save_results(
    store: &dyn KeyValueStore,
    incoming: &[GapRecord],
) -> Result<Vec<GapRecord>> {
    let current = load_results(store).await?;
    let merged = merge(&current, incoming);
    BATCH_RESULTS.save(store, &merged).await?;
    Ok(merged)
}

pub async fn clear_results(store: &dyn KeyValueStore) -> Result<()> {
    BATCH_RESULTS.clear(store).await
}
