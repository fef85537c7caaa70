use crate::errors::Result;
use crate::fetcher::AnalysisBackend;
use crate::models::CurrencyRates;
use crate::storage::{KeyValueStore, VersionedCache};

pub const RATES_CACHE: VersionedCache<CurrencyRates> =
    VersionedCache::new("poe_currency_rates", "v1");

/// Returns the cached rates, seeding the cache with defaults on first use.
pub async fn get_rates(store: &dyn KeyValueStore) -> Result<CurrencyRates> {
    if let Some(rates) = RATES_CACHE.load(store).await? {
        if !rates.is_empty() {
            return Ok(rates);
        }
    }

    let defaults = CurrencyRates::default();
    RATES_CACHE.save(store, &defaults).await?;
    Ok(defaults)
}

/// Fetches fresh rates from the backend and caches them.
///
/// A failed or empty fetch keeps whatever `get_rates` would return.
pub async fn refresh_rates(
    backend: &dyn AnalysisBackend,
    store: &dyn KeyValueStore,
) -> Result<CurrencyRates> {
    match backend.currency_rates().await {
        Ok(rates) if !rates.is_empty() => {
            tracing::info!("Fetched {} currency rates", rates.len());
            RATES_CACHE.save(store, &rates).await?;
            Ok(rates)
        }
        Ok(_) => {
            tracing::warn!("Backend returned no currency rates, keeping cached values");
            get_rates(store).await
        }
        Err(e) => {
            tracing::warn!("Failed to refresh currency rates: {}", e);
            get_rates(store).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::mock::ScriptedBackend;
    use crate::storage::MemoryStore;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_get_rates_seeds_defaults() {
        let store = MemoryStore::new();
        let rates = get_rates(&store).await.unwrap();
        assert_eq!(rates, CurrencyRates::default());
        assert!(store.get("poe_currency_rates").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_rates_saves_fetched_table() {
        let store = MemoryStore::new();
        let backend = ScriptedBackend::new();
        let fetched = CurrencyRates::from_map(BTreeMap::from([
            ("exalted".to_string(), 1.0),
            ("divine".to_string(), 410.0),
        ]));
        backend.push_rates(Ok(fetched.clone()));

        assert_eq!(refresh_rates(&backend, &store).await.unwrap(), fetched);
        assert_eq!(get_rates(&store).await.unwrap(), fetched);
    }

    #[tokio::test]
    async fn test_refresh_rates_falls_back_on_error() {
        let store = MemoryStore::new();
        let backend = ScriptedBackend::new();
        let rates = refresh_rates(&backend, &store).await.unwrap();
        assert_eq!(rates.get("divine"), Some(320.0));
    }
}
