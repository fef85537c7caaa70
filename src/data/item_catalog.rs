use serde::Deserialize;
use std::collections::HashSet;

use crate::errors::Result;
use crate::fetcher::BackendClient;
use crate::models::ItemEntry;

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    result: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CatalogCategory {
    label: Option<String>,
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

/// Flattens the backend's categorised item listing into selectable entries.
///
/// Categories without a label are filed under "Unknown". Entries without a
/// `type` are skipped, as are repeated names inside one category.
pub fn parse_catalog(data: &serde_json::Value) -> Vec<ItemEntry> {
    let Ok(response) = CatalogResponse::deserialize(data) else {
        tracing::warn!("Item catalog has no result list");
        return Vec::new();
    };

    let mut items = Vec::new();
    for raw_category in response.result {
        let Ok(category) = CatalogCategory::deserialize(&raw_category) else {
            continue;
        };
        let category_name = category.label.unwrap_or_else(|| "Unknown".to_string());

        let mut seen_names = HashSet::new();
        for (index, entry) in category.entries.iter().enumerate() {
            let Some(name) = entry.get("type").and_then(|t| t.as_str()) else {
                continue;
            };
            if name.is_empty() || !seen_names.insert(name.to_string()) {
                continue;
            }
            items.push(ItemEntry::new(
                format!("{}-{}-{}", category_name, name, index),
                name,
                category_name.clone(),
            ));
        }
    }

    items
}

pub async fn load_catalog(client: &BackendClient) -> Result<Vec<ItemEntry>> {
    let data = client.item_catalog().await?;
    let items = parse_catalog(&data);
    tracing::info!("Loaded {} catalog entries", items.len());
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_catalog() {
        let data = json!({
            "result": [
                {
                    "label": "Boots",
                    "entries": [
                        {"type": "Expert Laced Boots"},
                        {"type": "Expert Laced Boots", "name": "Unique Variant"},
                        {"name": "no type here"},
                        {"type": "Vaal Greaves"}
                    ]
                },
                {
                    "entries": [{"type": "Expert Laced Boots"}]
                },
                "not a category"
            ]
        });

        let items = parse_catalog(&data);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].id, "Boots-Expert Laced Boots-0");
        assert_eq!(items[1].id, "Boots-Vaal Greaves-3");
        assert_eq!(items[2].category, "Unknown");
        assert_eq!(items[2].name, "Expert Laced Boots");
    }

    #[test]
    fn test_parse_catalog_without_result() {
        assert!(parse_catalog(&json!({"oops": 1})).is_empty());
        assert!(parse_catalog(&json!([1, 2])).is_empty());
    }
}
