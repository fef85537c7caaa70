use serde::{Deserialize, Serialize};

/// One selectable item base in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEntry {
    // Internal identifier, unique across the catalog
    pub id: String,
    // Real item name, the value sent to the backend
    pub name: String,
    pub category: String,
}

impl ItemEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
        }
    }

    pub fn matches_filter(&self, lowercase_term: &str) -> bool {
        self.name.to_lowercase().contains(lowercase_term)
            || self.category.to_lowercase().contains(lowercase_term)
    }
}
