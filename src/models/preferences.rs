use serde::{Deserialize, Serialize};

/// A persisted rule excluding modifiers from analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub id: String,
    #[serde(default)]
    pub mod_name_pattern: Option<String>,
    #[serde(default)]
    pub mod_tier: Option<String>,
    #[serde(default)]
    pub mod_type: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Body for creating or updating an exclusion rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewExclusion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_name_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NewExclusion {
    // The backend needs at least one matching criterion
    pub fn has_criteria(&self) -> bool {
        self.mod_name_pattern.is_some() || self.mod_tier.is_some() || self.mod_type.is_some()
    }
}

/// A user-defined group of item names, stored server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCustomCategory {
    pub name: String,
    pub items: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exclusion_defaults_active() {
        let rule: ExclusionRule = serde_json::from_value(json!({
            "id": "1",
            "mod_tier": "P1"
        }))
        .unwrap();
        assert!(rule.is_active);
        assert_eq!(rule.mod_tier.as_deref(), Some("P1"));
    }

    #[test]
    fn test_new_exclusion_serializes_only_set_fields() {
        let body = NewExclusion {
            mod_type: Some("implicit".to_string()),
            ..Default::default()
        };
        assert!(body.has_criteria());
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"mod_type": "implicit"}));
        assert!(!NewExclusion::default().has_criteria());
    }
}
