use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A first-party AI vendor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(name: impl Into<String>, url: Option<String>, provider_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url,
            provider_type: provider_type.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One billable offering of a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub category: String,
    pub subcategory: String,
    pub description: Option<String>,
}

impl Service {
    pub fn new(
        provider_id: Uuid,
        category: impl Into<String>,
        subcategory: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id,
            category: category.into(),
            subcategory: subcategory.into(),
            description,
        }
    }
}
