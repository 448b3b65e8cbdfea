use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rewrite a raw skill/category string into canonical `category/subcategory`
/// form: any observation with only `category` is rewritten to
/// `category/default`.
pub fn canonicalize_skill(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('/') {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        "default/default".to_string()
    } else {
        format!("{trimmed}/default")
    }
}

/// Split a canonical skill into `(category, subcategory)`.
pub fn split_skill(skill: &str) -> (&str, &str) {
    match skill.split_once('/') {
        Some((cat, sub)) => (cat, sub),
        None => (skill, "default"),
    }
}

/// A priced offering of a third-party agent, cataloged from a marketplace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentService {
    pub agent_id: String,
    pub agent_name: String,
    pub skill: String,
    pub price: f64,
    pub unit: String,
    pub currency: String,
    pub uptime: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub rating: Option<f64>,
    pub reviews_count: u32,
    pub x402_endpoint: Option<String>,
    pub bazaar_url: Option<String>,
    pub metadata: serde_json::Value,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AgentService {
    pub fn new(agent_id: impl Into<String>, agent_name: impl Into<String>, skill: &str, price: f64, unit: impl Into<String>, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            skill: canonicalize_skill(skill),
            price,
            unit: unit.into(),
            currency: currency.into(),
            uptime: None,
            avg_latency_ms: None,
            rating: None,
            reviews_count: 0,
            x402_endpoint: None,
            bazaar_url: None,
            metadata: serde_json::Value::Null,
            last_updated: now,
            created_at: now,
        }
    }
}

/// Append-only audit record for an [`AgentService`] price/uptime/latency
/// change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentServiceHistory {
    pub id: Uuid,
    pub agent_id: String,
    pub price: f64,
    pub uptime: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl AgentServiceHistory {
    pub fn new(agent_id: impl Into<String>, price: f64, uptime: Option<f64>, avg_latency_ms: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            price,
            uptime,
            avg_latency_ms,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_bare_category() {
        assert_eq!(canonicalize_skill("translation"), "translation/default");
    }

    #[test]
    fn leaves_full_skill_untouched() {
        assert_eq!(canonicalize_skill("translation/spanish"), "translation/spanish");
    }

    #[test]
    fn splits_canonical_skill() {
        assert_eq!(split_skill("translation/spanish"), ("translation", "spanish"));
        assert_eq!(split_skill("translation"), ("translation", "default"));
    }
}
