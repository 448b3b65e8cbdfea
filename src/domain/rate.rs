use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{OracleError, Result};

/// Pricing unit a rate is quoted against, e.g. "1k_tokens", "request", "minute".
pub type Unit = String;

/// The *current* fused rate for a service. At most one
/// row exists per `service_id`; history is kept separately in
/// [`RateHistory`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rate {
    pub id: Uuid,
    pub service_id: Uuid,
    pub price: f64,
    pub currency: String,
    pub unit: Unit,
    pub pricing_type: String,
    pub confidence: f64,
    pub source_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Rate {
    pub fn new(
        service_id: Uuid,
        price: f64,
        currency: impl Into<String>,
        unit: impl Into<String>,
        pricing_type: impl Into<String>,
        confidence: f64,
        source_count: u32,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(OracleError::validation("confidence must be within [0, 1]"));
        }
        if source_count == 0 {
            return Err(OracleError::validation("source_count must be >= 1"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            service_id,
            price,
            currency: currency.into(),
            unit: unit.into(),
            pricing_type: pricing_type.into(),
            confidence,
            source_count,
            created_at: Utc::now(),
        })
    }
}

/// Append-only audit record of every accepted rate observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateHistory {
    pub id: Uuid,
    pub service_id: Uuid,
    pub price: f64,
    pub currency: String,
    pub unit: Unit,
    pub recorded_at: DateTime<Utc>,
}

impl RateHistory {
    pub fn new(service_id: Uuid, price: f64, currency: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id,
            price,
            currency: currency.into(),
            unit: unit.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Direction classification with a 5% dead zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    /// Classify a percentage delta (`(new - old) / old * 100`).
    pub fn from_pct_delta(pct_delta: f64) -> Self {
        if pct_delta.abs() < 5.0 {
            Trend::Stable
        } else if pct_delta > 0.0 {
            Trend::Up
        } else {
            Trend::Down
        }
    }
}
