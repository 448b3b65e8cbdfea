use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single day's predicted price point for a skill, produced by the
/// forecast engine. Unique per
/// `(skill, forecast_date)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceForecast {
    pub id: Uuid,
    pub skill: String,
    pub forecast_date: NaiveDate,
    pub predicted_price: f64,
    pub confidence: f64,
    pub model_version: String,
    pub features_used: serde_json::Value,
    pub generated_at: DateTime<Utc>,
}

impl PriceForecast {
    pub fn new(
        skill: impl Into<String>,
        forecast_date: NaiveDate,
        predicted_price: f64,
        confidence: f64,
        model_version: impl Into<String>,
        features_used: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            skill: skill.into(),
            forecast_date,
            predicted_price,
            confidence: confidence.clamp(0.0, 1.0),
            model_version: model_version.into(),
            features_used,
            generated_at: Utc::now(),
        }
    }
}

/// Backtest accuracy summary for a single skill's forecast model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestResult {
    pub skill: String,
    pub mae: f64,
    pub rmse: f64,
    pub sample_size: usize,
}
