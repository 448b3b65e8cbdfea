use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::domain::{BacktestResult, PriceForecast, Result, split_skill};
use crate::storage::{ForecastRepository, RateRepository};

const ALPHA: f64 = 0.3;
const HISTORY_DAYS: i64 = 180;
const BACKTEST_DAYS: i64 = 210;
const BACKTEST_MIN_DAYS: usize = 60;
const DEFAULT_HORIZON_DAYS: i64 = 7;
const TREND_DEAD_ZONE: f64 = 1e-4;
const MIN_PREDICTED_PRICE: f64 = 1e-4;
const MODEL_VERSION: &str = "ses_v1";
const RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_price: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastResult {
    pub skill: String,
    pub trend: TrendDirection,
    pub trend_strength: f64,
    pub points: Vec<ForecastPoint>,
    pub insufficient_data: bool,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stddev(values: &[f64], avg: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Simple exponential smoothing seeded from the first observation.
fn smooth(series: &[f64]) -> f64 {
    let mut level = series[0];
    for &value in &series[1..] {
        level = ALPHA * value + (1.0 - ALPHA) * level;
    }
    level
}

/// Least-squares slope of `series` against its index.
fn least_squares_slope(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let xs: Vec<f64> = (0..series.len()).map(|i| i as f64).collect();
    let x_mean = mean(&xs);
    let y_mean = mean(series);
    let numerator: f64 = xs.iter().zip(series).map(|(x, y)| (x - x_mean) * (y - y_mean)).sum();
    let denominator: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Produces per-skill price forecasts and backtests via Simple Exponential
/// Smoothing with a linear trend adjustment.
pub struct ForecastEngine {
    rates: Arc<dyn RateRepository>,
    forecasts: Arc<dyn ForecastRepository>,
}

impl ForecastEngine {
    pub fn new(rates: Arc<dyn RateRepository>, forecasts: Arc<dyn ForecastRepository>) -> Self {
        Self { rates, forecasts }
    }

    async fn load_series(&self, skill: &str, lookback_days: i64) -> Result<Vec<f64>> {
        let (category, subcategory) = split_skill(skill);
        let subcategory_filter = if skill.contains('/') { Some(subcategory) } else { None };
        let since = Utc::now() - Duration::days(lookback_days);
        let rows = self.rates.daily_avg_by_category(category, subcategory_filter, since).await?;
        Ok(rows.into_iter().map(|(_, avg_price)| avg_price).collect())
    }

    pub async fn forecast(&self, skill: &str, horizon_days: i64) -> Result<ForecastResult> {
        let series = self.load_series(skill, HISTORY_DAYS).await?;

        if series.is_empty() {
            return Ok(ForecastResult {
                skill: skill.to_string(),
                trend: TrendDirection::Stable,
                trend_strength: 0.0,
                points: Vec::new(),
                insufficient_data: true,
            });
        }

        let level = smooth(&series);
        let slope = least_squares_slope(&series);
        let avg = mean(&series);
        let cv = if avg != 0.0 { stddev(&series, avg) / avg } else { 0.0 };

        let trend = if avg != 0.0 && slope > TREND_DEAD_ZONE * avg {
            TrendDirection::Increasing
        } else if avg != 0.0 && slope < -TREND_DEAD_ZONE * avg {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };
        let trend_strength = if avg != 0.0 { (slope / avg).abs() } else { 0.0 };

        let completeness = (series.len() as f64 / HISTORY_DAYS as f64).min(1.0);
        let base_confidence = 1.0 / (1.0 + cv);
        let today = Utc::now().date_naive();

        let horizon = if horizon_days > 0 { horizon_days } else { DEFAULT_HORIZON_DAYS };
        let points = (1..=horizon)
            .map(|i| {
                let predicted_price = (level + slope * i as f64).max(MIN_PREDICTED_PRICE);
                let decay = 0.95f64.powi(i as i32);
                let confidence = round_to((base_confidence * completeness * decay).clamp(0.0, 1.0), 3);
                ForecastPoint {
                    date: today + Duration::days(i),
                    predicted_price: round_to(predicted_price, 6),
                    confidence,
                }
            })
            .collect();

        Ok(ForecastResult {
            skill: skill.to_string(),
            trend,
            trend_strength,
            points,
            insufficient_data: false,
        })
    }

    /// Persists a forecast: purges stale rows for the skill, then inserts
    /// the new horizon. Duplicate `(skill, forecast_date)` rows are
    /// overwritten via the repository's upsert, matching "swallowed".
    pub async fn generate_and_persist(&self, skill: &str) -> Result<usize> {
        let result = self.forecast(skill, DEFAULT_HORIZON_DAYS).await?;
        if result.insufficient_data {
            return Ok(0);
        }

        let today = Utc::now().date_naive();
        let retention_cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        self.forecasts.delete_stale(skill, today).await?;
        self.forecasts.delete_generated_before(skill, retention_cutoff).await?;

        let features_used = json!(["historical_prices", "exponential_smoothing", "trend_adjustment"]);
        for point in &result.points {
            let forecast = PriceForecast::new(skill, point.date, point.predicted_price, point.confidence, MODEL_VERSION, features_used.clone());
            self.forecasts.upsert(&forecast).await?;
        }

        Ok(result.points.len())
    }

    pub async fn backtest(&self, skill: &str) -> Result<Option<BacktestResult>> {
        let series = self.load_series(skill, BACKTEST_DAYS).await?;
        if series.len() < BACKTEST_MIN_DAYS {
            return Ok(None);
        }

        let split = (series.len() as f64 * 0.8) as usize;
        let (train, test) = series.split_at(split.max(1).min(series.len() - 1));
        if test.is_empty() {
            return Ok(None);
        }

        let level = smooth(train);
        let slope = least_squares_slope(train);

        let errors: Vec<f64> = test
            .iter()
            .enumerate()
            .map(|(i, actual)| {
                let predicted = level + slope * (i as f64 + 1.0);
                actual - predicted
            })
            .collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64;
        let rmse = (errors.iter().map(|e| e.powi(2)).sum::<f64>() / errors.len() as f64).sqrt();

        Ok(Some(BacktestResult {
            skill: skill.to_string(),
            mae: round_to(mae, 6),
            rmse: round_to(rmse, 6),
            sample_size: test.len(),
        }))
    }

    pub async fn accuracy(&self, skill: &str) -> Result<Option<f64>> {
        let series = self.load_series(skill, BACKTEST_DAYS).await?;
        let Some(backtest) = self.backtest(skill).await? else {
            return Ok(None);
        };

        let split = (series.len() as f64 * 0.8) as usize;
        let test_mean = mean(&series[split.max(1).min(series.len() - 1)..]);
        if test_mean == 0.0 {
            warn!(skill, "zero mean test window, accuracy undefined");
            return Ok(Some(0.0));
        }
        Ok(Some((1.0 - backtest.mae / test_mean).max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_converges_toward_a_flat_series() {
        let series = vec![0.02; 30];
        assert!((smooth(&series) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn slope_is_zero_for_a_flat_series() {
        let series = vec![0.02; 30];
        assert_eq!(least_squares_slope(&series), 0.0);
    }

    #[test]
    fn slope_is_positive_for_a_rising_series() {
        let series: Vec<f64> = (0..30).map(|i| 0.01 + i as f64 * 0.001).collect();
        assert!(least_squares_slope(&series) > 0.0);
    }

    #[test]
    fn boundary_scenario_six_stability_around_two_cents() {
        // 30 daily points varying +/-5% around 0.02, alternating sign.
        let series: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 0.02 * 1.05 } else { 0.02 * 0.95 })
            .collect();
        let avg = mean(&series);
        let slope = least_squares_slope(&series);
        assert!((slope / avg).abs() <= 1e-4 * 10.0, "near-zero slope for an oscillating flat series");
    }
}
