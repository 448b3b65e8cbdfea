use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Result, Trend};
use crate::storage::{AgentServiceRepository, RateRepository};

use super::confidence::{detailed_confidence, ConfidenceObservation};
use super::outlier::detect_outliers;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateMeta {
    pub outliers_removed: usize,
    pub total_rates_collected: usize,
    pub median_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateAggregate {
    pub price: f64,
    pub currency: String,
    pub unit: String,
    pub confidence: f64,
    pub source_count: usize,
    pub last_updated: DateTime<Utc>,
    pub trend: Trend,
    pub category: String,
    pub subcategory: String,
    pub meta: AggregateMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentServiceStats {
    pub skill: String,
    pub market_median: f64,
    pub price_min: f64,
    pub price_max: f64,
    pub avg_price: f64,
    pub std_deviation: f64,
    pub avg_uptime: f64,
    pub avg_latency_ms: f64,
    pub avg_rating: f64,
    pub total_agents: usize,
    pub outlier_agent_ids: Vec<String>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn median(mut prices: Vec<f64>) -> f64 {
    prices.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = prices.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        prices[n / 2]
    } else {
        (prices[n / 2 - 1] + prices[n / 2]) / 2.0
    }
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

/// Fuses observations across providers into a single current rate for a
/// (category, subcategory) or a skill.
pub struct Aggregator {
    rates: Arc<dyn RateRepository>,
    agent_services: Arc<dyn AgentServiceRepository>,
}

impl Aggregator {
    pub fn new(rates: Arc<dyn RateRepository>, agent_services: Arc<dyn AgentServiceRepository>) -> Self {
        Self { rates, agent_services }
    }

    pub async fn aggregate(&self, category: &str, subcategory: Option<&str>) -> Result<Option<RateAggregate>> {
        let observations = self.rates.list_joined_by_category(category, subcategory).await?;
        if observations.is_empty() {
            return Ok(None);
        }

        let total_rates_collected = observations.len();
        let outliers = detect_outliers(&observations, |o| o.price);
        if outliers.filtered.is_empty() {
            return Ok(None);
        }

        let prices: Vec<f64> = outliers.filtered.iter().map(|o| o.price).collect();
        let price = round_to(median(prices), 6);

        let confidence_inputs: Vec<ConfidenceObservation> = outliers
            .filtered
            .iter()
            .map(|o| ConfidenceObservation {
                price: o.price,
                observed_at: Some(o.created_at),
            })
            .collect();
        let confidence = round_to(detailed_confidence(&confidence_inputs).confidence, 3);

        let anchor = &outliers.filtered[0];
        let cutoff = Utc::now() - Duration::hours(24);
        let trend = match self.rates.latest_history_before(anchor.service_id, cutoff).await? {
            Some(past) if past.price != 0.0 => {
                let pct_delta = (anchor.price - past.price) / past.price * 100.0;
                Trend::from_pct_delta(pct_delta)
            }
            _ => Trend::Stable,
        };

        let last_updated = outliers
            .filtered
            .iter()
            .map(|o| o.created_at)
            .max()
            .unwrap_or_else(Utc::now);

        Ok(Some(RateAggregate {
            price,
            currency: anchor.currency.clone(),
            unit: anchor.unit.clone(),
            confidence,
            source_count: outliers.filtered.len(),
            last_updated,
            trend,
            category: category.to_string(),
            subcategory: subcategory.unwrap_or(&anchor.subcategory).to_string(),
            meta: AggregateMeta {
                outliers_removed: outliers.removed.len(),
                total_rates_collected,
                median_used: true,
            },
        }))
    }

    /// Keys results `"category"` when the pair's subcategory is the
    /// canonical default bucket, `"category:subcategory"` otherwise.
    pub async fn aggregate_all_categories(&self) -> Result<HashMap<String, RateAggregate>> {
        let pairs = self.rates.list_distinct_category_pairs().await?;
        let mut out = HashMap::new();
        for (category, subcategory) in pairs {
            if let Some(aggregate) = self.aggregate(&category, Some(&subcategory)).await? {
                let key = if subcategory == "default" {
                    category.clone()
                } else {
                    format!("{category}:{subcategory}")
                };
                out.insert(key, aggregate);
            }
        }
        Ok(out)
    }

    pub async fn aggregate_agent_service_stats(&self, skill: &str) -> Result<Option<AgentServiceStats>> {
        let agents = self.agent_services.list_by_skill(skill).await?;
        if agents.is_empty() {
            return Ok(None);
        }

        let total_agents = agents.len();
        let outliers = detect_outliers(&agents, |a| a.price);
        let filtered_prices: Vec<f64> = outliers.filtered.iter().map(|a| a.price).collect();

        let avg_price = mean(&filtered_prices);
        let std_deviation = stddev(&filtered_prices, avg_price);
        let market_median = median(filtered_prices.clone());
        let price_min = filtered_prices.iter().cloned().fold(f64::INFINITY, f64::min);
        let price_max = filtered_prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let uptimes: Vec<f64> = agents.iter().filter_map(|a| a.uptime).collect();
        let latencies: Vec<f64> = agents.iter().filter_map(|a| a.avg_latency_ms).collect();
        let ratings: Vec<f64> = agents.iter().filter_map(|a| a.rating).collect();

        Ok(Some(AgentServiceStats {
            skill: skill.to_string(),
            market_median: round_to(market_median, 6),
            price_min: round_to(price_min, 6),
            price_max: round_to(price_max, 6),
            avg_price: round_to(avg_price, 6),
            std_deviation: round_to(std_deviation, 6),
            avg_uptime: round_to(mean(&uptimes), 3),
            avg_latency_ms: round_to(mean(&latencies), 3),
            avg_rating: round_to(mean(&ratings), 3),
            total_agents,
            outlier_agent_ids: outliers.removed.iter().map(|a| a.agent_id.clone()).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_requested_decimals() {
        assert_eq!(round_to(1.23456789, 6), 1.234568);
        assert_eq!(round_to(0.123456, 3), 0.123);
    }

    #[test]
    fn median_ties_average_middle_two() {
        assert_eq!(median(vec![1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(vec![1.0, 2.0, 3.0]), 2.0);
    }
}
