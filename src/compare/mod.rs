use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::Result;
use crate::engine::Aggregator;
use crate::storage::AgentServiceRepository;

const DEFAULT_UPTIME_SCORE: f64 = 0.5;
const DEFAULT_RATING_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonEntry {
    pub agent_id: String,
    pub agent_name: String,
    pub price: f64,
    pub unit: String,
    pub currency: String,
    pub uptime: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub rating: Option<f64>,
    pub ranking: usize,
    pub savings_pct: f64,
    pub is_cheapest: bool,
    pub is_best_value: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonResult {
    pub skill: String,
    pub market_median: f64,
    pub entries: Vec<ComparisonEntry>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Ranks AgentService offerings for a skill by price and by a weighted
/// value score.
pub struct ComparisonEngine {
    agent_services: Arc<dyn AgentServiceRepository>,
    aggregator: Arc<Aggregator>,
}

impl ComparisonEngine {
    pub fn new(agent_services: Arc<dyn AgentServiceRepository>, aggregator: Arc<Aggregator>) -> Self {
        Self { agent_services, aggregator }
    }

    pub async fn compare(&self, skill: &str) -> Result<Option<ComparisonResult>> {
        let mut agents = self.agent_services.list_by_skill(skill).await?;
        if agents.is_empty() {
            return Ok(None);
        }

        let stats = self.aggregator.aggregate_agent_service_stats(skill).await?;
        let market_median = stats.map(|s| s.market_median).unwrap_or(0.0);

        agents.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap());
        let max_price = agents.iter().map(|a| a.price).fold(f64::NEG_INFINITY, f64::max);

        let mut entries: Vec<ComparisonEntry> = agents
            .into_iter()
            .enumerate()
            .map(|(index, agent)| {
                let savings_pct = if market_median != 0.0 {
                    round_to(100.0 * (market_median - agent.price) / market_median, 3)
                } else {
                    0.0
                };
                ComparisonEntry {
                    agent_id: agent.agent_id,
                    agent_name: agent.agent_name,
                    price: agent.price,
                    unit: agent.unit,
                    currency: agent.currency,
                    uptime: agent.uptime,
                    avg_latency_ms: agent.avg_latency_ms,
                    rating: agent.rating,
                    ranking: index + 1,
                    savings_pct,
                    is_cheapest: index == 0,
                    is_best_value: false,
                }
            })
            .collect();

        let best_index = best_value_index(&entries, max_price);
        if let Some(index) = best_index {
            entries[index].is_best_value = true;
        }

        Ok(Some(ComparisonResult {
            skill: skill.to_string(),
            market_median: round_to(market_median, 6),
            entries,
        }))
    }
}

/// Highest weighted score wins; ties broken by the lower-priced entry,
/// which `entries` is already sorted by.
fn best_value_index(entries: &[ComparisonEntry], max_price: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, entry) in entries.iter().enumerate() {
        let price_score = if max_price > 0.0 { 1.0 - entry.price / max_price } else { 0.0 };
        let uptime_score = entry.uptime.unwrap_or(DEFAULT_UPTIME_SCORE);
        let rating_score = entry.rating.map(|r| r / 5.0).unwrap_or(DEFAULT_RATING_SCORE);
        let score = 0.5 * price_score + 0.3 * uptime_score + 0.2 * rating_score;

        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(price: f64, uptime: Option<f64>, rating: Option<f64>) -> ComparisonEntry {
        ComparisonEntry {
            agent_id: format!("agent-{price}"),
            agent_name: "agent".to_string(),
            price,
            unit: "request".to_string(),
            currency: "USD".to_string(),
            uptime,
            avg_latency_ms: None,
            rating,
            ranking: 0,
            savings_pct: 0.0,
            is_cheapest: false,
            is_best_value: false,
        }
    }

    #[test]
    fn cheapest_wins_best_value_under_uniform_uptime_and_rating() {
        let entries = vec![
            entry(0.01, Some(0.99), Some(4.5)),
            entry(0.012, Some(0.99), Some(4.5)),
            entry(0.015, Some(0.99), Some(4.5)),
            entry(0.025, Some(0.99), Some(4.5)),
        ];
        let max_price = 0.025;
        let best = best_value_index(&entries, max_price).unwrap();
        assert_eq!(best, 0);
    }

    #[test]
    fn missing_uptime_and_rating_fall_back_to_midpoint_defaults() {
        let entries = vec![entry(0.01, None, None), entry(0.02, Some(1.0), Some(5.0))];
        let best = best_value_index(&entries, 0.02).unwrap();
        assert_eq!(best, 0, "cheap entry with default scores still wins this weighting");
    }
}
