use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An end-user account: creator of alerts and budgets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            api_key: api_key.into(),
            created_at: Utc::now(),
        }
    }
}

/// Per-agent, per-period spend ceiling for the smart-router collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub monthly_limit: f64,
    pub spent: f64,
    /// `YYYY-MM`
    pub period: String,
}

impl Budget {
    pub fn new(agent_id: Uuid, monthly_limit: f64, period: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            monthly_limit,
            spent: 0.0,
            period: period.into(),
        }
    }

    /// Record spend; `Budget.spent` is non-decreasing within a period.
    pub fn record_spend(&mut self, amount: f64) {
        self.spent += amount.max(0.0);
    }

    pub fn current_period() -> String {
        Utc::now().format("%Y-%m").to_string()
    }
}

/// A single smart-router call's accounting record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestLog {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub provider: String,
    pub category: String,
    pub cost: f64,
    pub latency_ms: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl RequestLog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: Uuid,
        provider: impl Into<String>,
        category: impl Into<String>,
        cost: f64,
        latency_ms: u64,
        tokens_in: u64,
        tokens_out: u64,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            provider: provider.into(),
            category: category.into(),
            cost,
            latency_ms,
            tokens_in,
            tokens_out,
            status: status.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_spend_is_monotonic() {
        let mut budget = Budget::new(Uuid::new_v4(), 100.0, "2026-07");
        budget.record_spend(10.0);
        budget.record_spend(5.0);
        assert_eq!(budget.spent, 15.0);
    }
}
