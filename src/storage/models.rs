use serde_json::Value as JsonValue;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct ProviderRow {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub provider_type: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub provider_id: String,
    pub category: String,
    pub subcategory: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RateRow {
    pub id: String,
    pub service_id: String,
    pub price: f64,
    pub currency: String,
    pub unit: String,
    pub pricing_type: String,
    pub confidence: f64,
    pub source_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct RateHistoryRow {
    pub id: String,
    pub service_id: String,
    pub price: f64,
    pub currency: String,
    pub unit: String,
    pub recorded_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct JoinedRateRow {
    pub service_id: String,
    pub provider_name: String,
    pub category: String,
    pub subcategory: String,
    pub price: f64,
    pub currency: String,
    pub unit: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct DailyAvgRow {
    pub day: String,
    pub avg_price: f64,
}

#[derive(Debug, Clone, FromRow)]
pub struct CategoryPairRow {
    pub category: String,
    pub subcategory: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct AgentServiceRow {
    pub agent_id: String,
    pub agent_name: String,
    pub skill: String,
    pub price: f64,
    pub unit: String,
    pub currency: String,
    pub uptime: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub rating: Option<f64>,
    pub reviews_count: i64,
    pub x402_endpoint: Option<String>,
    pub bazaar_url: Option<String>,
    pub metadata: JsonValue,
    pub last_updated: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct AgentServiceHistoryRow {
    pub id: String,
    pub agent_id: String,
    pub price: f64,
    pub uptime: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub recorded_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct AgentRow {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct BudgetRow {
    pub id: String,
    pub agent_id: String,
    pub monthly_limit: f64,
    pub spent: f64,
    pub period: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct RequestLogRow {
    pub id: String,
    pub agent_id: String,
    pub provider: String,
    pub category: String,
    pub cost: f64,
    pub latency_ms: i64,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct PriceAlertRow {
    pub id: String,
    pub agent_id: String,
    pub alert_type: String,
    pub target_skill: Option<String>,
    pub target_provider: Option<String>,
    pub max_price: Option<f64>,
    pub notify_method: String,
    pub webhook_url: Option<String>,
    pub email: Option<String>,
    pub status: String,
    pub last_triggered: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct AlertTriggerRow {
    pub id: String,
    pub alert_id: String,
    pub old_price: f64,
    pub new_price: f64,
    pub provider: Option<String>,
    pub skill: Option<String>,
    pub triggered_at: String,
    pub notified: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PriceForecastRow {
    pub id: String,
    pub skill: String,
    pub forecast_date: String,
    pub predicted_price: f64,
    pub confidence: f64,
    pub model_version: String,
    pub features_used: JsonValue,
    pub generated_at: String,
}
