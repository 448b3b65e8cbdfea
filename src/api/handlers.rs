//! Thin per-route handlers. No business logic lives here: every handler
//! resolves its inputs and calls straight into the engine, the alert
//! manager, or a repository, then wraps the result in [`Envelope`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Extension;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Agent, AlertStatus, AlertType, Budget, NewPriceAlert, NotifyMethod, OracleError, PriceAlert,
};

use super::auth::AuthContext;
use super::envelope::Envelope;
use super::error::{ApiError, ApiResult};
use super::state::AppState;

const API_KEY_PREFIX: &str = "po_";
const API_KEY_BYTES: usize = 24;
const AGENT_SERVICE_LIMIT_MAX: i64 = 200;

fn generate_api_key() -> String {
    let random_bytes: Vec<u8> = (0..API_KEY_BYTES).map(|_| rand::random::<u8>()).collect();
    let random_part = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);
    format!("{API_KEY_PREFIX}{random_part}")
}

// ---------------------------------------------------------------- rates

pub async fn list_rates(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let aggregates = state.engine.aggregator().aggregate_all_categories().await?;
    Ok(Envelope::ok(serde_json::to_value(aggregates)?))
}

pub async fn rates_by_category(State(state): State<Arc<AppState>>, Path(category): Path<String>) -> ApiResult<serde_json::Value> {
    let aggregate = state.engine.aggregator().aggregate(&category, None).await?;
    match aggregate {
        Some(aggregate) => Ok(Envelope::ok(serde_json::to_value(aggregate)?)),
        None => Err(OracleError::not_found(format!("no aggregate rate for category {category}")).into()),
    }
}

pub async fn rates_by_subcategory(
    State(state): State<Arc<AppState>>,
    Path((category, subcategory)): Path<(String, String)>,
) -> ApiResult<serde_json::Value> {
    let aggregate = state.engine.aggregator().aggregate(&category, Some(&subcategory)).await?;
    match aggregate {
        Some(aggregate) => Ok(Envelope::ok(serde_json::to_value(aggregate)?)),
        None => Err(OracleError::not_found(format!("no aggregate rate for {category}/{subcategory}")).into()),
    }
}

// ----------------------------------------------------------- providers

#[derive(Debug, Deserialize)]
pub struct ProvidersQuery {
    #[serde(rename = "sortByPrice")]
    sort_by_price: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProviderSummary {
    #[serde(flatten)]
    provider: crate::domain::Provider,
    min_price: Option<f64>,
}

pub async fn list_providers(State(state): State<Arc<AppState>>, Query(query): Query<ProvidersQuery>) -> ApiResult<Vec<ProviderSummary>> {
    let repos = state.engine.repositories();
    let providers = repos.providers.list_all().await?;

    let mut summaries = Vec::with_capacity(providers.len());
    for provider in providers {
        let services = repos.services.list_by_provider(provider.id).await?;
        let mut min_price = None;
        for service in services {
            if let Some(category) = &query.category {
                if &service.category != category {
                    continue;
                }
            }
            if let Some(rate) = repos.rates.get_current(service.id).await? {
                min_price = Some(min_price.map_or(rate.price, |m: f64| m.min(rate.price)));
            }
        }
        if query.category.is_some() && min_price.is_none() {
            continue;
        }
        summaries.push(ProviderSummary { provider, min_price });
    }

    match query.sort_by_price.as_deref() {
        Some("asc") => summaries.sort_by(|a, b| cmp_optional_price(a.min_price, b.min_price)),
        Some("desc") => summaries.sort_by(|a, b| cmp_optional_price(b.min_price, a.min_price)),
        _ => {}
    }

    Ok(Envelope::ok(summaries))
}

fn cmp_optional_price(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

pub async fn get_provider(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<crate::domain::Provider> {
    let provider = state
        .engine
        .repositories()
        .providers
        .get_by_id(id)
        .await?
        .ok_or_else(|| OracleError::not_found(format!("provider {id} not found")))?;
    Ok(Envelope::ok(provider))
}

// ---------------------------------------------------------------- stats

#[derive(Debug, Serialize)]
pub struct StoreStats {
    providers: usize,
    rates: usize,
    agent_services: usize,
    active_alerts: usize,
}

pub async fn store_stats(State(state): State<Arc<AppState>>) -> ApiResult<StoreStats> {
    let repos = state.engine.repositories();
    let stats = StoreStats {
        providers: repos.providers.list_all().await?.len(),
        rates: repos.rates.list_current_all().await?.len(),
        agent_services: repos.agent_services.list_all().await?.len(),
        active_alerts: repos.alerts.list_active().await?.len(),
    };
    Ok(Envelope::ok(stats))
}

#[derive(Debug, Serialize)]
pub struct VolatilityEntry {
    category: String,
    confidence: f64,
    source_count: usize,
}

/// Ranks categories least-confident first, as a proxy for volatility: the
/// same dispersion and freshness inputs that depress confidence are
/// exactly what makes a category's price unstable.
pub async fn stats_volatility(State(state): State<Arc<AppState>>) -> ApiResult<Vec<VolatilityEntry>> {
    let aggregates = state.engine.aggregator().aggregate_all_categories().await?;
    let mut entries: Vec<VolatilityEntry> = aggregates
        .into_iter()
        .map(|(category, aggregate)| VolatilityEntry {
            category,
            confidence: aggregate.confidence,
            source_count: aggregate.source_count,
        })
        .collect();
    entries.sort_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Envelope::ok(entries))
}

// -------------------------------------------------------------- compare

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    category: Option<String>,
    subcategory: Option<String>,
    providers: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProviderComparisonEntry {
    provider_name: String,
    price: f64,
    currency: String,
    unit: String,
    savings_pct: f64,
    ranking: usize,
}

fn median_price(prices: &[f64]) -> f64 {
    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

pub async fn compare_providers(State(state): State<Arc<AppState>>, Query(query): Query<CompareQuery>) -> ApiResult<Vec<ProviderComparisonEntry>> {
    let category = query.category.ok_or_else(|| OracleError::validation("category is required"))?;
    let allowlist: Option<Vec<String>> = query.providers.map(|csv| csv.split(',').map(|s| s.trim().to_lowercase()).collect());

    let mut observations = state
        .engine
        .repositories()
        .rates
        .list_joined_by_category(&category, query.subcategory.as_deref())
        .await?;

    if let Some(allowlist) = &allowlist {
        observations.retain(|o| allowlist.contains(&o.provider_name.to_lowercase()));
    }
    if observations.is_empty() {
        return Err(OracleError::not_found("no providers found for the requested category").into());
    }

    observations.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
    let median = median_price(&observations.iter().map(|o| o.price).collect::<Vec<_>>());

    let entries = observations
        .into_iter()
        .enumerate()
        .map(|(index, o)| {
            let savings_pct = if median != 0.0 { 100.0 * (median - o.price) / median } else { 0.0 };
            ProviderComparisonEntry {
                provider_name: o.provider_name,
                price: o.price,
                currency: o.currency,
                unit: o.unit,
                savings_pct,
                ranking: index + 1,
            }
        })
        .collect();

    Ok(Envelope::ok(entries))
}

// --------------------------------------------------------- agent-services

#[derive(Debug, Deserialize)]
pub struct AgentServicesQuery {
    skill: Option<String>,
    sort: Option<String>,
    order: Option<String>,
    limit: Option<i64>,
}

pub async fn list_agent_services(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AgentServicesQuery>,
) -> ApiResult<Vec<crate::domain::AgentService>> {
    let repos = state.engine.repositories();
    let mut agents = match &query.skill {
        Some(skill) => repos.agent_services.list_by_skill(skill).await?,
        None => repos.agent_services.list_all().await?,
    };

    let descending = matches!(query.order.as_deref(), Some("desc"));
    match query.sort.as_deref() {
        Some("rating") => agents.sort_by(|a, b| cmp_optional_price(b.rating, a.rating)),
        Some("uptime") => agents.sort_by(|a, b| cmp_optional_price(b.uptime, a.uptime)),
        _ => agents.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal)),
    }
    if descending {
        agents.reverse();
    }

    let limit = query.limit.unwrap_or(AGENT_SERVICE_LIMIT_MAX).clamp(1, AGENT_SERVICE_LIMIT_MAX) as usize;
    agents.truncate(limit);

    Ok(Envelope::ok(agents))
}

pub async fn get_agent_service(State(state): State<Arc<AppState>>, Path(agent_id): Path<String>) -> ApiResult<Vec<crate::domain::AgentService>> {
    let services = state.engine.repositories().agent_services.list_by_agent(&agent_id).await?;
    if services.is_empty() {
        return Err(OracleError::not_found(format!("no agent-service offerings for {agent_id}")).into());
    }
    Ok(Envelope::ok(services))
}

#[derive(Debug, Deserialize)]
pub struct AgentServiceCompareQuery {
    skill: String,
}

pub async fn compare_agent_services(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AgentServiceCompareQuery>,
) -> ApiResult<crate::compare::ComparisonResult> {
    let result = state
        .engine
        .comparison()
        .compare(&query.skill)
        .await?
        .ok_or_else(|| OracleError::not_found(format!("no agent-service offerings for skill {}", query.skill)))?;
    Ok(Envelope::ok(result))
}

// ------------------------------------------------------------------ agents

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateAgentResponse {
    #[serde(flatten)]
    agent: Agent,
}

pub async fn create_agent(State(state): State<Arc<AppState>>, axum::Json(body): axum::Json<CreateAgentRequest>) -> ApiResult<CreateAgentResponse> {
    if body.name.trim().is_empty() {
        return Err(OracleError::validation("name must not be empty").into());
    }
    let agent = Agent::new(body.name.trim(), generate_api_key());
    state.engine.repositories().agents.create(&agent).await?;
    Ok(Envelope::ok(CreateAgentResponse { agent }))
}

pub async fn list_agents(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Agent>> {
    let agents = state.engine.repositories().agents.list_all().await?;
    Ok(Envelope::ok(agents))
}

// ----------------------------------------------------------------- budget

pub async fn get_budget(State(state): State<Arc<AppState>>, Path(agent_id): Path<Uuid>) -> ApiResult<Budget> {
    let period = Budget::current_period();
    let budget = load_or_materialize_budget(&state, agent_id, &period).await?;
    Ok(Envelope::ok(budget))
}

async fn load_or_materialize_budget(state: &AppState, agent_id: Uuid, period: &str) -> crate::domain::Result<Budget> {
    let repos = state.engine.repositories();
    if let Some(budget) = repos.budgets.get_current(agent_id, period).await? {
        return Ok(budget);
    }
    let budget = Budget::new(agent_id, 0.0, period);
    repos.budgets.upsert(&budget).await?;
    Ok(budget)
}

#[derive(Debug, Deserialize)]
pub struct SetBudgetRequest {
    agent_id: Uuid,
    monthly_limit: f64,
}

pub async fn set_budget(State(state): State<Arc<AppState>>, axum::Json(body): axum::Json<SetBudgetRequest>) -> ApiResult<Budget> {
    if body.monthly_limit < 0.0 {
        return Err(OracleError::validation("monthly_limit must be non-negative").into());
    }
    let period = Budget::current_period();
    let repos = state.engine.repositories();
    let mut budget = load_or_materialize_budget(&state, body.agent_id, &period).await?;
    budget.monthly_limit = body.monthly_limit;
    repos.budgets.upsert(&budget).await?;
    Ok(Envelope::ok(budget))
}

pub async fn budget_history(State(state): State<Arc<AppState>>, Path(agent_id): Path<Uuid>) -> ApiResult<Vec<crate::domain::RequestLog>> {
    const HISTORY_LIMIT: i64 = 50;
    let logs = state.engine.repositories().request_log.list_by_agent(agent_id, HISTORY_LIMIT).await?;
    Ok(Envelope::ok(logs))
}

// ----------------------------------------------------------------- alerts

#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    alert_type: String,
    target_skill: Option<String>,
    target_provider: Option<String>,
    max_price: Option<f64>,
    notify_method: String,
    webhook_url: Option<String>,
    email: Option<String>,
}

pub async fn create_alert(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(body): axum::Json<CreateAlertRequest>,
) -> ApiResult<PriceAlert> {
    let alert_type = AlertType::parse(&body.alert_type).ok_or_else(|| OracleError::validation("unknown alert_type"))?;
    let notify_method = NotifyMethod::parse(&body.notify_method).ok_or_else(|| OracleError::validation("unknown notify_method"))?;

    let alert = state
        .alert_manager
        .create(NewPriceAlert {
            agent_id: auth.agent.id,
            alert_type,
            target_skill: body.target_skill,
            target_provider: body.target_provider,
            max_price: body.max_price,
            notify_method,
            webhook_url: body.webhook_url,
            email: body.email,
        })
        .await?;

    Ok(Envelope::ok(alert))
}

pub async fn list_alerts(State(state): State<Arc<AppState>>, Extension(auth): Extension<AuthContext>) -> ApiResult<Vec<PriceAlert>> {
    let alerts = state.alert_manager.list_by_agent(auth.agent.id).await?;
    Ok(Envelope::ok(alerts))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAlertRequest {
    status: String,
}

pub async fn update_alert(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<UpdateAlertRequest>,
) -> ApiResult<PriceAlert> {
    let status = AlertStatus::parse(&body.status).ok_or_else(|| OracleError::validation("unknown status"))?;
    let alert = state.alert_manager.update_status(id, auth.agent.id, status).await?;
    Ok(Envelope::ok(alert))
}

pub async fn delete_alert(State(state): State<Arc<AppState>>, Extension(auth): Extension<AuthContext>, Path(id): Path<Uuid>) -> ApiResult<()> {
    state.alert_manager.delete(id, auth.agent.id).await?;
    Ok(Envelope::ok(()))
}

pub async fn alert_history(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<crate::domain::AlertTrigger>> {
    let history = state.alert_manager.history(id, auth.agent.id).await?;
    Ok(Envelope::ok(history))
}

// ---------------------------------------------------------------- forecast

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    days: Option<i64>,
}

const DEFAULT_FORECAST_DAYS: i64 = 7;
const MAX_FORECAST_DAYS: i64 = 30;

pub async fn get_forecast(
    State(state): State<Arc<AppState>>,
    Path(skill): Path<String>,
    Query(query): Query<ForecastQuery>,
) -> ApiResult<crate::forecast::ForecastResult> {
    let days = query.days.unwrap_or(DEFAULT_FORECAST_DAYS).clamp(1, MAX_FORECAST_DAYS);
    let result = state.engine.forecaster().forecast(&skill, days).await?;
    Ok(Envelope::ok(result))
}

pub async fn forecast_accuracy(State(state): State<Arc<AppState>>, Path(skill): Path<String>) -> ApiResult<serde_json::Value> {
    let accuracy = state.engine.forecaster().accuracy(&skill).await?;
    match accuracy {
        Some(accuracy) => Ok(Envelope::ok(serde_json::json!({ "skill": skill, "accuracy": accuracy }))),
        None => Err(OracleError::not_found(format!("insufficient history to backtest {skill}")).into()),
    }
}

#[derive(Debug, Serialize)]
pub struct ForecastStatus {
    horizon_days: i64,
}

pub async fn forecast_status() -> ApiResult<ForecastStatus> {
    Ok(Envelope::ok(ForecastStatus {
        horizon_days: crate::engine::Engine::forecast_horizon_days(),
    }))
}

pub async fn trigger_forecast_generation(State(state): State<Arc<AppState>>) -> ApiResult<crate::engine::ForecastRunReport> {
    let report = state.engine.generate_all_forecasts().await?;
    Ok(Envelope::ok(report))
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        OracleError::from(err).into()
    }
}
