use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::Router;

use super::auth::auth_middleware;
use super::handlers;
use super::state::AppState;

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let gateway = state.ws_gateway.clone();
    let agents = state.engine.repositories().agents.clone();
    ws.on_upgrade(move |socket| gateway.handle_socket(socket, agents))
}

/// Routes scoped to an agent: require a resolved `AuthContext`.
fn agent_scoped_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/alerts", post(handlers::create_alert).get(handlers::list_alerts))
        .route("/v1/alerts/:id", patch(handlers::update_alert).delete(handlers::delete_alert))
        .route("/v1/alerts/:id/history", get(handlers::alert_history))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/rates", get(handlers::list_rates))
        .route("/v1/rates/:category", get(handlers::rates_by_category))
        .route("/v1/rates/:category/:subcategory", get(handlers::rates_by_subcategory))
        .route("/v1/providers", get(handlers::list_providers))
        .route("/v1/providers/:id", get(handlers::get_provider))
        .route("/v1/stats", get(handlers::store_stats))
        .route("/v1/stats/volatility", get(handlers::stats_volatility))
        .route("/v1/compare", get(handlers::compare_providers))
        .route("/v1/agent-services", get(handlers::list_agent_services))
        .route("/v1/agent-services/compare", get(handlers::compare_agent_services))
        .route("/v1/agent-services/:agentId", get(handlers::get_agent_service))
        .route("/v1/agents", post(handlers::create_agent).get(handlers::list_agents))
        .route("/v1/budget", post(handlers::set_budget))
        .route("/v1/budget/:agentId", get(handlers::get_budget))
        .route("/v1/budget/:agentId/history", get(handlers::budget_history))
        .route("/v1/forecast/status", get(handlers::forecast_status))
        .route("/v1/forecast/generate", post(handlers::trigger_forecast_generation))
        .route("/v1/forecast/:skill/accuracy", get(handlers::forecast_accuracy))
        .route("/v1/forecast/:skill", get(handlers::get_forecast))
        .route("/ws", get(ws_upgrade))
        .merge(agent_scoped_routes(state.clone()))
        .with_state(state)
}
