use std::sync::Arc;

use chrono::Utc;
use price_oracle::domain::{Agent, AlertType, NewPriceAlert, NotifyMethod, Provider, Rate, RateHistory, Service};
use price_oracle::engine::Engine;
use price_oracle::storage::{DatabaseConfig, DatabasePool, Repositories};
use price_oracle::ws::WsGateway;

// A single connection against a private in-memory database: sqlite hands
// out a fresh empty database per connection to "sqlite::memory:" absent a
// shared-cache URI, so the pool is pinned to one connection to keep every
// query in these tests hitting the same migrated schema.
async fn build_engine() -> Arc<Engine> {
    let mut config = DatabaseConfig::sqlite_memory();
    config.max_connections = 1;
    config.min_connections = 1;
    let db_pool = DatabasePool::new(&config).await.expect("failed to open in-memory sqlite database");

    let repos = Repositories::from_sqlite_pool(&db_pool).expect("sqlite repository set");
    let ws_gateway = Arc::new(WsGateway::new());
    Arc::new(Engine::new(repos, None, ws_gateway, None))
}

#[tokio::test]
async fn crawl_then_aggregate_reflects_seeded_catalog() {
    let engine = build_engine().await;

    let result = engine.run_crawl_cycle().await;
    assert!(result.errors.is_empty(), "seeded crawlers should not error: {:?}", result.errors);
    assert!(result.new_rates > 0, "expected the static catalog crawler to ingest at least one rate");

    let categories = engine
        .repositories()
        .rates
        .list_distinct_category_pairs()
        .await
        .expect("category pairs should be queryable after a crawl");
    assert!(!categories.is_empty());

    let (category, subcategory) = categories[0].clone();
    let aggregate = engine
        .aggregator()
        .aggregate(&category, Some(&subcategory))
        .await
        .expect("aggregate query should succeed")
        .expect("a seeded category should produce an aggregate");
    assert!(aggregate.price > 0.0);
    assert_eq!(aggregate.category, category);
}

#[tokio::test]
async fn manual_rate_insert_is_immediately_aggregatable() {
    let engine = build_engine().await;
    let repos = engine.repositories();

    let provider = Provider::new("acme-inference", None, "first_party");
    repos.providers.upsert(&provider).await.unwrap();

    let service = Service::new(provider.id, "text-generation", "chat-completion", None);
    repos.services.upsert(&service).await.unwrap();

    let rate = Rate::new(service.id, 0.015, "USD", "1k_tokens", "per_unit", 0.6, 1).unwrap();
    repos.rates.upsert_current(&rate).await.unwrap();
    repos
        .rates
        .record_history(&RateHistory::new(service.id, rate.price, "USD", "1k_tokens"))
        .await
        .unwrap();

    let aggregate = engine
        .aggregator()
        .aggregate("text-generation", Some("chat-completion"))
        .await
        .unwrap()
        .expect("single-source aggregate should still resolve");

    assert_eq!(aggregate.price, 0.015);
    assert!(aggregate.confidence <= 0.6);
    assert_eq!(aggregate.meta.total_rates_collected, 1);
    assert_eq!(aggregate.meta.outliers_removed, 0);
}

#[tokio::test]
async fn price_threshold_alert_fires_without_a_baseline_gate() {
    let engine = build_engine().await;
    let repos = engine.repositories();

    let provider = Provider::new("acme-inference", None, "first_party");
    repos.providers.upsert(&provider).await.unwrap();
    let service = Service::new(provider.id, "text-generation", "chat-completion", None);
    repos.services.upsert(&service).await.unwrap();
    let rate = Rate::new(service.id, 0.009, "USD", "1k_tokens", "per_unit", 0.6, 1).unwrap();
    repos.rates.upsert_current(&rate).await.unwrap();

    let agent = Agent::new("watcher", "po_test_key");
    repos.agents.create(&agent).await.unwrap();

    let alert = NewPriceAlert {
        agent_id: agent.id,
        alert_type: AlertType::PriceThreshold,
        target_skill: None,
        target_provider: Some(provider.name.clone()),
        max_price: Some(0.01),
        notify_method: NotifyMethod::Websocket,
        webhook_url: None,
        email: None,
    };

    let created = price_oracle::domain::PriceAlert::create(alert).unwrap();
    repos.alerts.create(&created).await.unwrap();

    let first = engine.check_price_alerts().await.unwrap();
    assert_eq!(first.checked_alerts, 1);
    assert_eq!(first.triggered_alerts, 1, "0.009 <= maxPrice 0.01 should fire on first evaluation");

    let second = engine.check_price_alerts().await.unwrap();
    assert_eq!(second.triggered_alerts, 1, "threshold alerts have no baseline gate, so they fire every pass");

    let raised = Rate::new(service.id, 0.02, "USD", "1k_tokens", "per_unit", 0.6, 1).unwrap();
    repos.rates.upsert_current(&raised).await.unwrap();
    let third = engine.check_price_alerts().await.unwrap();
    assert_eq!(third.triggered_alerts, 0, "0.02 exceeds maxPrice 0.01 and should not fire");

    let triggers = repos.alert_triggers.list_by_alert(created.id, 10).await.unwrap();
    assert_eq!(triggers.len(), 2);
}

#[tokio::test]
async fn aggregate_of_nonexistent_category_is_none() {
    let engine = build_engine().await;
    let result = engine.aggregator().aggregate("nonexistent-category", Some("nonexistent-subcategory")).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn forecast_generation_skips_skills_with_insufficient_history() {
    let engine = build_engine().await;
    let report = engine.generate_all_forecasts().await.unwrap();
    assert_eq!(report.skills_attempted, 0);
    assert_eq!(report.skills_forecasted, 0);
    assert_eq!(report.points_written, 0);
}

#[tokio::test]
async fn forecast_generation_produces_a_week_of_predictions_from_thirty_days_of_history() {
    let engine = build_engine().await;
    let repos = engine.repositories();

    let agent_id = "agent-forecast-1";
    let skill = "text-generation/chat-completion";

    // Forecasts are built from `rate_history`, keyed by category/subcategory;
    // the agent-service row only makes the skill show up in the scan that
    // `generate_all_forecasts` drives.
    let provider = Provider::new("forecast-provider", None, "first_party");
    repos.providers.upsert(&provider).await.unwrap();
    let service = Service::new(provider.id, "text-generation", "chat-completion", None);
    repos.services.upsert(&service).await.unwrap();

    let base = Utc::now() - chrono::Duration::days(30);
    for day in 0..30 {
        let wobble = if day % 2 == 0 { 1.05 } else { 0.95 };
        let price = 0.02 * wobble;
        let mut history = RateHistory::new(service.id, price, "USD", "1k_tokens");
        history.recorded_at = base + chrono::Duration::days(day);
        repos.rates.record_history(&history).await.unwrap();
    }

    let agent_service = price_oracle::domain::AgentService::new(agent_id, "forecast-test-agent", skill, 0.02, "request", "USD");
    repos.agent_services.upsert(&agent_service).await.unwrap();

    let report = engine.generate_all_forecasts().await.unwrap();
    assert_eq!(report.skills_attempted, 1);
    assert_eq!(report.skills_forecasted, 1);
    assert_eq!(report.points_written, Engine::forecast_horizon_days() as usize);

    let forecasts = repos.forecasts.list_by_skill(skill).await.unwrap();
    assert_eq!(forecasts.len(), Engine::forecast_horizon_days() as usize);
    for forecast in &forecasts {
        assert!(forecast.predicted_price >= 0.0001 && forecast.predicted_price <= 0.04);
    }
}
