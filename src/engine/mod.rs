pub mod aggregator;
pub mod confidence;
pub mod outlier;

pub use aggregator::{AgentServiceStats, Aggregator, AggregateMeta, RateAggregate};
pub use confidence::{calculate_confidence, detailed_confidence, ConfidenceBreakdown, ConfidenceObservation};
pub use outlier::{detect_outliers, OutlierResult, OutlierStats};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alerts::evaluator::{AlertCheckReport, AlertEvaluator};
use crate::compare::ComparisonEngine;
use crate::crawl::{BazaarCrawler, CrawlCycleResult, CrawlOrchestrator, StaticCatalogCrawler};
use crate::domain::Result;
use crate::forecast::ForecastEngine;
use crate::notify::{Dispatcher, NotificationDispatcher};
use crate::observability::metrics::ForecastMetrics;
use crate::storage::Repositories;
use crate::ws::WsGateway;

const FORECAST_HORIZON_DAYS: i64 = 7;

/// Report returned by [`Engine::generate_all_forecasts`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastRunReport {
    pub skills_attempted: usize,
    pub skills_forecasted: usize,
    pub points_written: usize,
    pub errors: Vec<String>,
}

/// The single entry point for the three scheduled operations: crawling,
/// alert evaluation, and forecast generation. The scheduler and the CLI
/// both call through here rather than constructing crawlers, the
/// evaluator, or the forecast engine themselves, so there is exactly one
/// place each operation is wired up.
pub struct Engine {
    repos: Repositories,
    orchestrator: CrawlOrchestrator,
    aggregator: Arc<Aggregator>,
    evaluator: AlertEvaluator,
    comparison: ComparisonEngine,
    forecaster: ForecastEngine,
}

impl Engine {
    pub fn new(repos: Repositories, bazaar_endpoint: Option<String>, ws_gateway: Arc<WsGateway>, smtp: Option<crate::config::SmtpConfig>) -> Self {
        let crawlers: Vec<Arc<dyn crate::crawl::Crawler>> = vec![
            Arc::new(StaticCatalogCrawler::new()),
            Arc::new(BazaarCrawler::new(bazaar_endpoint)),
        ];

        let orchestrator = CrawlOrchestrator::new(
            crawlers,
            repos.providers.clone(),
            repos.services.clone(),
            repos.rates.clone(),
            repos.rate_ingest.clone(),
            repos.agent_services.clone(),
        );

        let aggregator = Arc::new(Aggregator::new(repos.rates.clone(), repos.agent_services.clone()));

        let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(Dispatcher::new(smtp, ws_gateway, repos.alert_triggers.clone()));
        let evaluator = AlertEvaluator::new(
            repos.alerts.clone(),
            repos.alert_triggers.clone(),
            repos.providers.clone(),
            repos.services.clone(),
            repos.rates.clone(),
            repos.agent_services.clone(),
            dispatcher,
        );

        let comparison = ComparisonEngine::new(repos.agent_services.clone(), aggregator.clone());
        let forecaster = ForecastEngine::new(repos.rates.clone(), repos.forecasts.clone());

        Self {
            repos,
            orchestrator,
            aggregator,
            evaluator,
            comparison,
            forecaster,
        }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn comparison(&self) -> &ComparisonEngine {
        &self.comparison
    }

    pub fn forecaster(&self) -> &ForecastEngine {
        &self.forecaster
    }

    /// Runs every registered crawler once and folds the results into the
    /// store. Never returns an error for a single crawler's failure — those
    /// accumulate in [`CrawlCycleResult::errors`] instead.
    pub async fn run_crawl_cycle(&self) -> CrawlCycleResult {
        self.orchestrator.run_cycle().await
    }

    /// Evaluates every active alert against current store state and
    /// dispatches any that fire.
    pub async fn check_price_alerts(&self) -> Result<AlertCheckReport> {
        self.evaluator.check_all().await
    }

    /// Regenerates forecasts for every skill currently tracked by
    /// agent-service history, skipping any with insufficient history.
    pub async fn generate_all_forecasts(&self) -> Result<ForecastRunReport> {
        let started_at = std::time::Instant::now();
        let agents = self.repos.agent_services.list_all().await?;
        let rate_pairs = self.repos.rates.list_distinct_category_pairs().await?;

        let mut skills: Vec<String> = agents.into_iter().map(|a| a.skill).collect();
        skills.extend(rate_pairs.into_iter().map(|(category, subcategory)| {
            if subcategory == "default" {
                category
            } else {
                format!("{category}/{subcategory}")
            }
        }));
        skills.sort();
        skills.dedup();

        let skills_attempted = skills.len();
        let mut skills_forecasted = 0usize;
        let mut points_written = 0usize;
        let mut errors = Vec::new();

        for skill in &skills {
            match self.forecaster.generate_and_persist(skill).await {
                Ok(0) => {}
                Ok(points) => {
                    skills_forecasted += 1;
                    points_written += points;
                }
                Err(err) => {
                    tracing::warn!(skill, %err, "forecast generation failed");
                    errors.push(format!("{skill}: {err}"));
                }
            }
        }

        info!(skills_attempted, skills_forecasted, points_written, errors = errors.len(), "forecast run complete");
        ForecastMetrics::record_run(skills_attempted, skills_forecasted, points_written, started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(ForecastRunReport {
            skills_attempted,
            skills_forecasted,
            points_written,
            errors,
        })
    }

    pub fn forecast_horizon_days() -> i64 {
        FORECAST_HORIZON_DAYS
    }
}
