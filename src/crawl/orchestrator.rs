use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{AgentService, AgentServiceHistory, Provider, Rate, RateHistory, Service};
use crate::observability::metrics::CrawlMetrics;
use crate::storage::{
    AgentServiceRepository, ProviderRepository, RateIngestRepository, RateRepository,
    ServiceRepository,
};

use super::crawlers::{AgentServiceObservation, Crawler, CrawlOutput, ProviderRateObservation};

const DEDUP_WINDOW_MINUTES: i64 = 5;
const DEFAULT_CRAWLER_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlCycleResult {
    pub providers_checked: usize,
    pub new_rates: usize,
    pub errors: Vec<String>,
}

/// Runs the registered crawlers concurrently and folds their output into
/// the store.
pub struct CrawlOrchestrator {
    crawlers: Vec<Arc<dyn Crawler>>,
    providers: Arc<dyn ProviderRepository>,
    services: Arc<dyn ServiceRepository>,
    rates: Arc<dyn RateRepository>,
    rate_ingest: Arc<dyn RateIngestRepository>,
    agent_services: Arc<dyn AgentServiceRepository>,
}

impl CrawlOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        crawlers: Vec<Arc<dyn Crawler>>,
        providers: Arc<dyn ProviderRepository>,
        services: Arc<dyn ServiceRepository>,
        rates: Arc<dyn RateRepository>,
        rate_ingest: Arc<dyn RateIngestRepository>,
        agent_services: Arc<dyn AgentServiceRepository>,
    ) -> Self {
        Self {
            crawlers,
            providers,
            services,
            rates,
            rate_ingest,
            agent_services,
        }
    }

    /// A crawler's failure (including a panic) never cancels its
    /// siblings — the settle-all pattern.
    pub async fn run_cycle(&self) -> CrawlCycleResult {
        let started_at = std::time::Instant::now();
        let mut handles = Vec::with_capacity(self.crawlers.len());
        for crawler in &self.crawlers {
            let crawler = Arc::clone(crawler);
            handles.push(tokio::spawn(async move {
                let name = crawler.name().to_string();
                let output = crawler.crawl().await;
                (name, output)
            }));
        }

        let mut errors = Vec::new();
        let mut providers_seen = HashSet::new();
        let mut new_rates = 0usize;

        for handle in handles {
            match handle.await {
                Ok((name, Ok(CrawlOutput::ProviderRates(observations)))) => {
                    for obs in &observations {
                        providers_seen.insert(obs.provider_name.clone());
                    }
                    match self.ingest_provider_rates(observations).await {
                        Ok(inserted) => new_rates += inserted,
                        Err(err) => errors.push(format!("{name}: {err}")),
                    }
                }
                Ok((name, Ok(CrawlOutput::AgentServices(observations)))) => {
                    if let Err(err) = self.ingest_agent_services(observations).await {
                        errors.push(format!("{name}: {err}"));
                    }
                }
                Ok((name, Err(err))) => {
                    warn!(crawler = %name, %err, "crawler failed");
                    errors.push(format!("{name}: {err}"));
                }
                Err(join_err) => {
                    warn!(%join_err, "crawler task panicked");
                    errors.push(format!("crawler task panicked: {join_err}"));
                }
            }
        }

        let duration_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        info!(
            providers_checked = providers_seen.len(),
            new_rates,
            error_count = errors.len(),
            "crawl cycle complete"
        );
        CrawlMetrics::record_cycle(providers_seen.len(), new_rates, errors.len(), duration_ms);

        CrawlCycleResult {
            providers_checked: providers_seen.len(),
            new_rates,
            errors,
        }
    }

    async fn ingest_provider_rates(&self, observations: Vec<ProviderRateObservation>) -> crate::domain::Result<usize> {
        let mut inserted = 0usize;
        for obs in observations {
            match self.ingest_one_rate(obs).await {
                Ok(true) => inserted += 1,
                Ok(false) => {}
                Err(err) => warn!(%err, "skipping rate observation"),
            }
        }
        Ok(inserted)
    }

    async fn ingest_one_rate(&self, obs: ProviderRateObservation) -> crate::domain::Result<bool> {
        let provider = match self.providers.get_by_name(&obs.provider_name).await? {
            Some(provider) => provider,
            None => Provider::new(obs.provider_name.clone(), obs.provider_url.clone(), obs.provider_type.clone()),
        };

        let service = match self.services.find(provider.id, &obs.category, &obs.subcategory).await? {
            Some(service) => service,
            None => Service::new(provider.id, obs.category.clone(), obs.subcategory.clone(), None),
        };

        let since = Utc::now() - Duration::minutes(DEDUP_WINDOW_MINUTES);
        let recent = self.rates.list_history(service.id, since).await?;
        let is_duplicate = recent.iter().any(|h| h.price == obs.price && h.unit == obs.unit);
        if is_duplicate {
            return Ok(false);
        }

        let confidence = obs.confidence.unwrap_or(DEFAULT_CRAWLER_CONFIDENCE);
        let rate = Rate::new(service.id, obs.price, obs.currency.clone(), obs.unit.clone(), obs.pricing_type, confidence, 1)?;
        let history = RateHistory::new(service.id, obs.price, obs.currency, obs.unit);

        // Provider upsert, service upsert, current-rate upsert, and the
        // history insert commit as one transaction so a mid-write failure
        // can never leave a service without a rate or a rate without a
        // matching history row.
        self.rate_ingest.ingest_observation(&provider, &service, &rate, &history).await?;

        Ok(true)
    }

    async fn ingest_agent_services(&self, observations: Vec<AgentServiceObservation>) -> crate::domain::Result<()> {
        for obs in observations {
            if let Err(err) = self.ingest_one_agent_service(obs).await {
                warn!(%err, "skipping agent-service observation");
            }
        }
        Ok(())
    }

    async fn ingest_one_agent_service(&self, obs: AgentServiceObservation) -> crate::domain::Result<()> {
        let existing = self.agent_services.get(&obs.agent_id, &obs.skill).await?;

        match existing {
            Some(current) if current.price != obs.price => {
                self.agent_services
                    .record_history(&AgentServiceHistory::new(
                        current.agent_id.clone(),
                        current.price,
                        current.uptime,
                        current.avg_latency_ms,
                    ))
                    .await?;
                let mut updated = current;
                updated.agent_name = obs.agent_name;
                updated.price = obs.price;
                updated.unit = obs.unit;
                updated.currency = obs.currency;
                updated.uptime = obs.uptime;
                updated.avg_latency_ms = obs.avg_latency_ms;
                updated.rating = obs.rating;
                updated.reviews_count = obs.reviews_count;
                updated.x402_endpoint = obs.x402_endpoint;
                updated.bazaar_url = obs.bazaar_url;
                updated.last_updated = Utc::now();
                self.agent_services.upsert(&updated).await?;
            }
            Some(_) => {
                // Identical price: nothing changed, skip silently.
            }
            None => {
                let mut service = AgentService::new(
                    obs.agent_id,
                    obs.agent_name,
                    &obs.skill,
                    obs.price,
                    obs.unit,
                    obs.currency,
                );
                service.uptime = obs.uptime;
                service.avg_latency_ms = obs.avg_latency_ms;
                service.rating = obs.rating;
                service.reviews_count = obs.reviews_count;
                service.x402_endpoint = obs.x402_endpoint;
                service.bazaar_url = obs.bazaar_url;
                self.agent_services.upsert(&service).await?;
            }
        }

        Ok(())
    }
}
