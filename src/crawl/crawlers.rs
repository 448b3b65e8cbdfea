use std::time::Duration;

use serde::Deserialize;

use crate::domain::Result;

const BAZAAR_TIMEOUT: Duration = Duration::from_secs(10);
const BAZAAR_USER_AGENT: &str = "price-oracle-crawler/1.0";

static SEED_CATALOG: &str = include_str!("seed_catalog.json");
static MOCK_BAZAAR_CATALOG: &str = include_str!("mock_bazaar_catalog.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerKind {
    Provider,
    AgentService,
}

#[derive(Debug, Clone)]
pub struct ProviderRateObservation {
    pub provider_name: String,
    pub provider_url: Option<String>,
    pub provider_type: String,
    pub category: String,
    pub subcategory: String,
    pub price: f64,
    pub currency: String,
    pub unit: String,
    pub pricing_type: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AgentServiceObservation {
    pub agent_id: String,
    pub agent_name: String,
    pub skill: String,
    pub price: f64,
    pub unit: String,
    pub currency: String,
    pub uptime: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub rating: Option<f64>,
    pub reviews_count: u32,
    pub x402_endpoint: Option<String>,
    pub bazaar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub enum CrawlOutput {
    ProviderRates(Vec<ProviderRateObservation>),
    AgentServices(Vec<AgentServiceObservation>),
}

#[async_trait::async_trait]
pub trait Crawler: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> CrawlerKind;
    async fn crawl(&self) -> Result<CrawlOutput>;
}

#[derive(Debug, Deserialize)]
struct SeedCatalog {
    providers: Vec<SeedProvider>,
}

#[derive(Debug, Deserialize)]
struct SeedProvider {
    name: String,
    url: Option<String>,
    #[serde(rename = "type")]
    provider_type: String,
    rates: Vec<SeedRate>,
}

#[derive(Debug, Deserialize)]
struct SeedRate {
    category: String,
    subcategory: String,
    price: f64,
    currency: String,
    unit: String,
    pricing_type: String,
}

/// Reads the bundled first-party provider catalog. Registered as an
/// always-on crawler and also used directly by the scheduler to seed an
/// empty store on first run.
pub struct StaticCatalogCrawler;

impl StaticCatalogCrawler {
    pub fn new() -> Self {
        Self
    }

    pub fn load() -> Result<Vec<ProviderRateObservation>> {
        let catalog: SeedCatalog = serde_json::from_str(SEED_CATALOG)?;
        let mut observations = Vec::new();
        for provider in catalog.providers {
            for rate in provider.rates {
                observations.push(ProviderRateObservation {
                    provider_name: provider.name.clone(),
                    provider_url: provider.url.clone(),
                    provider_type: provider.provider_type.clone(),
                    category: rate.category,
                    subcategory: rate.subcategory,
                    price: rate.price,
                    currency: rate.currency,
                    unit: rate.unit,
                    pricing_type: rate.pricing_type,
                    confidence: None,
                });
            }
        }
        Ok(observations)
    }
}

impl Default for StaticCatalogCrawler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Crawler for StaticCatalogCrawler {
    fn name(&self) -> &str {
        "static-catalog"
    }

    fn kind(&self) -> CrawlerKind {
        CrawlerKind::Provider
    }

    async fn crawl(&self) -> Result<CrawlOutput> {
        Ok(CrawlOutput::ProviderRates(Self::load()?))
    }
}

#[derive(Debug, Deserialize)]
struct BazaarCatalog {
    services: Vec<BazaarService>,
}

#[derive(Debug, Deserialize)]
struct BazaarService {
    agent_id: String,
    agent_name: String,
    skill: String,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    x402: Option<X402Payment>,
    unit: String,
    currency: String,
    #[serde(default)]
    uptime: Option<f64>,
    #[serde(default)]
    avg_latency_ms: Option<f64>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    reviews_count: Option<u32>,
    #[serde(default)]
    x402_endpoint: Option<String>,
    #[serde(default)]
    bazaar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct X402Payment {
    payment: X402PaymentAmount,
}

#[derive(Debug, Deserialize)]
struct X402PaymentAmount {
    amount: f64,
}

impl BazaarService {
    /// Price comes from either `x402.payment.amount` or a flat `price`
    /// field.
    fn resolved_price(&self) -> Option<f64> {
        self.x402.as_ref().map(|p| p.payment.amount).or(self.price)
    }
}

fn normalize_bazaar(catalog: BazaarCatalog) -> Vec<AgentServiceObservation> {
    catalog
        .services
        .into_iter()
        .filter_map(|svc| {
            let price = svc.resolved_price()?;
            Some(AgentServiceObservation {
                agent_id: svc.agent_id,
                agent_name: svc.agent_name,
                skill: crate::domain::canonicalize_skill(&svc.skill),
                price,
                unit: svc.unit,
                currency: svc.currency,
                uptime: svc.uptime,
                avg_latency_ms: svc.avg_latency_ms,
                rating: svc.rating,
                reviews_count: svc.reviews_count.unwrap_or(0),
                x402_endpoint: svc.x402_endpoint,
                bazaar_url: svc.bazaar_url,
            })
        })
        .collect()
}

/// Crawls a marketplace's agent-service catalog. Tries a live HTTP
/// endpoint with a 10-second timeout and falls back to a bundled mock
/// catalog on any failure.
pub struct BazaarCrawler {
    endpoint: Option<String>,
    client: reqwest::Client,
}

impl BazaarCrawler {
    pub fn new(endpoint: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(BAZAAR_TIMEOUT)
            .user_agent(BAZAAR_USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { endpoint, client }
    }

    async fn fetch_live(&self, endpoint: &str) -> Result<Vec<AgentServiceObservation>> {
        let body = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| crate::domain::OracleError::unavailable(format!("bazaar endpoint unreachable: {e}")))?
            .error_for_status()
            .map_err(|e| crate::domain::OracleError::unavailable(format!("bazaar endpoint returned an error: {e}")))?
            .text()
            .await
            .map_err(|e| crate::domain::OracleError::unavailable(format!("failed to read bazaar response: {e}")))?;

        let catalog: BazaarCatalog = serde_json::from_str(&body)?;
        Ok(normalize_bazaar(catalog))
    }

    fn fetch_mock(&self) -> Result<Vec<AgentServiceObservation>> {
        let catalog: BazaarCatalog = serde_json::from_str(MOCK_BAZAAR_CATALOG)?;
        Ok(normalize_bazaar(catalog))
    }
}

#[async_trait::async_trait]
impl Crawler for BazaarCrawler {
    fn name(&self) -> &str {
        "bazaar"
    }

    fn kind(&self) -> CrawlerKind {
        CrawlerKind::AgentService
    }

    async fn crawl(&self) -> Result<CrawlOutput> {
        let observations = match &self.endpoint {
            Some(endpoint) => match self.fetch_live(endpoint).await {
                Ok(observations) => observations,
                Err(err) => {
                    tracing::warn!(%err, "bazaar live fetch failed, falling back to mock catalog");
                    self.fetch_mock()?
                }
            },
            None => self.fetch_mock()?,
        };
        Ok(CrawlOutput::AgentServices(observations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_catalog_parses() {
        let observations = StaticCatalogCrawler::load().unwrap();
        assert!(!observations.is_empty());
        assert!(observations.iter().any(|o| o.provider_name == "OpenAI"));
    }

    #[test]
    fn mock_bazaar_catalog_normalizes_skills() {
        let catalog: BazaarCatalog = serde_json::from_str(MOCK_BAZAAR_CATALOG).unwrap();
        let observations = normalize_bazaar(catalog);
        assert!(!observations.is_empty());
        assert!(observations.iter().all(|o| o.skill.contains('/')));
    }
}
