pub mod crawlers;
pub mod orchestrator;

pub use crawlers::{AgentServiceObservation, BazaarCrawler, CrawlOutput, Crawler, CrawlerKind, ProviderRateObservation, StaticCatalogCrawler};
pub use orchestrator::{CrawlCycleResult, CrawlOrchestrator};
