//! Named metric-recording helpers, one struct per subsystem, so call sites
//! read as `CrawlMetrics::record_cycle(...)` rather than bare `metrics::`
//! macro calls scattered through engine code.

/// Crawl-cycle metrics.
pub struct CrawlMetrics;

impl CrawlMetrics {
    pub fn record_cycle(providers_checked: usize, new_rates: usize, error_count: usize, duration_ms: f64) {
        metrics::counter!("price_oracle_crawl_cycles_total", 1);
        metrics::counter!("price_oracle_crawl_providers_checked_total", providers_checked as u64);
        metrics::counter!("price_oracle_crawl_new_rates_total", new_rates as u64);
        metrics::counter!("price_oracle_crawl_errors_total", error_count as u64);
        metrics::histogram!("price_oracle_crawl_cycle_duration_ms", duration_ms);
    }
}

/// Alert-evaluation metrics.
pub struct AlertMetrics;

impl AlertMetrics {
    pub fn record_check(checked_alerts: u32, triggered_alerts: u32, duration_ms: f64) {
        metrics::counter!("price_oracle_alert_checks_total", 1);
        metrics::gauge!("price_oracle_alerts_checked", checked_alerts as f64);
        metrics::counter!("price_oracle_alert_triggers_total", triggered_alerts as u64);
        metrics::histogram!("price_oracle_alert_check_duration_ms", duration_ms);
    }

    pub fn record_notification(method: &'static str, delivered: bool) {
        match (method, delivered) {
            ("webhook", true) => metrics::counter!("price_oracle_notifications_webhook_delivered_total", 1),
            ("webhook", false) => metrics::counter!("price_oracle_notifications_webhook_failed_total", 1),
            ("email", true) => metrics::counter!("price_oracle_notifications_email_delivered_total", 1),
            ("email", false) => metrics::counter!("price_oracle_notifications_email_failed_total", 1),
            ("websocket", true) => metrics::counter!("price_oracle_notifications_websocket_delivered_total", 1),
            ("websocket", false) => metrics::counter!("price_oracle_notifications_websocket_failed_total", 1),
            _ => {}
        }
    }
}

/// Forecast-generation metrics.
pub struct ForecastMetrics;

impl ForecastMetrics {
    pub fn record_run(skills_attempted: usize, skills_forecasted: usize, points_written: usize, duration_ms: f64) {
        metrics::counter!("price_oracle_forecast_runs_total", 1);
        metrics::gauge!("price_oracle_forecast_skills_attempted", skills_attempted as f64);
        metrics::counter!("price_oracle_forecast_skills_forecasted_total", skills_forecasted as u64);
        metrics::counter!("price_oracle_forecast_points_written_total", points_written as u64);
        metrics::histogram!("price_oracle_forecast_run_duration_ms", duration_ms);
    }
}
