//! Drives the engine's three periodic operations off cron expressions.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use cron::Schedule;
use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::ScheduleConfig;
use crate::domain::{OracleError, Result};
use crate::engine::Engine;

const TICK_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Guards a single scheduled task so a slow run never overlaps with the
/// next tick — ticks that land while a run is still in flight are
/// dropped rather than queued.
struct SingleFlight {
    running: AtomicBool,
}

impl SingleFlight {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    fn try_enter(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn leave(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

struct Task {
    name: &'static str,
    schedule: Schedule,
    guard: Arc<SingleFlight>,
    last_run: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
}

impl Task {
    fn new(name: &'static str, expr: &str) -> Result<Self> {
        let schedule = Schedule::from_str(expr)
            .map_err(|e| OracleError::config(format!("invalid cron expression for {name}: {e}")))?;
        Ok(Self {
            name,
            schedule,
            guard: Arc::new(SingleFlight::new()),
            last_run: Mutex::new(None),
        })
    }

    /// Whether `schedule` has a firing time strictly between `last_run`
    /// (exclusive) and `now` (inclusive).
    async fn is_due(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let mut last_run = self.last_run.lock().await;
        let after = last_run.unwrap_or(now - chrono::Duration::seconds(1));
        let due = self.schedule.after(&after).take(1).next().map(|t| t <= now).unwrap_or(false);
        if due {
            *last_run = Some(now);
        }
        due
    }
}

/// Runs the crawl, alert-check, and forecast-generation cycles on their
/// configured cron schedules. The crawl and alert-check tasks also run
/// once immediately on [`CronScheduler::start`] so a freshly started
/// instance doesn't wait a full interval before the store has data;
/// forecast generation does not, since it depends on history the
/// first crawl has not yet produced.
pub struct CronScheduler {
    engine: Arc<Engine>,
    crawl_task: Task,
    alert_task: Task,
    forecast_task: Task,
    shutdown_tx: broadcast::Sender<()>,
}

impl CronScheduler {
    pub fn new(engine: Arc<Engine>, config: &ScheduleConfig) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            engine,
            crawl_task: Task::new("crawl", &config.crawl_cron)?,
            alert_task: Task::new("alert_check", &config.alert_check_cron)?,
            forecast_task: Task::new("forecast", &config.forecast_cron)?,
            shutdown_tx,
        })
    }

    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Runs until a shutdown signal is broadcast. Spawns the tick loop on
    /// the current task and awaits it.
    pub async fn run(self: Arc<Self>) {
        info!("scheduler starting, running initial crawl and alert check");
        self.run_crawl_guarded().await;
        self.run_alert_check_guarded().await;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = chrono::Utc::now();
                    if self.crawl_task.is_due(now).await {
                        self.spawn_crawl();
                    }
                    if self.alert_task.is_due(now).await {
                        self.spawn_alert_check();
                    }
                    if self.forecast_task.is_due(now).await {
                        self.spawn_forecast();
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }

    fn spawn_crawl(&self) {
        let engine = self.engine.clone();
        let guard = self.crawl_task.guard.clone();
        if !guard.try_enter() {
            warn!(task = "crawl", "previous run still in flight, skipping tick");
            return;
        }
        tokio::spawn(async move {
            let result = engine.run_crawl_cycle().await;
            info!(providers_checked = result.providers_checked, new_rates = result.new_rates, errors = result.errors.len(), "scheduled crawl complete");
            guard.leave();
        });
    }

    fn spawn_alert_check(&self) {
        let engine = self.engine.clone();
        let guard = self.alert_task.guard.clone();
        if !guard.try_enter() {
            warn!(task = "alert_check", "previous run still in flight, skipping tick");
            return;
        }
        tokio::spawn(async move {
            match engine.check_price_alerts().await {
                Ok(report) => info!(checked = report.checked_alerts, triggered = report.triggered_alerts, "scheduled alert check complete"),
                Err(err) => warn!(%err, "scheduled alert check failed"),
            }
            guard.leave();
        });
    }

    fn spawn_forecast(&self) {
        let engine = self.engine.clone();
        let guard = self.forecast_task.guard.clone();
        if !guard.try_enter() {
            warn!(task = "forecast", "previous run still in flight, skipping tick");
            return;
        }
        tokio::spawn(async move {
            match engine.generate_all_forecasts().await {
                Ok(report) => info!(skills_attempted = report.skills_attempted, skills_forecasted = report.skills_forecasted, "scheduled forecast run complete"),
                Err(err) => warn!(%err, "scheduled forecast run failed"),
            }
            guard.leave();
        });
    }

    async fn run_crawl_guarded(&self) {
        if !self.crawl_task.guard.try_enter() {
            return;
        }
        let result = self.engine.run_crawl_cycle().await;
        info!(providers_checked = result.providers_checked, new_rates = result.new_rates, "startup crawl complete");
        self.crawl_task.guard.leave();
    }

    async fn run_alert_check_guarded(&self) {
        if !self.alert_task.guard.try_enter() {
            return;
        }
        match self.engine.check_price_alerts().await {
            Ok(report) => info!(checked = report.checked_alerts, triggered = report.triggered_alerts, "startup alert check complete"),
            Err(err) => warn!(%err, "startup alert check failed"),
        }
        self.alert_task.guard.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_cron_expression() {
        let err = Task::new("crawl", "not a cron expression");
        assert!(err.is_err());
    }

    #[test]
    fn single_flight_guard_blocks_reentry_until_released() {
        let guard = SingleFlight::new();
        assert!(guard.try_enter());
        assert!(!guard.try_enter());
        guard.leave();
        assert!(guard.try_enter());
    }
}
