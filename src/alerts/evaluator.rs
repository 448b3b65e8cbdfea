use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::domain::{AlertTrigger, AlertType, PriceAlert, Result};
use crate::notify::NotificationDispatcher;
use crate::observability::metrics::AlertMetrics;
use crate::storage::{AgentServiceRepository, AlertRepository, AlertTriggerRepository, ProviderRepository, RateRepository, ServiceRepository};

struct CurrentObservation {
    price: f64,
    provider: Option<String>,
    skill: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertCheckReport {
    pub checked_alerts: u32,
    pub triggered_alerts: u32,
}

/// Runs the active alert book against the latest store state and dispatches
/// any fired conditions.
pub struct AlertEvaluator {
    alerts: Arc<dyn AlertRepository>,
    triggers: Arc<dyn AlertTriggerRepository>,
    providers: Arc<dyn ProviderRepository>,
    services: Arc<dyn ServiceRepository>,
    rates: Arc<dyn RateRepository>,
    agent_services: Arc<dyn AgentServiceRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl AlertEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        alerts: Arc<dyn AlertRepository>,
        triggers: Arc<dyn AlertTriggerRepository>,
        providers: Arc<dyn ProviderRepository>,
        services: Arc<dyn ServiceRepository>,
        rates: Arc<dyn RateRepository>,
        agent_services: Arc<dyn AgentServiceRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            alerts,
            triggers,
            providers,
            services,
            rates,
            agent_services,
            dispatcher,
        }
    }

    pub async fn check_all(&self) -> Result<AlertCheckReport> {
        let started_at = std::time::Instant::now();
        let active = self.alerts.list_active().await?;
        let mut triggered_alerts = 0u32;

        for alert in &active {
            match self.check_one(alert).await {
                Ok(true) => triggered_alerts += 1,
                Ok(false) => {}
                Err(err) => warn!(alert_id = %alert.id, %err, "alert evaluation failed"),
            }
        }

        let checked_alerts = active.len() as u32;
        AlertMetrics::record_check(checked_alerts, triggered_alerts, started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(AlertCheckReport {
            checked_alerts,
            triggered_alerts,
        })
    }

    async fn check_one(&self, alert: &PriceAlert) -> Result<bool> {
        let current = match self.resolve_current(alert).await? {
            Some(observation) => observation,
            None => return Ok(false),
        };

        let baseline = self.resolve_baseline(alert, current.price).await?;

        let fires = match alert.alert_type {
            AlertType::PriceDrop => current.price < baseline,
            AlertType::PriceThreshold => current.price <= alert.max_price.unwrap_or(f64::INFINITY),
            AlertType::AnyChange => current.price != baseline,
        };

        if !fires {
            return Ok(false);
        }

        let trigger = AlertTrigger::new(alert.id, baseline, current.price, current.provider, current.skill);
        self.triggers.create(&trigger).await?;
        self.alerts.mark_triggered(alert.id, trigger.triggered_at).await?;
        self.dispatcher.dispatch(alert, &trigger).await;

        Ok(true)
    }

    async fn resolve_current(&self, alert: &PriceAlert) -> Result<Option<CurrentObservation>> {
        if let Some(provider_name) = &alert.target_provider {
            let Some(provider) = self.providers.get_by_name(provider_name).await? else {
                return Ok(None);
            };
            let services = self.services.list_by_provider(provider.id).await?;

            let mut latest: Option<(CurrentObservation, chrono::DateTime<chrono::Utc>)> = None;
            for service in services {
                let Some(rate) = self.rates.get_current(service.id).await? else {
                    continue;
                };
                if latest.as_ref().map(|(_, at)| rate.created_at > *at).unwrap_or(true) {
                    latest = Some((
                        CurrentObservation {
                            price: rate.price,
                            provider: Some(provider.name.clone()),
                            skill: Some(format!("{}/{}", service.category, service.subcategory)),
                        },
                        rate.created_at,
                    ));
                }
            }
            return Ok(latest.map(|(obs, _)| obs));
        }

        if let Some(skill) = &alert.target_skill {
            let cheapest = self.agent_services.list_by_skill(skill).await?.into_iter().next();
            return Ok(cheapest.map(|agent_service| CurrentObservation {
                price: agent_service.price,
                provider: Some(agent_service.agent_name),
                skill: Some(skill.clone()),
            }));
        }

        warn!(alert_id = %alert.id, "malformed alert has neither target_provider nor target_skill");
        Ok(None)
    }

    /// Baseline = the most recent trigger's `new_price`, or the current
    /// observation if the alert has never fired. This naturally means a
    /// `price_drop`/`any_change` alert never fires on its first evaluation.
    async fn resolve_baseline(&self, alert: &PriceAlert, current_price: f64) -> Result<f64> {
        let last = self.triggers.list_by_alert(alert.id, 1).await?;
        Ok(last.first().map(|t| t.new_price).unwrap_or(current_price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentService, AlertStatus, NewPriceAlert, NotifyMethod, Provider, Service};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeAlerts {
        alerts: Mutex<Vec<PriceAlert>>,
    }

    #[async_trait]
    impl AlertRepository for FakeAlerts {
        async fn create(&self, alert: &PriceAlert) -> Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
        async fn get_by_id(&self, id: Uuid) -> Result<Option<PriceAlert>> {
            Ok(self.alerts.lock().unwrap().iter().find(|a| a.id == id).cloned())
        }
        async fn list_by_agent(&self, _agent_id: Uuid) -> Result<Vec<PriceAlert>> {
            Ok(self.alerts.lock().unwrap().clone())
        }
        async fn list_active(&self) -> Result<Vec<PriceAlert>> {
            Ok(self.alerts.lock().unwrap().iter().filter(|a| a.status == AlertStatus::Active).cloned().collect())
        }
        async fn update_status(&self, id: Uuid, status: AlertStatus) -> Result<()> {
            if let Some(a) = self.alerts.lock().unwrap().iter_mut().find(|a| a.id == id) {
                a.status = status;
            }
            Ok(())
        }
        async fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
            if let Some(a) = self.alerts.lock().unwrap().iter_mut().find(|a| a.id == id) {
                a.last_triggered = Some(at);
            }
            Ok(())
        }
        async fn delete(&self, id: Uuid) -> Result<()> {
            self.alerts.lock().unwrap().retain(|a| a.id != id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTriggers {
        triggers: Mutex<Vec<AlertTrigger>>,
    }

    #[async_trait]
    impl AlertTriggerRepository for FakeTriggers {
        async fn create(&self, trigger: &AlertTrigger) -> Result<()> {
            self.triggers.lock().unwrap().push(trigger.clone());
            Ok(())
        }
        async fn list_by_alert(&self, alert_id: Uuid, limit: i64) -> Result<Vec<AlertTrigger>> {
            let mut found: Vec<AlertTrigger> = self.triggers.lock().unwrap().iter().filter(|t| t.alert_id == alert_id).cloned().collect();
            found.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
            found.truncate(limit as usize);
            Ok(found)
        }
        async fn mark_notified(&self, id: Uuid) -> Result<()> {
            if let Some(t) = self.triggers.lock().unwrap().iter_mut().find(|t| t.id == id) {
                t.notified = true;
            }
            Ok(())
        }
    }

    struct FakeProviders(Provider);
    #[async_trait]
    impl ProviderRepository for FakeProviders {
        async fn upsert(&self, _provider: &Provider) -> Result<()> {
            Ok(())
        }
        async fn get_by_id(&self, _id: Uuid) -> Result<Option<Provider>> {
            Ok(Some(self.0.clone()))
        }
        async fn get_by_name(&self, name: &str) -> Result<Option<Provider>> {
            Ok(if self.0.name == name { Some(self.0.clone()) } else { None })
        }
        async fn list_all(&self) -> Result<Vec<Provider>> {
            Ok(vec![self.0.clone()])
        }
    }

    struct FakeServices(Service);
    #[async_trait]
    impl ServiceRepository for FakeServices {
        async fn upsert(&self, _service: &Service) -> Result<()> {
            Ok(())
        }
        async fn get_by_id(&self, _id: Uuid) -> Result<Option<Service>> {
            Ok(Some(self.0.clone()))
        }
        async fn find(&self, _provider_id: Uuid, _category: &str, _subcategory: &str) -> Result<Option<Service>> {
            Ok(Some(self.0.clone()))
        }
        async fn list_by_provider(&self, _provider_id: Uuid) -> Result<Vec<Service>> {
            Ok(vec![self.0.clone()])
        }
    }

    struct FakeRates(Mutex<f64>);
    #[async_trait]
    impl RateRepository for FakeRates {
        async fn upsert_current(&self, rate: &crate::domain::Rate) -> Result<()> {
            *self.0.lock().unwrap() = rate.price;
            Ok(())
        }
        async fn get_current(&self, _service_id: Uuid) -> Result<Option<crate::domain::Rate>> {
            let price = *self.0.lock().unwrap();
            Ok(Some(crate::domain::Rate::new(Uuid::new_v4(), price, "USD", "1k_tokens", "per_unit", 0.9, 1)?))
        }
        async fn list_current_all(&self) -> Result<Vec<crate::domain::Rate>> {
            Ok(Vec::new())
        }
        async fn record_history(&self, _entry: &crate::domain::RateHistory) -> Result<()> {
            Ok(())
        }
        async fn list_history(&self, _service_id: Uuid, _since: DateTime<Utc>) -> Result<Vec<crate::domain::RateHistory>> {
            Ok(Vec::new())
        }
        async fn latest_history_before(&self, _service_id: Uuid, _before: DateTime<Utc>) -> Result<Option<crate::domain::RateHistory>> {
            Ok(None)
        }
        async fn list_joined_by_category(&self, _category: &str, _subcategory: Option<&str>) -> Result<Vec<crate::storage::JoinedRateObservation>> {
            Ok(Vec::new())
        }
        async fn list_distinct_category_pairs(&self) -> Result<Vec<(String, String)>> {
            Ok(Vec::new())
        }
        async fn daily_avg_by_category(&self, _category: &str, _subcategory: Option<&str>, _since: DateTime<Utc>) -> Result<Vec<(chrono::NaiveDate, f64)>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeAgentServices;
    #[async_trait]
    impl AgentServiceRepository for FakeAgentServices {
        async fn upsert(&self, _service: &AgentService) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _agent_id: &str, _skill: &str) -> Result<Option<AgentService>> {
            Ok(None)
        }
        async fn list_by_skill(&self, _skill: &str) -> Result<Vec<AgentService>> {
            Ok(Vec::new())
        }
        async fn list_by_agent(&self, _agent_id: &str) -> Result<Vec<AgentService>> {
            Ok(Vec::new())
        }
        async fn list_all(&self) -> Result<Vec<AgentService>> {
            Ok(Vec::new())
        }
        async fn record_history(&self, _entry: &crate::domain::AgentServiceHistory) -> Result<()> {
            Ok(())
        }
        async fn list_history(&self, _agent_id: &str, _since: DateTime<Utc>) -> Result<Vec<crate::domain::AgentServiceHistory>> {
            Ok(Vec::new())
        }
    }

    struct NullDispatcher;
    #[async_trait]
    impl NotificationDispatcher for NullDispatcher {
        async fn dispatch(&self, _alert: &PriceAlert, _trigger: &AlertTrigger) -> bool {
            true
        }
    }

    fn make_evaluator(price: f64) -> (AlertEvaluator, Arc<FakeAlerts>, Provider) {
        let provider = Provider::new("openai", None, "first_party");
        let service = Service::new(provider.id, "llm", "gpt-4o", None);
        let alerts = Arc::new(FakeAlerts::default());
        let evaluator = AlertEvaluator::new(
            alerts.clone(),
            Arc::new(FakeTriggers::default()),
            Arc::new(FakeProviders(provider.clone())),
            Arc::new(FakeServices(service)),
            Arc::new(FakeRates(Mutex::new(price))),
            Arc::new(FakeAgentServices),
            Arc::new(NullDispatcher),
        );
        (evaluator, alerts, provider)
    }

    #[tokio::test]
    async fn threshold_fires_repeatedly_without_baseline_gate() {
        let (evaluator, alerts, provider) = make_evaluator(0.009);
        let alert = PriceAlert::create(NewPriceAlert {
            agent_id: Uuid::new_v4(),
            alert_type: AlertType::PriceThreshold,
            target_skill: None,
            target_provider: Some(provider.name.clone()),
            max_price: Some(0.01),
            notify_method: NotifyMethod::Websocket,
            webhook_url: None,
            email: None,
        })
        .unwrap();
        alerts.create(&alert).await.unwrap();

        let report = evaluator.check_all().await.unwrap();
        assert_eq!(report.checked_alerts, 1);
        assert_eq!(report.triggered_alerts, 1);

        let report_again = evaluator.check_all().await.unwrap();
        assert_eq!(report_again.triggered_alerts, 1, "threshold alerts fire every evaluation, no baseline gate");
    }

    #[tokio::test]
    async fn threshold_does_not_fire_above_max_price() {
        let (evaluator, alerts, provider) = make_evaluator(0.02);
        let alert = PriceAlert::create(NewPriceAlert {
            agent_id: Uuid::new_v4(),
            alert_type: AlertType::PriceThreshold,
            target_skill: None,
            target_provider: Some(provider.name.clone()),
            max_price: Some(0.01),
            notify_method: NotifyMethod::Websocket,
            webhook_url: None,
            email: None,
        })
        .unwrap();
        alerts.create(&alert).await.unwrap();

        let report = evaluator.check_all().await.unwrap();
        assert_eq!(report.triggered_alerts, 0);
    }

    #[tokio::test]
    async fn any_change_establishes_baseline_without_firing_first_time() {
        let (evaluator, alerts, provider) = make_evaluator(0.02);
        let alert = PriceAlert::create(NewPriceAlert {
            agent_id: Uuid::new_v4(),
            alert_type: AlertType::AnyChange,
            target_skill: None,
            target_provider: Some(provider.name.clone()),
            max_price: None,
            notify_method: NotifyMethod::Websocket,
            webhook_url: None,
            email: None,
        })
        .unwrap();
        alerts.create(&alert).await.unwrap();

        let report = evaluator.check_all().await.unwrap();
        assert_eq!(report.triggered_alerts, 0, "first evaluation only establishes the baseline");
    }
}
