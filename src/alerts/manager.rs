use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{AlertStatus, AlertTrigger, NewPriceAlert, OracleError, PriceAlert, Result};
use crate::storage::{AlertRepository, AlertTriggerRepository};

const HISTORY_LIMIT: i64 = 50;

/// CRUD surface for [`PriceAlert`]s. Mutating and history operations are
/// restricted to the alert's owning agent.
pub struct AlertManager {
    alerts: Arc<dyn AlertRepository>,
    triggers: Arc<dyn AlertTriggerRepository>,
}

impl AlertManager {
    pub fn new(alerts: Arc<dyn AlertRepository>, triggers: Arc<dyn AlertTriggerRepository>) -> Self {
        Self { alerts, triggers }
    }

    pub async fn create(&self, input: NewPriceAlert) -> Result<PriceAlert> {
        let alert = PriceAlert::create(input)?;
        self.alerts.create(&alert).await?;
        Ok(alert)
    }

    /// Most-recent-first.
    pub async fn list_by_agent(&self, agent_id: Uuid) -> Result<Vec<PriceAlert>> {
        self.alerts.list_by_agent(agent_id).await
    }

    pub async fn update_status(&self, id: Uuid, agent_id: Uuid, status: AlertStatus) -> Result<PriceAlert> {
        let alert = self.authorize(id, agent_id).await?;
        self.alerts.update_status(id, status).await?;
        Ok(PriceAlert { status, ..alert })
    }

    pub async fn delete(&self, id: Uuid, agent_id: Uuid) -> Result<()> {
        self.authorize(id, agent_id).await?;
        self.alerts.delete(id).await
    }

    /// Last 50 triggers for an alert, newest first.
    pub async fn history(&self, id: Uuid, agent_id: Uuid) -> Result<Vec<AlertTrigger>> {
        self.authorize(id, agent_id).await?;
        self.triggers.list_by_alert(id, HISTORY_LIMIT).await
    }

    async fn authorize(&self, id: Uuid, agent_id: Uuid) -> Result<PriceAlert> {
        let alert = self
            .alerts
            .get_by_id(id)
            .await?
            .ok_or_else(|| OracleError::not_found(format!("alert {id} not found")))?;
        if alert.agent_id != agent_id {
            return Err(OracleError::forbidden("alert does not belong to this agent"));
        }
        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertType, NotifyMethod};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryAlerts {
        alerts: Mutex<Vec<PriceAlert>>,
    }

    #[async_trait]
    impl AlertRepository for InMemoryAlerts {
        async fn create(&self, alert: &PriceAlert) -> Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
        async fn get_by_id(&self, id: Uuid) -> Result<Option<PriceAlert>> {
            Ok(self.alerts.lock().unwrap().iter().find(|a| a.id == id).cloned())
        }
        async fn list_by_agent(&self, agent_id: Uuid) -> Result<Vec<PriceAlert>> {
            Ok(self.alerts.lock().unwrap().iter().filter(|a| a.agent_id == agent_id).cloned().collect())
        }
        async fn list_active(&self) -> Result<Vec<PriceAlert>> {
            Ok(self.alerts.lock().unwrap().iter().filter(|a| a.status == AlertStatus::Active).cloned().collect())
        }
        async fn update_status(&self, id: Uuid, status: AlertStatus) -> Result<()> {
            if let Some(alert) = self.alerts.lock().unwrap().iter_mut().find(|a| a.id == id) {
                alert.status = status;
            }
            Ok(())
        }
        async fn mark_triggered(&self, _id: Uuid, _at: DateTime<Utc>) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, id: Uuid) -> Result<()> {
            self.alerts.lock().unwrap().retain(|a| a.id != id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct InMemoryTriggers;

    #[async_trait]
    impl AlertTriggerRepository for InMemoryTriggers {
        async fn create(&self, _trigger: &AlertTrigger) -> Result<()> {
            Ok(())
        }
        async fn list_by_alert(&self, _alert_id: Uuid, _limit: i64) -> Result<Vec<AlertTrigger>> {
            Ok(Vec::new())
        }
        async fn mark_notified(&self, _id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    fn new_alert_input(agent_id: Uuid) -> NewPriceAlert {
        NewPriceAlert {
            agent_id,
            alert_type: AlertType::AnyChange,
            target_skill: Some("llm/gpt-4o".to_string()),
            target_provider: None,
            max_price: None,
            notify_method: NotifyMethod::Websocket,
            webhook_url: None,
            email: None,
        }
    }

    #[tokio::test]
    async fn other_agent_cannot_update_status() {
        let manager = AlertManager::new(Arc::new(InMemoryAlerts::default()), Arc::new(InMemoryTriggers));
        let owner = Uuid::new_v4();
        let alert = manager.create(new_alert_input(owner)).await.unwrap();

        let result = manager.update_status(alert.id, Uuid::new_v4(), AlertStatus::Paused).await;
        assert!(matches!(result, Err(OracleError::Forbidden(_))));
    }

    #[tokio::test]
    async fn deleting_unknown_alert_is_not_found() {
        let manager = AlertManager::new(Arc::new(InMemoryAlerts::default()), Arc::new(InMemoryTriggers));
        let result = manager.delete(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(OracleError::NotFound(_))));
    }
}
