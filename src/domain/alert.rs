use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{OracleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PriceDrop,
    PriceThreshold,
    AnyChange,
}

impl AlertType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "price_drop" => Some(Self::PriceDrop),
            "price_threshold" => Some(Self::PriceThreshold),
            "any_change" => Some(Self::AnyChange),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceDrop => "price_drop",
            Self::PriceThreshold => "price_threshold",
            Self::AnyChange => "any_change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMethod {
    Webhook,
    Email,
    Websocket,
}

impl NotifyMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "webhook" => Some(Self::Webhook),
            "email" => Some(Self::Email),
            "websocket" => Some(Self::Websocket),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Email => "email",
            Self::Websocket => "websocket",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Paused,
    Expired,
}

impl AlertStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Expired => "expired",
        }
    }
}

/// A user-declared rule over (skill or provider) price evolution, and the
/// action to take when it fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceAlert {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub alert_type: AlertType,
    pub target_skill: Option<String>,
    pub target_provider: Option<String>,
    pub max_price: Option<f64>,
    pub notify_method: NotifyMethod,
    pub webhook_url: Option<String>,
    pub email: Option<String>,
    pub status: AlertStatus,
    pub last_triggered: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Inputs accepted by [`PriceAlert::create`] — mirrors the shape a caller
/// (the CLI or the thin HTTP surface) would submit.
#[derive(Debug, Clone)]
pub struct NewPriceAlert {
    pub agent_id: Uuid,
    pub alert_type: AlertType,
    pub target_skill: Option<String>,
    pub target_provider: Option<String>,
    pub max_price: Option<f64>,
    pub notify_method: NotifyMethod,
    pub webhook_url: Option<String>,
    pub email: Option<String>,
}

impl PriceAlert {
    /// Enforces the conditional requirements for `max_price`,
    /// `webhook_url`/`email`, and "at least one target".
    pub fn create(input: NewPriceAlert) -> Result<Self> {
        if input.target_skill.is_none() && input.target_provider.is_none() {
            return Err(OracleError::validation(
                "alert must target a skill or a provider",
            ));
        }

        if matches!(input.alert_type, AlertType::PriceThreshold) && input.max_price.is_none() {
            return Err(OracleError::validation(
                "price_threshold alerts require max_price",
            ));
        }

        match input.notify_method {
            NotifyMethod::Webhook if input.webhook_url.is_none() => {
                return Err(OracleError::validation(
                    "webhook notify_method requires webhook_url",
                ));
            }
            NotifyMethod::Email if input.email.is_none() => {
                return Err(OracleError::validation(
                    "email notify_method requires email",
                ));
            }
            _ => {}
        }

        Ok(Self {
            id: Uuid::new_v4(),
            agent_id: input.agent_id,
            alert_type: input.alert_type,
            target_skill: input.target_skill,
            target_provider: input.target_provider,
            max_price: input.max_price,
            notify_method: input.notify_method,
            webhook_url: input.webhook_url,
            email: input.email,
            status: AlertStatus::Active,
            last_triggered: None,
            created_at: Utc::now(),
        })
    }
}

/// The persistent record that an alert's condition was met at a specific
/// moment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertTrigger {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub old_price: f64,
    pub new_price: f64,
    pub provider: Option<String>,
    pub skill: Option<String>,
    pub triggered_at: DateTime<Utc>,
    pub notified: bool,
}

impl AlertTrigger {
    pub fn new(alert_id: Uuid, old_price: f64, new_price: f64, provider: Option<String>, skill: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_id,
            old_price,
            new_price,
            provider,
            skill,
            triggered_at: Utc::now(),
            notified: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> NewPriceAlert {
        NewPriceAlert {
            agent_id: Uuid::new_v4(),
            alert_type: AlertType::PriceDrop,
            target_skill: Some("translation/spanish".to_string()),
            target_provider: None,
            max_price: None,
            notify_method: NotifyMethod::Webhook,
            webhook_url: Some("https://example.com/hook".to_string()),
            email: None,
        }
    }

    #[test]
    fn rejects_alert_without_target() {
        let mut input = base_input();
        input.target_skill = None;
        assert!(PriceAlert::create(input).is_err());
    }

    #[test]
    fn rejects_threshold_without_max_price() {
        let mut input = base_input();
        input.alert_type = AlertType::PriceThreshold;
        assert!(PriceAlert::create(input).is_err());
    }

    #[test]
    fn rejects_webhook_without_url() {
        let mut input = base_input();
        input.webhook_url = None;
        assert!(PriceAlert::create(input).is_err());
    }

    #[test]
    fn accepts_valid_alert() {
        let alert = PriceAlert::create(base_input()).unwrap();
        assert_eq!(alert.status, AlertStatus::Active);
    }
}
