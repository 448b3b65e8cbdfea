use std::sync::Arc;
use std::time::Duration;

use handlebars::Handlebars;
use lettre::message::{header, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as MailMessage, Tokio1Executor};
use serde_json::json;
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::domain::{AlertTrigger, NotifyMethod, PriceAlert};
use crate::observability::metrics::AlertMetrics;
use crate::storage::AlertTriggerRepository;
use crate::ws::WsGateway;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);
const WEBHOOK_USER_AGENT: &str = "price-oracle-notifier/1.0";
const SOURCE_NAME: &str = "price-oracle";
const PROTOCOL_VERSION: &str = "1";

fn trigger_payload(alert: &PriceAlert, trigger: &AlertTrigger) -> serde_json::Value {
    let savings_pct = if trigger.old_price != 0.0 {
        (trigger.old_price - trigger.new_price) / trigger.old_price * 100.0
    } else {
        0.0
    };
    json!({
        "alertId": alert.id,
        "alertType": alert.alert_type.as_str(),
        "oldPrice": trigger.old_price,
        "newPrice": trigger.new_price,
        "savingsPct": savings_pct,
        "provider": trigger.provider,
        "skill": trigger.skill,
        "triggeredAt": trigger.triggered_at,
    })
}

#[async_trait::async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Dispatches a trigger to its alert's configured channel. Returns
    /// whether delivery succeeded; a `false` return is non-fatal to the
    /// evaluator pass that called it.
    async fn dispatch(&self, alert: &PriceAlert, trigger: &AlertTrigger) -> bool;
}

/// Fans a trigger out to webhook, email, or WebSocket delivery depending
/// on the owning alert's `notify_method`.
pub struct Dispatcher {
    http: reqwest::Client,
    smtp: Option<SmtpConfig>,
    templates: Handlebars<'static>,
    ws_gateway: Arc<WsGateway>,
    alert_triggers: Arc<dyn AlertTriggerRepository>,
}

impl Dispatcher {
    pub fn new(smtp: Option<SmtpConfig>, ws_gateway: Arc<WsGateway>, alert_triggers: Arc<dyn AlertTriggerRepository>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .user_agent(WEBHOOK_USER_AGENT)
            .build()
            .unwrap_or_default();

        let mut templates = Handlebars::new();
        templates
            .register_template_string("alert_email", include_str!("templates/alert_email.hbs"))
            .expect("bundled alert email template is valid handlebars");

        Self {
            http,
            smtp,
            templates,
            ws_gateway,
            alert_triggers,
        }
    }

    async fn dispatch_webhook(&self, url: &str, payload: &serde_json::Value) -> bool {
        let mut body = payload.clone();
        body["event"] = json!("price_alert");
        body["source"] = json!(SOURCE_NAME);
        body["version"] = json!(PROTOCOL_VERSION);

        if self.post_webhook(url, &body).await {
            return true;
        }

        let mut retry_body = body.clone();
        retry_body["retry"] = json!(true);
        self.post_webhook(url, &retry_body).await
    }

    async fn post_webhook(&self, url: &str, body: &serde_json::Value) -> bool {
        match self.http.post(url).json(body).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!(%err, "webhook delivery attempt failed");
                false
            }
        }
    }

    async fn dispatch_email(&self, to: &str, alert: &PriceAlert, trigger: &AlertTrigger) -> bool {
        let Some(smtp) = &self.smtp else {
            warn!("smtp not configured, email dispatch is a no-op");
            return false;
        };

        let savings_pct = if trigger.old_price != 0.0 {
            (trigger.old_price - trigger.new_price) / trigger.old_price * 100.0
        } else {
            0.0
        };
        let target = trigger.skill.clone().or_else(|| trigger.provider.clone()).unwrap_or_default();
        let data = json!({
            "alert_id": alert.id,
            "target": target,
            "old_price": trigger.old_price,
            "new_price": trigger.new_price,
            "savings_pct": format!("{savings_pct:.2}"),
            "triggered_at": trigger.triggered_at,
        });

        let body = match self.templates.render("alert_email", &data) {
            Ok(body) => body,
            Err(err) => {
                warn!(%err, "failed to render alert email template");
                return false;
            }
        };

        let from = match format!("{} <{}>", smtp.from_name, smtp.from_email).parse() {
            Ok(mailbox) => mailbox,
            Err(err) => {
                warn!(%err, "invalid smtp from address configured");
                return false;
            }
        };
        let to_mailbox = match to.parse() {
            Ok(mailbox) => mailbox,
            Err(err) => {
                warn!(%err, recipient = to, "invalid alert recipient email address");
                return false;
            }
        };

        let email = match MailMessage::builder()
            .from(from)
            .to(to_mailbox)
            .subject("Price alert triggered")
            .header(header::ContentType::TEXT_HTML)
            .singlepart(SinglePart::html(body))
        {
            Ok(email) => email,
            Err(err) => {
                warn!(%err, "failed to build alert email");
                return false;
            }
        };

        let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());
        let transport = match AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host) {
            Ok(builder) => builder.port(smtp.port).credentials(creds).build(),
            Err(err) => {
                warn!(%err, "failed to build smtp transport");
                return false;
            }
        };

        match transport.send(email).await {
            Ok(_) => true,
            Err(err) => {
                warn!(%err, "smtp delivery failed");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for Dispatcher {
    async fn dispatch(&self, alert: &PriceAlert, trigger: &AlertTrigger) -> bool {
        let payload = trigger_payload(alert, trigger);

        let delivered = match alert.notify_method {
            NotifyMethod::Webhook => match &alert.webhook_url {
                Some(url) => self.dispatch_webhook(url, &payload).await,
                None => false,
            },
            NotifyMethod::Email => match &alert.email {
                Some(email) => self.dispatch_email(email, alert, trigger).await,
                None => false,
            },
            NotifyMethod::Websocket => self.ws_gateway.broadcast_alert(&alert.agent_id.to_string(), payload).await,
        };

        AlertMetrics::record_notification(alert.notify_method.as_str(), delivered);

        if delivered {
            if let Err(err) = self.alert_triggers.mark_notified(trigger.id).await {
                warn!(%err, trigger_id = %trigger.id, "failed to mark trigger notified");
            }
        }

        info!(alert_id = %alert.id, trigger_id = %trigger.id, delivered, "notification dispatched");
        delivered
    }
}
