use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Sqlite};
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    AgentService, AgentServiceHistory, AlertStatus, AlertTrigger, AlertType, Budget,
    NotifyMethod, OracleError, PriceAlert, PriceForecast, Provider, Rate, RateHistory,
    RequestLog, Result, Service,
};

use super::models::{
    AgentRow, AgentServiceHistoryRow, AgentServiceRow, AlertTriggerRow, BudgetRow,
    CategoryPairRow, DailyAvgRow, JoinedRateRow, PriceAlertRow, PriceForecastRow, ProviderRow,
    RateHistoryRow, RateRow, RequestLogRow, ServiceRow,
};

/// A current Rate joined to its owning Service and Provider — the shape
/// the aggregator reads, since rates alone don't carry category/provider.
#[derive(Debug, Clone)]
pub struct JoinedRateObservation {
    pub service_id: Uuid,
    pub provider_name: String,
    pub category: String,
    pub subcategory: String,
    pub price: f64,
    pub currency: String,
    pub unit: String,
    pub created_at: DateTime<Utc>,
}

fn joined_rate_from_row(row: JoinedRateRow) -> Result<JoinedRateObservation> {
    Ok(JoinedRateObservation {
        service_id: parse_uuid(&row.service_id)?,
        provider_name: row.provider_name,
        category: row.category,
        subcategory: row.subcategory,
        price: row.price,
        currency: row.currency,
        unit: row.unit,
        created_at: parse_dt(&row.created_at)?,
    })
}

fn parse_dt(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OracleError::internal(format!("corrupt timestamp in storage: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::from_str(raw).map_err(|e| OracleError::internal(format!("corrupt id in storage: {e}")))
}

fn provider_from_row(row: ProviderRow) -> Result<Provider> {
    Ok(Provider {
        id: parse_uuid(&row.id)?,
        name: row.name,
        url: row.url,
        provider_type: row.provider_type,
        created_at: parse_dt(&row.created_at)?,
        updated_at: parse_dt(&row.updated_at)?,
    })
}

fn service_from_row(row: ServiceRow) -> Result<Service> {
    Ok(Service {
        id: parse_uuid(&row.id)?,
        provider_id: parse_uuid(&row.provider_id)?,
        category: row.category,
        subcategory: row.subcategory,
        description: row.description,
    })
}

fn rate_from_row(row: RateRow) -> Result<Rate> {
    Ok(Rate {
        id: parse_uuid(&row.id)?,
        service_id: parse_uuid(&row.service_id)?,
        price: row.price,
        currency: row.currency,
        unit: row.unit,
        pricing_type: row.pricing_type,
        confidence: row.confidence,
        source_count: row.source_count as u32,
        created_at: parse_dt(&row.created_at)?,
    })
}

fn rate_history_from_row(row: RateHistoryRow) -> Result<RateHistory> {
    Ok(RateHistory {
        id: parse_uuid(&row.id)?,
        service_id: parse_uuid(&row.service_id)?,
        price: row.price,
        currency: row.currency,
        unit: row.unit,
        recorded_at: parse_dt(&row.recorded_at)?,
    })
}

fn agent_service_from_row(row: AgentServiceRow) -> Result<AgentService> {
    Ok(AgentService {
        agent_id: row.agent_id,
        agent_name: row.agent_name,
        skill: row.skill,
        price: row.price,
        unit: row.unit,
        currency: row.currency,
        uptime: row.uptime,
        avg_latency_ms: row.avg_latency_ms,
        rating: row.rating,
        reviews_count: row.reviews_count as u32,
        x402_endpoint: row.x402_endpoint,
        bazaar_url: row.bazaar_url,
        metadata: row.metadata,
        last_updated: parse_dt(&row.last_updated)?,
        created_at: parse_dt(&row.created_at)?,
    })
}

fn agent_service_history_from_row(row: AgentServiceHistoryRow) -> Result<AgentServiceHistory> {
    Ok(AgentServiceHistory {
        id: parse_uuid(&row.id)?,
        agent_id: row.agent_id,
        price: row.price,
        uptime: row.uptime,
        avg_latency_ms: row.avg_latency_ms,
        recorded_at: parse_dt(&row.recorded_at)?,
    })
}

fn budget_from_row(row: BudgetRow) -> Result<Budget> {
    Ok(Budget {
        id: parse_uuid(&row.id)?,
        agent_id: parse_uuid(&row.agent_id)?,
        monthly_limit: row.monthly_limit,
        spent: row.spent,
        period: row.period,
    })
}

fn request_log_from_row(row: RequestLogRow) -> Result<RequestLog> {
    Ok(RequestLog {
        id: parse_uuid(&row.id)?,
        agent_id: parse_uuid(&row.agent_id)?,
        provider: row.provider,
        category: row.category,
        cost: row.cost,
        latency_ms: row.latency_ms as u64,
        tokens_in: row.tokens_in as u64,
        tokens_out: row.tokens_out as u64,
        status: row.status,
        created_at: parse_dt(&row.created_at)?,
    })
}

fn price_alert_from_row(row: PriceAlertRow) -> Result<PriceAlert> {
    Ok(PriceAlert {
        id: parse_uuid(&row.id)?,
        agent_id: parse_uuid(&row.agent_id)?,
        alert_type: AlertType::parse(&row.alert_type)
            .ok_or_else(|| OracleError::internal("corrupt alert_type in storage"))?,
        target_skill: row.target_skill,
        target_provider: row.target_provider,
        max_price: row.max_price,
        notify_method: NotifyMethod::parse(&row.notify_method)
            .ok_or_else(|| OracleError::internal("corrupt notify_method in storage"))?,
        webhook_url: row.webhook_url,
        email: row.email,
        status: AlertStatus::parse(&row.status)
            .ok_or_else(|| OracleError::internal("corrupt alert status in storage"))?,
        last_triggered: row.last_triggered.as_deref().map(parse_dt).transpose()?,
        created_at: parse_dt(&row.created_at)?,
    })
}

fn alert_trigger_from_row(row: AlertTriggerRow) -> Result<AlertTrigger> {
    Ok(AlertTrigger {
        id: parse_uuid(&row.id)?,
        alert_id: parse_uuid(&row.alert_id)?,
        old_price: row.old_price,
        new_price: row.new_price,
        provider: row.provider,
        skill: row.skill,
        triggered_at: parse_dt(&row.triggered_at)?,
        notified: row.notified != 0,
    })
}

fn forecast_from_row(row: PriceForecastRow) -> Result<PriceForecast> {
    Ok(PriceForecast {
        id: parse_uuid(&row.id)?,
        skill: row.skill,
        forecast_date: NaiveDate::parse_from_str(&row.forecast_date, "%Y-%m-%d")
            .map_err(|e| OracleError::internal(format!("corrupt forecast_date in storage: {e}")))?,
        predicted_price: row.predicted_price,
        confidence: row.confidence,
        model_version: row.model_version,
        features_used: row.features_used,
        generated_at: parse_dt(&row.generated_at)?,
    })
}

#[async_trait::async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn upsert(&self, provider: &Provider) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Provider>>;
    async fn get_by_name(&self, name: &str) -> Result<Option<Provider>>;
    async fn list_all(&self) -> Result<Vec<Provider>>;
}

#[async_trait::async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn upsert(&self, service: &Service) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Service>>;
    async fn find(&self, provider_id: Uuid, category: &str, subcategory: &str) -> Result<Option<Service>>;
    async fn list_by_provider(&self, provider_id: Uuid) -> Result<Vec<Service>>;
}

#[async_trait::async_trait]
pub trait RateRepository: Send + Sync {
    async fn upsert_current(&self, rate: &Rate) -> Result<()>;
    async fn get_current(&self, service_id: Uuid) -> Result<Option<Rate>>;
    async fn list_current_all(&self) -> Result<Vec<Rate>>;
    async fn record_history(&self, entry: &RateHistory) -> Result<()>;
    async fn list_history(&self, service_id: Uuid, since: DateTime<Utc>) -> Result<Vec<RateHistory>>;
    async fn latest_history_before(&self, service_id: Uuid, before: DateTime<Utc>) -> Result<Option<RateHistory>>;
    async fn list_joined_by_category(
        &self,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<Vec<JoinedRateObservation>>;
    async fn list_distinct_category_pairs(&self) -> Result<Vec<(String, String)>>;
    /// Daily average price over `rate_history` joined to `services` by
    /// (category, subcategory) or just category, since `since`. Ordered by
    /// day ascending.
    async fn daily_avg_by_category(
        &self,
        category: &str,
        subcategory: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<(NaiveDate, f64)>>;
}

/// Writes the provider/service/rate/history rows of a single crawl
/// observation as one transaction, so a mid-batch failure can never leave
/// a service without a rate or a current rate without a matching history
/// row.
#[async_trait::async_trait]
pub trait RateIngestRepository: Send + Sync {
    async fn ingest_observation(
        &self,
        provider: &Provider,
        service: &Service,
        rate: &Rate,
        history: &RateHistory,
    ) -> Result<()>;
}

#[async_trait::async_trait]
pub trait AgentServiceRepository: Send + Sync {
    async fn upsert(&self, service: &AgentService) -> Result<()>;
    async fn get(&self, agent_id: &str, skill: &str) -> Result<Option<AgentService>>;
    async fn list_by_skill(&self, skill: &str) -> Result<Vec<AgentService>>;
    async fn list_by_agent(&self, agent_id: &str) -> Result<Vec<AgentService>>;
    async fn list_all(&self) -> Result<Vec<AgentService>>;
    async fn record_history(&self, entry: &AgentServiceHistory) -> Result<()>;
    async fn list_history(&self, agent_id: &str, since: DateTime<Utc>) -> Result<Vec<AgentServiceHistory>>;
}

#[async_trait::async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create(&self, agent: &crate::domain::Agent) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<crate::domain::Agent>>;
    async fn get_by_api_key(&self, api_key: &str) -> Result<Option<crate::domain::Agent>>;
    async fn list_all(&self) -> Result<Vec<crate::domain::Agent>>;
}

#[async_trait::async_trait]
pub trait BudgetRepository: Send + Sync {
    async fn upsert(&self, budget: &Budget) -> Result<()>;
    async fn get_current(&self, agent_id: Uuid, period: &str) -> Result<Option<Budget>>;
}

#[async_trait::async_trait]
pub trait RequestLogRepository: Send + Sync {
    async fn create(&self, log: &RequestLog) -> Result<()>;
    async fn list_by_agent(&self, agent_id: Uuid, limit: i64) -> Result<Vec<RequestLog>>;
}

#[async_trait::async_trait]
pub trait AlertRepository: Send + Sync {
    async fn create(&self, alert: &PriceAlert) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<PriceAlert>>;
    async fn list_by_agent(&self, agent_id: Uuid) -> Result<Vec<PriceAlert>>;
    async fn list_active(&self) -> Result<Vec<PriceAlert>>;
    async fn update_status(&self, id: Uuid, status: AlertStatus) -> Result<()>;
    async fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait::async_trait]
pub trait AlertTriggerRepository: Send + Sync {
    async fn create(&self, trigger: &AlertTrigger) -> Result<()>;
    async fn list_by_alert(&self, alert_id: Uuid, limit: i64) -> Result<Vec<AlertTrigger>>;
    async fn mark_notified(&self, id: Uuid) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ForecastRepository: Send + Sync {
    async fn upsert(&self, forecast: &PriceForecast) -> Result<()>;
    async fn list_by_skill(&self, skill: &str) -> Result<Vec<PriceForecast>>;
    async fn delete_stale(&self, skill: &str, before: NaiveDate) -> Result<u64>;
    async fn delete_generated_before(&self, skill: &str, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone)]
pub struct SqliteProviderRepository {
    pool: Pool<Sqlite>,
}

impl SqliteProviderRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProviderRepository for SqliteProviderRepository {
    async fn upsert(&self, provider: &Provider) -> Result<()> {
        info!(provider_id = %provider.id, "upserting provider");
        sqlx::query(
            r#"
            INSERT INTO providers (id, name, url, provider_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                provider_type = excluded.provider_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(provider.id.to_string())
        .bind(&provider.name)
        .bind(&provider.url)
        .bind(&provider.provider_type)
        .bind(provider.created_at.to_rfc3339())
        .bind(provider.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Provider>> {
        let row = sqlx::query_as::<_, ProviderRow>("SELECT * FROM providers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(provider_from_row).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Provider>> {
        let row = sqlx::query_as::<_, ProviderRow>("SELECT * FROM providers WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(provider_from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Provider>> {
        let rows = sqlx::query_as::<_, ProviderRow>("SELECT * FROM providers ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(provider_from_row).collect()
    }
}

#[derive(Clone)]
pub struct SqliteServiceRepository {
    pool: Pool<Sqlite>,
}

impl SqliteServiceRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ServiceRepository for SqliteServiceRepository {
    async fn upsert(&self, service: &Service) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO services (id, provider_id, category, subcategory, description)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(provider_id, category, subcategory) DO UPDATE SET
                description = excluded.description
            "#,
        )
        .bind(service.id.to_string())
        .bind(service.provider_id.to_string())
        .bind(&service.category)
        .bind(&service.subcategory)
        .bind(&service.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(service_from_row).transpose()
    }

    async fn find(&self, provider_id: Uuid, category: &str, subcategory: &str) -> Result<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            "SELECT * FROM services WHERE provider_id = ? AND category = ? AND subcategory = ?",
        )
        .bind(provider_id.to_string())
        .bind(category)
        .bind(subcategory)
        .fetch_optional(&self.pool)
        .await?;
        row.map(service_from_row).transpose()
    }

    async fn list_by_provider(&self, provider_id: Uuid) -> Result<Vec<Service>> {
        let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE provider_id = ?")
            .bind(provider_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(service_from_row).collect()
    }
}

#[derive(Clone)]
pub struct SqliteRateRepository {
    pool: Pool<Sqlite>,
}

impl SqliteRateRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RateRepository for SqliteRateRepository {
    async fn upsert_current(&self, rate: &Rate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rates (id, service_id, price, currency, unit, pricing_type, confidence, source_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(service_id) DO UPDATE SET
                id = excluded.id,
                price = excluded.price,
                currency = excluded.currency,
                unit = excluded.unit,
                pricing_type = excluded.pricing_type,
                confidence = excluded.confidence,
                source_count = excluded.source_count,
                created_at = excluded.created_at
            "#,
        )
        .bind(rate.id.to_string())
        .bind(rate.service_id.to_string())
        .bind(rate.price)
        .bind(&rate.currency)
        .bind(&rate.unit)
        .bind(&rate.pricing_type)
        .bind(rate.confidence)
        .bind(rate.source_count as i64)
        .bind(rate.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_current(&self, service_id: Uuid) -> Result<Option<Rate>> {
        let row = sqlx::query_as::<_, RateRow>("SELECT * FROM rates WHERE service_id = ?")
            .bind(service_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(rate_from_row).transpose()
    }

    async fn list_current_all(&self) -> Result<Vec<Rate>> {
        let rows = sqlx::query_as::<_, RateRow>("SELECT * FROM rates")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(rate_from_row).collect()
    }

    async fn record_history(&self, entry: &RateHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_history (id, service_id, price, currency, unit, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.service_id.to_string())
        .bind(entry.price)
        .bind(&entry.currency)
        .bind(&entry.unit)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_history(&self, service_id: Uuid, since: DateTime<Utc>) -> Result<Vec<RateHistory>> {
        let rows = sqlx::query_as::<_, RateHistoryRow>(
            "SELECT * FROM rate_history WHERE service_id = ? AND recorded_at >= ? ORDER BY recorded_at ASC",
        )
        .bind(service_id.to_string())
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(rate_history_from_row).collect()
    }

    async fn latest_history_before(&self, service_id: Uuid, before: DateTime<Utc>) -> Result<Option<RateHistory>> {
        let row = sqlx::query_as::<_, RateHistoryRow>(
            "SELECT * FROM rate_history WHERE service_id = ? AND recorded_at < ? ORDER BY recorded_at DESC LIMIT 1",
        )
        .bind(service_id.to_string())
        .bind(before.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;
        row.map(rate_history_from_row).transpose()
    }

    async fn list_joined_by_category(
        &self,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<Vec<JoinedRateObservation>> {
        let rows = match subcategory {
            Some(sub) => {
                sqlx::query_as::<_, JoinedRateRow>(
                    r#"
                    SELECT r.service_id AS service_id, p.name AS provider_name, s.category AS category,
                           s.subcategory AS subcategory, r.price AS price, r.currency AS currency,
                           r.unit AS unit, r.created_at AS created_at
                    FROM rates r
                    JOIN services s ON r.service_id = s.id
                    JOIN providers p ON s.provider_id = p.id
                    WHERE s.category = ? AND s.subcategory = ?
                    "#,
                )
                .bind(category)
                .bind(sub)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, JoinedRateRow>(
                    r#"
                    SELECT r.service_id AS service_id, p.name AS provider_name, s.category AS category,
                           s.subcategory AS subcategory, r.price AS price, r.currency AS currency,
                           r.unit AS unit, r.created_at AS created_at
                    FROM rates r
                    JOIN services s ON r.service_id = s.id
                    JOIN providers p ON s.provider_id = p.id
                    WHERE s.category = ?
                    "#,
                )
                .bind(category)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(joined_rate_from_row).collect()
    }

    async fn list_distinct_category_pairs(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query_as::<_, CategoryPairRow>(
            "SELECT DISTINCT category, subcategory FROM services ORDER BY category, subcategory",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.category, r.subcategory)).collect())
    }

    async fn daily_avg_by_category(
        &self,
        category: &str,
        subcategory: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<(NaiveDate, f64)>> {
        let rows = match subcategory {
            Some(sub) => {
                sqlx::query_as::<_, DailyAvgRow>(
                    r#"
                    SELECT date(rh.recorded_at) AS day, AVG(rh.price) AS avg_price
                    FROM rate_history rh
                    JOIN services s ON rh.service_id = s.id
                    WHERE s.category = ? AND s.subcategory = ? AND rh.recorded_at >= ?
                    GROUP BY day
                    ORDER BY day ASC
                    "#,
                )
                .bind(category)
                .bind(sub)
                .bind(since.to_rfc3339())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DailyAvgRow>(
                    r#"
                    SELECT date(rh.recorded_at) AS day, AVG(rh.price) AS avg_price
                    FROM rate_history rh
                    JOIN services s ON rh.service_id = s.id
                    WHERE s.category = ? AND rh.recorded_at >= ?
                    GROUP BY day
                    ORDER BY day ASC
                    "#,
                )
                .bind(category)
                .bind(since.to_rfc3339())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|r| {
                NaiveDate::parse_from_str(&r.day, "%Y-%m-%d")
                    .map(|day| (day, r.avg_price))
                    .map_err(|e| OracleError::internal(format!("corrupt day in storage: {e}")))
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct SqliteRateIngestRepository {
    pool: Pool<Sqlite>,
}

impl SqliteRateIngestRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RateIngestRepository for SqliteRateIngestRepository {
    async fn ingest_observation(
        &self,
        provider: &Provider,
        service: &Service,
        rate: &Rate,
        history: &RateHistory,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO providers (id, name, url, provider_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                provider_type = excluded.provider_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(provider.id.to_string())
        .bind(&provider.name)
        .bind(&provider.url)
        .bind(&provider.provider_type)
        .bind(provider.created_at.to_rfc3339())
        .bind(provider.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO services (id, provider_id, category, subcategory, description)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(provider_id, category, subcategory) DO UPDATE SET
                description = excluded.description
            "#,
        )
        .bind(service.id.to_string())
        .bind(service.provider_id.to_string())
        .bind(&service.category)
        .bind(&service.subcategory)
        .bind(&service.description)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO rates (id, service_id, price, currency, unit, pricing_type, confidence, source_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(service_id) DO UPDATE SET
                id = excluded.id,
                price = excluded.price,
                currency = excluded.currency,
                unit = excluded.unit,
                pricing_type = excluded.pricing_type,
                confidence = excluded.confidence,
                source_count = excluded.source_count,
                created_at = excluded.created_at
            "#,
        )
        .bind(rate.id.to_string())
        .bind(rate.service_id.to_string())
        .bind(rate.price)
        .bind(&rate.currency)
        .bind(&rate.unit)
        .bind(&rate.pricing_type)
        .bind(rate.confidence)
        .bind(rate.source_count as i64)
        .bind(rate.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO rate_history (id, service_id, price, currency, unit, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(history.id.to_string())
        .bind(history.service_id.to_string())
        .bind(history.price)
        .bind(&history.currency)
        .bind(&history.unit)
        .bind(history.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteAgentServiceRepository {
    pool: Pool<Sqlite>,
}

impl SqliteAgentServiceRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AgentServiceRepository for SqliteAgentServiceRepository {
    async fn upsert(&self, service: &AgentService) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_services (
                agent_id, agent_name, skill, price, unit, currency, uptime, avg_latency_ms,
                rating, reviews_count, x402_endpoint, bazaar_url, metadata, last_updated, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_id, skill) DO UPDATE SET
                agent_name = excluded.agent_name,
                price = excluded.price,
                unit = excluded.unit,
                currency = excluded.currency,
                uptime = excluded.uptime,
                avg_latency_ms = excluded.avg_latency_ms,
                rating = excluded.rating,
                reviews_count = excluded.reviews_count,
                x402_endpoint = excluded.x402_endpoint,
                bazaar_url = excluded.bazaar_url,
                metadata = excluded.metadata,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&service.agent_id)
        .bind(&service.agent_name)
        .bind(&service.skill)
        .bind(service.price)
        .bind(&service.unit)
        .bind(&service.currency)
        .bind(service.uptime)
        .bind(service.avg_latency_ms)
        .bind(service.rating)
        .bind(service.reviews_count as i64)
        .bind(&service.x402_endpoint)
        .bind(&service.bazaar_url)
        .bind(&service.metadata)
        .bind(service.last_updated.to_rfc3339())
        .bind(service.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, agent_id: &str, skill: &str) -> Result<Option<AgentService>> {
        let row = sqlx::query_as::<_, AgentServiceRow>(
            "SELECT * FROM agent_services WHERE agent_id = ? AND skill = ?",
        )
        .bind(agent_id)
        .bind(skill)
        .fetch_optional(&self.pool)
        .await?;
        row.map(agent_service_from_row).transpose()
    }

    async fn list_by_skill(&self, skill: &str) -> Result<Vec<AgentService>> {
        let rows = sqlx::query_as::<_, AgentServiceRow>(
            "SELECT * FROM agent_services WHERE skill = ? ORDER BY price ASC",
        )
        .bind(skill)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(agent_service_from_row).collect()
    }

    async fn list_by_agent(&self, agent_id: &str) -> Result<Vec<AgentService>> {
        let rows = sqlx::query_as::<_, AgentServiceRow>(
            "SELECT * FROM agent_services WHERE agent_id = ? ORDER BY skill ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(agent_service_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<AgentService>> {
        let rows = sqlx::query_as::<_, AgentServiceRow>("SELECT * FROM agent_services")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(agent_service_from_row).collect()
    }

    async fn record_history(&self, entry: &AgentServiceHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_service_history (id, agent_id, price, uptime, avg_latency_ms, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.agent_id)
        .bind(entry.price)
        .bind(entry.uptime)
        .bind(entry.avg_latency_ms)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_history(&self, agent_id: &str, since: DateTime<Utc>) -> Result<Vec<AgentServiceHistory>> {
        let rows = sqlx::query_as::<_, AgentServiceHistoryRow>(
            "SELECT * FROM agent_service_history WHERE agent_id = ? AND recorded_at >= ? ORDER BY recorded_at ASC",
        )
        .bind(agent_id)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(agent_service_history_from_row).collect()
    }
}

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: Pool<Sqlite>,
}

impl SqliteAgentRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn create(&self, agent: &crate::domain::Agent) -> Result<()> {
        sqlx::query("INSERT INTO agents (id, name, api_key, created_at) VALUES (?, ?, ?, ?)")
            .bind(agent.id.to_string())
            .bind(&agent.name)
            .bind(&agent.api_key)
            .bind(agent.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<crate::domain::Agent>> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| -> Result<crate::domain::Agent> {
            Ok(crate::domain::Agent {
                id: parse_uuid(&r.id)?,
                name: r.name,
                api_key: r.api_key,
                created_at: parse_dt(&r.created_at)?,
            })
        })
        .transpose()
    }

    async fn get_by_api_key(&self, api_key: &str) -> Result<Option<crate::domain::Agent>> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE api_key = ?")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| -> Result<crate::domain::Agent> {
            Ok(crate::domain::Agent {
                id: parse_uuid(&r.id)?,
                name: r.name,
                api_key: r.api_key,
                created_at: parse_dt(&r.created_at)?,
            })
        })
        .transpose()
    }

    async fn list_all(&self) -> Result<Vec<crate::domain::Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(crate::domain::Agent {
                    id: parse_uuid(&r.id)?,
                    name: r.name,
                    api_key: r.api_key,
                    created_at: parse_dt(&r.created_at)?,
                })
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct SqliteBudgetRepository {
    pool: Pool<Sqlite>,
}

impl SqliteBudgetRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BudgetRepository for SqliteBudgetRepository {
    async fn upsert(&self, budget: &Budget) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO budgets (id, agent_id, monthly_limit, spent, period)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(agent_id, period) DO UPDATE SET
                monthly_limit = excluded.monthly_limit,
                spent = excluded.spent
            "#,
        )
        .bind(budget.id.to_string())
        .bind(budget.agent_id.to_string())
        .bind(budget.monthly_limit)
        .bind(budget.spent)
        .bind(&budget.period)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_current(&self, agent_id: Uuid, period: &str) -> Result<Option<Budget>> {
        let row = sqlx::query_as::<_, BudgetRow>(
            "SELECT * FROM budgets WHERE agent_id = ? AND period = ?",
        )
        .bind(agent_id.to_string())
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;
        row.map(budget_from_row).transpose()
    }
}

#[derive(Clone)]
pub struct SqliteRequestLogRepository {
    pool: Pool<Sqlite>,
}

impl SqliteRequestLogRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RequestLogRepository for SqliteRequestLogRepository {
    async fn create(&self, log: &RequestLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO request_log (id, agent_id, provider, category, cost, latency_ms, tokens_in, tokens_out, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.agent_id.to_string())
        .bind(&log.provider)
        .bind(&log.category)
        .bind(log.cost)
        .bind(log.latency_ms as i64)
        .bind(log.tokens_in as i64)
        .bind(log.tokens_out as i64)
        .bind(&log.status)
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_agent(&self, agent_id: Uuid, limit: i64) -> Result<Vec<RequestLog>> {
        let rows = sqlx::query_as::<_, RequestLogRow>(
            "SELECT * FROM request_log WHERE agent_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(agent_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(request_log_from_row).collect()
    }
}

#[derive(Clone)]
pub struct SqliteAlertRepository {
    pool: Pool<Sqlite>,
}

impl SqliteAlertRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AlertRepository for SqliteAlertRepository {
    async fn create(&self, alert: &PriceAlert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_alerts (
                id, agent_id, alert_type, target_skill, target_provider, max_price,
                notify_method, webhook_url, email, status, last_triggered, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.id.to_string())
        .bind(alert.agent_id.to_string())
        .bind(alert.alert_type.as_str())
        .bind(&alert.target_skill)
        .bind(&alert.target_provider)
        .bind(alert.max_price)
        .bind(alert.notify_method.as_str())
        .bind(&alert.webhook_url)
        .bind(&alert.email)
        .bind(alert.status.as_str())
        .bind(alert.last_triggered.map(|t| t.to_rfc3339()))
        .bind(alert.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<PriceAlert>> {
        let row = sqlx::query_as::<_, PriceAlertRow>("SELECT * FROM price_alerts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(price_alert_from_row).transpose()
    }

    async fn list_by_agent(&self, agent_id: Uuid) -> Result<Vec<PriceAlert>> {
        let rows = sqlx::query_as::<_, PriceAlertRow>(
            "SELECT * FROM price_alerts WHERE agent_id = ? ORDER BY created_at DESC",
        )
        .bind(agent_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(price_alert_from_row).collect()
    }

    async fn list_active(&self) -> Result<Vec<PriceAlert>> {
        let rows = sqlx::query_as::<_, PriceAlertRow>(
            "SELECT * FROM price_alerts WHERE status = 'active' ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(price_alert_from_row).collect()
    }

    async fn update_status(&self, id: Uuid, status: AlertStatus) -> Result<()> {
        sqlx::query("UPDATE price_alerts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE price_alerts SET last_triggered = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM price_alerts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteAlertTriggerRepository {
    pool: Pool<Sqlite>,
}

impl SqliteAlertTriggerRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AlertTriggerRepository for SqliteAlertTriggerRepository {
    async fn create(&self, trigger: &AlertTrigger) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_triggers (id, alert_id, old_price, new_price, provider, skill, triggered_at, notified)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trigger.id.to_string())
        .bind(trigger.alert_id.to_string())
        .bind(trigger.old_price)
        .bind(trigger.new_price)
        .bind(&trigger.provider)
        .bind(&trigger.skill)
        .bind(trigger.triggered_at.to_rfc3339())
        .bind(trigger.notified as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_alert(&self, alert_id: Uuid, limit: i64) -> Result<Vec<AlertTrigger>> {
        let rows = sqlx::query_as::<_, AlertTriggerRow>(
            "SELECT * FROM alert_triggers WHERE alert_id = ? ORDER BY triggered_at DESC LIMIT ?",
        )
        .bind(alert_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(alert_trigger_from_row).collect()
    }

    async fn mark_notified(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE alert_triggers SET notified = 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteForecastRepository {
    pool: Pool<Sqlite>,
}

impl SqliteForecastRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ForecastRepository for SqliteForecastRepository {
    async fn upsert(&self, forecast: &PriceForecast) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_forecasts (id, skill, forecast_date, predicted_price, confidence, model_version, features_used, generated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(skill, forecast_date) DO UPDATE SET
                predicted_price = excluded.predicted_price,
                confidence = excluded.confidence,
                model_version = excluded.model_version,
                features_used = excluded.features_used,
                generated_at = excluded.generated_at
            "#,
        )
        .bind(forecast.id.to_string())
        .bind(&forecast.skill)
        .bind(forecast.forecast_date.format("%Y-%m-%d").to_string())
        .bind(forecast.predicted_price)
        .bind(forecast.confidence)
        .bind(&forecast.model_version)
        .bind(&forecast.features_used)
        .bind(forecast.generated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_skill(&self, skill: &str) -> Result<Vec<PriceForecast>> {
        let rows = sqlx::query_as::<_, PriceForecastRow>(
            "SELECT * FROM price_forecasts WHERE skill = ? ORDER BY forecast_date ASC",
        )
        .bind(skill)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(forecast_from_row).collect()
    }

    async fn delete_stale(&self, skill: &str, before: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM price_forecasts WHERE skill = ? AND forecast_date < ?")
            .bind(skill)
            .bind(before.format("%Y-%m-%d").to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_generated_before(&self, skill: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM price_forecasts WHERE skill = ? AND generated_at < ?")
            .bind(skill)
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
