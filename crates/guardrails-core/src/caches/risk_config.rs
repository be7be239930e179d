use chrono::{DateTime, Utc};
use guardrails_shared::RiskTypeConfig;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-tenant risk-type/sensitivity cache (§4.5), grounded on `risk_config_cache.py`.
/// Falls back to the tenant-default-open config on miss or DB error (§4.1 failure
/// semantics: "Cache load failure -> return tenant-default-open config").
pub struct RiskConfigCache {
    pool: PgPool,
    ttl: chrono::Duration,
    entries: RwLock<HashMap<Uuid, RiskTypeConfig>>,
    last_refresh: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl RiskConfigCache {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ttl: chrono::Duration::minutes(5),
            entries: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, tenant_id: Uuid) -> RiskTypeConfig {
        if self.is_fresh(tenant_id).await {
            if let Some(cfg) = self.entries.read().await.get(&tenant_id).cloned() {
                return cfg;
            }
        }

        match self.load_from_db(tenant_id).await {
            Ok(Some(cfg)) => {
                self.entries.write().await.insert(tenant_id, cfg.clone());
                self.last_refresh.write().await.insert(tenant_id, Utc::now());
                cfg
            }
            Ok(None) => RiskTypeConfig {
                tenant_id,
                ..RiskTypeConfig::default()
            },
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "risk config load failed, using default-open config");
                RiskTypeConfig {
                    tenant_id,
                    ..RiskTypeConfig::default()
                }
            }
        }
    }

    async fn is_fresh(&self, tenant_id: Uuid) -> bool {
        self.last_refresh
            .read()
            .await
            .get(&tenant_id)
            .is_some_and(|t| Utc::now() - *t < self.ttl)
    }

    async fn load_from_db(&self, tenant_id: Uuid) -> sqlx::Result<Option<RiskTypeConfig>> {
        sqlx::query_as::<_, RiskTypeConfigRow>(
            r"SELECT tenant_id, s1_enabled, s2_enabled, s3_enabled, s4_enabled, s5_enabled,
                     s6_enabled, s7_enabled, s8_enabled, s9_enabled, s10_enabled, s11_enabled,
                     s12_enabled, high_sensitivity_threshold, medium_sensitivity_threshold,
                     low_sensitivity_threshold, sensitivity_trigger_level
              FROM risk_type_configs WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map(|opt| opt.map(Into::into))
    }

    pub async fn invalidate(&self, tenant_id: Uuid) {
        self.last_refresh.write().await.remove(&tenant_id);
        self.entries.write().await.remove(&tenant_id);
    }
}

#[derive(sqlx::FromRow)]
struct RiskTypeConfigRow {
    tenant_id: Uuid,
    s1_enabled: bool,
    s2_enabled: bool,
    s3_enabled: bool,
    s4_enabled: bool,
    s5_enabled: bool,
    s6_enabled: bool,
    s7_enabled: bool,
    s8_enabled: bool,
    s9_enabled: bool,
    s10_enabled: bool,
    s11_enabled: bool,
    s12_enabled: bool,
    high_sensitivity_threshold: f64,
    medium_sensitivity_threshold: f64,
    low_sensitivity_threshold: f64,
    sensitivity_trigger_level: String,
}

impl From<RiskTypeConfigRow> for RiskTypeConfig {
    fn from(r: RiskTypeConfigRow) -> Self {
        Self {
            tenant_id: r.tenant_id,
            s1_enabled: r.s1_enabled,
            s2_enabled: r.s2_enabled,
            s3_enabled: r.s3_enabled,
            s4_enabled: r.s4_enabled,
            s5_enabled: r.s5_enabled,
            s6_enabled: r.s6_enabled,
            s7_enabled: r.s7_enabled,
            s8_enabled: r.s8_enabled,
            s9_enabled: r.s9_enabled,
            s10_enabled: r.s10_enabled,
            s11_enabled: r.s11_enabled,
            s12_enabled: r.s12_enabled,
            high_sensitivity_threshold: r.high_sensitivity_threshold,
            medium_sensitivity_threshold: r.medium_sensitivity_threshold,
            low_sensitivity_threshold: r.low_sensitivity_threshold,
            sensitivity_trigger_level: r.sensitivity_trigger_level,
        }
    }
}
