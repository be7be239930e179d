use chrono::{DateTime, Utc};
use guardrails_shared::ProxyModelConfig;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// `[SUPPLEMENT]` cache for `ProxyModelConfig` lookups (§4.2 step 2), hot-path on
/// every proxied request just like the other four caches in §4.5 — grounded on
/// `proxy_service.py`'s `get_user_model_config`, which is called per-request in the
/// original but not described as cacheable in spec.md's distillation.
pub struct ModelConfigCache {
    pool: PgPool,
    ttl: chrono::Duration,
    configs: RwLock<HashMap<Uuid, Vec<ProxyModelConfig>>>,
    last_refresh: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl ModelConfigCache {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ttl: chrono::Duration::minutes(5),
            configs: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(HashMap::new()),
        }
    }

    /// Exact `config_name` match if given, else the tenant's first enabled config.
    pub async fn get(&self, tenant_id: Uuid, config_name: Option<&str>) -> Option<ProxyModelConfig> {
        let configs = self.get_all(tenant_id).await;

        if let Some(name) = config_name {
            if let Some(cfg) = configs.iter().find(|c| c.config_name == name && c.enabled) {
                return Some(cfg.clone());
            }
        }
        configs.iter().find(|c| c.enabled).cloned()
    }

    pub async fn get_all(&self, tenant_id: Uuid) -> Vec<ProxyModelConfig> {
        let fresh = self
            .last_refresh
            .read()
            .await
            .get(&tenant_id)
            .is_some_and(|t| Utc::now() - *t < self.ttl);

        if fresh {
            if let Some(cfgs) = self.configs.read().await.get(&tenant_id) {
                return cfgs.clone();
            }
        }

        match self.load_from_db(tenant_id).await {
            Ok(cfgs) => {
                self.configs.write().await.insert(tenant_id, cfgs.clone());
                self.last_refresh.write().await.insert(tenant_id, Utc::now());
                cfgs
            }
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "model config load failed");
                Vec::new()
            }
        }
    }

    async fn load_from_db(&self, tenant_id: Uuid) -> sqlx::Result<Vec<ProxyModelConfig>> {
        sqlx::query_as::<_, ProxyModelConfig>(
            r"SELECT id, tenant_id, config_name, api_base_url, api_key_encrypted, model_name,
                     enabled, block_on_input_risk, block_on_output_risk, enable_reasoning_detection,
                     stream_chunk_size
              FROM proxy_model_configs WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn invalidate(&self, tenant_id: Uuid) {
        self.last_refresh.write().await.remove(&tenant_id);
        self.configs.write().await.remove(&tenant_id);
    }
}
