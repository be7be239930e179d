use chrono::{DateTime, Utc};
use guardrails_shared::{category_code_from_display_name, category_risk_level};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

const GLOBAL_KEY: &str = "__global__";
const DEFAULT_ANSWER: &str = "很抱歉，我不能回答这个问题。如有疑问请联系客服。";

/// `tenant_key -> category -> is_default -> content`; `tenant_key` is either the
/// tenant id's string form or `__global__` for tenant_id = NULL rows.
type Snapshot = HashMap<String, HashMap<String, HashMap<bool, String>>>;

/// Response-template resolver cache (§4.5/§4.1 step 7), grounded on `template_cache.py`.
pub struct TemplateCache {
    pool: PgPool,
    ttl: chrono::Duration,
    snapshot: RwLock<Snapshot>,
    last_refresh: RwLock<DateTime<Utc>>,
}

impl TemplateCache {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ttl: chrono::Duration::minutes(10),
            snapshot: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    async fn ensure_fresh(&self) {
        {
            let last = *self.last_refresh.read().await;
            if Utc::now() - last < self.ttl {
                return;
            }
        }
        let mut last = self.last_refresh.write().await;
        if Utc::now() - *last < self.ttl {
            return;
        }
        match self.load_from_db().await {
            Ok(snap) => {
                *self.snapshot.write().await = snap;
                *last = Utc::now();
            }
            Err(e) => tracing::warn!(error = %e, "template cache refresh failed"),
        }
    }

    async fn load_from_db(&self) -> sqlx::Result<Snapshot> {
        let rows = sqlx::query_as::<_, (Option<Uuid>, String, bool, String)>(
            "SELECT tenant_id, category, is_default, template_content FROM response_templates WHERE is_active = true",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot: Snapshot = HashMap::new();
        for (tenant_id, category, is_default, content) in rows {
            let key = tenant_id.map(|t| t.to_string()).unwrap_or_else(|| GLOBAL_KEY.to_string());
            snapshot
                .entry(key)
                .or_default()
                .entry(category)
                .or_default()
                .insert(is_default, content);
        }
        Ok(snapshot)
    }

    /// Resolve a substitute answer for the triggered `categories` (display names),
    /// trying the tenant's specific template, then the tenant's default template,
    /// then the global default template, per category in descending risk priority;
    /// finally falls through to the tenant/global "default" category and the
    /// hard-coded refusal.
    pub async fn get_suggest_answer(&self, categories: &[String], tenant_id: Option<Uuid>) -> String {
        self.ensure_fresh().await;
        let snapshot = self.snapshot.read().await;
        let tenant_key = tenant_id.map(|t| t.to_string());

        let mut codes: Vec<&str> = categories
            .iter()
            .filter_map(|name| category_code_from_display_name(name))
            .collect();
        codes.sort_by_key(|c| std::cmp::Reverse(category_risk_level(c)));

        for code in codes {
            if let Some(answer) = self.lookup(&snapshot, tenant_key.as_deref(), code) {
                return answer;
            }
        }

        self.default_answer(&snapshot, tenant_key.as_deref())
    }

    fn lookup(&self, snapshot: &Snapshot, tenant_key: Option<&str>, category: &str) -> Option<String> {
        if let Some(key) = tenant_key {
            if let Some(by_default) = snapshot.get(key).and_then(|c| c.get(category)) {
                if let Some(content) = by_default.get(&false) {
                    return Some(content.clone());
                }
                if let Some(content) = by_default.get(&true) {
                    return Some(content.clone());
                }
            }
        }
        snapshot
            .get(GLOBAL_KEY)
            .and_then(|c| c.get(category))
            .and_then(|by_default| by_default.get(&true))
            .cloned()
    }

    fn default_answer(&self, snapshot: &Snapshot, tenant_key: Option<&str>) -> String {
        if let Some(key) = tenant_key {
            if let Some(content) = snapshot
                .get(key)
                .and_then(|c| c.get("default"))
                .and_then(|by_default| by_default.get(&true).or_else(|| by_default.get(&false)))
            {
                return content.clone();
            }
        }
        if let Some(content) = snapshot
            .get(GLOBAL_KEY)
            .and_then(|c| c.get("default"))
            .and_then(|by_default| by_default.get(&true))
        {
            return content.clone();
        }
        DEFAULT_ANSWER.to_string()
    }

    pub async fn invalidate(&self) {
        *self.last_refresh.write().await = DateTime::<Utc>::MIN_UTC;
    }
}
