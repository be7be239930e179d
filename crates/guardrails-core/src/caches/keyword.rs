use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// `tenant_id -> list_name -> lowercased keyword set`, one map per list kind.
type Snapshot = HashMap<Uuid, HashMap<String, HashSet<String>>>;

/// Blacklist/whitelist prefilter cache (§4.5), a full-snapshot cache refreshed under
/// double-checked locking, grounded on `keyword_cache.py`.
pub struct KeywordCache {
    pool: PgPool,
    ttl: chrono::Duration,
    blacklist: RwLock<Snapshot>,
    whitelist: RwLock<Snapshot>,
    last_refresh: RwLock<DateTime<Utc>>,
}

pub struct KeywordHit {
    pub list_name: String,
    pub matched_keywords: Vec<String>,
}

impl KeywordCache {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ttl: chrono::Duration::minutes(5),
            blacklist: RwLock::new(HashMap::new()),
            whitelist: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    async fn ensure_fresh(&self) -> sqlx::Result<()> {
        {
            let last = *self.last_refresh.read().await;
            if Utc::now() - last < self.ttl {
                return Ok(());
            }
        }

        let mut last = self.last_refresh.write().await;
        if Utc::now() - *last < self.ttl {
            return Ok(());
        }

        let (blacklist, whitelist) = self.load_from_db().await?;
        *self.blacklist.write().await = blacklist;
        *self.whitelist.write().await = whitelist;
        *last = Utc::now();
        Ok(())
    }

    async fn load_from_db(&self) -> sqlx::Result<(Snapshot, Snapshot)> {
        let mut blacklist: Snapshot = HashMap::new();
        let mut whitelist: Snapshot = HashMap::new();

        let blacklist_rows = sqlx::query_as::<_, (Uuid, String, Vec<String>)>(
            "SELECT tenant_id, name, keywords FROM blacklists WHERE is_active = true",
        )
        .fetch_all(&self.pool)
        .await?;
        for (tenant_id, name, keywords) in blacklist_rows {
            let set = keywords.into_iter().map(|k| k.to_lowercase()).collect();
            blacklist.entry(tenant_id).or_default().insert(name, set);
        }

        let whitelist_rows = sqlx::query_as::<_, (Uuid, String, Vec<String>)>(
            "SELECT tenant_id, name, keywords FROM whitelists WHERE is_active = true",
        )
        .fetch_all(&self.pool)
        .await?;
        for (tenant_id, name, keywords) in whitelist_rows {
            let set = keywords.into_iter().map(|k| k.to_lowercase()).collect();
            whitelist.entry(tenant_id).or_default().insert(name, set);
        }

        Ok((blacklist, whitelist))
    }

    pub async fn check_blacklist(&self, content: &str, tenant_id: Uuid) -> KeywordHitResult {
        self.check(&self.blacklist, content, tenant_id).await
    }

    pub async fn check_whitelist(&self, content: &str, tenant_id: Uuid) -> KeywordHitResult {
        self.check(&self.whitelist, content, tenant_id).await
    }

    async fn check(
        &self,
        snapshot: &RwLock<Snapshot>,
        content: &str,
        tenant_id: Uuid,
    ) -> KeywordHitResult {
        if self.ensure_fresh().await.is_err() {
            tracing::warn!("keyword cache refresh failed; serving stale snapshot");
        }

        let lowered = content.to_lowercase();
        let guard = snapshot.read().await;
        let Some(lists) = guard.get(&tenant_id) else {
            return KeywordHitResult::NoHit;
        };

        for (list_name, keywords) in lists {
            let matched: Vec<String> = keywords
                .iter()
                .filter(|kw| lowered.contains(kw.as_str()))
                .cloned()
                .collect();
            if !matched.is_empty() {
                return KeywordHitResult::Hit(KeywordHit {
                    list_name: list_name.clone(),
                    matched_keywords: matched,
                });
            }
        }
        KeywordHitResult::NoHit
    }

    /// Forces the next access to refresh (CRUD invariant in §4.5).
    pub async fn invalidate(&self) {
        *self.last_refresh.write().await = DateTime::<Utc>::MIN_UTC;
    }
}

pub enum KeywordHitResult {
    Hit(KeywordHit),
    NoHit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit_for(content: &str, keywords: &[&str]) -> bool {
        let lowered = content.to_lowercase();
        keywords.iter().any(|kw| lowered.contains(&kw.to_lowercase()))
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        assert!(hit_for("Teach Me To KILL people", &["kill people"]));
        assert!(!hit_for("a peaceful message", &["kill people"]));
    }
}
