use chrono::{DateTime, Utc};
use guardrails_shared::{BanPolicy, RiskLevel, Result};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ActiveBan {
    pub ban_until: DateTime<Utc>,
    pub reason: String,
}

/// Risk-trigger accumulation and ban enforcement (§4.7), grounded on
/// `ban_policy_service.py`.
pub struct BanPolicyService {
    pool: PgPool,
}

impl BanPolicyService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_policy(&self, tenant_id: Uuid) -> Result<BanPolicy> {
        let policy = sqlx::query_as::<_, BanPolicy>(
            "SELECT tenant_id, enabled, risk_level, trigger_count, time_window_minutes, ban_duration_minutes
             FROM ban_policies WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(policy.unwrap_or(BanPolicy {
            tenant_id,
            ..BanPolicy::default()
        }))
    }

    pub async fn check_user_banned(&self, tenant_id: Uuid, end_user_id: &str) -> Result<Option<ActiveBan>> {
        let row = sqlx::query_as::<_, (DateTime<Utc>, String)>(
            "SELECT ban_until, reason FROM user_ban_records
             WHERE tenant_id = $1 AND end_user_id = $2 AND is_active = true AND ban_until > now()
             ORDER BY banned_at DESC LIMIT 1",
        )
        .bind(tenant_id)
        .bind(end_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(ban_until, reason)| ActiveBan { ban_until, reason }))
    }

    /// Records a risk trigger and, if the policy's threshold is reached within its
    /// time window and no ban is already active, inserts a new `UserBanRecord`.
    pub async fn check_and_apply(
        &self,
        tenant_id: Uuid,
        end_user_id: &str,
        risk_level: RiskLevel,
        detection_result_id: Option<&str>,
    ) -> Result<Option<ActiveBan>> {
        let policy = self.get_policy(tenant_id).await?;
        if !policy.enabled || risk_level < policy.risk_level {
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO user_risk_triggers (id, tenant_id, end_user_id, detection_result_id, risk_level, triggered_at)
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(end_user_id)
        .bind(detection_result_id)
        .bind(risk_level)
        .execute(&self.pool)
        .await?;

        // `risk_level` is stored as its `snake_case` text rendering, which does not
        // sort the same as priority order, so the ">= policy.risk_level" gate (§4.7:
        // "count of triggers ... at or above risk_level") is applied in Rust rather
        // than in SQL.
        let window_start = Utc::now() - chrono::Duration::minutes(i64::from(policy.time_window_minutes));
        let rows: Vec<(RiskLevel,)> = sqlx::query_as(
            "SELECT risk_level FROM user_risk_triggers
             WHERE tenant_id = $1 AND end_user_id = $2 AND triggered_at > $3",
        )
        .bind(tenant_id)
        .bind(end_user_id)
        .bind(window_start)
        .fetch_all(&self.pool)
        .await?;

        let trigger_count = rows.iter().filter(|(level,)| *level >= policy.risk_level).count() as i64;

        if trigger_count < i64::from(policy.trigger_count) {
            return Ok(None);
        }

        if self.check_user_banned(tenant_id, end_user_id).await?.is_some() {
            return Ok(None);
        }

        let ban_until = Utc::now() + chrono::Duration::minutes(i64::from(policy.ban_duration_minutes));
        let reason = format!(
            "在 {} 分钟内触发 {} 次{:?}风险",
            policy.time_window_minutes, trigger_count, policy.risk_level
        );

        sqlx::query(
            "INSERT INTO user_ban_records (id, tenant_id, end_user_id, banned_at, ban_until, trigger_count, risk_level, reason, is_active)
             VALUES ($1, $2, $3, now(), $4, $5, $6, $7, true)",
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(end_user_id)
        .bind(ban_until)
        .bind(trigger_count as i32)
        .bind(policy.risk_level)
        .bind(&reason)
        .execute(&self.pool)
        .await?;

        tracing::warn!(tenant_id = %tenant_id, end_user_id, %ban_until, "end user banned");

        Ok(Some(ActiveBan { ban_until, reason }))
    }

    pub async fn unban(&self, tenant_id: Uuid, end_user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE user_ban_records SET is_active = false, ban_until = now()
             WHERE tenant_id = $1 AND end_user_id = $2 AND is_active = true",
        )
        .bind(tenant_id)
        .bind(end_user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
