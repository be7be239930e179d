use chrono::Utc;
use guardrails_shared::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// Per-tenant 1-second sliding window rate limiter (§4.7), backed by a DB row so
/// limits hold across processes. `rps = 0` disables the limit.
pub struct RateLimiter {
    pool: PgPool,
}

impl RateLimiter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns `true` if the request is admitted, `false` if it should receive 429.
    pub async fn check_and_increment(&self, tenant_id: Uuid) -> Result<bool> {
        let limit = sqlx::query_as::<_, (i32, bool)>(
            "SELECT requests_per_second, is_active FROM user_rate_limits WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((rps, is_active)) = limit else {
            return Ok(true);
        };
        if !is_active || rps == 0 {
            return Ok(true);
        }

        let now = Utc::now();

        let row = sqlx::query_as::<_, (i32, chrono::DateTime<Utc>)>(
            "SELECT current_count, window_start FROM user_rate_limit_counters WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => {
                sqlx::query(
                    "INSERT INTO user_rate_limit_counters (tenant_id, current_count, window_start, last_updated)
                     VALUES ($1, 1, $2, $2)",
                )
                .bind(tenant_id)
                .bind(now)
                .execute(&self.pool)
                .await?;
                Ok(true)
            }
            Some((current_count, window_start)) => {
                if now - window_start >= chrono::Duration::seconds(1) {
                    sqlx::query(
                        "UPDATE user_rate_limit_counters SET current_count = 1, window_start = $2, last_updated = $2
                         WHERE tenant_id = $1",
                    )
                    .bind(tenant_id)
                    .bind(now)
                    .execute(&self.pool)
                    .await?;
                    Ok(true)
                } else if current_count < rps {
                    sqlx::query(
                        "UPDATE user_rate_limit_counters SET current_count = current_count + 1, last_updated = $2
                         WHERE tenant_id = $1",
                    )
                    .bind(tenant_id)
                    .bind(now)
                    .execute(&self.pool)
                    .await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}
