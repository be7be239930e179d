use crate::state::AppState;
use chrono::Utc;
use guardrails_shared::ProxyRequestStatus;
use uuid::Uuid;

/// One row per proxied request (§4.2 step 5), grounded on `proxy_service.py`'s
/// request-log insert. Unlike detection logging, this is a direct DB write rather
/// than the JSONL write-ahead path: the proxy log table is small and queried
/// synchronously by the Admin Service's usage views, so there is no import step.
#[allow(clippy::too_many_arguments)]
pub async fn record(
    state: &AppState,
    request_id: &str,
    tenant_id: Uuid,
    proxy_config_id: Uuid,
    input_detection_id: Option<&str>,
    output_detection_id: Option<&str>,
    input_blocked: bool,
    output_blocked: bool,
    tokens: Option<i32>,
    response_time_ms: i64,
    status: ProxyRequestStatus,
) {
    let result = sqlx::query(
        "INSERT INTO proxy_request_logs
            (request_id, tenant_id, proxy_config_id, input_detection_id, output_detection_id,
             input_blocked, output_blocked, tokens, response_time_ms, status, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (request_id) DO NOTHING",
    )
    .bind(request_id)
    .bind(tenant_id)
    .bind(proxy_config_id)
    .bind(input_detection_id)
    .bind(output_detection_id)
    .bind(input_blocked)
    .bind(output_blocked)
    .bind(tokens)
    .bind(response_time_ms)
    .bind(status)
    .bind(Utc::now())
    .execute(state.db.pool())
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, request_id, "proxy request log insert failed");
    }
}
