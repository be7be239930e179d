use crate::state::AppState;
use axum::http::HeaderMap;
use guardrails_core::pipeline::PipelineVerdict;
use serde_json::json;
use uuid::Uuid;

pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers.get("User-Agent").and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Enqueues a detection log record for a proxied inspection and fires off the
/// ban-policy bookkeeping in the background, mirroring the Detection Service's
/// inline `inspect` helper (§4.1, §4.7, §4.8).
pub fn record_verdict(
    state: &AppState,
    tenant_id: Uuid,
    end_user_id: &str,
    verdict: &PipelineVerdict,
    headers: Option<&HeaderMap>,
) {
    let record = json!({
        "request_id": verdict.request_id,
        "tenant_id": tenant_id,
        "content": verdict.content,
        "suggest_action": verdict.suggest_action,
        "suggest_answer": verdict.suggest_answer,
        "security_risk_level": verdict.security.risk_level,
        "security_categories": verdict.security.categories,
        "compliance_risk_level": verdict.compliance.risk_level,
        "compliance_categories": verdict.compliance.categories,
        "data_risk_level": verdict.data.risk_level,
        "data_categories": verdict.data.categories,
        "sensitivity_level": verdict.sensitivity_level,
        "sensitivity_score": verdict.sensitivity_score,
        "has_image": verdict.has_image,
        "image_count": i64::from(verdict.has_image),
        "image_paths": Vec::<String>::new(),
        "hit_keywords": verdict.hit_keywords,
        "model_response": verdict.model_response,
        "ip_address": headers.and_then(client_ip),
        "user_agent": headers.and_then(user_agent),
    });
    state.logger.log_detection(record);

    let ban_policy = state.ban_policy.clone();
    let overall = verdict.overall_risk_level;
    let request_id = verdict.request_id.clone();
    let end_user_id = end_user_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = ban_policy
            .check_and_apply(tenant_id, &end_user_id, overall, Some(&request_id))
            .await
        {
            tracing::error!(error = %e, "ban policy bookkeeping failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("198.51.100.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.7"));
    }

    #[test]
    fn user_agent_reads_the_header_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert("User-Agent", HeaderValue::from_static("acme-sdk/1.0"));
        assert_eq!(user_agent(&headers).as_deref(), Some("acme-sdk/1.0"));
    }
}
