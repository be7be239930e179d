use guardrails_core::encryption::ApiKeyCipher;
use guardrails_shared::{GuardrailsError, ProxyModelConfig, Result};
use serde_json::Value;

/// A client request rewritten for the real upstream model and endpoint (§4.2
/// step 4), grounded on `proxy_service.py`'s `_build_upstream_request`.
pub struct ForwardRequest {
    pub url: String,
    pub api_key: String,
    pub body: Value,
}

pub fn build(cfg: &ProxyModelConfig, cipher: &ApiKeyCipher, endpoint: &str, mut body: Value) -> Result<ForwardRequest> {
    let api_key = cipher.decrypt(&cfg.api_key_encrypted)?;

    if let Some(obj) = body.as_object_mut() {
        obj.insert("model".to_string(), Value::String(cfg.model_name.clone()));
    }

    let base = cfg.api_base_url.trim_end_matches('/');
    Ok(ForwardRequest {
        url: format!("{base}/{endpoint}"),
        api_key,
        body,
    })
}

pub fn is_streaming(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(false)
}

pub async fn send(http: &reqwest::Client, fwd: &ForwardRequest) -> Result<reqwest::Response> {
    http.post(&fwd.url)
        .bearer_auth(&fwd.api_key)
        .json(&fwd.body)
        .send()
        .await
        .map_err(|e| GuardrailsError::UpstreamError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config(base_url: &str, encrypted_key: String) -> ProxyModelConfig {
        ProxyModelConfig {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            config_name: "my-gpt".to_string(),
            api_base_url: base_url.to_string(),
            api_key_encrypted: encrypted_key,
            model_name: "gpt-4o-upstream".to_string(),
            enabled: true,
            block_on_input_risk: true,
            block_on_output_risk: true,
            enable_reasoning_detection: false,
            stream_chunk_size: 5,
        }
    }

    #[test]
    fn build_rewrites_model_and_trims_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        let cipher = ApiKeyCipher::load_or_create(dir.path().to_str().unwrap()).unwrap();
        let encrypted = cipher.encrypt("sk-upstream-secret").unwrap();
        let cfg = test_config("https://api.upstream.example/v1/", encrypted);

        let body = json!({"model": "my-gpt", "messages": []});
        let fwd = build(&cfg, &cipher, "chat/completions", body).unwrap();

        assert_eq!(fwd.url, "https://api.upstream.example/v1/chat/completions");
        assert_eq!(fwd.api_key, "sk-upstream-secret");
        assert_eq!(fwd.body["model"], "gpt-4o-upstream");
    }

    #[test]
    fn is_streaming_reads_the_stream_flag() {
        assert!(is_streaming(&json!({"stream": true})));
        assert!(!is_streaming(&json!({"stream": false})));
        assert!(!is_streaming(&json!({})));
    }
}
