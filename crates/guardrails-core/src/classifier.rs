use guardrails_shared::{ChatMessage, GuardrailsError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text classifier model name (§6).
pub const TEXT_MODEL: &str = "Xiangxin-Guardrails-Text";
/// Vision classifier model name, used when any message part carries an image.
pub const VISION_MODEL: &str = "Xiangxin-Guardrails-VL";

#[derive(Debug, Clone)]
pub struct ClassifierVerdict {
    /// `None` when the assistant content was exactly `safe`.
    pub category_code: Option<String>,
    /// `[0,1]`, defaults to `1.0` (fail safe) when the upstream omits it — see
    /// DESIGN.md open-question decision 1.
    pub sensitivity_score: f64,
}

#[derive(Serialize)]
struct ClassifierRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ClassifierResponseChoice {
    message: ClassifierResponseMessage,
}

#[derive(Deserialize)]
struct ClassifierResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ClassifierResponse {
    choices: Vec<ClassifierResponseChoice>,
    #[serde(default)]
    sensitivity_score: Option<f64>,
}

/// HTTP client for the upstream classifier model API (§6), grounded on
/// `guardrail_service.py`'s `model_service.check_messages`.
pub struct ClassifierClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ClassifierClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(180))
            .build()
            .expect("classifier http client");

        Self {
            http,
            base_url,
            api_key,
        }
    }

    pub async fn check_messages(&self, messages: &[ChatMessage], has_image: bool) -> Result<ClassifierVerdict> {
        let model = if has_image { VISION_MODEL } else { TEXT_MODEL };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&ClassifierRequest { model, messages })
            .send()
            .await
            .map_err(|e| GuardrailsError::ClassifierError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GuardrailsError::ClassifierError(format!(
                "classifier returned status {}",
                response.status()
            )));
        }

        let body: ClassifierResponse = response
            .json()
            .await
            .map_err(|e| GuardrailsError::ClassifierError(e.to_string()))?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| GuardrailsError::ClassifierError("empty classifier response".to_string()))?;

        Ok(Self::parse_response(&content, body.sensitivity_score))
    }

    /// Parses the fixed `safe` / `unsafe\n<Sxx>` token grammar (§4.1 step 4).
    fn parse_response(content: &str, sensitivity_score: Option<f64>) -> ClassifierVerdict {
        let trimmed = content.trim();
        let category_code = trimmed
            .strip_prefix("unsafe")
            .and_then(|rest| rest.trim().lines().next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        ClassifierVerdict {
            category_code,
            sensitivity_score: sensitivity_score.unwrap_or(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_safe_response() {
        let verdict = ClassifierClient::parse_response("safe", Some(0.1));
        assert!(verdict.category_code.is_none());
        assert_eq!(verdict.sensitivity_score, 0.1);
    }

    #[test]
    fn parses_unsafe_response_with_category() {
        let verdict = ClassifierClient::parse_response("unsafe\nS5", Some(0.9));
        assert_eq!(verdict.category_code.as_deref(), Some("S5"));
    }

    #[test]
    fn missing_sensitivity_score_defaults_to_fail_safe() {
        let verdict = ClassifierClient::parse_response("unsafe\nS9", None);
        assert_eq!(verdict.sensitivity_score, 1.0);
    }
}
