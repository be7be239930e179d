use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

/// Coarse risk level shared by compliance/security/data sub-verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum RiskLevel {
    #[serde(rename = "无风险")]
    NoRisk,
    #[serde(rename = "低风险")]
    Low,
    #[serde(rename = "中风险")]
    Medium,
    #[serde(rename = "高风险")]
    High,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::NoRisk
    }
}

impl RiskLevel {
    /// `max(security, compliance, data)` over `high > medium > low > no_risk` (§3 invariant).
    pub fn max_of(levels: impl IntoIterator<Item = Self>) -> Self {
        levels.into_iter().max().unwrap_or_default()
    }
}

/// Action resolved from the overall risk level (§4.1 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum Action {
    Pass,
    Replace,
    Reject,
}

impl Action {
    pub fn from_overall_risk(overall: RiskLevel) -> Self {
        match overall {
            RiskLevel::NoRisk => Self::Pass,
            RiskLevel::High => Self::Reject,
            RiskLevel::Low | RiskLevel::Medium => Self::Replace,
        }
    }
}

/// Direction an inspection runs in; selects `check_input` vs `check_output` on
/// data-security entity types (§4.1 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum AnonymizationMethod {
    Replace,
    Mask,
    Hash,
    Encrypt,
    Shuffle,
    Random,
}

/// One part of a (possibly multi-modal) message content array (§9 "dynamic typing
/// of message content").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlPart },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrlPart {
    pub url: String,
}

/// Message content is either a plain string or an array of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn as_text_shortcut(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Concatenated text across all text parts (or the whole string), used for
    /// length budgeting and keyword/regex scanning.
    pub fn text_len(&self) -> usize {
        match self {
            Self::Text(s) => s.chars().count(),
            Self::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.chars().count(),
                    ContentPart::ImageUrl { .. } => 0,
                })
                .sum(),
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self, Self::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }

    pub fn to_plain_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// A principal holding API keys; the sole owner of configuration (§3).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub api_key: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Super-admin impersonation session (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantSwitch {
    pub session_token: String,
    pub admin_tenant_id: Uuid,
    pub target_tenant_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeywordList {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub keywords: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResponseTemplate {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub category: String,
    pub risk_level: RiskLevel,
    pub template_content: String,
    pub is_default: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnowledgeBase {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub category: String,
    pub file_path: String,
    pub vector_file_path: String,
    pub total_qa_pairs: i32,
    pub is_active: bool,
    pub is_global: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RiskTypeConfig {
    pub tenant_id: Uuid,
    pub s1_enabled: bool,
    pub s2_enabled: bool,
    pub s3_enabled: bool,
    pub s4_enabled: bool,
    pub s5_enabled: bool,
    pub s6_enabled: bool,
    pub s7_enabled: bool,
    pub s8_enabled: bool,
    pub s9_enabled: bool,
    pub s10_enabled: bool,
    pub s11_enabled: bool,
    pub s12_enabled: bool,
    pub high_sensitivity_threshold: f64,
    pub medium_sensitivity_threshold: f64,
    pub low_sensitivity_threshold: f64,
    pub sensitivity_trigger_level: String,
}

impl Default for RiskTypeConfig {
    fn default() -> Self {
        Self {
            tenant_id: Uuid::nil(),
            s1_enabled: true,
            s2_enabled: true,
            s3_enabled: true,
            s4_enabled: true,
            s5_enabled: true,
            s6_enabled: true,
            s7_enabled: true,
            s8_enabled: true,
            s9_enabled: true,
            s10_enabled: true,
            s11_enabled: true,
            s12_enabled: true,
            high_sensitivity_threshold: 0.40,
            medium_sensitivity_threshold: 0.60,
            low_sensitivity_threshold: 0.95,
            sensitivity_trigger_level: "medium".to_string(),
        }
    }
}

impl RiskTypeConfig {
    pub fn is_enabled(&self, category_code: &str) -> bool {
        match category_code {
            "S1" => self.s1_enabled,
            "S2" => self.s2_enabled,
            "S3" => self.s3_enabled,
            "S4" => self.s4_enabled,
            "S5" => self.s5_enabled,
            "S6" => self.s6_enabled,
            "S7" => self.s7_enabled,
            "S8" => self.s8_enabled,
            "S9" => self.s9_enabled,
            "S10" => self.s10_enabled,
            "S11" => self.s11_enabled,
            "S12" => self.s12_enabled,
            _ => true,
        }
    }

    /// Threshold selected by `sensitivity_trigger_level` (§4.1 step 5).
    pub fn threshold(&self) -> f64 {
        match self.sensitivity_trigger_level.as_str() {
            "low" => self.low_sensitivity_threshold,
            "high" => self.high_sensitivity_threshold,
            _ => self.medium_sensitivity_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub pattern: String,
    pub check_input: bool,
    pub check_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnonymizationConfig {
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub mask_char: Option<String>,
    #[serde(default)]
    pub keep_prefix: Option<usize>,
    #[serde(default)]
    pub keep_suffix: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSecurityEntityType {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub entity_type: String,
    pub display_name: String,
    pub category: RiskLevel,
    pub recognition_config: RecognitionConfig,
    pub anonymization_method: AnonymizationMethod,
    pub anonymization_config: AnonymizationConfig,
    pub is_active: bool,
    pub is_global: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProxyModelConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub config_name: String,
    pub api_base_url: String,
    pub api_key_encrypted: String,
    pub model_name: String,
    pub enabled: bool,
    pub block_on_input_risk: bool,
    pub block_on_output_risk: bool,
    pub enable_reasoning_detection: bool,
    pub stream_chunk_size: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ProxyRequestStatus {
    Success,
    Blocked,
    StreamSuccess,
    StreamBlocked,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProxyRequestLog {
    pub request_id: String,
    pub tenant_id: Uuid,
    pub proxy_config_id: Uuid,
    pub input_detection_id: Option<String>,
    pub output_detection_id: Option<String>,
    pub input_blocked: bool,
    pub output_blocked: bool,
    pub tokens: Option<i32>,
    pub response_time_ms: i64,
    pub status: ProxyRequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DetectionResult {
    pub request_id: String,
    pub tenant_id: Uuid,
    pub content: String,
    pub suggest_action: Action,
    pub suggest_answer: Option<String>,
    pub security_risk_level: RiskLevel,
    pub security_categories: Vec<String>,
    pub compliance_risk_level: RiskLevel,
    pub compliance_categories: Vec<String>,
    pub data_risk_level: RiskLevel,
    pub data_categories: Vec<String>,
    pub sensitivity_level: Option<String>,
    pub sensitivity_score: Option<f64>,
    pub has_image: bool,
    pub image_count: i32,
    pub image_paths: Vec<String>,
    pub hit_keywords: Option<Vec<String>>,
    pub model_response: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DetectionResult {
    pub fn overall_risk_level(&self) -> RiskLevel {
        RiskLevel::max_of([
            self.security_risk_level,
            self.compliance_risk_level,
            self.data_risk_level,
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRateLimit {
    pub tenant_id: Uuid,
    pub requests_per_second: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRateLimitCounter {
    pub tenant_id: Uuid,
    pub current_count: i32,
    pub window_start: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BanPolicy {
    pub tenant_id: Uuid,
    pub enabled: bool,
    pub risk_level: RiskLevel,
    pub trigger_count: i32,
    pub time_window_minutes: i32,
    pub ban_duration_minutes: i32,
}

impl Default for BanPolicy {
    fn default() -> Self {
        Self {
            tenant_id: Uuid::nil(),
            enabled: false,
            risk_level: RiskLevel::High,
            trigger_count: 3,
            time_window_minutes: 10,
            ban_duration_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRiskTrigger {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub end_user_id: String,
    pub risk_level: RiskLevel,
    pub triggered_at: DateTime<Utc>,
    pub detection_result_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserBanRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub end_user_id: String,
    pub banned_at: DateTime<Utc>,
    pub ban_until: DateTime<Utc>,
    pub trigger_count: i32,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoginAttempt {
    pub email: String,
    pub ip: String,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
}

// ---- request/response wire types ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailSubVerdict {
    pub risk_level: RiskLevel,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResponse {
    pub id: String,
    pub result: GuardrailResult,
    pub overall_risk_level: RiskLevel,
    pub suggest_action: Action,
    pub suggest_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub compliance: GuardrailSubVerdict,
    pub security: GuardrailSubVerdict,
    pub data: GuardrailSubVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsRequest {
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub extra_body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsInputRequest {
    pub input: String,
    pub model: Option<String>,
    pub xxai_app_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsOutputRequest {
    pub input: String,
    pub output: String,
    pub xxai_app_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub verification_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub tenant: Tenant,
}

/// End-user identifier carried by `extra_body.xxai_app_user_id` (§9 open question 4);
/// distinct from `tenant_id`. Falls back to the tenant id when absent.
pub fn resolve_end_user_id(tenant_id: Uuid, xxai_app_user_id: Option<&str>) -> String {
    xxai_app_user_id
        .map(str::to_string)
        .unwrap_or_else(|| tenant_id.to_string())
}
