use guardrails_core::ban_policy::BanPolicyService;
use guardrails_core::caches::{KeywordCache, ModelConfigCache, RiskConfigCache, TemplateCache};
use guardrails_core::classifier::ClassifierClient;
use guardrails_core::config::ProxyConfig;
use guardrails_core::database::Database;
use guardrails_core::encryption::ApiKeyCipher;
use guardrails_core::pipeline::GuardrailPipeline;
use guardrails_core::rate_limit::RateLimiter;
use guardrails_core::{async_logger::AsyncDetectionLogger, auth::AuthService};
use guardrails_core::auth::TenantResolver;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state for the Proxy Service. Adds the model-config cache,
/// the API-key cipher, and an egress HTTP client on top of the Detection
/// Service's set (§4.2).
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<ProxyConfig>,
    pub pipeline: Arc<GuardrailPipeline>,
    pub resolver: Arc<TenantResolver>,
    pub rate_limiter: Arc<RateLimiter>,
    pub ban_policy: Arc<BanPolicyService>,
    pub logger: Arc<AsyncDetectionLogger>,
    pub model_config_cache: Arc<ModelConfigCache>,
    pub cipher: Arc<ApiKeyCipher>,
    pub upstream_http: reqwest::Client,
}

impl AppState {
    pub fn new(db: Database, config: ProxyConfig) -> anyhow::Result<Self> {
        let pool = db.pool().clone();
        let keyword_cache = Arc::new(KeywordCache::new(pool.clone()));
        let template_cache = Arc::new(TemplateCache::new(pool.clone()));
        let risk_config_cache = Arc::new(RiskConfigCache::new(pool.clone()));
        let classifier = Arc::new(ClassifierClient::new(
            config.core.guardrails_model_api_url.clone(),
            config.core.guardrails_model_api_key.clone(),
        ));

        let pipeline = Arc::new(GuardrailPipeline::new(
            keyword_cache,
            template_cache,
            risk_config_cache,
            classifier,
            config.core.max_detection_context_length,
        ));

        let auth_service = AuthService::new(
            config.core.jwt_secret_key.clone(),
            config.core.jwt_access_token_expire_minutes,
        );
        let resolver = Arc::new(TenantResolver::new(
            pool.clone(),
            auth_service,
            config.core.super_admin_username.clone(),
        ));

        let cipher = Arc::new(ApiKeyCipher::load_or_create(&config.core.data_dir)?);

        // §5: upstream forward is 5 minutes read, 15s connect.
        let upstream_http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            rate_limiter: Arc::new(RateLimiter::new(pool.clone())),
            ban_policy: Arc::new(BanPolicyService::new(pool.clone())),
            logger: AsyncDetectionLogger::start(config.core.detection_log_dir.clone()),
            model_config_cache: Arc::new(ModelConfigCache::new(pool)),
            cipher,
            upstream_http,
            db,
            config: Arc::new(config),
            pipeline,
            resolver,
        })
    }
}
