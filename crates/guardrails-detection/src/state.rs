use guardrails_core::ban_policy::BanPolicyService;
use guardrails_core::caches::{KeywordCache, RiskConfigCache, TemplateCache};
use guardrails_core::classifier::ClassifierClient;
use guardrails_core::config::DetectionConfig;
use guardrails_core::database::Database;
use guardrails_core::images::ImageProcessor;
use guardrails_core::media::MediaSigner;
use guardrails_core::pipeline::GuardrailPipeline;
use guardrails_core::rate_limit::RateLimiter;
use guardrails_core::{async_logger::AsyncDetectionLogger, auth::AuthService};
use guardrails_core::auth::TenantResolver;
use std::sync::Arc;

/// Shared application state for the Detection Service, assembled once at startup
/// (teacher's `Database` + service-struct pattern, extended with the pipeline's
/// cache handles).
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<DetectionConfig>,
    pub pipeline: Arc<GuardrailPipeline>,
    pub resolver: Arc<TenantResolver>,
    pub rate_limiter: Arc<RateLimiter>,
    pub ban_policy: Arc<BanPolicyService>,
    pub logger: Arc<AsyncDetectionLogger>,
    pub media_signer: Arc<MediaSigner>,
    pub image_processor: Arc<ImageProcessor>,
}

impl AppState {
    pub fn new(db: Database, config: DetectionConfig) -> Self {
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

        Self {
            rate_limiter: Arc::new(RateLimiter::new(pool.clone())),
            ban_policy: Arc::new(BanPolicyService::new(pool.clone())),
            logger: AsyncDetectionLogger::start(config.core.detection_log_dir.clone()),
            media_signer: Arc::new(MediaSigner::new(config.core.jwt_secret_key.clone())),
            image_processor: Arc::new(ImageProcessor::new(config.core.media_dir.clone())),
            db,
            config: Arc::new(config),
            pipeline,
            resolver,
        }
    }
}
