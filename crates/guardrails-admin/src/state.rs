use crate::email::{EmailSender, LoggingEmailSender};
use guardrails_core::ban_policy::BanPolicyService;
use guardrails_core::caches::{KeywordCache, ModelConfigCache, RiskConfigCache, TemplateCache};
use guardrails_core::config::AdminConfig;
use guardrails_core::database::Database;
use guardrails_core::encryption::ApiKeyCipher;
use guardrails_core::images::ImageProcessor;
use guardrails_core::importer::Importer;
use guardrails_core::media::MediaSigner;
use guardrails_core::rate_limit::RateLimiter;
use guardrails_core::{auth::AuthService, auth::TenantResolver};
use std::sync::Arc;

/// Shared application state for the Admin Service: tenant/config CRUD, the result
/// read API, and the background importer/ban-policy workers spawned from `main.rs`
/// (teacher's `Database`-plus-service-struct wiring, extended with every cache the
/// Admin Service must invalidate on CRUD per §4.5's invariant).
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AdminConfig>,
    pub resolver: Arc<TenantResolver>,
    pub auth: Arc<AuthService>,
    pub keyword_cache: Arc<KeywordCache>,
    pub template_cache: Arc<TemplateCache>,
    pub risk_config_cache: Arc<RiskConfigCache>,
    pub model_config_cache: Arc<ModelConfigCache>,
    pub cipher: Arc<ApiKeyCipher>,
    pub media_signer: Arc<MediaSigner>,
    pub image_processor: Arc<ImageProcessor>,
    pub rate_limiter: Arc<RateLimiter>,
    pub ban_policy: Arc<BanPolicyService>,
    pub importer: Arc<Importer>,
    pub email_sender: Arc<dyn EmailSender>,
}

impl AppState {
    pub fn new(db: Database, config: AdminConfig) -> anyhow::Result<Self> {
        let pool = db.pool().clone();

        let auth = Arc::new(AuthService::new(
            config.core.jwt_secret_key.clone(),
            config.core.jwt_access_token_expire_minutes,
        ));
        let resolver = Arc::new(TenantResolver::new(
            pool.clone(),
            AuthService::new(config.core.jwt_secret_key.clone(), config.core.jwt_access_token_expire_minutes),
            config.core.super_admin_username.clone(),
        ));

        let cipher = Arc::new(ApiKeyCipher::load_or_create(&config.core.data_dir)?);
        let importer = Arc::new(Importer::new(pool.clone(), config.core.detection_log_dir.clone()));

        Ok(Self {
            keyword_cache: Arc::new(KeywordCache::new(pool.clone())),
            template_cache: Arc::new(TemplateCache::new(pool.clone())),
            risk_config_cache: Arc::new(RiskConfigCache::new(pool.clone())),
            model_config_cache: Arc::new(ModelConfigCache::new(pool.clone())),
            media_signer: Arc::new(MediaSigner::new(config.core.jwt_secret_key.clone())),
            image_processor: Arc::new(ImageProcessor::new(config.core.media_dir.clone())),
            rate_limiter: Arc::new(RateLimiter::new(pool.clone())),
            ban_policy: Arc::new(BanPolicyService::new(pool.clone())),
            cipher,
            importer,
            email_sender: Arc::new(LoggingEmailSender),
            db,
            config: Arc::new(config),
            resolver,
            auth,
        })
    }
}
