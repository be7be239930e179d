pub mod keyword;
pub mod model_config;
pub mod risk_config;
pub mod template;

pub use keyword::KeywordCache;
pub use model_config::ModelConfigCache;
pub use risk_config::RiskConfigCache;
pub use template::TemplateCache;
