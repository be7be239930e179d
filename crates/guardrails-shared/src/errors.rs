use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardrailsError {
    #[error("invalid credentials")]
    AuthenticationFailed,

    #[error("authorization failed")]
    AuthorizationFailed,

    #[error("tenant not found")]
    TenantNotFound,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("user is banned until {ban_until}: {reason}")]
    Banned {
        ban_until: chrono::DateTime<chrono::Utc>,
        reason: String,
    },

    #[error("upstream classifier error: {0}")]
    ClassifierError(String),

    #[error("upstream provider error: {0}")]
    UpstreamError(String),

    #[error("image too large or unsupported: {0}")]
    ImageError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, GuardrailsError>;

impl From<sqlx::Error> for GuardrailsError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
