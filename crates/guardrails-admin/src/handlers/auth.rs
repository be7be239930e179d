use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::{ConnectInfo, State};
use axum::Json;
use chrono::Utc;
use guardrails_core::auth::API_KEY_PREFIX;
use guardrails_shared::{AuthResponse, GuardrailsError, LoginRequest, RegisterRequest, Tenant};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::error::DatabaseError;
use std::net::SocketAddr;
use uuid::Uuid;

const VERIFICATION_CODE_TTL_MINUTES: i64 = 10;
const LOGIN_ATTEMPT_WINDOW_MINUTES: i64 = 15;
const MAX_FAILED_LOGIN_ATTEMPTS: i64 = 5;

fn generate_api_key() -> String {
    let suffix: String = (0..32)
        .map(|_| {
            const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
            let idx = rand::thread_rng().gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();
    format!("{API_KEY_PREFIX}{suffix}")
}

fn generate_verification_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[derive(Debug, Deserialize)]
pub struct RequestCodeBody {
    pub email: String,
}

/// Issues a 6-digit, 10-minute verification code and hands it to the configured
/// [`crate::email::EmailSender`] (§3 "Lifecycles" self-registration flow).
pub async fn request_verification_code(
    State(state): State<AppState>,
    Json(body): Json<RequestCodeBody>,
) -> Result<Json<Value>, ApiError> {
    let code = generate_verification_code();
    let expires_at = Utc::now() + chrono::Duration::minutes(VERIFICATION_CODE_TTL_MINUTES);

    sqlx::query("INSERT INTO email_verification_codes (email, code, expires_at) VALUES ($1, $2, $3)")
        .bind(&body.email)
        .bind(&code)
        .bind(expires_at)
        .execute(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    state.email_sender.send_verification_code(&body.email, &code);

    Ok(Json(json!({ "message": "verification code sent" })))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let valid = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM email_verification_codes WHERE email = $1 AND code = $2 AND expires_at > now()",
    )
    .bind(&body.email)
    .bind(&body.verification_code)
    .fetch_one(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    if valid == 0 {
        return Err(GuardrailsError::ValidationError("invalid or expired verification code".to_string()).into());
    }

    let password_hash = state.auth.hash_password(&body.password)?;
    let api_key = generate_api_key();
    let is_super_admin = state.config.core.is_super_admin_email(&body.email);

    let tenant = sqlx::query_as::<_, Tenant>(
        "INSERT INTO tenants (id, email, password_hash, api_key, is_active, is_verified, is_super_admin)
         VALUES ($1, $2, $3, $4, true, true, $5)
         RETURNING id, email, password_hash, api_key, is_active, is_verified, is_super_admin, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(&body.email)
    .bind(&password_hash)
    .bind(&api_key)
    .bind(is_super_admin)
    .fetch_one(state.db.pool())
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            GuardrailsError::ValidationError("email already registered".to_string())
        }
        other => GuardrailsError::from(other),
    })?;

    sqlx::query("DELETE FROM email_verification_codes WHERE email = $1")
        .bind(&body.email)
        .execute(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    let role = if tenant.is_super_admin { "admin" } else { "tenant" };
    let token = state.auth.generate_token(tenant.id, &tenant.email, role, tenant.is_super_admin)?;
    tracing::info!(security = true, event = "register", tenant_id = %tenant.id);

    Ok(Json(AuthResponse { token, tenant }))
}

/// Brute-force guard (§4.6): more than [`MAX_FAILED_LOGIN_ATTEMPTS`] failures for an
/// email within [`LOGIN_ATTEMPT_WINDOW_MINUTES`] rejects further attempts outright.
async fn too_many_recent_failures(state: &AppState, email: &str) -> Result<bool, ApiError> {
    let window_start = Utc::now() - chrono::Duration::minutes(LOGIN_ATTEMPT_WINDOW_MINUTES);
    let failures = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM login_attempts WHERE email = $1 AND success = false AND attempted_at > $2",
    )
    .bind(email)
    .bind(window_start)
    .fetch_one(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    Ok(failures >= MAX_FAILED_LOGIN_ATTEMPTS)
}

async fn record_login_attempt(state: &AppState, email: &str, ip: &str, success: bool) {
    if let Err(e) = sqlx::query("INSERT INTO login_attempts (email, ip, success) VALUES ($1, $2, $3)")
        .bind(email)
        .bind(ip)
        .bind(success)
        .execute(state.db.pool())
        .await
    {
        tracing::error!(error = %e, "failed to record login attempt");
    }
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let ip = addr.ip().to_string();

    if too_many_recent_failures(&state, &body.email).await? {
        tracing::warn!(security = true, event = "login", status = "locked_out", email = %body.email);
        return Err(GuardrailsError::AuthenticationFailed.into());
    }

    let tenant = sqlx::query_as::<_, Tenant>(
        "SELECT id, email, password_hash, api_key, is_active, is_verified, is_super_admin, created_at, updated_at
         FROM tenants WHERE email = $1",
    )
    .bind(&body.email)
    .fetch_optional(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    let Some(tenant) = tenant else {
        record_login_attempt(&state, &body.email, &ip, false).await;
        return Err(GuardrailsError::AuthenticationFailed.into());
    };

    if !tenant.is_active || !state.auth.verify_password(&body.password, &tenant.password_hash)? {
        record_login_attempt(&state, &body.email, &ip, false).await;
        return Err(GuardrailsError::AuthenticationFailed.into());
    }

    record_login_attempt(&state, &body.email, &ip, true).await;

    let role = if tenant.is_super_admin { "admin" } else { "tenant" };
    let token = state.auth.generate_token(tenant.id, &tenant.email, role, tenant.is_super_admin)?;
    Ok(Json(AuthResponse { token, tenant }))
}

pub async fn me(State(state): State<AppState>, Authenticated(ctx): Authenticated) -> Result<Json<Tenant>, ApiError> {
    let tenant = sqlx::query_as::<_, Tenant>(
        "SELECT id, email, password_hash, api_key, is_active, is_verified, is_super_admin, created_at, updated_at
         FROM tenants WHERE id = $1",
    )
    .bind(ctx.tenant_id)
    .fetch_optional(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?
    .ok_or(GuardrailsError::TenantNotFound)?;

    Ok(Json(tenant))
}

/// Rotates the caller's API key; the old key is invalidated immediately since the
/// lookup is by exact match (§4.6).
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> Result<Json<Value>, ApiError> {
    let new_key = generate_api_key();

    sqlx::query("UPDATE tenants SET api_key = $1, updated_at = now() WHERE id = $2")
        .bind(&new_key)
        .bind(ctx.tenant_id)
        .execute(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    tracing::info!(security = true, event = "api_key_rotate", tenant_id = %ctx.tenant_id);
    Ok(Json(json!({ "api_key": new_key })))
}
