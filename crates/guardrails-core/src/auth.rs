use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use guardrails_shared::{GuardrailsError, Result, Tenant};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation, Algorithm};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

pub const API_KEY_PREFIX: &str = "sk-xxai-";

/// JWT payload (§4.6): `sub` is the tenant id; admin tokens carry `role="admin"`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub is_super_admin: bool,
    pub exp: usize,
    pub iat: usize,
}

pub struct AuthService {
    jwt_secret: String,
    access_token_expire_minutes: i64,
}

impl AuthService {
    pub fn new(jwt_secret: String, access_token_expire_minutes: i64) -> Self {
        Self {
            jwt_secret,
            access_token_expire_minutes,
        }
    }

    #[cfg(test)]
    pub fn new_test() -> Self {
        Self::new("test-secret".to_string(), 1440)
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        match argon2.hash_password(password.as_bytes(), &salt) {
            Ok(hash) => {
                tracing::info!(security = true, event = "password_hash", status = "success");
                Ok(hash.to_string())
            }
            Err(e) => {
                tracing::warn!(security = true, event = "password_hash", status = "failure", error = %e);
                Err(GuardrailsError::InternalError(format!(
                    "password hashing failed: {e}"
                )))
            }
        }
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| GuardrailsError::InternalError(format!("invalid password hash: {e}")))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => {
                tracing::info!(security = true, event = "password_verify", status = "success");
                Ok(true)
            }
            Err(_) => {
                tracing::warn!(security = true, event = "password_verify", status = "failure");
                Ok(false)
            }
        }
    }

    pub fn generate_token(
        &self,
        tenant_id: Uuid,
        email: &str,
        role: &str,
        is_super_admin: bool,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expire_minutes);

        let claims = Claims {
            sub: tenant_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            is_super_admin,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        match encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        ) {
            Ok(token) => {
                tracing::info!(security = true, event = "token_issue", status = "success", tenant_id = %tenant_id);
                Ok(token)
            }
            Err(e) => {
                tracing::warn!(security = true, event = "token_issue", status = "failure", error = %e);
                Err(GuardrailsError::InternalError(format!(
                    "token generation failed: {e}"
                )))
            }
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!(security = true, event = "token_verify", status = "failure", error = %e);
            GuardrailsError::AuthenticationFailed
        })
    }
}

/// Resolved authentication context for an inbound request (§4.6).
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Effective tenant id downstream lookups should use.
    pub tenant_id: Uuid,
    /// Present when a super-admin is impersonating `tenant_id` via `X-Switch-Session`.
    pub acting_admin_id: Option<Uuid>,
    pub is_super_admin: bool,
}

impl AuthContext {
    pub fn direct(tenant_id: Uuid, is_super_admin: bool) -> Self {
        Self {
            tenant_id,
            acting_admin_id: None,
            is_super_admin,
        }
    }

    pub fn switched(admin_id: Uuid, target_tenant_id: Uuid) -> Self {
        Self {
            tenant_id: target_tenant_id,
            acting_admin_id: Some(admin_id),
            is_super_admin: true,
        }
    }
}

/// Resolves the bearer token plus optional `X-Switch-Session` header into an
/// [`AuthContext`] (§4.6), shared by all three binaries so the API-key/JWT/switch
/// resolution logic lives in one place instead of being re-derived per handler.
pub struct TenantResolver {
    pool: PgPool,
    auth: AuthService,
    super_admin_email: String,
}

impl TenantResolver {
    pub fn new(pool: PgPool, auth: AuthService, super_admin_email: String) -> Self {
        Self { pool, auth, super_admin_email }
    }

    pub async fn resolve(&self, bearer: &str, switch_session: Option<&str>) -> Result<AuthContext> {
        let tenant = if let Some(api_key) = bearer.strip_prefix(API_KEY_PREFIX).map(|_| bearer) {
            self.tenant_by_api_key(api_key).await?
        } else {
            let claims = self.auth.verify_token(bearer)?;
            let tenant_id = Uuid::parse_str(&claims.sub).map_err(|_| GuardrailsError::AuthenticationFailed)?;
            self.tenant_by_id(tenant_id).await?
        };

        if !tenant.is_active {
            return Err(GuardrailsError::AuthenticationFailed);
        }
        let is_super_admin = self.super_admin_email == tenant.email;

        if let Some(session_token) = switch_session {
            let target_id = self.active_switch_target(session_token, tenant.id).await?;
            return Ok(AuthContext::switched(tenant.id, target_id));
        }

        Ok(AuthContext::direct(tenant.id, is_super_admin))
    }

    async fn tenant_by_api_key(&self, api_key: &str) -> Result<Tenant> {
        sqlx::query_as::<_, Tenant>(
            "SELECT id, email, password_hash, api_key, is_active, is_verified, is_super_admin, created_at, updated_at
             FROM tenants WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(GuardrailsError::AuthenticationFailed)
    }

    async fn tenant_by_id(&self, tenant_id: Uuid) -> Result<Tenant> {
        sqlx::query_as::<_, Tenant>(
            "SELECT id, email, password_hash, api_key, is_active, is_verified, is_super_admin, created_at, updated_at
             FROM tenants WHERE id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(GuardrailsError::AuthenticationFailed)
    }

    /// A switch session is only honored for the super-admin who holds it; the
    /// effective `tenant_id` becomes the impersonation target (§4.6).
    async fn active_switch_target(&self, session_token: &str, admin_tenant_id: Uuid) -> Result<Uuid> {
        let row = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT admin_tenant_id, target_tenant_id FROM tenant_switches
             WHERE session_token = $1 AND is_active = true AND expires_at > now()",
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(GuardrailsError::AuthenticationFailed)?;

        if row.0 != admin_tenant_id {
            return Err(GuardrailsError::AuthorizationFailed);
        }
        Ok(row.1)
    }
}

pub fn strip_bearer(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trips() {
        let auth = AuthService::new_test();
        let hash = auth.hash_password("hunter2-hunter2").unwrap();
        assert!(auth.verify_password("hunter2-hunter2", &hash).unwrap());
        assert!(!auth.verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn token_round_trips() {
        let auth = AuthService::new_test();
        let tenant_id = Uuid::new_v4();
        let token = auth
            .generate_token(tenant_id, "t@example.com", "tenant", false)
            .unwrap();
        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, tenant_id.to_string());
        assert_eq!(claims.email, "t@example.com");
    }

    #[test]
    fn tampered_token_rejected() {
        let auth = AuthService::new_test();
        let tenant_id = Uuid::new_v4();
        let token = auth
            .generate_token(tenant_id, "t@example.com", "tenant", false)
            .unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(auth.verify_token(&tampered).is_err());
    }
}
