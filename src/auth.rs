use argon2::{Argon2, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    access::Actor,
    config::{AppConfig, Env},
    error::AppError,
    models::{Brand, PermissionSet, Session},
    repository::RepositoryState,
};

/// Claims
///
/// JWT payload. The subject is a **session id**, not a user id: the user,
/// their permissions and the CSRF token are resolved from the session row
/// on every request, so logout and deactivation take effect immediately.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the session UUID.
    pub sub: Uuid,
    /// Expiration time. Mirrors the session row's `expires_at`.
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request: session-scoped
/// context passed per request, never ambient global state. Handlers take
/// this as an argument; the access guard consumes it through `actor()`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub brand: Option<Brand>,
    pub permissions: PermissionSet,
    /// Backing session id, used by logout. `None` only under the local
    /// development bypass, which carries no session.
    pub session_id: Option<Uuid>,
    /// CSRF token of the backing session; absent under the bypass.
    pub csrf_token: Option<String>,
}

impl AuthUser {
    /// The guard's view of this user.
    pub fn actor(&self) -> Actor<'_> {
        Actor {
            permissions: &self.permissions,
            brand: self.brand,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Makes `AuthUser` usable as a handler argument on any protected route.
/// The flow:
/// 1. Local bypass: in `Env::Local` only, a valid `x-user-id` header for an
///    existing, active user authenticates directly (no session).
/// 2. Bearer token extraction and JWT validation.
/// 3. Session lookup: the row must exist and be unexpired.
/// 4. User lookup: the account must still exist and be active.
///
/// Rejection is always `AppError::Unauthenticated` (401); the reason is
/// deliberately not differentiated to the client.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // 1. Local development bypass. The account is still looked up so
        // permissions and brand scoping behave exactly as in production.
        if config.env == Env::Local {
            if let Some(user_id_header) = parts.headers.get("x-user-id") {
                if let Ok(id_str) = user_id_header.to_str() {
                    if let Ok(user_id) = Uuid::parse_str(id_str) {
                        if let Some(user) = repo.get_user(user_id).await {
                            if user.active {
                                return Ok(AuthUser {
                                    id: user.id,
                                    name: user.name,
                                    email: user.email,
                                    brand: user.brand,
                                    permissions: user.permissions,
                                    session_id: None,
                                    csrf_token: None,
                                });
                            }
                        }
                    }
                }
            }
        }

        // 2. Bearer token extraction.
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthenticated)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthenticated)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|_| AppError::Unauthenticated)?;

        // 3. Session lookup. A revoked (logged-out) or expired session
        // fails even though the JWT itself is still well-formed.
        let session = repo
            .get_session(token_data.claims.sub)
            .await
            .ok_or(AppError::Unauthenticated)?;

        if session.expires_at <= Utc::now() {
            return Err(AppError::Unauthenticated);
        }

        // 4. User lookup. Deleted or deactivated accounts stop
        // authenticating regardless of outstanding tokens.
        let user = repo
            .get_user(session.user_id)
            .await
            .ok_or(AppError::Unauthenticated)?;

        if !user.active {
            return Err(AppError::Unauthenticated);
        }

        Ok(AuthUser {
            id: user.id,
            name: user.name,
            email: user.email,
            brand: user.brand,
            permissions: user.permissions,
            session_id: Some(session.id),
            csrf_token: Some(session.csrf_token),
        })
    }
}

// --- Session Issuance ---

/// Builds a new session row for a user, valid for `hours`.
pub fn new_session(user_id: Uuid, hours: i64) -> Session {
    let now = Utc::now();
    Session {
        id: Uuid::new_v4(),
        user_id,
        csrf_token: Uuid::new_v4().simple().to_string(),
        created_at: now,
        expires_at: now + chrono::Duration::hours(hours),
    }
}

/// Signs the JWT for a session.
pub fn issue_token(config: &AppConfig, session: &Session) -> Result<String, AppError> {
    let claims = Claims {
        sub: session.id,
        exp: session.expires_at.timestamp() as usize,
        iat: session.created_at.timestamp() as usize,
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key)
        .map_err(|e| AppError::Internal(format!("token creation failed: {e}")))
}

// --- Password Handling (Argon2id, PHC format) ---

/// Hashes a password for storage.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Verifies a plaintext password against a stored PHC-format hash.
///
/// Returns `Ok(false)` on mismatch; an error means the stored hash is
/// malformed, which is a data problem rather than a failed login.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("invalid stored hash: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!("verify error: {e}"))),
    }
}

// --- Provisioning Password Policy ---

/// Policy message shown to the client, verbatim from the legacy system.
pub const PASSWORD_POLICY_MESSAGE: &str = "La contrasena tiene que tener al menos 10 caracteres, \
     al menos una letra mayuscula y miniscula, un numero y uno de los \
     siguientes simbolos especiales (@$!%*?&).";

const PASSWORD_SYMBOLS: &[char] = &['@', '$', '!', '%', '*', '?', '&'];

/// Checks the account-provisioning password policy: at least 10
/// characters, one lowercase, one uppercase, one digit and one of
/// `@$!%*?&`, with no characters outside those classes.
pub fn password_meets_policy(password: &str) -> bool {
    let allowed = |c: char| {
        c.is_ascii_lowercase()
            || c.is_ascii_uppercase()
            || c.is_ascii_digit()
            || PASSWORD_SYMBOLS.contains(&c)
    };

    password.chars().count() >= 10
        && password.chars().all(allowed)
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SYMBOLS.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_accepts_a_conforming_password() {
        assert!(password_meets_policy("Abcdef123!"));
        assert!(password_meets_policy("XyZ9876543$"));
    }

    #[test]
    fn policy_rejects_short_or_incomplete_passwords() {
        assert!(!password_meets_policy("Ab1!"));
        assert!(!password_meets_policy("abcdefgh123!"));
        assert!(!password_meets_policy("ABCDEFGH123!"));
        assert!(!password_meets_policy("Abcdefghij!"));
        assert!(!password_meets_policy("Abcdefgh123"));
    }

    #[test]
    fn policy_rejects_characters_outside_the_classes() {
        assert!(!password_meets_policy("Abcdef123! "));
        assert!(!password_meets_policy("Abcdef123#x"));
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("Abcdef123!").unwrap();
        assert!(verify_password("Abcdef123!", &hash).unwrap());
        assert!(!verify_password("Abcdef123?", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("pw", "not-a-hash").is_err());
    }

    #[test]
    fn sessions_expire_in_the_configured_window() {
        let session = new_session(Uuid::new_v4(), 24);
        let lifetime = session.expires_at - session.created_at;
        assert_eq!(lifetime, chrono::Duration::hours(24));
        assert!(!session.csrf_token.is_empty());
    }
}
