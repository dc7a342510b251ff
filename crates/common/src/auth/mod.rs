//! Authentication and authorization utilities
//!
//! Provides:
//! - Password hashing (argon2id)
//! - JWT token generation and validation
//! - `AuthUser` / `MaybeAuthUser` extractors
//! - Role and ownership rules shared by every handler

use crate::db::models::{User, UserRole};
use crate::errors::{AppError, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated caller, decoded from a bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    /// Journalist profile id, when the account has one
    pub journalist_id: Option<Uuid>,
}

impl AuthUser {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_journalist(&self) -> bool {
        self.role == UserRole::Journalist
    }

    /// Require one of the given roles
    pub fn require_role(&self, allowed: &[UserRole], action: &str) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::InsufficientRole {
                role: self.role.to_string(),
                action: action.to_string(),
            })
        }
    }

    /// Require a moderator or admin
    pub fn require_staff(&self, action: &str) -> Result<()> {
        self.require_role(&[UserRole::Moderator, UserRole::Admin], action)
    }

    pub fn viewer(&self) -> Viewer {
        Viewer {
            user_id: Some(self.user_id),
            role: Some(self.role),
            journalist_id: self.journalist_id,
        }
    }
}

/// Who is looking at a resource. Drives visibility filters in queries
/// and the edit checks in handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Viewer {
    pub user_id: Option<Uuid>,
    pub role: Option<UserRole>,
    pub journalist_id: Option<Uuid>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_staff(&self) -> bool {
        self.role.map(|r| r.is_staff()).unwrap_or(false)
    }

    fn owns(&self, owner_journalist_id: Option<Uuid>) -> bool {
        self.role == Some(UserRole::Journalist)
            && self.journalist_id.is_some()
            && self.journalist_id == owner_journalist_id
    }

    /// Public records are visible to everyone; private ones to staff and
    /// the owning journalist.
    pub fn can_view(&self, is_public: bool, owner_journalist_id: Option<Uuid>) -> bool {
        is_public || self.is_staff() || self.owns(owner_journalist_id)
    }

    /// Staff edit anything; journalists only their own cases.
    pub fn can_edit_case(&self, owner_journalist_id: Option<Uuid>) -> bool {
        self.is_staff() || self.owns(owner_journalist_id)
    }
}

impl From<&AuthUser> for Viewer {
    fn from(user: &AuthUser) -> Self {
        user.viewer()
    }
}

impl From<&MaybeAuthUser> for Viewer {
    fn from(user: &MaybeAuthUser) -> Self {
        user.0.as_ref().map(AuthUser::viewer).unwrap_or_default()
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    pub email: String,

    pub role: UserRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journalist_id: Option<Uuid>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    pub fn expiration_secs(&self) -> i64 {
        self.expiration_secs
    }

    /// Issue a token for a user
    pub fn generate_token(&self, user: &User, journalist_id: Option<Uuid>) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.user_role(),
            journalist_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            })
    }

    /// Decode a token into the caller it names
    pub fn authenticate(&self, token: &str) -> Result<AuthUser> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;

        Ok(AuthUser {
            user_id,
            email: claims.email,
            role: claims.role,
            journalist_id: claims.journalist_id,
        })
    }
}

/// Hash a password for storage
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::Internal {
        message: format!("Failed to encode salt: {}", e),
    })?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Failed to hash password: {}", e),
        })
}

/// Check a password against a stored PHC string
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Extract the token from an Authorization header
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn bearer_from_parts(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
}

/// Axum extractor for AuthUser
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let token = bearer_from_parts(parts).ok_or_else(|| AppError::Unauthorized {
            message: "Missing bearer token".to_string(),
        })?;

        let jwt = Arc::<JwtManager>::from_ref(state);
        jwt.authenticate(token)
    }
}

/// Caller that may be anonymous. A present but invalid token is still
/// rejected.
#[derive(Debug, Clone, Default)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        match bearer_from_parts(parts) {
            Some(token) => {
                let jwt = Arc::<JwtManager>::from_ref(state);
                jwt.authenticate(token).map(|user| MaybeAuthUser(Some(user)))
            }
            None => Ok(MaybeAuthUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "reporter@example.org".to_string(),
            password_hash: String::new(),
            name: Some("Reporter".to_string()),
            role: role.to_string(),
            is_active: true,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    fn journalist(profile: Uuid) -> Viewer {
        Viewer {
            user_id: Some(Uuid::new_v4()),
            role: Some(UserRole::Journalist),
            journalist_id: Some(profile),
        }
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn test_password_hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("x", "not-a-phc-string"));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Basic abc"), None);
        assert_eq!(extract_bearer("abc"), None);
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test_secret", 3600);
        let account = user(UserRole::Journalist);
        let profile = Uuid::new_v4();

        let token = manager.generate_token(&account, Some(profile)).unwrap();
        let caller = manager.authenticate(&token).unwrap();

        assert_eq!(caller.user_id, account.id);
        assert_eq!(caller.role, UserRole::Journalist);
        assert_eq!(caller.journalist_id, Some(profile));
        assert_eq!(caller.email, account.email);
    }

    #[test]
    fn test_jwt_wrong_secret_is_invalid() {
        let token = JwtManager::new("one", 3600)
            .generate_token(&user(UserRole::Public), None)
            .unwrap();
        let err = JwtManager::new("two", 3600).authenticate(&token).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[test]
    fn test_jwt_expired() {
        // Past the default 60s leeway
        let manager = JwtManager::new("secret", 0);
        let now = Utc::now();
        let claims = JwtClaims {
            sub: Uuid::new_v4().to_string(),
            email: "a@b.c".to_string(),
            role: UserRole::Public,
            journalist_id: None,
            exp: (now - Duration::seconds(600)).timestamp(),
            iat: (now - Duration::seconds(700)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(
            manager.validate_token(&token).unwrap_err(),
            AppError::ExpiredToken
        ));
    }

    #[test]
    fn test_require_staff() {
        let caller = AuthUser {
            user_id: Uuid::new_v4(),
            email: "m@x.y".into(),
            role: UserRole::Moderator,
            journalist_id: None,
        };
        assert!(caller.require_staff("process the email queue").is_ok());

        let caller = AuthUser {
            role: UserRole::Journalist,
            ..caller
        };
        assert!(matches!(
            caller.require_staff("process the email queue"),
            Err(AppError::InsufficientRole { .. })
        ));
    }

    #[test]
    fn test_anonymous_sees_only_public() {
        let viewer = Viewer::anonymous();
        assert!(viewer.can_view(true, None));
        assert!(!viewer.can_view(false, Some(Uuid::new_v4())));
        assert!(!viewer.can_edit_case(None));
    }

    #[test]
    fn test_journalist_owns_their_cases() {
        let profile = Uuid::new_v4();
        let viewer = journalist(profile);
        assert!(viewer.can_view(false, Some(profile)));
        assert!(viewer.can_edit_case(Some(profile)));
        assert!(!viewer.can_view(false, Some(Uuid::new_v4())));
        assert!(!viewer.can_edit_case(Some(Uuid::new_v4())));
        // An unowned case is not editable just because both ids are absent
        assert!(!Viewer { journalist_id: None, ..viewer }.can_edit_case(None));
    }

    #[test]
    fn test_staff_can_edit_anything() {
        let viewer = Viewer {
            user_id: Some(Uuid::new_v4()),
            role: Some(UserRole::Admin),
            journalist_id: None,
        };
        assert!(viewer.can_view(false, Some(Uuid::new_v4())));
        assert!(viewer.can_edit_case(None));
    }

    #[test]
    fn test_public_role_cannot_see_private() {
        let viewer = Viewer {
            user_id: Some(Uuid::new_v4()),
            role: Some(UserRole::Public),
            journalist_id: None,
        };
        assert!(!viewer.can_view(false, None));
    }
}
