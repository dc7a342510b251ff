//! Registration and login handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::{clean, UserSummary};
use crate::extract::ApiJson;
use crate::AppState;
use casefile_common::{
    auth::{hash_password, verify_password},
    db::models::{JournalistProfile, UserRole},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    #[validate(length(max = 200))]
    pub name: Option<String>,

    pub role: Option<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journalist_profile: Option<JournalistProfile>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserSummary,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Argon2 is CPU bound, keep it off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Password task failed: {}", e),
        })
}

/// Create an account
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let role = req.role.unwrap_or_default();
    if !role.is_self_assignable() {
        return Err(AppError::forbidden(format!(
            "Role {} cannot be self-assigned",
            role
        )));
    }

    let email = normalize_email(&req.email);
    let password = req.password;
    let password_hash = blocking(move || hash_password(&password)).await??;

    let (user, journalist_profile) = state
        .repo()
        .register_user(&email, password_hash, clean(req.name), role)
        .await?;

    info!(user_id = %user.id, role = %role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserSummary::from(&user),
            journalist_profile,
        }),
    ))
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let repo = state.repo();
    let email = normalize_email(&req.email);

    let user = repo
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let password = req.password;
    let stored = user.password_hash.clone();
    if !blocking(move || verify_password(&password, &stored)).await? {
        return Err(AppError::InvalidCredentials);
    }

    if !user.is_active {
        return Err(AppError::Unauthorized {
            message: "Account is disabled".to_string(),
        });
    }

    let journalist_id = repo.find_profile_by_user_id(user.id).await?.map(|p| p.id);
    let token = state.jwt.generate_token(&user, journalist_id)?;

    info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer",
        expires_in: state.jwt.expiration_secs(),
        user: UserSummary::from(&user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Reporter@Example.ORG "), "reporter@example.org");
    }

    #[test]
    fn test_register_validation() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "not-an-email",
            "password": "short",
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_register_role_parses_screaming_case() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "j@example.org",
            "password": "long enough",
            "role": "JOURNALIST",
        }))
        .unwrap();

        assert!(req.validate().is_ok());
        assert_eq!(req.role, Some(UserRole::Journalist));
    }

    #[tokio::test]
    async fn test_blocking_runs_closure() {
        let hashed = blocking(|| hash_password("correct horse")).await.unwrap().unwrap();
        let ok = blocking(move || verify_password("correct horse", &hashed))
            .await
            .unwrap();
        assert!(ok);
    }
}
