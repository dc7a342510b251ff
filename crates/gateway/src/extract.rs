//! Request extractors that reject with `AppError`
//!
//! axum's own `Json`, `Path` and `Query` reject with plain-text bodies; these
//! wrappers turn the rejection into the structured 400 every other error
//! uses and run `validator` rules on JSON bodies.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use casefile_common::errors::AppError;
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSON body, deserialized and validated
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::InvalidFormat {
                message: rejection.body_text(),
            })?;

        value.validate()?;
        Ok(ApiJson(value))
    }
}

/// Query string
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::InvalidFormat {
                message: rejection.body_text(),
            })?;

        Ok(ApiQuery(value))
    }
}

/// Path parameters
#[derive(Debug, Clone, Copy)]
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::InvalidFormat {
                message: rejection.body_text(),
            })?;

        Ok(ApiPath(value))
    }
}
