//! Request extractors that reject with [`AppError`]
//!
//! Axum's own `Json` and `Query` rejections render as plain text. These wrappers
//! turn them into the JSON `ValidationError` body every other failure uses.

use crate::error::AppError;
use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use serde_json::json;

/// Message used for every malformed request
pub const INVALID_REQUEST: &str = "Invalid request data";

/// JSON body extractor
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::validation_with(
                INVALID_REQUEST,
                json!({ "body": rejection.body_text() }),
            )),
        }
    }
}

/// Query string extractor
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::validation_with(
                INVALID_REQUEST,
                json!({ "query": rejection.body_text() }),
            )),
        }
    }
}
