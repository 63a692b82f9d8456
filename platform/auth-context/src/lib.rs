//! # Auth Context
//!
//! Identity at the service boundary. The gateway validates JWTs and forwards
//! the subject as an `x-user-id` header; services behind it trust that
//! header and never see a token. [`AuthUser`] is the axum extractor that
//! makes the contract explicit in handler signatures.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use serde::Serialize;

/// Header installed by the JWT-validating gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated user id, extracted from the trusted gateway header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

#[derive(Debug, Serialize)]
pub struct AuthError {
    pub error: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<AuthError>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|id| *id > 0);

        match user_id {
            Some(id) => Ok(AuthUser(id)),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(AuthError {
                    error: "missing or invalid user identity".to_string(),
                }),
            )),
        }
    }
}
