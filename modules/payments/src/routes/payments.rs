//! Payment read API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::repos::payment_repo::{self, Payment, PaymentError};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        let status = match e {
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::Duplicate(_) => StatusCode::CONFLICT,
            PaymentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: e.to_string(),
        }
    }
}

/// Handler for GET /api/payments/{order_uuid}
pub async fn get_payment(
    State(state): State<AppState>,
    Path(order_uuid): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    let payment = payment_repo::get_by_order_uuid(&state.pool, &order_uuid).await?;
    Ok(Json(payment))
}
