//! Cart HTTP surface.
//!
//! The stock check on add-to-cart is advisory: it catches obvious mistakes
//! at the UI, but the only authoritative gate is the reservation
//! transaction during the saga. When the snapshot mirror hasn't caught up,
//! the check falls back to asking the product service directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use auth_context::AuthUser;

use crate::clients::product_client::ProductClientError;
use crate::repos::{cart_repo, snapshot_repo};
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

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("database error: {}", e),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: i64,
    pub quantity: i32,
}

/// The wire shape the order service reads at checkout.
#[derive(Debug, Serialize)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i32,
    pub price: i64,
    pub subtotal: i64,
}

/// Handler for POST /api/cart
pub async fn add_to_cart(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(request): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<Vec<CartLine>>), ApiError> {
    if request.quantity < 1 {
        return Err(ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "quantity must be positive".to_string(),
        });
    }

    // Advisory stock view: snapshot first, catalog as fallback.
    let (price, stock) = match snapshot_repo::get(&state.pool, request.product_id).await? {
        Some(snapshot) => (snapshot.price, snapshot.stock),
        None => {
            let product = state
                .products
                .get_product(request.product_id)
                .await
                .map_err(|e| match e {
                    ProductClientError::NotFound => ApiError {
                        status: StatusCode::NOT_FOUND,
                        message: "product not found".to_string(),
                    },
                    ProductClientError::Unavailable(detail) => ApiError {
                        status: StatusCode::BAD_GATEWAY,
                        message: format!("product service unavailable: {}", detail),
                    },
                })?;
            (product.price, product.stock)
        }
    };

    if stock < request.quantity as i64 {
        return Err(ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "insufficient stock".to_string(),
        });
    }

    cart_repo::add_item(
        &state.pool,
        user_id,
        request.product_id,
        request.quantity,
        price,
    )
    .await?;

    let items = cart_lines(&state, user_id).await?;
    Ok((StatusCode::CREATED, Json(items)))
}

/// Handler for GET /api/cart
pub async fn get_cart(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CartLine>>, ApiError> {
    let items = cart_lines(&state, user_id).await?;
    Ok(Json(items))
}

/// Handler for DELETE /api/cart
pub async fn clear_cart(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    cart_repo::clear(&state.pool, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cart_lines(state: &AppState, user_id: i64) -> Result<Vec<CartLine>, sqlx::Error> {
    let items = cart_repo::list(&state.pool, user_id).await?;
    Ok(items
        .into_iter()
        .map(|item| CartLine {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
            subtotal: item.subtotal,
        })
        .collect())
}
