//! Admin product CRUD and the advisory read path.
//!
//! Reads go through the best-effort cache; every committed mutation
//! publishes a product event for the cart-side mirror and invalidates the
//! cached view.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use event_contracts::{ProductEvent, ProductRecord};

use crate::events::publisher::publish_product_event;
use crate::repos::product_repo::{self, Product, ProductError, ProductInput};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error response wrapper for proper HTTP error handling
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

impl From<ProductError> for ApiError {
    fn from(e: ProductError) -> Self {
        let status = match e {
            ProductError::NotFound(_) => StatusCode::NOT_FOUND,
            ProductError::Invalid(_) => StatusCode::BAD_REQUEST,
            ProductError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: e.to_string(),
        }
    }
}

fn record(product: &Product) -> ProductRecord {
    ProductRecord {
        id: product.id,
        name: product.name.clone(),
        price: product.price,
        stock: product.stock,
    }
}

/// Handler for GET /api/products
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    let products = product_repo::list(&state.pool).await?;
    Ok(Json(products))
}

/// Handler for GET /api/products/{id}
///
/// Cache read-through: the stale window is bounded by the TTL and by
/// invalidation on every mutation, and the value is advisory anyway.
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    if let Some(cached) = state.cache.get(id).await {
        return Ok(Json(cached));
    }

    let product = product_repo::get(&state.pool, id).await?;
    state.cache.set(&product).await;
    Ok(Json(product))
}

/// Handler for POST /api/products
pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = product_repo::create(&state.pool, &input).await?;

    if let Err(e) = publish_product_event(&state.broker, &ProductEvent::Created(record(&product))).await
    {
        tracing::error!(product_id = product.id, error = %e, "Failed to publish product.created");
    }

    Ok((StatusCode::CREATED, Json(product)))
}

/// Handler for PUT /api/products/{id}
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<ProductInput>,
) -> Result<Json<Product>, ApiError> {
    let product = product_repo::update(&state.pool, id, &input).await?;
    state.cache.invalidate(id).await;

    if let Err(e) = publish_product_event(&state.broker, &ProductEvent::Updated(record(&product))).await
    {
        tracing::error!(product_id = id, error = %e, "Failed to publish product.updated");
    }

    Ok(Json(product))
}

/// Handler for DELETE /api/products/{id}
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    product_repo::delete(&state.pool, id).await?;
    state.cache.invalidate(id).await;

    if let Err(e) =
        publish_product_event(&state.broker, &ProductEvent::Deleted { product_id: id }).await
    {
        tracing::error!(product_id = id, error = %e, "Failed to publish product.deleted");
    }

    Ok(StatusCode::NO_CONTENT)
}
