//! Order HTTP surface: checkout plus user-scoped reads and the admin
//! status transition.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use auth_context::AuthUser;
use event_contracts::{Envelope, OrderCreated, OrderLine, SagaEvent};

use crate::clients::cart_client::CartError;
use crate::events::publisher::publish_saga_event;
use crate::repos::order_repo::{self, NewOrderItem, Order, OrderError, OrderStatus};
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

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        let status = match e {
            OrderError::Invalid(_) => StatusCode::BAD_REQUEST,
            OrderError::NotFound => StatusCode::NOT_FOUND,
            OrderError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Handler for POST /api/orders
///
/// Reads the caller's cart, persists the order in Pending, and emits
/// `order.created` to start the fulfillment saga. The cart check here is the
/// last advisory one; the reservation transaction is the authoritative
/// stock gate.
pub async fn create_order(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    // The body is optional; an empty one means no shipping address.
    let request: CreateOrderRequest = if body.is_empty() {
        CreateOrderRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError {
            status: StatusCode::BAD_REQUEST,
            message: format!("invalid request body: {}", e),
        })?
    };

    let cart = state.cart.fetch_cart(user_id).await.map_err(|e| {
        let CartError::Unavailable(detail) = &e;
        tracing::error!(user_id = user_id, error = %detail, "Cart fetch failed");
        ApiError {
            status: StatusCode::BAD_GATEWAY,
            message: e.to_string(),
        }
    })?;

    if cart.is_empty() {
        return Err(ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "cart is empty".to_string(),
        });
    }

    let items: Vec<NewOrderItem> = cart
        .iter()
        .map(|line| NewOrderItem {
            product_id: line.product_id,
            quantity: line.quantity,
            price: line.price,
        })
        .collect();

    let order =
        order_repo::create_order(&state.pool, user_id, request.shipping_address, &items).await?;

    let event = SagaEvent::OrderCreated(Envelope::new(
        order.uuid.clone(),
        OrderCreated {
            user_id,
            total: order.total,
            currency: state.currency.clone(),
            items: order
                .items
                .iter()
                .map(|item| OrderLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        },
    ));

    // The order row is committed; a failed publish leaves a Pending order
    // for the operator rather than failing the checkout.
    if let Err(e) = publish_saga_event(&state.broker, &event).await {
        tracing::error!(order_uuid = %order.uuid, error = %e, "Failed to publish order.created");
    }

    Ok((StatusCode::CREATED, Json(order)))
}

/// Handler for GET /api/orders
pub async fn list_orders(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = order_repo::list_by_user(&state.pool, user_id).await?;
    Ok(Json(orders))
}

/// Handler for GET /api/orders/{id}
pub async fn get_order(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Order>, ApiError> {
    let order = order_repo::get_by_id(&state.pool, user_id, order_id).await?;
    Ok(Json(order))
}

/// Handler for PUT /api/orders/{id}/status
///
/// Admin transition (Shipped/Delivered); unconditional but user-scoped.
pub async fn update_order_status(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order =
        order_repo::update_status(&state.pool, user_id, order_id, request.status).await?;
    Ok(Json(order))
}
