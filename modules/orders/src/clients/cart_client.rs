//! HTTP read of the user's cart at checkout.
//!
//! The cart is the only line-item source for a new order. Any non-200
//! answer maps to `CartUnavailable`, which the checkout route surfaces as a
//! 502 without emitting any event.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i32,
    pub price: i64,
    pub subtotal: i64,
}

#[derive(Debug, Error)]
pub enum CartError {
    #[error("cart service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone)]
pub struct CartClient {
    base_url: String,
    http: reqwest::Client,
}

impl CartClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into(),
            http,
        }
    }

    /// Fetch the authenticated user's cart lines.
    pub async fn fetch_cart(&self, user_id: i64) -> Result<Vec<CartLine>, CartError> {
        let url = format!("{}/api/cart", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .header(auth_context::USER_ID_HEADER, user_id.to_string())
            .send()
            .await
            .map_err(|e| CartError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CartError::Unavailable(format!(
                "cart returned {}",
                response.status()
            )));
        }

        response
            .json::<Vec<CartLine>>()
            .await
            .map_err(|e| CartError::Unavailable(format!("invalid cart response: {}", e)))
    }
}
