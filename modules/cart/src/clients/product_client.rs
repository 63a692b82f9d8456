//! Advisory fallback to the product service for products the snapshot
//! mirror hasn't seen yet (the mirror may lag behind the catalog).

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct ProductView {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub stock: i64,
}

#[derive(Debug, Error)]
pub enum ProductClientError {
    #[error("product not found")]
    NotFound,

    #[error("product service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone)]
pub struct ProductClient {
    base_url: String,
    http: reqwest::Client,
}

impl ProductClient {
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

    pub async fn get_product(&self, product_id: i64) -> Result<ProductView, ProductClientError> {
        let url = format!(
            "{}/api/products/{}",
            self.base_url.trim_end_matches('/'),
            product_id
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProductClientError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProductClientError::NotFound);
        }
        if !response.status().is_success() {
            return Err(ProductClientError::Unavailable(format!(
                "product service returned {}",
                response.status()
            )));
        }

        response
            .json::<ProductView>()
            .await
            .map_err(|e| ProductClientError::Unavailable(format!("invalid response: {}", e)))
    }
}
