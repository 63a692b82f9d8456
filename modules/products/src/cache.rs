//! Best-effort Redis read cache for product rows.
//!
//! The cache is an optimization for the advisory read path only; the
//! authoritative stock check is the conditional UPDATE in the reservation
//! transaction. Every operation here swallows connection errors into a log
//! line, and a deployment without `REDIS_URL` runs with the cache disabled.

use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::{debug, warn};

use crate::repos::product_repo::Product;

/// Cached entries expire after ten minutes.
const TTL_SECS: u64 = 600;

#[derive(Clone)]
pub struct ProductCache {
    conn: Option<ConnectionManager>,
}

impl ProductCache {
    /// Connect to Redis; on failure the cache starts disabled.
    pub async fn connect(url: &str) -> Self {
        match redis::Client::open(url) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    debug!(url = %url, "Product cache connected");
                    Self { conn: Some(conn) }
                }
                Err(e) => {
                    warn!(error = %e, "Product cache unavailable, running without it");
                    Self { conn: None }
                }
            },
            Err(e) => {
                warn!(error = %e, "Invalid REDIS_URL, running without cache");
                Self { conn: None }
            }
        }
    }

    pub fn disabled() -> Self {
        Self { conn: None }
    }

    fn key(product_id: i64) -> String {
        format!("product:{}", product_id)
    }

    pub async fn get(&self, product_id: i64) -> Option<Product> {
        let mut conn = self.conn.clone()?;

        match conn.get::<_, Option<String>>(Self::key(product_id)).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(product_id = product_id, error = %e, "Cache read failed");
                None
            }
        }
    }

    pub async fn set(&self, product: &Product) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };

        let raw = match serde_json::to_string(product) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(product_id = product.id, error = %e, "Cache encode failed");
                return;
            }
        };

        if let Err(e) = conn
            .set_ex::<_, _, ()>(Self::key(product.id), raw, TTL_SECS)
            .await
        {
            warn!(product_id = product.id, error = %e, "Cache write failed");
        }
    }

    /// Delete the cached view. A miss is not an error.
    pub async fn invalidate(&self, product_id: i64) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };

        if let Err(e) = conn.del::<_, ()>(Self::key(product_id)).await {
            warn!(product_id = product_id, error = %e, "Cache invalidation failed");
        }
    }
}
