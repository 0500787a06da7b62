//! The fast store: a TTL'd key/value cache in front of the durable store.

use std::time::Duration;

use async_trait::async_trait;
use common::UserId;
use domain::CheckoutId;

use crate::error::Result;

/// Cache key for a user's cart.
pub fn cart_cache_key(user_id: UserId) -> String {
    format!("cart:user:{user_id}")
}

/// Cache key for a checkout session.
pub fn checkout_cache_key(checkout_id: &CheckoutId) -> String {
    format!("checkout:{checkout_id}")
}

/// A key/value cache with per-entry TTL.
///
/// Values are opaque serialized documents. The cache is an accelerator,
/// not a source of truth: callers must tolerate misses and fall back to
/// the durable store.
#[async_trait]
pub trait FastStore: Send + Sync {
    /// Returns the value for a key, or `None` on miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores a value under a key with the given time-to-live.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Removes a key. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
