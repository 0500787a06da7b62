//! Durable document repositories for carts and checkouts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::UserId;
use domain::{Cart, Checkout, CheckoutId};

use crate::error::Result;

/// Repository for carts, keyed by owning user.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Loads a user's cart, if one was ever persisted.
    async fn find_by_user_id(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Persists a cart, bumping its version and stamping `updated_at`.
    ///
    /// Last write wins. Returns the stored copy with the bumped version.
    async fn save(&self, cart: &Cart) -> Result<Cart>;

    /// Deletes a user's cart. Absent carts are not an error.
    async fn delete_by_user_id(&self, user_id: UserId) -> Result<()>;
}

/// Repository for checkout sessions.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Loads a checkout by its identifier.
    async fn find_by_checkout_id(&self, checkout_id: &CheckoutId) -> Result<Option<Checkout>>;

    /// Loads the user's lock-holding checkout (Reserved or WaitingPayment),
    /// if any.
    async fn find_active_by_user_id(&self, user_id: UserId) -> Result<Option<Checkout>>;

    /// Inserts a new active checkout.
    ///
    /// Fails with [`StoreError::ActiveCheckoutExists`] when the user
    /// already has an active checkout. The check and the insert are one
    /// atomic step, so two concurrent prepares cannot both succeed.
    ///
    /// [`StoreError::ActiveCheckoutExists`]: crate::StoreError::ActiveCheckoutExists
    async fn insert_active(&self, checkout: &Checkout) -> Result<()>;

    /// Updates an existing checkout in place.
    async fn save(&self, checkout: &Checkout) -> Result<()>;

    /// Returns active checkouts whose reservation window ended before
    /// `cutoff`, oldest deadline first, at most `limit` of them.
    async fn find_expired(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<Vec<Checkout>>;

    /// Deletes a checkout. Absent checkouts are not an error.
    async fn delete(&self, checkout_id: &CheckoutId) -> Result<()>;
}
