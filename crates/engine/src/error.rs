//! Engine error types.

use domain::{CartError, CheckoutError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
///
/// State conflicts on checkout operations are not errors; they come back
/// as variants of the typed result unions in [`crate::results`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input failed validation before reaching any store.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// The catalog does not know the product, or it is inactive.
    #[error("Product not found or inactive: {sku}")]
    ProductNotFound { sku: String },

    /// No checkout exists with the given identifier.
    #[error("Checkout not found: {checkout_id}")]
    CheckoutNotFound { checkout_id: String },

    /// The checkout belongs to a different user.
    #[error("Checkout {checkout_id} is not owned by the requesting user")]
    Unauthorized { checkout_id: String },

    /// A cart invariant was violated.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// A checkout state transition was rejected.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// A store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The inventory service failed.
    #[error("Inventory error: {0}")]
    Inventory(String),

    /// The product catalog failed.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
