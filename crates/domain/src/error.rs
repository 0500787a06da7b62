//! Domain error types.

use thiserror::Error;

use crate::status::CheckoutStatus;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity must be at least 1.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Item not found in cart.
    #[error("Item not found in cart: {sku}")]
    ItemNotFound { sku: String },

    /// Requested quantity exceeds available stock.
    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: u32,
        available: u32,
    },
}

/// Errors that can occur during checkout state transitions.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Checkout is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: CheckoutStatus,
        action: &'static str,
    },
}
