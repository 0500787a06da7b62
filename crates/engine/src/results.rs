//! Typed result unions for checkout operations.
//!
//! State conflicts are ordinary outcomes of the checkout state machine,
//! so they come back as named variants rather than errors; only broken
//! infrastructure and invariant violations surface as `EngineError`.

use domain::{Checkout, CheckoutStatus, Sku, SubSku};

/// Per-sku outcome of a lock attempt during checkout preparation.
#[derive(Debug, Clone)]
pub struct SkuLockSummary {
    /// The product identifier.
    pub sku: Sku,
    /// The variant the lock was attempted on.
    pub sub_sku: SubSku,
    /// True when any units were locked.
    pub locked: bool,
    /// Units the user asked for.
    pub requested_quantity: u32,
    /// Units actually locked.
    pub locked_quantity: u32,
    /// Available stock observed during the attempt.
    pub available_stock: u32,
    /// Why the lock failed or fell short, if it did.
    pub error_message: Option<String>,
}

impl SkuLockSummary {
    /// A lock granted at the full requested quantity.
    pub fn success(sku: Sku, sub_sku: SubSku, quantity: u32, available_stock: u32) -> Self {
        Self {
            sku,
            sub_sku,
            locked: true,
            requested_quantity: quantity,
            locked_quantity: quantity,
            available_stock,
            error_message: None,
        }
    }

    /// A lock granted below the requested quantity.
    pub fn partial(
        sku: Sku,
        sub_sku: SubSku,
        requested_quantity: u32,
        locked_quantity: u32,
        available_stock: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sku,
            sub_sku,
            locked: true,
            requested_quantity,
            locked_quantity,
            available_stock,
            error_message: Some(message.into()),
        }
    }

    /// A lock attempt that granted nothing.
    pub fn failed(
        sku: Sku,
        sub_sku: SubSku,
        requested_quantity: u32,
        available_stock: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sku,
            sub_sku,
            locked: false,
            requested_quantity,
            locked_quantity: 0,
            available_stock,
            error_message: Some(message.into()),
        }
    }

    /// Returns true when the full requested quantity was locked.
    pub fn fully_locked(&self) -> bool {
        self.locked && self.locked_quantity == self.requested_quantity
    }
}

/// Outcome of `prepare_checkout`.
#[derive(Debug)]
pub enum PrepareCheckoutResult {
    /// The cart had no items; nothing was locked.
    EmptyCart,

    /// The user already has an unexpired active checkout.
    ExistingCheckout(Checkout),

    /// No item could be locked; nothing was persisted.
    NoItemsLocked { summaries: Vec<SkuLockSummary> },

    /// Every item was locked at its full requested quantity.
    Success {
        checkout: Checkout,
        summaries: Vec<SkuLockSummary>,
    },

    /// At least one item was locked, but not all of them in full.
    PartialSuccess {
        checkout: Checkout,
        summaries: Vec<SkuLockSummary>,
    },
}

/// Machine-readable reason a sku failed validation during
/// `validate_and_reserve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockErrorCode {
    /// No units were available at all.
    OutOfStock,
    /// Some units were locked, fewer than requested.
    PartialStock,
    /// The inventory service refused or failed the lock.
    LockFailed,
}

impl StockErrorCode {
    /// Returns the wire-format code.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockErrorCode::OutOfStock => "OUT_OF_STOCK",
            StockErrorCode::PartialStock => "PARTIAL_STOCK",
            StockErrorCode::LockFailed => "LOCK_FAILED",
        }
    }
}

impl std::fmt::Display for StockErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-sku validation failure carried by `validate_and_reserve`.
#[derive(Debug, Clone)]
pub struct SkuValidationError {
    /// The affected product.
    pub sku: Sku,
    /// Machine-readable reason.
    pub error_code: StockErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// Outcome of `validate_and_reserve`.
#[derive(Debug)]
pub enum ValidateCheckoutResponse {
    /// The cart had no items; nothing was locked.
    EmptyCart,

    /// The user already has an unexpired active checkout.
    ExistingCheckout(Checkout),

    /// No item could be locked; per-sku reasons attached.
    NothingReserved { errors: Vec<SkuValidationError> },

    /// A checkout was created; shortfalls, if any, are attached.
    Reserved {
        checkout: Checkout,
        errors: Vec<SkuValidationError>,
    },
}

/// Outcome of `finalize_checkout`.
#[derive(Debug)]
pub enum FinalizeCheckoutResult {
    /// The checkout moved to WaitingPayment with fresh identifiers.
    Finalized { checkout: Checkout },

    /// The checkout was already finalized with the same order ID; the
    /// stored identifiers are returned unchanged.
    AlreadyFinalized {
        order_id: String,
        payment_code: String,
    },

    /// The reservation window elapsed; locks were released.
    Expired,

    /// The checkout is in a state that cannot be finalized.
    InvalidStatus(CheckoutStatus),
}

/// Outcome of `pay_checkout`.
#[derive(Debug)]
pub enum PayCheckoutResult {
    /// Payment recorded; the reservation was committed permanently.
    Paid { checkout: Checkout },

    /// The checkout was never finalized; there is nothing to pay.
    NotFinalized,

    /// The checkout is already paid.
    AlreadyPaid,

    /// The reservation window elapsed; locks were released.
    Expired,

    /// The checkout is in a state that cannot be paid.
    InvalidStatus(CheckoutStatus),

    /// The inventory commit failed; the checkout stays in
    /// WaitingPayment so payment can be retried.
    InventoryAcquireFailed { message: String },
}

/// Outcome of `invalidate_checkout`.
#[derive(Debug)]
pub enum CancelCheckoutResult {
    /// The checkout was cancelled and its locks released.
    Cancelled { checkout: Checkout },

    /// The checkout was already in a terminal state; nothing changed.
    AlreadyTerminal(CheckoutStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_constructors() {
        let ok = SkuLockSummary::success(Sku::new("A"), SubSku::new("A-1"), 3, 7);
        assert!(ok.fully_locked());
        assert!(ok.error_message.is_none());

        let partial =
            SkuLockSummary::partial(Sku::new("B"), SubSku::new("B-1"), 5, 2, 0, "short");
        assert!(partial.locked);
        assert!(!partial.fully_locked());
        assert_eq!(partial.locked_quantity, 2);

        let failed = SkuLockSummary::failed(Sku::new("C"), SubSku::new("C-1"), 4, 0, "gone");
        assert!(!failed.locked);
        assert_eq!(failed.locked_quantity, 0);
    }

    #[test]
    fn test_stock_error_codes() {
        assert_eq!(StockErrorCode::OutOfStock.as_str(), "OUT_OF_STOCK");
        assert_eq!(StockErrorCode::PartialStock.as_str(), "PARTIAL_STOCK");
        assert_eq!(StockErrorCode::LockFailed.as_str(), "LOCK_FAILED");
    }
}
