//! Checkout state machine.

use serde::{Deserialize, Serialize};

/// The state of a checkout session in its lifecycle.
///
/// State transitions:
/// ```text
/// Reserved ──► WaitingPayment ──► Finalized
///     │               │
///     └───────────────┴──► Cancelled | Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStatus {
    /// Inventory locks are held, awaiting finalization into an order.
    #[default]
    Reserved,

    /// An order ID and payment code have been assigned, awaiting payment.
    WaitingPayment,

    /// Payment committed the reservation permanently (terminal state).
    Finalized,

    /// The user abandoned the checkout and locks were released (terminal state).
    Cancelled,

    /// The reservation window elapsed and locks were released (terminal state).
    Expired,
}

impl CheckoutStatus {
    /// Returns true if the checkout still holds inventory locks.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CheckoutStatus::Reserved | CheckoutStatus::WaitingPayment
        )
    }

    /// Returns true if the checkout can be finalized in this state.
    pub fn can_finalize(&self) -> bool {
        matches!(self, CheckoutStatus::Reserved)
    }

    /// Returns true if the checkout can be paid in this state.
    pub fn can_pay(&self) -> bool {
        matches!(self, CheckoutStatus::WaitingPayment)
    }

    /// Returns true if the checkout can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        self.is_active()
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutStatus::Finalized | CheckoutStatus::Cancelled | CheckoutStatus::Expired
        )
    }

    /// Returns the status name as it is persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Reserved => "RESERVED",
            CheckoutStatus::WaitingPayment => "WAITING_PAYMENT",
            CheckoutStatus::Finalized => "FINALIZED",
            CheckoutStatus::Cancelled => "CANCELLED",
            CheckoutStatus::Expired => "EXPIRED",
        }
    }

    /// Parses a persisted status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RESERVED" => Some(CheckoutStatus::Reserved),
            "WAITING_PAYMENT" => Some(CheckoutStatus::WaitingPayment),
            "FINALIZED" => Some(CheckoutStatus::Finalized),
            "CANCELLED" => Some(CheckoutStatus::Cancelled),
            "EXPIRED" => Some(CheckoutStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
