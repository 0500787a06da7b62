//! Checkout session: a time-boxed set of inventory reservations.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::CheckoutError;
use crate::status::CheckoutStatus;
use crate::value_objects::{CheckoutId, Money, Sku, SubSku};

/// A line item inside a checkout.
///
/// `quantity` is what the user asked for; `locked_quantity` is what the
/// inventory service actually granted. The two differ on partial locks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    /// The product identifier.
    pub sku: Sku,

    /// The variant the lock was taken on.
    pub sub_sku: SubSku,

    /// Human-readable product title.
    pub title: String,

    /// Unit price at lock time.
    pub price_snapshot: Money,

    /// Quantity requested by the user.
    pub quantity: u32,

    /// Quantity actually locked (0 when the lock failed).
    pub locked_quantity: u32,

    /// Available stock observed when locking.
    pub available_stock_snapshot: u32,

    /// True when a lock is held for this line.
    pub reserved: bool,

    /// Why the lock failed or fell short, if it did.
    pub reservation_error: Option<String>,
}

impl CheckoutItem {
    /// Returns the charged total for this line (price * locked quantity).
    ///
    /// Units that were never locked are not charged.
    pub fn line_total(&self) -> Money {
        if self.reserved {
            self.price_snapshot.multiply(self.locked_quantity)
        } else {
            Money::zero()
        }
    }

    /// Returns true if the lock covered the full requested quantity.
    pub fn fully_locked(&self) -> bool {
        self.reserved && self.locked_quantity == self.quantity
    }

    /// Returns true if the lock covered some but not all of the request.
    pub fn partially_locked(&self) -> bool {
        self.reserved && self.locked_quantity < self.quantity
    }
}

/// A checkout session holding inventory locks until paid, cancelled or
/// expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    /// Identifier of this checkout session.
    pub checkout_id: CheckoutId,

    /// Owner of the checkout. Only this user may act on it.
    pub user_id: UserId,

    /// The cart this checkout was prepared from (carts are keyed by user).
    pub source_cart_user_id: UserId,

    /// Line items, in cart order.
    pub items: Vec<CheckoutItem>,

    /// Sum of line totals over reserved items.
    pub total_amount: Money,

    /// ISO currency code.
    pub currency: String,

    /// Current lifecycle state.
    pub status: CheckoutStatus,

    /// When the inventory locks were taken.
    pub locked_at: DateTime<Utc>,

    /// When the reservation window ends.
    pub expires_at: DateTime<Utc>,

    /// When the checkout was created.
    pub created_at: DateTime<Utc>,

    /// Set when payment committed the reservation.
    pub paid_at: Option<DateTime<Utc>>,

    /// Set when the user cancelled the checkout.
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Order identifier assigned at finalization.
    pub order_id: Option<String>,

    /// Payment code assigned at finalization.
    pub payment_code: Option<String>,
}

impl Checkout {
    /// Creates a freshly reserved checkout over the given items.
    ///
    /// The total is computed from the reserved items' locked quantities.
    pub fn reserve(
        user_id: UserId,
        items: Vec<CheckoutItem>,
        currency: impl Into<String>,
        locked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let total_amount = items.iter().map(CheckoutItem::line_total).sum();
        Self {
            checkout_id: CheckoutId::generate(),
            user_id,
            source_cart_user_id: user_id,
            items,
            total_amount,
            currency: currency.into(),
            status: CheckoutStatus::Reserved,
            locked_at,
            expires_at,
            created_at: locked_at,
            paid_at: None,
            cancelled_at: None,
            order_id: None,
            payment_code: None,
        }
    }

    /// Returns the items that hold a lock.
    pub fn reserved_items(&self) -> impl Iterator<Item = &CheckoutItem> {
        self.items.iter().filter(|item| item.reserved)
    }

    /// Returns the skus whose full requested quantity was locked.
    pub fn fully_locked_skus(&self) -> Vec<Sku> {
        self.items
            .iter()
            .filter(|item| item.fully_locked())
            .map(|item| item.sku.clone())
            .collect()
    }

    /// Returns true if every item holds a full lock.
    pub fn all_items_fully_locked(&self) -> bool {
        self.items.iter().all(CheckoutItem::fully_locked)
    }

    /// Returns true if the reservation window has elapsed while the
    /// checkout is still active. Terminal checkouts never report expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && now > self.expires_at
    }

    /// Assigns the order identifiers and moves Reserved -> WaitingPayment.
    pub fn finalize(
        &mut self,
        order_id: impl Into<String>,
        payment_code: impl Into<String>,
    ) -> Result<(), CheckoutError> {
        if !self.status.can_finalize() {
            return Err(CheckoutError::InvalidStateTransition {
                current_state: self.status,
                action: "finalize",
            });
        }
        self.order_id = Some(order_id.into());
        self.payment_code = Some(payment_code.into());
        self.status = CheckoutStatus::WaitingPayment;
        Ok(())
    }

    /// Moves WaitingPayment -> Finalized and stamps `paid_at`.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        if !self.status.can_pay() {
            return Err(CheckoutError::InvalidStateTransition {
                current_state: self.status,
                action: "pay",
            });
        }
        self.status = CheckoutStatus::Finalized;
        self.paid_at = Some(now);
        Ok(())
    }

    /// Moves an active checkout to Cancelled and stamps `cancelled_at`.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        if !self.status.can_cancel() {
            return Err(CheckoutError::InvalidStateTransition {
                current_state: self.status,
                action: "cancel",
            });
        }
        self.status = CheckoutStatus::Cancelled;
        self.cancelled_at = Some(now);
        Ok(())
    }

    /// Moves an active checkout to Expired.
    pub fn expire(&mut self) -> Result<(), CheckoutError> {
        if !self.status.is_active() {
            return Err(CheckoutError::InvalidStateTransition {
                current_state: self.status,
                action: "expire",
            });
        }
        self.status = CheckoutStatus::Expired;
        Ok(())
    }
}
