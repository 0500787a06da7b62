//! Commerce events emitted by the engine.
//!
//! Publication is fire-and-forget: the sink signature is infallible and
//! no engine operation depends on delivery.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

/// Events that can occur across the cart and checkout lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CommerceEvent {
    /// A cart was created or mutated.
    CartUpdated(CartUpdatedData),

    /// A cart was cleared and deleted.
    CartCleared(CartClearedData),

    /// A checkout was prepared and inventory locks taken.
    CheckoutPrepared(CheckoutPreparedData),

    /// A checkout was assigned order/payment identifiers.
    CheckoutFinalized(CheckoutFinalizedData),

    /// A checkout was paid and its locks committed.
    CheckoutPaid(CheckoutPaidData),

    /// A checkout was cancelled and its locks released.
    CheckoutCancelled(CheckoutLifecycleData),

    /// A checkout's reservation window elapsed and its locks were released.
    CheckoutExpired(CheckoutLifecycleData),
}

impl CommerceEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            CommerceEvent::CartUpdated(_) => "CartUpdated",
            CommerceEvent::CartCleared(_) => "CartCleared",
            CommerceEvent::CheckoutPrepared(_) => "CheckoutPrepared",
            CommerceEvent::CheckoutFinalized(_) => "CheckoutFinalized",
            CommerceEvent::CheckoutPaid(_) => "CheckoutPaid",
            CommerceEvent::CheckoutCancelled(_) => "CheckoutCancelled",
            CommerceEvent::CheckoutExpired(_) => "CheckoutExpired",
        }
    }
}

/// Data for CartUpdated events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartUpdatedData {
    /// Owner of the cart.
    pub user_id: UserId,
    /// Number of distinct line items after the mutation.
    pub item_count: usize,
    /// Cart total in cents after the mutation.
    pub total_cents: i64,
    /// When the mutation happened.
    pub at: DateTime<Utc>,
}

/// Data for CartCleared events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartClearedData {
    /// Owner of the cart.
    pub user_id: UserId,
    /// When the cart was cleared.
    pub at: DateTime<Utc>,
}

/// Data for CheckoutPrepared events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutPreparedData {
    /// The new checkout.
    pub checkout_id: String,
    /// Owner of the checkout.
    pub user_id: UserId,
    /// Number of line items carried into the checkout.
    pub item_count: usize,
    /// True when every item was locked at its full requested quantity.
    pub fully_locked: bool,
    /// Charged total in cents.
    pub total_cents: i64,
    /// When the locks expire.
    pub expires_at: DateTime<Utc>,
}

/// Data for CheckoutFinalized events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutFinalizedData {
    /// The finalized checkout.
    pub checkout_id: String,
    /// Owner of the checkout.
    pub user_id: UserId,
    /// Assigned order identifier.
    pub order_id: String,
    /// Assigned payment code.
    pub payment_code: String,
    /// When finalization happened.
    pub at: DateTime<Utc>,
}

/// Data for CheckoutPaid events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutPaidData {
    /// The paid checkout.
    pub checkout_id: String,
    /// Owner of the checkout.
    pub user_id: UserId,
    /// The order the payment applies to.
    pub order_id: String,
    /// When payment was recorded.
    pub at: DateTime<Utc>,
}

/// Data for CheckoutCancelled and CheckoutExpired events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLifecycleData {
    /// The affected checkout.
    pub checkout_id: String,
    /// Owner of the checkout.
    pub user_id: UserId,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

/// Sink for commerce events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes an event. Delivery is best-effort.
    async fn publish(&self, event: CommerceEvent);
}

/// Event sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: CommerceEvent) {}
}

/// Event sink that logs each event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: CommerceEvent) {
        tracing::info!(event_type = event.event_type(), ?event, "commerce event");
    }
}

/// Event sink that records events for test assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<RwLock<Vec<CommerceEvent>>>,
}

impl RecordingEventSink {
    /// Creates a new empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events.
    pub fn events(&self) -> Vec<CommerceEvent> {
        self.events.read().unwrap().clone()
    }

    /// Returns the recorded event type names, in order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .read()
            .unwrap()
            .iter()
            .map(CommerceEvent::event_type)
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: CommerceEvent) {
        self.events.write().unwrap().push(event);
    }
}
