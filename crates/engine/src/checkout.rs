//! Checkout engine: prepares, finalizes, pays, cancels and expires
//! checkout sessions.

use chrono::Utc;
use common::UserId;
use domain::{Cart, CartItem, Checkout, CheckoutId, CheckoutItem, CheckoutStatus};
use store::{CartStore, CheckoutStore, FastStore, StoreError, checkout_cache_key};
use uuid::Uuid;

use crate::cart::CartManager;
use crate::clients::{InventoryClient, ProductCatalog};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{
    CheckoutFinalizedData, CheckoutLifecycleData, CheckoutPaidData, CheckoutPreparedData,
    CommerceEvent, EventSink,
};
use crate::lease::UserLeases;
use crate::results::{
    CancelCheckoutResult, FinalizeCheckoutResult, PayCheckoutResult, PrepareCheckoutResult,
    SkuLockSummary, SkuValidationError, StockErrorCode, ValidateCheckoutResponse,
};

/// Generates an order identifier: `{prefix}-{yyyymmdd}-{4 hex}`.
pub fn generate_order_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d"), &hex[..4])
}

/// Generates a payment code: `{prefix}-{8 hex}`.
pub fn generate_payment_code(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", prefix, &hex[..8])
}

/// Owns the checkout lifecycle.
///
/// Prepare locks inventory per line item with partial-lock tolerance;
/// finalize and pay convert the reservation into an order exactly once;
/// cancel and expiry release every held lock. Check-then-act sequences
/// run under the per-user lease, and the checkout store's atomic
/// `insert_active` closes the cross-process prepare race.
#[derive(Clone)]
pub struct CheckoutEngine<F, C, K, I, P, E>
where
    F: FastStore,
    C: CartStore,
    K: CheckoutStore,
    I: InventoryClient,
    P: ProductCatalog,
    E: EventSink,
{
    cart_manager: CartManager<F, C, P, E>,
    fast: F,
    checkouts: K,
    inventory: I,
    events: E,
    config: EngineConfig,
    leases: UserLeases,
}

impl<F, C, K, I, P, E> CheckoutEngine<F, C, K, I, P, E>
where
    F: FastStore,
    C: CartStore,
    K: CheckoutStore,
    I: InventoryClient,
    P: ProductCatalog,
    E: EventSink,
{
    /// Creates a new checkout engine.
    ///
    /// `fast` should be the same fast store the cart manager writes to.
    pub fn new(
        cart_manager: CartManager<F, C, P, E>,
        fast: F,
        checkouts: K,
        inventory: I,
        events: E,
        config: EngineConfig,
    ) -> Self {
        Self {
            cart_manager,
            fast,
            checkouts,
            inventory,
            events,
            config,
            leases: UserLeases::new(),
        }
    }

    /// Returns the cart manager this engine prepares checkouts from.
    pub fn cart_manager(&self) -> &CartManager<F, C, P, E> {
        &self.cart_manager
    }

    /// Prepares a checkout from the user's cart, locking inventory per
    /// line item.
    ///
    /// Each item is locked at `min(requested, available)`; items that
    /// cannot be locked at all ride along unreserved. When nothing at
    /// all could be locked the attempt is abandoned and any stray
    /// acquisitions are released.
    #[tracing::instrument(skip(self))]
    pub async fn prepare_checkout(&self, user_id: UserId) -> Result<PrepareCheckoutResult> {
        let started = std::time::Instant::now();

        let _lease = self.leases.acquire(user_id).await;

        // The active checkout wins over whatever is in the cart; a
        // concurrent prepare that already emptied the cart must still
        // surface its checkout here.
        if let Some(existing) = self.checkouts.find_active_by_user_id(user_id).await? {
            if existing.is_expired(Utc::now()) {
                // Leftover from an abandoned session; clean it up and
                // let this prepare proceed.
                self.expire_locked(existing).await?;
            } else {
                return Ok(PrepareCheckoutResult::ExistingCheckout(existing));
            }
        }

        let cart = self.cart_manager.get_cart(user_id).await?;
        if cart.is_empty() {
            return Ok(PrepareCheckoutResult::EmptyCart);
        }

        let (items, summaries) = self.lock_cart_items(&cart).await;

        if !items.iter().any(|item| item.reserved) {
            self.release_items(&items).await;
            return Ok(PrepareCheckoutResult::NoItemsLocked { summaries });
        }

        let now = Utc::now();
        let checkout = Checkout::reserve(
            user_id,
            items,
            cart.currency.clone(),
            now,
            now + self.config.reservation_window(),
        );

        match self.checkouts.insert_active(&checkout).await {
            Ok(()) => {}
            Err(StoreError::ActiveCheckoutExists { .. }) => {
                // A concurrent prepare from another process won; give
                // back what we just locked and surface the survivor.
                self.release_items(&checkout.items).await;
                if let Some(survivor) = self.checkouts.find_active_by_user_id(user_id).await? {
                    return Ok(PrepareCheckoutResult::ExistingCheckout(survivor));
                }
                return Err(StoreError::ActiveCheckoutExists { user_id }.into());
            }
            Err(e) => {
                self.release_items(&checkout.items).await;
                return Err(e.into());
            }
        }

        self.cache_checkout(&checkout).await;

        let fully_locked = checkout.fully_locked_skus();
        if !fully_locked.is_empty()
            && let Err(e) = self.cart_manager.bulk_remove_items(user_id, &fully_locked).await
        {
            tracing::warn!(%user_id, error = %e, "removing locked items from cart failed");
        }

        let all_locked = summaries.iter().all(SkuLockSummary::fully_locked);
        self.events
            .publish(CommerceEvent::CheckoutPrepared(CheckoutPreparedData {
                checkout_id: checkout.checkout_id.to_string(),
                user_id,
                item_count: checkout.items.len(),
                fully_locked: all_locked,
                total_cents: checkout.total_amount.cents(),
                expires_at: checkout.expires_at,
            }))
            .await;
        metrics::counter!("checkout_prepared_total").increment(1);
        metrics::histogram!("checkout_prepare_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if all_locked {
            Ok(PrepareCheckoutResult::Success { checkout, summaries })
        } else {
            Ok(PrepareCheckoutResult::PartialSuccess { checkout, summaries })
        }
    }

    /// Prepare variant that reports per-sku failures with machine
    /// readable codes instead of discarding a partially locked checkout.
    #[tracing::instrument(skip(self))]
    pub async fn validate_and_reserve(&self, user_id: UserId) -> Result<ValidateCheckoutResponse> {
        Ok(match self.prepare_checkout(user_id).await? {
            PrepareCheckoutResult::EmptyCart => ValidateCheckoutResponse::EmptyCart,
            PrepareCheckoutResult::ExistingCheckout(checkout) => {
                ValidateCheckoutResponse::ExistingCheckout(checkout)
            }
            PrepareCheckoutResult::NoItemsLocked { summaries } => {
                ValidateCheckoutResponse::NothingReserved {
                    errors: summaries.iter().map(summary_to_validation).collect(),
                }
            }
            PrepareCheckoutResult::Success { checkout, .. } => ValidateCheckoutResponse::Reserved {
                checkout,
                errors: Vec::new(),
            },
            PrepareCheckoutResult::PartialSuccess { checkout, summaries } => {
                ValidateCheckoutResponse::Reserved {
                    checkout,
                    errors: summaries
                        .iter()
                        .filter(|s| !s.fully_locked())
                        .map(summary_to_validation)
                        .collect(),
                }
            }
        })
    }

    /// Returns a checkout, enforcing ownership and expiring it on read
    /// when the reservation window has elapsed.
    #[tracing::instrument(skip(self))]
    pub async fn get_checkout(
        &self,
        checkout_id: &CheckoutId,
        user_id: UserId,
    ) -> Result<Checkout> {
        let checkout = self
            .load_checkout(checkout_id)
            .await?
            .ok_or_else(|| EngineError::CheckoutNotFound {
                checkout_id: checkout_id.to_string(),
            })?;

        if checkout.user_id != user_id {
            return Err(EngineError::Unauthorized {
                checkout_id: checkout_id.to_string(),
            });
        }

        if !checkout.is_expired(Utc::now()) {
            return Ok(checkout);
        }

        // Expiry-on-read. Re-read under the lease so two concurrent
        // readers release the locks exactly once: the loser reloads a
        // checkout that is no longer active.
        let _lease = self.leases.acquire(user_id).await;
        let fresh = self
            .checkouts
            .find_by_checkout_id(checkout_id)
            .await?
            .ok_or_else(|| EngineError::CheckoutNotFound {
                checkout_id: checkout_id.to_string(),
            })?;
        if fresh.is_expired(Utc::now()) {
            return self.expire_locked(fresh).await;
        }
        Ok(fresh)
    }

    /// Returns the user's current checkout, if any, expiring it on read
    /// when the window has elapsed.
    #[tracing::instrument(skip(self))]
    pub async fn get_checkout_by_user(&self, user_id: UserId) -> Result<Option<Checkout>> {
        let Some(checkout) = self.checkouts.find_active_by_user_id(user_id).await? else {
            return Ok(None);
        };

        if !checkout.is_expired(Utc::now()) {
            return Ok(Some(checkout));
        }

        let _lease = self.leases.acquire(user_id).await;
        let fresh = self
            .checkouts
            .find_by_checkout_id(&checkout.checkout_id)
            .await?;
        match fresh {
            Some(fresh) if fresh.is_expired(Utc::now()) => {
                Ok(Some(self.expire_locked(fresh).await?))
            }
            other => Ok(other),
        }
    }

    /// Assigns an order ID and payment code, moving the checkout from
    /// Reserved to WaitingPayment.
    ///
    /// Re-invoking with the same order ID returns the stored
    /// identifiers unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn finalize_checkout(
        &self,
        checkout_id: &CheckoutId,
        user_id: UserId,
        order_id: &str,
    ) -> Result<FinalizeCheckoutResult> {
        let _lease = self.leases.acquire(user_id).await;

        let mut checkout = self.load_owned(checkout_id, user_id).await?;

        if checkout.is_expired(Utc::now()) {
            self.expire_locked(checkout).await?;
            return Ok(FinalizeCheckoutResult::Expired);
        }

        if checkout.status.can_finalize() {
            let payment_code = generate_payment_code(&self.config.payment_code_prefix);
            checkout.finalize(order_id, payment_code.clone())?;
            self.checkouts.save(&checkout).await?;
            self.cache_checkout(&checkout).await;

            self.events
                .publish(CommerceEvent::CheckoutFinalized(CheckoutFinalizedData {
                    checkout_id: checkout.checkout_id.to_string(),
                    user_id,
                    order_id: order_id.to_string(),
                    payment_code,
                    at: Utc::now(),
                }))
                .await;
            metrics::counter!("checkout_finalized_total").increment(1);

            return Ok(FinalizeCheckoutResult::Finalized { checkout });
        }

        if checkout.status.is_active() || checkout.status == CheckoutStatus::Finalized {
            // Already carries identifiers; same order means the caller
            // is retrying and gets the stored pair back.
            if checkout.order_id.as_deref() == Some(order_id) {
                return Ok(FinalizeCheckoutResult::AlreadyFinalized {
                    order_id: checkout.order_id.clone().unwrap_or_default(),
                    payment_code: checkout.payment_code.clone().unwrap_or_default(),
                });
            }
        }

        Ok(FinalizeCheckoutResult::InvalidStatus(checkout.status))
    }

    /// Records payment: commits every held lock into a permanent
    /// decrement and moves the checkout to Finalized.
    ///
    /// A failed commit leaves the checkout in WaitingPayment so the
    /// caller can retry once inventory recovers; the finalize is never
    /// rolled back.
    #[tracing::instrument(skip(self))]
    pub async fn pay_checkout(
        &self,
        checkout_id: &CheckoutId,
        user_id: UserId,
    ) -> Result<PayCheckoutResult> {
        let _lease = self.leases.acquire(user_id).await;

        let mut checkout = self.load_owned(checkout_id, user_id).await?;

        if checkout.is_expired(Utc::now()) {
            self.expire_locked(checkout).await?;
            return Ok(PayCheckoutResult::Expired);
        }

        match checkout.status {
            CheckoutStatus::Reserved => return Ok(PayCheckoutResult::NotFinalized),
            CheckoutStatus::Finalized => return Ok(PayCheckoutResult::AlreadyPaid),
            CheckoutStatus::Cancelled | CheckoutStatus::Expired => {
                return Ok(PayCheckoutResult::InvalidStatus(checkout.status));
            }
            CheckoutStatus::WaitingPayment => {}
        }

        for item in checkout.reserved_items() {
            if let Err(e) = self
                .inventory
                .commit(&item.sku, &item.sub_sku, item.locked_quantity)
                .await
            {
                tracing::warn!(
                    %user_id,
                    checkout_id = %checkout.checkout_id,
                    sku = %item.sku,
                    error = %e,
                    "inventory commit failed, checkout stays payable"
                );
                return Ok(PayCheckoutResult::InventoryAcquireFailed {
                    message: e.to_string(),
                });
            }
        }

        let now = Utc::now();
        checkout.mark_paid(now)?;
        self.checkouts.save(&checkout).await?;
        self.evict_checkout(&checkout.checkout_id).await;

        self.events
            .publish(CommerceEvent::CheckoutPaid(CheckoutPaidData {
                checkout_id: checkout.checkout_id.to_string(),
                user_id,
                order_id: checkout.order_id.clone().unwrap_or_default(),
                at: now,
            }))
            .await;
        metrics::counter!("checkout_paid_total").increment(1);

        Ok(PayCheckoutResult::Paid { checkout })
    }

    /// Cancels an active checkout, releasing every held lock.
    ///
    /// Cancelling a terminal checkout is a no-op that reports the
    /// current state.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate_checkout(
        &self,
        checkout_id: &CheckoutId,
        user_id: UserId,
    ) -> Result<CancelCheckoutResult> {
        let _lease = self.leases.acquire(user_id).await;

        let mut checkout = self.load_owned(checkout_id, user_id).await?;

        if checkout.status.is_terminal() {
            return Ok(CancelCheckoutResult::AlreadyTerminal(checkout.status));
        }

        if checkout.is_expired(Utc::now()) {
            self.expire_locked(checkout).await?;
            return Ok(CancelCheckoutResult::AlreadyTerminal(
                CheckoutStatus::Expired,
            ));
        }

        self.release_items(&checkout.items).await;
        checkout.cancel(Utc::now())?;
        self.checkouts.save(&checkout).await?;
        self.evict_checkout(&checkout.checkout_id).await;

        self.events
            .publish(CommerceEvent::CheckoutCancelled(CheckoutLifecycleData {
                checkout_id: checkout.checkout_id.to_string(),
                user_id,
                at: Utc::now(),
            }))
            .await;
        metrics::counter!("checkout_cancelled_total").increment(1);

        Ok(CancelCheckoutResult::Cancelled { checkout })
    }

    /// Expires every active checkout whose window ended before `now`,
    /// at most `limit` of them. Returns how many were expired.
    ///
    /// Called by the expiry sweeper; safe to race with expiry-on-read
    /// because each checkout is re-read under its user's lease.
    #[tracing::instrument(skip(self))]
    pub async fn expire_due(&self, limit: u32) -> Result<usize> {
        let now = Utc::now();
        let due = self.checkouts.find_expired(now, limit).await?;
        let mut expired = 0;

        for stale in due {
            let _lease = self.leases.acquire(stale.user_id).await;
            let fresh = self.checkouts.find_by_checkout_id(&stale.checkout_id).await?;
            if let Some(fresh) = fresh
                && fresh.is_expired(now)
            {
                self.expire_locked(fresh).await?;
                expired += 1;
            }
        }

        Ok(expired)
    }

    /// Locks inventory for each cart item, building the checkout lines
    /// and their summaries.
    async fn lock_cart_items(&self, cart: &Cart) -> (Vec<CheckoutItem>, Vec<SkuLockSummary>) {
        let mut items = Vec::with_capacity(cart.items.len());
        let mut summaries = Vec::with_capacity(cart.items.len());

        for line in &cart.items {
            let available = match self.inventory.get_available_stock(&line.sub_sku).await {
                Ok(available) => available,
                Err(e) => {
                    summaries.push(SkuLockSummary::failed(
                        line.sku.clone(),
                        line.sub_sku.clone(),
                        line.quantity,
                        0,
                        e.to_string(),
                    ));
                    items.push(unreserved_item(line, 0, e.to_string()));
                    continue;
                }
            };

            if available == 0 {
                summaries.push(SkuLockSummary::failed(
                    line.sku.clone(),
                    line.sub_sku.clone(),
                    line.quantity,
                    0,
                    "out of stock",
                ));
                items.push(unreserved_item(line, 0, "out of stock".to_string()));
                continue;
            }

            let want = line.quantity.min(available);
            match self.inventory.acquire(&line.sku, &line.sub_sku, want).await {
                Ok(acq) if acq.locked_quantity > 0 => {
                    let shortfall = acq.locked_quantity < line.quantity;
                    if shortfall {
                        summaries.push(SkuLockSummary::partial(
                            line.sku.clone(),
                            line.sub_sku.clone(),
                            line.quantity,
                            acq.locked_quantity,
                            acq.available_stock,
                            acq.error
                                .clone()
                                .unwrap_or_else(|| "insufficient stock for full quantity".to_string()),
                        ));
                    } else {
                        summaries.push(SkuLockSummary::success(
                            line.sku.clone(),
                            line.sub_sku.clone(),
                            line.quantity,
                            acq.available_stock,
                        ));
                    }
                    items.push(CheckoutItem {
                        sku: line.sku.clone(),
                        sub_sku: line.sub_sku.clone(),
                        title: line.title.clone(),
                        price_snapshot: line.price_snapshot,
                        quantity: line.quantity,
                        locked_quantity: acq.locked_quantity,
                        available_stock_snapshot: acq.available_stock,
                        reserved: true,
                        reservation_error: if shortfall { acq.error } else { None },
                    });
                }
                Ok(acq) => {
                    let message = acq
                        .error
                        .unwrap_or_else(|| "lock refused".to_string());
                    summaries.push(SkuLockSummary::failed(
                        line.sku.clone(),
                        line.sub_sku.clone(),
                        line.quantity,
                        acq.available_stock,
                        message.clone(),
                    ));
                    items.push(unreserved_item(line, acq.available_stock, message));
                }
                Err(e) => {
                    summaries.push(SkuLockSummary::failed(
                        line.sku.clone(),
                        line.sub_sku.clone(),
                        line.quantity,
                        available,
                        e.to_string(),
                    ));
                    items.push(unreserved_item(line, available, e.to_string()));
                }
            }
        }

        (items, summaries)
    }

    /// Releases every held lock and marks the checkout Expired.
    async fn expire_locked(&self, mut checkout: Checkout) -> Result<Checkout> {
        self.release_items(&checkout.items).await;
        checkout.expire()?;
        self.checkouts.save(&checkout).await?;
        self.evict_checkout(&checkout.checkout_id).await;

        self.events
            .publish(CommerceEvent::CheckoutExpired(CheckoutLifecycleData {
                checkout_id: checkout.checkout_id.to_string(),
                user_id: checkout.user_id,
                at: Utc::now(),
            }))
            .await;
        metrics::counter!("checkout_expired_total").increment(1);

        Ok(checkout)
    }

    /// Best-effort release of every locked line. Failures are logged;
    /// compensation keeps going.
    async fn release_items(&self, items: &[CheckoutItem]) {
        for item in items.iter().filter(|i| i.reserved && i.locked_quantity > 0) {
            if let Err(e) = self
                .inventory
                .release(&item.sku, &item.sub_sku, item.locked_quantity)
                .await
            {
                tracing::warn!(sku = %item.sku, error = %e, "lock release failed");
            }
        }
    }

    async fn load_owned(&self, checkout_id: &CheckoutId, user_id: UserId) -> Result<Checkout> {
        let checkout = self
            .checkouts
            .find_by_checkout_id(checkout_id)
            .await?
            .ok_or_else(|| EngineError::CheckoutNotFound {
                checkout_id: checkout_id.to_string(),
            })?;
        if checkout.user_id != user_id {
            return Err(EngineError::Unauthorized {
                checkout_id: checkout_id.to_string(),
            });
        }
        Ok(checkout)
    }

    /// Reads: fast store first, durable store on miss or poison.
    async fn load_checkout(&self, checkout_id: &CheckoutId) -> Result<Option<Checkout>> {
        let key = checkout_cache_key(checkout_id);

        match self.fast.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Checkout>(&bytes) {
                Ok(checkout) => return Ok(Some(checkout)),
                Err(e) => {
                    tracing::warn!(%checkout_id, error = %e, "poisoned checkout cache entry, falling back");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%checkout_id, error = %e, "fast-store read failed, falling back");
            }
        }

        Ok(self.checkouts.find_by_checkout_id(checkout_id).await?)
    }

    /// Caches an active checkout for the rest of its window.
    async fn cache_checkout(&self, checkout: &Checkout) {
        let remaining = (checkout.expires_at - Utc::now()).to_std().unwrap_or_default();
        if remaining.is_zero() {
            return;
        }
        let key = checkout_cache_key(&checkout.checkout_id);
        match serde_json::to_vec(checkout) {
            Ok(bytes) => {
                if let Err(e) = self.fast.set(&key, bytes, remaining).await {
                    tracing::warn!(checkout_id = %checkout.checkout_id, error = %e, "checkout cache refresh failed");
                }
            }
            Err(e) => {
                tracing::warn!(checkout_id = %checkout.checkout_id, error = %e, "checkout serialization for cache failed");
            }
        }
    }

    async fn evict_checkout(&self, checkout_id: &CheckoutId) {
        if let Err(e) = self.fast.delete(&checkout_cache_key(checkout_id)).await {
            tracing::warn!(%checkout_id, error = %e, "checkout cache eviction failed");
        }
    }
}

fn unreserved_item(line: &CartItem, available: u32, message: String) -> CheckoutItem {
    CheckoutItem {
        sku: line.sku.clone(),
        sub_sku: line.sub_sku.clone(),
        title: line.title.clone(),
        price_snapshot: line.price_snapshot,
        quantity: line.quantity,
        locked_quantity: 0,
        available_stock_snapshot: available,
        reserved: false,
        reservation_error: Some(message),
    }
}

fn summary_to_validation(summary: &SkuLockSummary) -> SkuValidationError {
    let error_code = if summary.locked {
        StockErrorCode::PartialStock
    } else if summary.available_stock == 0 {
        StockErrorCode::OutOfStock
    } else {
        StockErrorCode::LockFailed
    };
    SkuValidationError {
        sku: summary.sku.clone(),
        error_code,
        message: summary.error_message.clone().unwrap_or_default(),
    }
}
