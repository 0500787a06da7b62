//! Cart manager: read-through/write-through cart operations over the
//! fast and durable stores.

use std::collections::HashMap;

use chrono::Utc;
use common::UserId;
use domain::{Cart, CartError, CartItem, Money, Sku, SubSku};
use store::{CartStore, FastStore, cart_cache_key};

use crate::clients::ProductCatalog;
use crate::config::{EngineConfig, StockCheckMode};
use crate::error::{EngineError, Result};
use crate::events::{CartClearedData, CartUpdatedData, CommerceEvent, EventSink};

/// An item to add to a cart, as submitted by the storefront.
///
/// The price is the client-observed snapshot; `get_cart` can refresh it
/// from the catalog when price revalidation is enabled.
#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub sku: Sku,
    pub sub_sku: SubSku,
    pub title: String,
    pub price: Money,
    pub quantity: u32,
    pub image_url: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl NewCartItem {
    /// Creates a new item with no image or attributes.
    pub fn new(
        sku: impl Into<Sku>,
        sub_sku: impl Into<SubSku>,
        title: impl Into<String>,
        price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            sku: sku.into(),
            sub_sku: sub_sku.into(),
            title: title.into(),
            price,
            quantity,
            image_url: None,
            attributes: HashMap::new(),
        }
    }
}

/// Orchestrates cart reads and writes across both storage tiers.
///
/// The durable store is written first; the fast store is refreshed after
/// and its failures are logged, never propagated. Reads try the fast
/// store and fall back to the durable store, repopulating the cache on
/// the way out. Cart operations never touch the inventory client.
#[derive(Clone)]
pub struct CartManager<F, C, P, E>
where
    F: FastStore,
    C: CartStore,
    P: ProductCatalog,
    E: EventSink,
{
    fast: F,
    carts: C,
    catalog: P,
    events: E,
    config: EngineConfig,
}

impl<F, C, P, E> CartManager<F, C, P, E>
where
    F: FastStore,
    C: CartStore,
    P: ProductCatalog,
    E: EventSink,
{
    /// Creates a new cart manager.
    pub fn new(fast: F, carts: C, catalog: P, events: E, config: EngineConfig) -> Self {
        Self {
            fast,
            carts,
            catalog,
            events,
            config,
        }
    }

    /// Returns the user's cart.
    ///
    /// A user with no persisted cart gets a synthesized empty cart that
    /// is not written anywhere. With price revalidation enabled, drifted
    /// price snapshots are refreshed from the catalog and persisted.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        let mut cart = self.load_cart(user_id).await?;

        if self.config.revalidate_prices && !cart.is_empty() {
            match self.revalidate_prices(&mut cart).await {
                Ok(true) => cart = self.persist_and_cache(&cart).await?,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(%user_id, error = %e, "price revalidation skipped");
                }
            }
        }

        Ok(cart)
    }

    /// Adds an item to the cart, merging with an existing line for the
    /// same sku.
    #[tracing::instrument(skip(self, item), fields(sku = %item.sku, quantity = item.quantity))]
    pub async fn add_item(&self, user_id: UserId, item: NewCartItem) -> Result<Cart> {
        if item.quantity == 0 {
            return Err(EngineError::Validation {
                message: "quantity must be at least 1".to_string(),
            });
        }

        let mut cart = self.load_cart(user_id).await?;

        // The stock check is informational; the catalog being down must
        // not block the cart. A definite "unknown product" still rejects.
        let stock_snapshot = match self.catalog.get_product(&item.sku).await {
            Ok(Some(product)) if product.active => {
                let merged = cart.quantity_of(&item.sku) + item.quantity;
                if merged > product.stock_hint {
                    match self.config.stock_check {
                        StockCheckMode::Strict => {
                            return Err(EngineError::Cart(CartError::InsufficientStock {
                                sku: item.sku.to_string(),
                                requested: merged,
                                available: product.stock_hint,
                            }));
                        }
                        StockCheckMode::Advisory => {
                            tracing::warn!(
                                %user_id,
                                sku = %item.sku,
                                requested = merged,
                                available = product.stock_hint,
                                "stock shortfall, adding anyway"
                            );
                        }
                    }
                }
                product.stock_hint
            }
            Ok(_) => {
                return Err(EngineError::ProductNotFound {
                    sku: item.sku.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(%user_id, sku = %item.sku, error = %e, "catalog unreachable, skipping stock check");
                0
            }
        };

        cart.add_or_merge_item(CartItem {
            sku: item.sku,
            sub_sku: item.sub_sku,
            title: item.title,
            price_snapshot: item.price,
            quantity: item.quantity,
            available_stock_snapshot: stock_snapshot,
            image_url: item.image_url,
            attributes: item.attributes,
        })?;

        let saved = self.persist_and_cache(&cart).await?;
        self.emit_cart_updated(&saved).await;
        Ok(saved)
    }

    /// Removes a line item from the cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, sku: &Sku) -> Result<Cart> {
        let mut cart = self.load_cart(user_id).await?;
        cart.remove_item(sku)?;

        let saved = self.persist_and_cache(&cart).await?;
        self.emit_cart_updated(&saved).await;
        Ok(saved)
    }

    /// Sets the quantity of an existing line item; zero or less removes it.
    #[tracing::instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: UserId,
        sku: &Sku,
        quantity: i64,
    ) -> Result<Cart> {
        let mut cart = self.load_cart(user_id).await?;
        cart.update_item_quantity(sku, quantity)?;

        let saved = self.persist_and_cache(&cart).await?;
        self.emit_cart_updated(&saved).await;
        Ok(saved)
    }

    /// Removes every listed sku from the cart, skipping absent ones.
    ///
    /// Used by the checkout engine to move locked items out of the cart.
    #[tracing::instrument(skip(self, skus), fields(sku_count = skus.len()))]
    pub async fn bulk_remove_items(&self, user_id: UserId, skus: &[Sku]) -> Result<Cart> {
        let mut cart = self.load_cart(user_id).await?;
        if cart.remove_items(skus) == 0 {
            return Ok(cart);
        }

        let saved = self.persist_and_cache(&cart).await?;
        self.emit_cart_updated(&saved).await;
        Ok(saved)
    }

    /// Deletes the cart from both stores. Absent carts are a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        self.carts.delete_by_user_id(user_id).await?;
        if let Err(e) = self.fast.delete(&cart_cache_key(user_id)).await {
            tracing::warn!(%user_id, error = %e, "fast-store eviction failed");
        }

        self.events
            .publish(CommerceEvent::CartCleared(CartClearedData {
                user_id,
                at: Utc::now(),
            }))
            .await;
        Ok(())
    }

    /// Loads a cart: fast store, then durable store, then a synthesized
    /// empty cart.
    async fn load_cart(&self, user_id: UserId) -> Result<Cart> {
        let key = cart_cache_key(user_id);

        match self.fast.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Cart>(&bytes) {
                Ok(cart) => return Ok(cart),
                Err(e) => {
                    tracing::warn!(%user_id, error = %e, "poisoned cart cache entry, falling back");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "fast-store read failed, falling back");
            }
        }

        match self.carts.find_by_user_id(user_id).await? {
            Some(cart) => {
                self.cache_cart(&cart).await;
                Ok(cart)
            }
            None => Ok(Cart::empty(user_id, self.config.currency.clone())),
        }
    }

    /// Durable write first, then cache refresh.
    async fn persist_and_cache(&self, cart: &Cart) -> Result<Cart> {
        let saved = self.carts.save(cart).await?;
        self.cache_cart(&saved).await;
        Ok(saved)
    }

    /// Best-effort cache write; bounded staleness is accepted.
    async fn cache_cart(&self, cart: &Cart) {
        let key = cart_cache_key(cart.user_id);
        match serde_json::to_vec(cart) {
            Ok(bytes) => {
                if let Err(e) = self.fast.set(&key, bytes, self.config.cart_cache_ttl()).await {
                    tracing::warn!(user_id = %cart.user_id, error = %e, "cart cache refresh failed");
                }
            }
            Err(e) => {
                tracing::warn!(user_id = %cart.user_id, error = %e, "cart serialization for cache failed");
            }
        }
    }

    /// Refreshes drifted price snapshots in place. Returns true when any
    /// price changed.
    async fn revalidate_prices(&self, cart: &mut Cart) -> Result<bool> {
        let mut changed = false;
        for item in &mut cart.items {
            if let Some(product) = self.catalog.get_product(&item.sku).await?
                && product.active
                && product.price != item.price_snapshot
            {
                tracing::debug!(
                    sku = %item.sku,
                    old = item.price_snapshot.cents(),
                    new = product.price.cents(),
                    "refreshing price snapshot"
                );
                item.price_snapshot = product.price;
                changed = true;
            }
        }
        Ok(changed)
    }

    async fn emit_cart_updated(&self, cart: &Cart) {
        metrics::counter!("cart_mutations_total").increment(1);
        self.events
            .publish(CommerceEvent::CartUpdated(CartUpdatedData {
                user_id: cart.user_id,
                item_count: cart.total_items(),
                total_cents: cart.total_amount().cents(),
                at: Utc::now(),
            }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{InMemoryProductCatalog, ProductInfo};
    use crate::events::RecordingEventSink;
    use store::{InMemoryCartStore, InMemoryFastStore};

    type TestCartManager =
        CartManager<InMemoryFastStore, InMemoryCartStore, InMemoryProductCatalog, RecordingEventSink>;

    struct Fixture {
        manager: TestCartManager,
        fast: InMemoryFastStore,
        carts: InMemoryCartStore,
        catalog: InMemoryProductCatalog,
        events: RecordingEventSink,
    }

    fn fixture_with_config(config: EngineConfig) -> Fixture {
        let fast = InMemoryFastStore::new();
        let carts = InMemoryCartStore::new();
        let catalog = InMemoryProductCatalog::new();
        let events = RecordingEventSink::new();
        catalog.insert_product(
            &Sku::new("SKU-001"),
            ProductInfo {
                price: Money::from_cents(1000),
                stock_hint: 10,
                active: true,
            },
        );
        let manager = CartManager::new(
            fast.clone(),
            carts.clone(),
            catalog.clone(),
            events.clone(),
            config,
        );
        Fixture {
            manager,
            fast,
            carts,
            catalog,
            events,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_config(EngineConfig::default())
    }

    fn widget(quantity: u32) -> NewCartItem {
        NewCartItem::new("SKU-001", "SKU-001-A", "Widget", Money::from_cents(1000), quantity)
    }

    #[tokio::test]
    async fn get_cart_synthesizes_empty_without_persisting() {
        let fx = fixture();
        let user_id = UserId::new();

        let cart = fx.manager.get_cart(user_id).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(fx.carts.cart_count().await, 0);
        assert_eq!(fx.fast.entry_count().await, 0);
    }

    #[tokio::test]
    async fn add_item_persists_durably_and_caches() {
        let fx = fixture();
        let user_id = UserId::new();

        let cart = fx.manager.add_item(user_id, widget(2)).await.unwrap();
        assert_eq!(cart.version, 1);
        assert_eq!(cart.quantity_of(&Sku::new("SKU-001")), 2);
        assert_eq!(fx.carts.cart_count().await, 1);
        assert_eq!(fx.fast.entry_count().await, 1);
        assert_eq!(fx.events.event_types(), vec!["CartUpdated"]);
    }

    #[tokio::test]
    async fn add_item_rejects_zero_quantity() {
        let fx = fixture();
        let err = fx.manager.add_item(UserId::new(), widget(0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn add_item_rejects_unknown_product() {
        let fx = fixture();
        let item = NewCartItem::new("SKU-404", "SKU-404-A", "Ghost", Money::from_cents(1), 1);
        let err = fx.manager.add_item(UserId::new(), item).await.unwrap_err();
        assert!(matches!(err, EngineError::ProductNotFound { .. }));
    }

    #[tokio::test]
    async fn add_item_rejects_inactive_product() {
        let fx = fixture();
        fx.catalog.insert_product(
            &Sku::new("SKU-OFF"),
            ProductInfo {
                price: Money::from_cents(500),
                stock_hint: 10,
                active: false,
            },
        );
        let item = NewCartItem::new("SKU-OFF", "SKU-OFF-A", "Gone", Money::from_cents(500), 1);
        let err = fx.manager.add_item(UserId::new(), item).await.unwrap_err();
        assert!(matches!(err, EngineError::ProductNotFound { .. }));
    }

    #[tokio::test]
    async fn strict_mode_rejects_merged_quantity_over_stock() {
        let fx = fixture();
        let user_id = UserId::new();

        fx.manager.add_item(user_id, widget(8)).await.unwrap();
        let err = fx.manager.add_item(user_id, widget(3)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Cart(CartError::InsufficientStock {
                requested: 11,
                available: 10,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn advisory_mode_adds_despite_shortfall() {
        let fx = fixture_with_config(EngineConfig {
            stock_check: StockCheckMode::Advisory,
            ..EngineConfig::default()
        });
        let user_id = UserId::new();

        let cart = fx.manager.add_item(user_id, widget(25)).await.unwrap();
        assert_eq!(cart.quantity_of(&Sku::new("SKU-001")), 25);
    }

    #[tokio::test]
    async fn catalog_outage_degrades_gracefully() {
        let fx = fixture();
        fx.catalog.set_fail_on_get(true);

        let cart = fx.manager.add_item(UserId::new(), widget(2)).await.unwrap();
        let item = cart.find_item(&Sku::new("SKU-001")).unwrap();
        assert_eq!(item.quantity, 2);
        assert_eq!(item.available_stock_snapshot, 0);
    }

    #[tokio::test]
    async fn poisoned_cache_falls_back_to_durable_store() {
        let fx = fixture();
        let user_id = UserId::new();
        fx.manager.add_item(user_id, widget(2)).await.unwrap();

        fx.fast
            .set(
                &cart_cache_key(user_id),
                b"not json".to_vec(),
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();

        let cart = fx.manager.get_cart(user_id).await.unwrap();
        assert_eq!(cart.quantity_of(&Sku::new("SKU-001")), 2);
    }

    #[tokio::test]
    async fn fast_store_write_failure_is_not_propagated() {
        let fx = fixture();
        let user_id = UserId::new();
        fx.fast.set_fail_on_set(true).await;

        let cart = fx.manager.add_item(user_id, widget(1)).await.unwrap();
        assert_eq!(cart.version, 1);
        assert_eq!(fx.carts.cart_count().await, 1);
    }

    #[tokio::test]
    async fn update_quantity_and_remove() {
        let fx = fixture();
        let user_id = UserId::new();
        fx.manager.add_item(user_id, widget(2)).await.unwrap();

        let cart = fx
            .manager
            .update_item_quantity(user_id, &Sku::new("SKU-001"), 5)
            .await
            .unwrap();
        assert_eq!(cart.quantity_of(&Sku::new("SKU-001")), 5);

        let cart = fx
            .manager
            .remove_item(user_id, &Sku::new("SKU-001"))
            .await
            .unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn remove_missing_item_errors() {
        let fx = fixture();
        let err = fx
            .manager
            .remove_item(UserId::new(), &Sku::new("SKU-404"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cart(CartError::ItemNotFound { .. })));
    }

    #[tokio::test]
    async fn bulk_remove_skips_absent_skus_and_persists_once() {
        let fx = fixture();
        let user_id = UserId::new();
        fx.manager.add_item(user_id, widget(2)).await.unwrap();

        let cart = fx
            .manager
            .bulk_remove_items(user_id, &[Sku::new("SKU-001"), Sku::new("SKU-404")])
            .await
            .unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.version, 2);

        // Nothing to remove: no durable write, no event.
        let before = fx.events.events().len();
        let cart = fx
            .manager
            .bulk_remove_items(user_id, &[Sku::new("SKU-404")])
            .await
            .unwrap();
        assert_eq!(cart.version, 2);
        assert_eq!(fx.events.events().len(), before);
    }

    #[tokio::test]
    async fn clear_cart_deletes_both_tiers() {
        let fx = fixture();
        let user_id = UserId::new();
        fx.manager.add_item(user_id, widget(2)).await.unwrap();

        fx.manager.clear_cart(user_id).await.unwrap();
        assert_eq!(fx.carts.cart_count().await, 0);
        assert_eq!(
            fx.fast.get(&cart_cache_key(user_id)).await.unwrap(),
            None
        );
        assert!(fx.events.event_types().contains(&"CartCleared"));

        // Clearing an absent cart is a no-op.
        fx.manager.clear_cart(user_id).await.unwrap();
    }

    #[tokio::test]
    async fn revalidate_prices_refreshes_drifted_snapshot() {
        let fx = fixture_with_config(EngineConfig {
            revalidate_prices: true,
            ..EngineConfig::default()
        });
        let user_id = UserId::new();
        fx.manager.add_item(user_id, widget(2)).await.unwrap();

        fx.catalog.insert_product(
            &Sku::new("SKU-001"),
            ProductInfo {
                price: Money::from_cents(1200),
                stock_hint: 10,
                active: true,
            },
        );

        let cart = fx.manager.get_cart(user_id).await.unwrap();
        let item = cart.find_item(&Sku::new("SKU-001")).unwrap();
        assert_eq!(item.price_snapshot.cents(), 1200);
        assert_eq!(cart.version, 2);

        // A catalog outage must not fail the read.
        fx.catalog.set_fail_on_get(true);
        let cart = fx.manager.get_cart(user_id).await.unwrap();
        assert_eq!(cart.version, 2);
    }
}
