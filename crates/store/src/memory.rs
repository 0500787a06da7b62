//! In-memory store implementations for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::UserId;
use domain::{Cart, Checkout, CheckoutId};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::durable::{CartStore, CheckoutStore};
use crate::error::{Result, StoreError};
use crate::fast::FastStore;

fn injected_failure(what: &str) -> StoreError {
    StoreError::Serialization(serde_json::Error::io(std::io::Error::other(format!(
        "injected {what} failure"
    ))))
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory fast store with lazy TTL eviction.
///
/// Expired entries are dropped when read, mirroring a cache that only
/// reclaims keys on access.
#[derive(Clone, Default)]
pub struct InMemoryFastStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    fail_on_get: Arc<RwLock<bool>>,
    fail_on_set: Arc<RwLock<bool>>,
}

impl InMemoryFastStore {
    /// Creates a new empty fast store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, including not-yet-evicted expired ones.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Makes subsequent `get` calls fail.
    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    /// Makes subsequent `set` calls fail.
    pub async fn set_fail_on_set(&self, fail: bool) {
        *self.fail_on_set.write().await = fail;
    }
}

#[async_trait]
impl FastStore for InMemoryFastStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if *self.fail_on_get.read().await {
            return Err(injected_failure("fast-store get"));
        }
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        if *self.fail_on_set.read().await {
            return Err(injected_failure("fast-store set"));
        }
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// In-memory cart repository.
#[derive(Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<Uuid, Cart>>>,
}

impl InMemoryCartStore {
    /// Creates a new empty cart store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of persisted carts.
    pub async fn cart_count(&self) -> usize {
        self.carts.read().await.len()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn find_by_user_id(&self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.carts.read().await.get(&user_id.as_uuid()).cloned())
    }

    async fn save(&self, cart: &Cart) -> Result<Cart> {
        let mut carts = self.carts.write().await;
        let mut stored = cart.clone();
        stored.updated_at = Utc::now();
        match carts.get(&cart.user_id.as_uuid()) {
            Some(existing) => {
                stored.created_at = existing.created_at;
                stored.version = existing.version + 1;
            }
            None => {
                stored.version = 1;
            }
        }
        carts.insert(cart.user_id.as_uuid(), stored.clone());
        Ok(stored)
    }

    async fn delete_by_user_id(&self, user_id: UserId) -> Result<()> {
        self.carts.write().await.remove(&user_id.as_uuid());
        Ok(())
    }
}

/// In-memory checkout repository.
///
/// All operations take the single write lock, so `insert_active`'s
/// existence check and insert happen in one atomic step, like the
/// partial unique index in the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryCheckoutStore {
    checkouts: Arc<RwLock<HashMap<String, Checkout>>>,
}

impl InMemoryCheckoutStore {
    /// Creates a new empty checkout store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of persisted checkouts, any status.
    pub async fn checkout_count(&self) -> usize {
        self.checkouts.read().await.len()
    }
}

#[async_trait]
impl CheckoutStore for InMemoryCheckoutStore {
    async fn find_by_checkout_id(&self, checkout_id: &CheckoutId) -> Result<Option<Checkout>> {
        Ok(self
            .checkouts
            .read()
            .await
            .get(checkout_id.as_str())
            .cloned())
    }

    async fn find_active_by_user_id(&self, user_id: UserId) -> Result<Option<Checkout>> {
        Ok(self
            .checkouts
            .read()
            .await
            .values()
            .find(|c| c.user_id == user_id && c.status.is_active())
            .cloned())
    }

    async fn insert_active(&self, checkout: &Checkout) -> Result<()> {
        let mut checkouts = self.checkouts.write().await;
        if checkouts
            .values()
            .any(|c| c.user_id == checkout.user_id && c.status.is_active())
        {
            return Err(StoreError::ActiveCheckoutExists {
                user_id: checkout.user_id,
            });
        }
        checkouts.insert(checkout.checkout_id.as_str().to_string(), checkout.clone());
        Ok(())
    }

    async fn save(&self, checkout: &Checkout) -> Result<()> {
        self.checkouts
            .write()
            .await
            .insert(checkout.checkout_id.as_str().to_string(), checkout.clone());
        Ok(())
    }

    async fn find_expired(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<Vec<Checkout>> {
        let checkouts = self.checkouts.read().await;
        let mut expired: Vec<Checkout> = checkouts
            .values()
            .filter(|c| c.status.is_active() && c.expires_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|c| c.expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn delete(&self, checkout_id: &CheckoutId) -> Result<()> {
        self.checkouts.write().await.remove(checkout_id.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use domain::{CartItem, CheckoutItem, Money, Sku, SubSku};

    fn test_cart(user_id: UserId) -> Cart {
        let mut cart = Cart::empty(user_id, "USD");
        cart.add_or_merge_item(CartItem::new(
            "SKU-001",
            "SKU-001-A",
            "Widget",
            Money::from_cents(1000),
            2,
            50,
        ))
        .unwrap();
        cart
    }

    fn test_checkout(user_id: UserId, expires_in_secs: i64) -> Checkout {
        let now = Utc::now();
        Checkout::reserve(
            user_id,
            vec![CheckoutItem {
                sku: Sku::new("SKU-001"),
                sub_sku: SubSku::new("SKU-001-A"),
                title: "Widget".to_string(),
                price_snapshot: Money::from_cents(1000),
                quantity: 2,
                locked_quantity: 2,
                available_stock_snapshot: 50,
                reserved: true,
                reservation_error: None,
            }],
            "USD",
            now,
            now + ChronoDuration::seconds(expires_in_secs),
        )
    }

    #[tokio::test]
    async fn fast_store_set_get_delete() {
        let store = InMemoryFastStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn fast_store_expired_entry_evicted_on_read() {
        let store = InMemoryFastStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(store.entry_count().await, 1);

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn fast_store_failure_toggles() {
        let store = InMemoryFastStore::new();
        store.set_fail_on_set(true).await;
        assert!(
            store
                .set("k", b"v".to_vec(), Duration::from_secs(60))
                .await
                .is_err()
        );

        store.set_fail_on_set(false).await;
        store
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        store.set_fail_on_get(true).await;
        assert!(store.get("k").await.is_err());
    }

    #[tokio::test]
    async fn cart_store_save_bumps_version_and_preserves_created_at() {
        let store = InMemoryCartStore::new();
        let user_id = UserId::new();
        let cart = test_cart(user_id);

        let first = store.save(&cart).await.unwrap();
        assert_eq!(first.version, 1);

        let second = store.save(&first).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.created_at, first.created_at);

        let loaded = store.find_by_user_id(user_id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn cart_store_delete_is_absent_tolerant() {
        let store = InMemoryCartStore::new();
        let user_id = UserId::new();
        store.delete_by_user_id(user_id).await.unwrap();

        store.save(&test_cart(user_id)).await.unwrap();
        store.delete_by_user_id(user_id).await.unwrap();
        assert!(store.find_by_user_id(user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkout_store_rejects_second_active_for_same_user() {
        let store = InMemoryCheckoutStore::new();
        let user_id = UserId::new();

        store.insert_active(&test_checkout(user_id, 900)).await.unwrap();

        let err = store
            .insert_active(&test_checkout(user_id, 900))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::ActiveCheckoutExists { user_id: uid } if uid == user_id
        ));
    }

    #[tokio::test]
    async fn checkout_store_allows_new_active_after_terminal() {
        let store = InMemoryCheckoutStore::new();
        let user_id = UserId::new();

        let mut first = test_checkout(user_id, 900);
        store.insert_active(&first).await.unwrap();

        first.cancel(Utc::now()).unwrap();
        store.save(&first).await.unwrap();

        store.insert_active(&test_checkout(user_id, 900)).await.unwrap();
        assert_eq!(store.checkout_count().await, 2);
    }

    #[tokio::test]
    async fn checkout_store_find_active_ignores_terminal() {
        let store = InMemoryCheckoutStore::new();
        let user_id = UserId::new();

        let mut checkout = test_checkout(user_id, 900);
        store.insert_active(&checkout).await.unwrap();
        assert!(
            store
                .find_active_by_user_id(user_id)
                .await
                .unwrap()
                .is_some()
        );

        checkout.cancel(Utc::now()).unwrap();
        store.save(&checkout).await.unwrap();
        assert!(
            store
                .find_active_by_user_id(user_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn checkout_store_find_expired_orders_by_deadline_and_limits() {
        let store = InMemoryCheckoutStore::new();

        let oldest = test_checkout(UserId::new(), -300);
        let older = test_checkout(UserId::new(), -100);
        let fresh = test_checkout(UserId::new(), 900);
        store.insert_active(&older).await.unwrap();
        store.insert_active(&oldest).await.unwrap();
        store.insert_active(&fresh).await.unwrap();

        let expired = store.find_expired(Utc::now(), 10).await.unwrap();
        assert_eq!(expired.len(), 2);
        assert_eq!(expired[0].checkout_id, oldest.checkout_id);
        assert_eq!(expired[1].checkout_id, older.checkout_id);

        let limited = store.find_expired(Utc::now(), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].checkout_id, oldest.checkout_id);
    }

    #[tokio::test]
    async fn checkout_store_delete_is_absent_tolerant() {
        let store = InMemoryCheckoutStore::new();
        let checkout = test_checkout(UserId::new(), 900);
        store.delete(&checkout.checkout_id).await.unwrap();

        store.insert_active(&checkout).await.unwrap();
        store.delete(&checkout.checkout_id).await.unwrap();
        assert!(
            store
                .find_by_checkout_id(&checkout.checkout_id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
