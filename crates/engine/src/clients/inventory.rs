//! Inventory client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Sku, SubSku};

use crate::error::EngineError;

/// Outcome of an inventory lock attempt.
///
/// A lock may be granted in full, in part, or not at all; `error` carries
/// the inventory service's reason when `locked_quantity` fell short.
#[derive(Debug, Clone)]
pub struct StockAcquisition {
    /// Units actually locked.
    pub locked_quantity: u32,
    /// Units still available after the lock.
    pub available_stock: u32,
    /// Why the lock fell short, if it did.
    pub error: Option<String>,
}

/// Trait for inventory lock operations.
///
/// Locks are held per sub-SKU until released (cancel/expire) or
/// committed (payment).
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Returns the currently available (unlocked) stock for a sub-SKU.
    async fn get_available_stock(&self, sub_sku: &SubSku) -> Result<u32, EngineError>;

    /// Attempts to lock `quantity` units. Grants at most what is available.
    async fn acquire(
        &self,
        sku: &Sku,
        sub_sku: &SubSku,
        quantity: u32,
    ) -> Result<StockAcquisition, EngineError>;

    /// Returns previously locked units to the available pool.
    async fn release(&self, sku: &Sku, sub_sku: &SubSku, quantity: u32)
    -> Result<(), EngineError>;

    /// Converts previously locked units into a permanent decrement.
    async fn commit(&self, sku: &Sku, sub_sku: &SubSku, quantity: u32) -> Result<(), EngineError>;
}

#[derive(Debug, Default)]
struct StockRecord {
    available: u32,
    held: u32,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    stock: HashMap<String, StockRecord>,
    release_calls: u32,
    fail_on_acquire: bool,
    fail_on_release: bool,
    fail_on_commit: bool,
}

/// In-memory inventory client for testing.
///
/// Lock attempts are an atomic test-and-decrement under one lock, so
/// concurrent acquires never over-grant.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryClient {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryClient {
    /// Creates a new in-memory inventory client with no stock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the available stock for a sub-SKU, clearing any held units.
    pub fn set_stock(&self, sub_sku: &SubSku, available: u32) {
        self.state.write().unwrap().stock.insert(
            sub_sku.as_str().to_string(),
            StockRecord {
                available,
                held: 0,
            },
        );
    }

    /// Returns the available units for a sub-SKU.
    pub fn available(&self, sub_sku: &SubSku) -> u32 {
        self.state
            .read()
            .unwrap()
            .stock
            .get(sub_sku.as_str())
            .map(|r| r.available)
            .unwrap_or(0)
    }

    /// Returns the locked units for a sub-SKU.
    pub fn held(&self, sub_sku: &SubSku) -> u32 {
        self.state
            .read()
            .unwrap()
            .stock
            .get(sub_sku.as_str())
            .map(|r| r.held)
            .unwrap_or(0)
    }

    /// Returns how many `release` calls have been made.
    pub fn release_call_count(&self) -> u32 {
        self.state.read().unwrap().release_calls
    }

    /// Configures the client to fail acquire calls.
    pub fn set_fail_on_acquire(&self, fail: bool) {
        self.state.write().unwrap().fail_on_acquire = fail;
    }

    /// Configures the client to fail release calls.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.state.write().unwrap().fail_on_release = fail;
    }

    /// Configures the client to fail commit calls.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.state.write().unwrap().fail_on_commit = fail;
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventoryClient {
    async fn get_available_stock(&self, sub_sku: &SubSku) -> Result<u32, EngineError> {
        Ok(self.available(sub_sku))
    }

    async fn acquire(
        &self,
        _sku: &Sku,
        sub_sku: &SubSku,
        quantity: u32,
    ) -> Result<StockAcquisition, EngineError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_acquire {
            return Err(EngineError::Inventory(
                "inventory service unavailable".to_string(),
            ));
        }

        let record = state.stock.entry(sub_sku.as_str().to_string()).or_default();
        let granted = quantity.min(record.available);
        record.available -= granted;
        record.held += granted;

        Ok(StockAcquisition {
            locked_quantity: granted,
            available_stock: record.available,
            error: if granted == 0 {
                Some("out of stock".to_string())
            } else if granted < quantity {
                Some("insufficient stock for full quantity".to_string())
            } else {
                None
            },
        })
    }

    async fn release(
        &self,
        _sku: &Sku,
        sub_sku: &SubSku,
        quantity: u32,
    ) -> Result<(), EngineError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_release {
            return Err(EngineError::Inventory(
                "inventory service unavailable".to_string(),
            ));
        }

        state.release_calls += 1;
        let record = state.stock.entry(sub_sku.as_str().to_string()).or_default();
        let returned = quantity.min(record.held);
        record.held -= returned;
        record.available += returned;
        Ok(())
    }

    async fn commit(&self, _sku: &Sku, sub_sku: &SubSku, quantity: u32) -> Result<(), EngineError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_commit {
            return Err(EngineError::Inventory(
                "inventory service unavailable".to_string(),
            ));
        }

        let record = state.stock.entry(sub_sku.as_str().to_string()).or_default();
        record.held = record.held.saturating_sub(quantity);
        Ok(())
    }
}
