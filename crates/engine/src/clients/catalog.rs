//! Product catalog trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Money, Sku};

use crate::error::EngineError;

/// The catalog's view of a product, as needed by the cart.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    /// Current listed unit price.
    pub price: Money,
    /// Advisory stock level; the inventory client is the real gate.
    pub stock_hint: u32,
    /// False once the product is delisted.
    pub active: bool,
}

/// Trait for product catalog lookups.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns the product for a SKU, or `None` if the catalog does not
    /// know it.
    async fn get_product(&self, sku: &Sku) -> Result<Option<ProductInfo>, EngineError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<String, ProductInfo>,
    fail_on_get: bool,
}

/// In-memory product catalog for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryProductCatalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn insert_product(&self, sku: &Sku, product: ProductInfo) {
        self.state
            .write()
            .unwrap()
            .products
            .insert(sku.as_str().to_string(), product);
    }

    /// Configures the catalog to fail lookups, simulating an outage.
    pub fn set_fail_on_get(&self, fail: bool) {
        self.state.write().unwrap().fail_on_get = fail;
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get_product(&self, sku: &Sku) -> Result<Option<ProductInfo>, EngineError> {
        let state = self.state.read().unwrap();

        if state.fail_on_get {
            return Err(EngineError::Catalog(
                "catalog service unavailable".to_string(),
            ));
        }

        Ok(state.products.get(sku.as_str()).cloned())
    }
}
