//! Collaborator service traits and their in-memory implementations.

pub mod catalog;
pub mod inventory;

pub use catalog::{InMemoryProductCatalog, ProductCatalog, ProductInfo};
pub use inventory::{InMemoryInventoryClient, InventoryClient, StockAcquisition};
