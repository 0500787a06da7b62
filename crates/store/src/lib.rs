//! Store adapters for the cart/checkout engine.
//!
//! Two storage tiers back the engine:
//! - the fast store: a TTL'd key/value cache ([`FastStore`])
//! - the durable store: document repositories for carts and checkouts
//!   ([`CartStore`], [`CheckoutStore`])
//!
//! Each trait has an in-memory implementation for tests and a PostgreSQL
//! implementation for production.

pub mod durable;
pub mod error;
pub mod fast;
pub mod memory;
pub mod postgres;

pub use durable::{CartStore, CheckoutStore};
pub use error::{Result, StoreError};
pub use fast::{FastStore, cart_cache_key, checkout_cache_key};
pub use memory::{InMemoryCartStore, InMemoryCheckoutStore, InMemoryFastStore};
pub use postgres::{PostgresCartStore, PostgresCheckoutStore};
