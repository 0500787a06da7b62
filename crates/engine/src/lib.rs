//! Cart and checkout engine.
//!
//! `CartManager` owns the cart read/write path over a fast store and a
//! durable store; `CheckoutEngine` turns carts into inventory-backed
//! reservations and walks them through finalize, pay, cancel and
//! expiry. `ExpirySweeper` reclaims abandoned reservations in the
//! background.

pub mod cart;
pub mod checkout;
pub mod clients;
pub mod config;
pub mod error;
pub mod events;
pub mod lease;
pub mod results;
pub mod sweeper;

pub use cart::{CartManager, NewCartItem};
pub use checkout::{CheckoutEngine, generate_order_id, generate_payment_code};
pub use clients::{
    InMemoryInventoryClient, InMemoryProductCatalog, InventoryClient, ProductCatalog, ProductInfo,
    StockAcquisition,
};
pub use config::{EngineConfig, StockCheckMode};
pub use error::{EngineError, Result};
pub use events::{CommerceEvent, EventSink, NullEventSink, RecordingEventSink, TracingEventSink};
pub use lease::{UserLease, UserLeases};
pub use results::{
    CancelCheckoutResult, FinalizeCheckoutResult, PayCheckoutResult, PrepareCheckoutResult,
    SkuLockSummary, SkuValidationError, StockErrorCode, ValidateCheckoutResponse,
};
pub use sweeper::ExpirySweeper;
