//! Domain model for the cart/checkout reservation engine.
//!
//! This crate provides the pure (I/O-free) domain types:
//! - `Cart`/`CartItem` with merge/remove/total logic
//! - `Checkout`/`CheckoutItem` and the `CheckoutStatus` state machine
//! - Value objects: `Sku`, `SubSku`, `Money`, `CheckoutId`
//! - Typed errors: `CartError`, `CheckoutError`

pub mod cart;
pub mod checkout;
pub mod error;
pub mod status;
pub mod value_objects;

pub use cart::{Cart, CartItem};
pub use checkout::{Checkout, CheckoutItem};
pub use error::{CartError, CheckoutError};
pub use status::CheckoutStatus;
pub use value_objects::{CheckoutId, Money, Sku, SubSku};
