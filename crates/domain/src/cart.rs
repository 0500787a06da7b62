//! Shopping cart and its line items.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::CartError;
use crate::value_objects::{Money, Sku, SubSku};

/// A line item in a shopping cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// The product identifier.
    pub sku: Sku,

    /// The variant the user picked.
    pub sub_sku: SubSku,

    /// Human-readable product title at the time of adding.
    pub title: String,

    /// Unit price at the time of adding.
    pub price_snapshot: Money,

    /// Quantity the user wants (always >= 1).
    pub quantity: u32,

    /// Available stock observed at the time of adding. Informational only.
    pub available_stock_snapshot: u32,

    /// Thumbnail URL, if the catalog provided one.
    pub image_url: Option<String>,

    /// Free-form variant attributes (size, color, ...).
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl CartItem {
    /// Creates a new cart item with no image or attributes.
    pub fn new(
        sku: impl Into<Sku>,
        sub_sku: impl Into<SubSku>,
        title: impl Into<String>,
        price_snapshot: Money,
        quantity: u32,
        available_stock_snapshot: u32,
    ) -> Self {
        Self {
            sku: sku.into(),
            sub_sku: sub_sku.into(),
            title: title.into(),
            price_snapshot,
            quantity,
            available_stock_snapshot,
            image_url: None,
            attributes: HashMap::new(),
        }
    }

    /// Returns the total price for this line (price * quantity).
    pub fn line_total(&self) -> Money {
        self.price_snapshot.multiply(self.quantity)
    }
}

/// A user's shopping cart.
///
/// One cart per user, keyed by `user_id`. Items are ordered by insertion
/// and unique by sku; adding an existing sku merges quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Owner of the cart.
    pub user_id: UserId,

    /// Line items, insertion-ordered, unique by sku.
    pub items: Vec<CartItem>,

    /// ISO currency code for all price snapshots.
    pub currency: String,

    /// Bumped on every durable write; last write wins.
    pub version: i64,

    /// When the cart was first persisted.
    pub created_at: DateTime<Utc>,

    /// When the cart was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a user.
    pub fn empty(user_id: UserId, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            items: Vec::new(),
            currency: currency.into(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the cart has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of distinct line items.
    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// Returns the quantity of a sku in the cart, or 0 if absent.
    pub fn quantity_of(&self, sku: &Sku) -> u32 {
        self.items
            .iter()
            .find(|item| &item.sku == sku)
            .map(|item| item.quantity)
            .unwrap_or(0)
    }

    /// Returns the item for a sku, if present.
    pub fn find_item(&self, sku: &Sku) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.sku == sku)
    }

    /// Returns the sum of line totals.
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Adds an item, or merges it into the existing line for the same sku.
    ///
    /// On merge the quantities are summed and the price snapshot, title,
    /// stock snapshot, image and attributes are overwritten with the new
    /// values (the incoming item carries fresher catalog data).
    pub fn add_or_merge_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity: 0 });
        }
        match self.items.iter_mut().find(|existing| existing.sku == item.sku) {
            Some(existing) => {
                existing.quantity += item.quantity;
                existing.sub_sku = item.sub_sku;
                existing.title = item.title;
                existing.price_snapshot = item.price_snapshot;
                existing.available_stock_snapshot = item.available_stock_snapshot;
                existing.image_url = item.image_url;
                existing.attributes = item.attributes;
            }
            None => self.items.push(item),
        }
        self.touch();
        Ok(())
    }

    /// Removes the line item for a sku.
    pub fn remove_item(&mut self, sku: &Sku) -> Result<CartItem, CartError> {
        let pos = self
            .items
            .iter()
            .position(|item| &item.sku == sku)
            .ok_or_else(|| CartError::ItemNotFound {
                sku: sku.to_string(),
            })?;
        let removed = self.items.remove(pos);
        self.touch();
        Ok(removed)
    }

    /// Removes every line item whose sku appears in `skus`.
    ///
    /// Skus not present in the cart are skipped. Returns how many lines
    /// were removed.
    pub fn remove_items(&mut self, skus: &[Sku]) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !skus.contains(&item.sku));
        let removed = before - self.items.len();
        if removed > 0 {
            self.touch();
        }
        removed
    }

    /// Sets the quantity of an existing line item.
    ///
    /// A quantity of zero or less removes the line.
    pub fn update_item_quantity(&mut self, sku: &Sku, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            self.remove_item(sku)?;
            return Ok(());
        }
        let quantity =
            u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity { quantity })?;
        let item = self
            .items
            .iter_mut()
            .find(|item| &item.sku == sku)
            .ok_or_else(|| CartError::ItemNotFound {
                sku: sku.to_string(),
            })?;
        item.quantity = quantity;
        self.touch();
        Ok(())
    }

    /// Removes all items.
    pub fn clear_items(&mut self) {
        self.items.clear();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
