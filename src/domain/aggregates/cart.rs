//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: Uuid,
    items: Vec<CartItem>,
    coupon_code: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub size: String,
    pub quantity: u32,
}

impl Cart {
    pub fn new(customer_id: Uuid) -> Self {
        Self { customer_id, items: vec![], coupon_code: None, updated_at: Utc::now() }
    }

    pub fn restore(customer_id: Uuid, items: Vec<CartItem>, coupon_code: Option<String>, updated_at: DateTime<Utc>) -> Self {
        Self { customer_id, items, coupon_code, updated_at }
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn coupon_code(&self) -> Option<&str> { self.coupon_code.as_deref() }
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn quantity_of(&self, product_id: Uuid, size: &str) -> u32 {
        self.find(product_id, size).map(|i| i.quantity).unwrap_or(0)
    }

    /// Adds an item, merging with an existing line for the same product and size.
    pub fn add_item(&mut self, item: CartItem, max_per_line: u32) -> Result<(), CartError> {
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        let merged = self.quantity_of(item.product_id, &item.size)
            .checked_add(item.quantity)
            .filter(|q| *q <= max_per_line)
            .ok_or(CartError::LineLimit(max_per_line))?;
        match self.items.iter_mut().find(|i| i.product_id == item.product_id && i.size == item.size) {
            Some(existing) => existing.quantity = merged,
            None => self.items.push(item),
        }
        self.touch();
        Ok(())
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, product_id: Uuid, size: &str, quantity: u32, max_per_line: u32) -> Result<(), CartError> {
        if quantity > max_per_line { return Err(CartError::LineLimit(max_per_line)); }
        let item = self.items.iter_mut().find(|i| i.product_id == product_id && i.size == size).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| !(i.product_id == product_id && i.size == size)); }
        else { item.quantity = quantity; }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid, size: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| !(i.product_id == product_id && i.size == size));
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    pub fn apply_coupon(&mut self, code: &str) { self.coupon_code = Some(code.trim().to_uppercase()); self.touch(); }
    pub fn remove_coupon(&mut self) { self.coupon_code = None; self.touch(); }

    pub fn clear(&mut self) { self.items.clear(); self.coupon_code = None; self.touch(); }

    fn find(&self, product_id: Uuid, size: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id && i.size == size)
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InvalidQuantity, LineLimit(u32) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found in cart"),
            Self::InvalidQuantity => write!(f, "Quantity must be at least 1"),
            Self::LineLimit(max) => write!(f, "At most {} pairs per size can be ordered", max),
        }
    }
}
