//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Sku, Slug};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub slug: String,
    pub brand: String,
    pub description: String,
    pub category: Category,
    pub gender: Gender,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub sizes: Vec<SizeStock>,
    pub status: ProductStatus,
    pub rating_average: f64,
    pub rating_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upper bound for a single size's stock level.
pub const MAX_STOCK: u32 = 1_000_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStock { pub size: String, pub stock: u32 }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category { Sneakers, Running, Casual, Formal, Sandals, Slides, Boots, Sports }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Gender { Men, Women, Unisex, Kids }

/// Everything needed to list a new product.
#[derive(Clone, Debug)]
pub struct ProductDraft {
    pub sku: Sku,
    pub name: String,
    pub brand: String,
    pub description: String,
    pub category: Category,
    pub gender: Gender,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub sizes: Vec<SizeStock>,
    pub status: ProductStatus,
}

impl Product {
    pub fn create(draft: ProductDraft) -> Result<Self, ProductError> {
        let now = Utc::now();
        let mut product = Self {
            id: Uuid::now_v7(), slug: Slug::from_name(&draft.name).into_string(),
            sku: draft.sku, name: draft.name.trim().to_string(), brand: draft.brand.trim().to_string(),
            description: draft.description, category: draft.category, gender: draft.gender,
            price: draft.price, compare_at_price: draft.compare_at_price, images: draft.images,
            tags: normalize_tags(draft.tags), sizes: vec![], status: draft.status,
            rating_average: 0.0, rating_count: 0, created_at: now, updated_at: now,
        };
        for s in draft.sizes { product.put_size(&s.size, s.stock)?; }
        product.check()?;
        Ok(product)
    }

    pub fn is_visible(&self) -> bool { self.status == ProductStatus::Active }

    pub fn size(&self, size: &str) -> Option<&SizeStock> { self.sizes.iter().find(|s| s.size == size) }

    pub fn total_stock(&self) -> u32 { self.sizes.iter().map(|s| s.stock).sum() }

    pub fn rename(&mut self, name: &str) -> Result<(), ProductError> {
        let name = name.trim();
        if name.is_empty() { return Err(ProductError::MissingName); }
        self.name = name.to_string();
        self.slug = Slug::from_name(name).into_string();
        self.touch();
        Ok(())
    }

    pub fn update_price(&mut self, price: Money, compare_at_price: Option<Money>) -> Result<(), ProductError> {
        check_prices(&price, compare_at_price.as_ref())?;
        self.price = price;
        self.compare_at_price = compare_at_price;
        self.touch();
        Ok(())
    }

    pub fn set_tags(&mut self, tags: Vec<String>) { self.tags = normalize_tags(tags); self.touch(); }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.is_empty() { return Err(ProductError::MissingName); }
        if self.images.is_empty() { return Err(ProductError::MissingImage); }
        self.status = ProductStatus::Active;
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }

    /// Inserts or overwrites a size's stock level.
    pub fn put_size(&mut self, size: &str, stock: u32) -> Result<(), ProductError> {
        let size = size.trim();
        if size.is_empty() || size.len() > 16 { return Err(ProductError::InvalidSize(size.to_string())); }
        if stock > MAX_STOCK { return Err(ProductError::StockLimit); }
        match self.sizes.iter_mut().find(|s| s.size == size) {
            Some(existing) => existing.stock = stock,
            None => self.sizes.push(SizeStock { size: size.to_string(), stock }),
        }
        self.touch();
        Ok(())
    }

    fn check(&self) -> Result<(), ProductError> {
        if self.name.is_empty() { return Err(ProductError::MissingName); }
        if self.slug.is_empty() { return Err(ProductError::MissingName); }
        if self.status == ProductStatus::Active && self.images.is_empty() { return Err(ProductError::MissingImage); }
        check_prices(&self.price, self.compare_at_price.as_ref())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn check_prices(price: &Money, compare_at: Option<&Money>) -> Result<(), ProductError> {
    if price.amount().is_sign_negative() { return Err(ProductError::NegativePrice); }
    if let Some(mrp) = compare_at {
        if mrp.currency() != price.currency() || mrp.amount() < price.amount() {
            return Err(ProductError::CompareAtBelowPrice);
        }
    }
    Ok(())
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = tags.into_iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect();
    out.sort();
    out.dedup();
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError { MissingName, MissingImage, NegativePrice, CompareAtBelowPrice, InvalidSize(String), StockLimit }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "Product name is required"),
            Self::MissingImage => write!(f, "An active product needs at least one image"),
            Self::NegativePrice => write!(f, "Price must not be negative"),
            Self::CompareAtBelowPrice => write!(f, "Compare-at price must be at least the selling price"),
            Self::InvalidSize(s) => write!(f, "Invalid size label '{}'", s),
            Self::StockLimit => write!(f, "Stock per size cannot exceed {}", MAX_STOCK),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample(name: &str, price: rust_decimal::Decimal, sizes: &[(&str, u32)]) -> Product {
    let mut p = Product::create(ProductDraft {
        sku: Sku::new(format!("SKU-{}", Slug::from_name(name))).unwrap(),
        name: name.into(), brand: "Stride".into(), description: String::new(),
        category: Category::Running, gender: Gender::Unisex, price: Money::new(price, "INR"),
        compare_at_price: None, images: vec!["https://cdn.example.com/image/upload/p.jpg".into()],
        tags: vec![], sizes: sizes.iter().map(|(s, n)| SizeStock { size: s.to_string(), stock: *n }).collect(),
        status: ProductStatus::Draft,
    }).unwrap();
    p.publish().unwrap();
    p
}
