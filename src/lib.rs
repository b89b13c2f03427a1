//! Solestore: a direct-to-consumer footwear storefront with its back office.
//!
//! ## Features
//! - Product catalog with per-size stock
//! - Cart with live pricing, coupons and shipping
//! - Checkout that reserves stock atomically and is idempotent per client key
//! - Online payments held for a payment window, released when they lapse
//! - Order tracking, reviews, wishlist and curated collections
//! - Admin inventory, orders, coupons, content and customers

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod state;
pub mod store;
pub mod worker;

pub use error::{Result, StoreError};
pub use state::AppState;
