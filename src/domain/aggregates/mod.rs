//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod coupon;
pub mod customer;
pub mod review;
pub mod content;

pub use product::{Category, Gender, Product, ProductDraft, ProductError, ProductStatus, SizeStock, MAX_STOCK};
pub use order::{Actor, Address, Order, OrderDraft, OrderError, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, Tracking};
pub use cart::{Cart, CartError, CartItem};
pub use coupon::{Coupon, CouponKind, CouponRejection};
pub use customer::{Customer, Role};
pub use review::{Review, ReviewError};
pub use content::{BestSeller, Collection};
