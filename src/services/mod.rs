//! Application services. Each one owns a slice of the storefront and talks
//! to storage only through [`crate::store::Storage`].

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod content;
pub mod coupons;
pub mod customers;
pub mod events;
pub mod payments;
pub mod reviews;
pub mod wishlist;

pub use auth::AuthService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::OrderService;
pub use content::ContentService;
pub use coupons::CouponService;
pub use customers::CustomerService;
pub use events::{EventPublisher, NatsPublisher, NoopPublisher};
pub use payments::PaymentGateway;
pub use reviews::ReviewService;
pub use wishlist::WishlistService;
