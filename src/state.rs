//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::config::{AuthSettings, StoreSettings};
use crate::services::{
    AuthService, CartService, CatalogService, ContentService, CouponService, CustomerService, EventPublisher,
    OrderService, PaymentGateway, ReviewService, WishlistService,
};
use crate::store::Storage;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub auth: AuthService,
    pub catalog: CatalogService,
    pub carts: CartService,
    pub orders: OrderService,
    pub coupons: CouponService,
    pub reviews: ReviewService,
    pub wishlist: WishlistService,
    pub content: ContentService,
    pub customers: CustomerService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Storage>,
        events: Arc<dyn EventPublisher>,
        auth: AuthSettings,
        settings: StoreSettings,
        payment_secret: &str,
    ) -> Self {
        let catalog = CatalogService::new(store.clone(), events.clone(), settings.clone());
        let carts = CartService::new(store.clone(), settings.clone());
        let orders = OrderService::new(
            store.clone(),
            carts.clone(),
            catalog.clone(),
            PaymentGateway::new(payment_secret),
            events.clone(),
            settings,
        );
        Self {
            auth: AuthService::new(store.clone(), auth),
            coupons: CouponService::new(store.clone()),
            reviews: ReviewService::new(store.clone(), events),
            wishlist: WishlistService::new(store.clone(), catalog.clone()),
            content: ContentService::new(store.clone(), catalog.clone()),
            customers: CustomerService::new(store.clone()),
            catalog,
            carts,
            orders,
            store,
        }
    }
}
