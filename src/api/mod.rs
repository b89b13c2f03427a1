//! HTTP layer: routing and thin handlers over the services.

pub mod account;
pub mod admin;
pub mod cart;
pub mod catalog;
pub mod content;
pub mod extract;
pub mod health;
pub mod orders;
pub mod wishlist;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::store::PageRequest;

/// `?page=&per_page=` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<PageQuery> for PageRequest {
    fn from(q: PageQuery) -> Self { PageRequest::new(q.page, q.per_page) }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(account::register))
        .route("/auth/login", post(account::login))
        .route("/account", get(account::profile).put(account::update_profile))
        // storefront
        .route("/products", get(catalog::list_products))
        .route("/products/slug/:slug", get(catalog::product_by_slug))
        .route("/products/:id", get(catalog::get_product))
        .route("/products/:id/reviews", get(catalog::list_reviews).post(catalog::post_review))
        .route("/reviews/:id", delete(catalog::delete_review))
        .route("/collections", get(content::list_collections))
        .route("/collections/:slug", get(content::collection_by_slug))
        .route("/best-sellers", get(content::best_sellers))
        // cart and checkout
        .route("/cart", get(cart::view).delete(cart::clear))
        .route("/cart/items", post(cart::add_item))
        .route("/cart/items/:product_id/:size", put(cart::update_item).delete(cart::remove_item))
        .route("/cart/coupon", post(cart::apply_coupon).delete(cart::remove_coupon))
        .route("/orders", get(orders::list).post(orders::place))
        .route("/orders/track/:order_number", get(orders::track))
        .route("/orders/:id", get(orders::get))
        .route("/orders/:id/cancel", post(orders::cancel))
        .route("/orders/:id/payment", post(orders::confirm_payment))
        .route("/orders/:id/payment/failure", post(orders::fail_payment))
        .route("/wishlist", get(wishlist::list).post(wishlist::add))
        .route("/wishlist/:product_id", delete(wishlist::remove))
        .nest("/admin", admin::routes())
}
