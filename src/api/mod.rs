pub mod auth;
pub mod error;
pub mod filters;
pub mod orders;
pub mod pagination;
pub mod products;
pub mod rate_limit;
mod users;
pub mod validation;

use axum::{
    extract::FromRequest,
    middleware,
    response::Redirect,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

use error::ApiError;

/// `Json` whose decode failures use the API error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

pub fn create_router(state: Arc<AppState>) -> Router {
    // Catalogue: the list carries its own throttle scope
    let product_list_routes = Router::new()
        .route(
            "/products/",
            get(products::list_products).post(products::create_product),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::throttle_products,
        ));

    let product_routes = Router::new()
        .route("/products/info/", get(products::product_info))
        .route(
            "/products/:product_id/",
            get(products::get_product)
                .put(products::update_product)
                .patch(products::partial_update_product)
                .delete(products::delete_product),
        )
        .merge(product_list_routes);

    // Order viewset, throttled as a whole
    let order_routes = Router::new()
        .route("/orders/", get(orders::list_orders).post(orders::create_order))
        .route(
            "/orders/:order_id/",
            get(orders::get_order)
                .put(orders::update_order)
                .patch(orders::update_order)
                .delete(orders::delete_order),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::throttle_orders,
        ));

    let auth_routes = Router::new()
        .route("/users/", get(users::list_users))
        .route("/auth/users/", post(auth::register))
        .route("/auth/users/me/", get(auth::me))
        .route("/api/token/", post(auth::obtain_token_pair))
        .route("/api/token/refresh/", post(auth::refresh_token));

    Router::new()
        .merge(product_routes)
        .merge(order_routes)
        .merge(auth_routes)
        // anon/user throttling for every API route
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::throttle_default,
        ))
        .route("/", get(|| async { Redirect::temporary("/products/") }))
        .route("/health", get(health_check))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found.")
}
