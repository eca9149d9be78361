//! Route configuration.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::handlers;
use crate::ratelimit::rate_limit_middleware;
use crate::state::AppState;

/// Create the application router.
///
/// Per route group, outermost first: rate limit, then auth, then the
/// handler. `/deploy` and `/rollback` share one limiter pool; `/health`
/// carries neither limiter nor auth so load balancers can probe it.
pub fn create_router(state: AppState) -> Router {
    let check_routes = Router::new()
        .route("/check", post(handlers::check))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.check_limiter.clone(),
            rate_limit_middleware,
        ));

    let deploy_routes = Router::new()
        .route("/deploy", post(handlers::deploy))
        .route("/rollback", post(handlers::rollback))
        // Archives carry whole build outputs; the default body cap is far
        // too small for them.
        .route_layer(DefaultBodyLimit::disable())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.deploy_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(check_routes)
        .merge(deploy_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
