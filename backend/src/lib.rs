use axum::{http::Method, middleware as axum_middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;

use state::AppState;

/// Full application router: health, OpenAPI docs and the audit query surface.
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest(
            handlers::audit_logs::AUDIT_API_PREFIX,
            handlers::audit_logs::audit_routes(),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs::ApiDoc::openapi()));
    with_audit_layers(routes, state)
}

/// Wraps `routes` in the shared layers. Outermost first: trace/CORS, request
/// id, request-boundary capture, identity.
pub fn with_audit_layers(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::identity::identity,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::audit_log::audit_log,
        ))
        .layer(axum_middleware::from_fn(middleware::request_id::request_id))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
                        .allow_headers(Any)
                        .max_age(std::time::Duration::from_secs(24 * 60 * 60)),
                ),
        )
        .with_state(state)
}
