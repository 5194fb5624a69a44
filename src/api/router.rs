//! Dashboard API router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Handlers use `State<ApiContext>`; CORS is permissive so a local dashboard
/// served from another port can call in.
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/permits",
            get(endpoints::permits::list).post(endpoints::permits::submit),
        )
        .route("/items/:id/state", get(endpoints::items::state))
        .route("/items/:id/history", get(endpoints::items::history))
        .route("/screening", post(endpoints::screening::screen))
        .route("/emergency", post(endpoints::emergency::respond))
        .route("/tutor", post(endpoints::tutor::answer))
        .route("/tutor/tools", post(endpoints::tutor::tool))
        .with_state(ctx);

    Router::new()
        .nest("/api", routes)
        .layer(CorsLayer::permissive())
}
