//! HTTP and WebSocket surface.

pub mod investigations;
pub mod ws;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(
            "/api/investigations",
            post(investigations::start).get(investigations::list),
        )
        .route("/api/investigations/:id", get(investigations::get_one))
        .route("/api/investigations/:id/export", post(investigations::export))
        .route("/ws/investigations/:id", get(ws::investigation_ws))
        .route("/ws/:org_id", get(ws::org_ws));

    if let Some(origin) = &state.config.server.cors_origin {
        let cors = if origin == "*" {
            CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
        } else {
            match origin.parse::<HeaderValue>() {
                Ok(value) => CorsLayer::new()
                    .allow_origin(AllowOrigin::exact(value))
                    .allow_methods(Any)
                    .allow_headers(Any),
                Err(_) => {
                    tracing::warn!(origin, "invalid cors_origin, skipping CORS layer");
                    CorsLayer::new()
                }
            }
        };
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
