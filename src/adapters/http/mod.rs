pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::adapters::http::state::HttpState;
use crate::adapters::http::ws::ws_handler;

pub fn router(state: HttpState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/config", get(routes::get_config))
        .route("/api/session", get(routes::get_session))
        .route("/api/session/events", post(routes::post_event))
        .route("/api/image", post(routes::post_image))
        .route("/api/video", post(routes::post_video))
        .route("/api/cameras", get(routes::list_cameras))
        .route("/ws/stream", get(ws_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
