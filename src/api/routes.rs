use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::{Router, routing::{get, post}};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use crate::AppState;
use crate::api::{handlers, handlers_face};

// Camera frames and training batches are larger than axum's 2 MB default
const UPLOAD_LIMIT: usize = 64 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec![axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/metrics", get(handlers::metrics))
        .route("/photos/:name", get(handlers::photo))
        .route("/attendance/today", get(handlers::attendance_today))
        .route("/date_report/:date", get(handlers::date_report))
        .route("/individual_history/:user_id", get(handlers::individual_history))
        .route("/notifications", get(handlers::notifications))
        .route("/clear_notifications", post(handlers::clear_notifications))
        .route("/insights", get(handlers::insights))
        .route("/process_attendance", post(handlers_face::process_attendance))
        .route("/process_intrusion", post(handlers_face::process_intrusion))
        .route("/process_geo_fence", post(handlers_face::process_geo_fence))
        .route("/save_geo_fence_boundary", post(handlers_face::save_geo_fence_boundary))
        .route("/get_geo_fence_boundary", get(handlers_face::get_geo_fence_boundary))
        .route("/train_model/:user_id", post(handlers_face::train_model))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .layer(cors)
        .with_state(state)
}
