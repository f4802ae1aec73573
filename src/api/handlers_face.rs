use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiError;
use crate::error::ProcessError;
use crate::pipeline::geofence::Point;
use crate::pipeline::{attendance, training, zone};
use crate::AppState;

/// Collect every non-empty `image` part of a multipart upload.
async fn read_images(mut multipart: Multipart) -> Result<Vec<Bytes>, ApiError> {
    let mut images = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProcessError::input(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let data = field.bytes().await.map_err(|e| ProcessError::input(format!("Invalid upload: {}", e)))?;
        if !data.is_empty() {
            images.push(data);
        }
    }
    Ok(images)
}

async fn single_image(multipart: Multipart) -> Result<Bytes, ApiError> {
    read_images(multipart)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ProcessError::input("No image provided").into())
}

pub async fn process_attendance(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let image = single_image(multipart).await?;
    let report = attendance::process_attendance(&state, image).await?;
    Ok(Json(json!({ "status": "success", "message": report.message, "results": report.results })))
}

pub async fn process_intrusion(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let image = single_image(multipart).await?;
    let report = attendance::process_intrusion(&state, image).await?;
    Ok(Json(json!({ "status": "success", "message": report.message, "results": report.results })))
}

pub async fn process_geo_fence(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let image = single_image(multipart).await?;
    let report = zone::process_geo_fence(&state, image).await?;
    Ok(Json(json!({ "status": "success", "message": report.message, "results": report.results })))
}

#[derive(Deserialize)]
struct BoundaryRequest {
    boundary: Option<Vec<Point>>,
}

pub async fn save_geo_fence_boundary(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: BoundaryRequest = serde_json::from_slice(&body)
        .map_err(|e| ProcessError::input(format!("Invalid boundary point format: {}", e)))?;
    let points = req.boundary.unwrap_or_default();
    zone::save_boundary(&state, points).await?;
    Ok(Json(json!({ "status": "success", "message": "Geo-fence boundary saved successfully" })))
}

pub async fn get_geo_fence_boundary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "success", "boundary": zone::current_boundary(&state) }))
}

pub async fn train_model(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let photos = read_images(multipart).await?;
    if photos.is_empty() {
        return Err(ProcessError::input("No image provided").into());
    }
    let faces = training::train_user(&state, &user_id, photos).await?;
    Ok(Json(json!({ "status": "success", "message": "Training completed successfully", "faces_used": faces })))
}
