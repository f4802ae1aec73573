use bytes::Bytes;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::db::writer;
use crate::error::ProcessError;
use crate::models::event::ZoneStatus;
use crate::pipeline::decision::ZoneVerdict;
use crate::pipeline::geofence::{Point, Polygon};
use crate::pipeline::note_failure;
use crate::pipeline::recorder::ZoneFace;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ZoneResult {
    pub face: usize,
    pub status: ZoneStatus,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneReport {
    pub message: String,
    pub results: Vec<ZoneResult>,
}

pub async fn process_geo_fence(state: &AppState, upload: Bytes) -> Result<ZoneReport, ProcessError> {
    state.stats.inc_geofence_requests();
    let result = evaluate(state, upload).await;
    if let Err(e) = &result {
        note_failure(&state.stats, e);
    }
    result
}

async fn evaluate(state: &AppState, upload: Bytes) -> Result<ZoneReport, ProcessError> {
    let polygon = state.boundary.get().ok_or_else(|| ProcessError::input("Geo-fence boundary not set"))?;

    let inside = polygon.clone();
    let frame = state.frames.analyze_where(upload, move |d| inside.contains_box(&d.bbox)).await?;
    state.stats.inc_faces(frame.detected as u64, frame.skipped.len() as u64);
    if frame.faces.is_empty() {
        debug!(outside = frame.excluded.len(), "no faces inside boundary");
        return Ok(ZoneReport { message: "No faces detected in boundary".to_string(), results: Vec::new() });
    }

    let engine = state.engine.clone();
    let snapshot = state.cache.snapshot();
    let faces = frame.faces;
    let zone_faces: Vec<ZoneFace> = tokio::task::spawn_blocking(move || {
        faces
            .into_par_iter()
            .map(|f| {
                let ranked = engine.rank(&f.embedding, &snapshot);
                let matched = engine.zone_match(&ranked).map(|c| c.user_id.clone());
                debug!(face = f.face, matched = ?matched, "zone face ranked");
                ZoneFace { face: f.face, crop: f.crop, matched }
            })
            .collect()
    })
    .await?;

    let recorder = state.recorder.clone();
    let outcomes = tokio::task::spawn_blocking(move || recorder.record_zone(zone_faces)).await??;

    let mut messages = Vec::with_capacity(outcomes.len());
    let mut results = Vec::with_capacity(outcomes.len());
    for (face, verdict) in outcomes {
        let user_id = match &verdict {
            ZoneVerdict::UnknownIntruder => {
                messages.push(format!("Unauthorized breach detected (face {})", face));
                state.stats.inc_zone_breaches();
                None
            }
            ZoneVerdict::Breach { user_id } => {
                messages.push(format!("Hostelite breach: {} (face {})", user_id, face));
                state.stats.inc_zone_breaches();
                Some(user_id.clone())
            }
            ZoneVerdict::Authorized { user_id, role } => {
                messages.push(format!("Authorized {} {} in zone", role, user_id));
                state.stats.inc_zone_authorized();
                Some(user_id.clone())
            }
        };
        results.push(ZoneResult { face, status: verdict.status(), user_id });
    }
    info!(faces = results.len(), outside = frame.excluded.len(), "geofence request complete");

    let message = if messages.is_empty() { "No unauthorized breaches detected".to_string() } else { messages.join("; ") };
    Ok(ZoneReport { message, results })
}

/// Validate, persist and swap in a new boundary. Returns the point count.
pub async fn save_boundary(state: &AppState, points: Vec<Point>) -> Result<usize, ProcessError> {
    let polygon = Polygon::new(points).map_err(|e| ProcessError::input(e.to_string()))?;
    let count = polygon.points().len();
    let pool = state.pool.clone();
    let boundary = state.boundary.clone();
    tokio::task::spawn_blocking(move || -> Result<(), ProcessError> {
        let conn = pool.get()?;
        boundary.save_with(polygon, |p| {
            let json = serde_json::to_string(p.points()).map_err(ProcessError::internal)?;
            writer::save_boundary(&conn, &json).map_err(ProcessError::Store)
        })
    })
    .await??;
    info!(points = count, "geofence boundary saved");
    Ok(count)
}

/// Current boundary points; empty when none has been saved.
pub fn current_boundary(state: &AppState) -> Vec<Point> {
    state.boundary.get().map(|p| p.points().to_vec()).unwrap_or_default()
}
