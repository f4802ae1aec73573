pub mod alert;
pub mod attendance;
pub mod cache;
pub mod decision;
pub mod geofence;
pub mod inference;
pub mod matcher;
pub mod photos;
pub mod recorder;
pub mod training;
pub mod zone;

use serde::Serialize;

use crate::error::ProcessError;
use crate::models::event::FaceResult;
use crate::stats::Stats;

/// Outcome of one recognition request: the joined status messages plus per-face rows.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionReport {
    pub message: String,
    pub results: Vec<FaceResult>,
}

/// Count a failed request by error kind.
pub(crate) fn note_failure(stats: &Stats, err: &ProcessError) {
    match err {
        ProcessError::Recognition(_) => stats.inc_recognition_failures(),
        ProcessError::Store(_) | ProcessError::Internal(_) => stats.inc_store_failures(),
        _ => {}
    }
}
