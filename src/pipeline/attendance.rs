use std::collections::HashMap;

use bytes::Bytes;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::ProcessError;
use crate::models::event::{round_to, FaceResult, FaceStatus};
use crate::pipeline::cache::CachedEmbedding;
use crate::pipeline::decision::{DecisionEngine, Verdict};
use crate::pipeline::inference::{AnalyzedFace, AnalyzedFrame};
use crate::pipeline::recorder::{AttendanceWrite, RecognitionBatch, VisitorWrite};
use crate::pipeline::{note_failure, RecognitionReport};
use crate::AppState;

/// Which recognition request is being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Matched faces mark today's attendance.
    Attendance,
    /// Matched faces are only reported as authorized.
    Intrusion,
}

impl Mode {
    fn visitor_alert(&self) -> &'static str {
        match self {
            Mode::Attendance => "An unregistered person detected",
            Mode::Intrusion => "Visitor Detected",
        }
    }
}

/// Rank and assess every face in parallel. Returns once all faces are done.
pub fn classify(engine: &DecisionEngine, snapshot: &[CachedEmbedding], faces: &[AnalyzedFace]) -> Vec<Verdict> {
    faces
        .par_iter()
        .map(|f| {
            let ranked = engine.rank(&f.embedding, snapshot);
            let verdict = engine.assess(&ranked);
            debug!(face = f.face, ?verdict, "face classified");
            verdict
        })
        .collect()
}

pub async fn process_attendance(state: &AppState, upload: Bytes) -> Result<RecognitionReport, ProcessError> {
    state.stats.inc_attendance_requests();
    let result = recognize(state, upload, Mode::Attendance).await;
    if let Err(e) = &result {
        note_failure(&state.stats, e);
    }
    result
}

pub async fn process_intrusion(state: &AppState, upload: Bytes) -> Result<RecognitionReport, ProcessError> {
    state.stats.inc_intrusion_requests();
    let result = recognize(state, upload, Mode::Intrusion).await;
    if let Err(e) = &result {
        note_failure(&state.stats, e);
    }
    result
}

async fn recognize(state: &AppState, upload: Bytes, mode: Mode) -> Result<RecognitionReport, ProcessError> {
    let frame = state.frames.analyze(upload).await?;
    state.stats.inc_faces(frame.detected as u64, frame.skipped.len() as u64);
    let latency = frame.detection_latency;
    let skipped = frame.skipped.clone();
    let faces = classify_frame(state, frame).await?;

    let mut batch = RecognitionBatch {
        attendance: Vec::new(),
        visitors: Vec::new(),
        detection_latency: latency,
        visitor_alert: mode.visitor_alert(),
    };
    for (face, verdict) in &faces {
        match verdict {
            Verdict::Unmatched { confidence } => batch.visitors.push(VisitorWrite {
                face: face.face,
                crop: face.crop.clone(),
                confidence: *confidence,
            }),
            Verdict::Matched { user_id, confidence } if mode == Mode::Attendance => {
                batch.attendance.push(AttendanceWrite { face: face.face, user_id: user_id.clone(), confidence: *confidence })
            }
            _ => {}
        }
    }

    let recorder = state.recorder.clone();
    let inserted = tokio::task::spawn_blocking(move || recorder.record_recognition(batch)).await??;

    let report = build_report(mode, &faces, &skipped, &inserted, latency);
    for r in &report.results {
        state.stats.record_face(r.status);
    }
    info!(
        mode = ?mode,
        faces = report.results.len(),
        skipped = skipped.len(),
        latency_secs = latency,
        "recognition request complete"
    );
    Ok(report)
}

fn build_report(
    mode: Mode,
    faces: &[(AnalyzedFace, Verdict)],
    skipped: &[usize],
    inserted: &HashMap<usize, bool>,
    latency: f64,
) -> RecognitionReport {
    let mut messages: Vec<String> = skipped.iter().map(|i| format!("Face {} skipped (low confidence)", i)).collect();
    let mut results = Vec::with_capacity(faces.len());
    let speed = round_to(latency, 4);

    for (face, verdict) in faces {
        let n = face.face;
        let conf = verdict.confidence();
        let (status, user_id) = match verdict {
            Verdict::Unmatched { .. } => {
                messages.push(format!("Visitor detected (face {}, confidence: {:.2}%, speed: {:.4}s)", n, conf, latency));
                (FaceStatus::Visitor, None)
            }
            Verdict::Ambiguous { user_id, .. } => {
                messages.push(format!("Ambiguous face detected (face {}, confidence: {:.2}%, speed: {:.4}s)", n, conf, latency));
                (FaceStatus::Ambiguous, Some(user_id.clone()))
            }
            Verdict::Matched { user_id, .. } if mode == Mode::Intrusion => {
                messages.push(format!(
                    "Authorized user detected: {} (face {}, confidence: {:.2}%, speed: {:.4}s)",
                    user_id, n, conf, latency
                ));
                (FaceStatus::Authorized, Some(user_id.clone()))
            }
            Verdict::Matched { user_id, .. } => {
                let fresh = inserted.get(&n).copied().unwrap_or(false);
                let status = DecisionEngine::attendance_status(!fresh);
                if fresh {
                    messages.push(format!(
                        "Attendance marked for {} (face {}, confidence: {:.2}%, speed: {:.4}s)",
                        user_id, n, conf, latency
                    ));
                } else {
                    messages.push(format!(
                        "Attendance already marked for {} (face {}, confidence: {:.2}%, speed: {:.4}s)",
                        user_id, n, conf, latency
                    ));
                }
                (status, Some(user_id.clone()))
            }
        };
        results.push(FaceResult { face: n, status, user_id, confidence: round_to(conf, 2), detected_speed: speed });
    }

    RecognitionReport { message: messages.join("; "), results }
}

/// Pair every face of the frame with its verdict, off the async workers.
pub async fn classify_frame(state: &AppState, frame: AnalyzedFrame) -> Result<Vec<(AnalyzedFace, Verdict)>, ProcessError> {
    let engine = state.engine.clone();
    let snapshot = state.cache.snapshot();
    let faces = frame.faces;
    let out = tokio::task::spawn_blocking(move || {
        let verdicts = classify(&engine, &snapshot, &faces);
        faces.into_iter().zip(verdicts).collect::<Vec<_>>()
    })
    .await?;
    Ok(out)
}
