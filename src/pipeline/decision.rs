use std::sync::Arc;

use crate::models::event::{FaceStatus, ZoneStatus};
use crate::models::identity::Role;
use crate::pipeline::cache::CachedEmbedding;
use crate::pipeline::matcher::{Candidate, LinearScanMatcher, Matcher};

/// Tunables for classifying one face. Passed to the engine at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionConfig {
    pub threshold: f32,
    pub ambiguity_margin: f32,
    pub confidence_scale: f32,
    pub ambiguous_confidence_cap: f32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self { threshold: 0.9, ambiguity_margin: 0.09, confidence_scale: 100.0, ambiguous_confidence_cap: 50.0 }
    }
}

/// Identity verdict for one face, before any attendance lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// No candidate within the threshold. `confidence` is confidence in the negative call.
    Unmatched { confidence: f64 },
    /// Best and runner-up too close to trust, whatever the threshold says.
    Ambiguous { user_id: String, confidence: f64 },
    Matched { user_id: String, confidence: f64 },
}

impl Verdict {
    pub fn confidence(&self) -> f64 {
        match self {
            Verdict::Unmatched { confidence }
            | Verdict::Ambiguous { confidence, .. }
            | Verdict::Matched { confidence, .. } => *confidence,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Verdict::Unmatched { .. } => None,
            Verdict::Ambiguous { user_id, .. } | Verdict::Matched { user_id, .. } => Some(user_id),
        }
    }
}

/// Verdict for a face already known to be inside the geofence.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneVerdict {
    UnknownIntruder,
    /// Matched identity whose role may be in the zone.
    Authorized { user_id: String, role: Role },
    /// Matched hostelite.
    Breach { user_id: String },
}

impl ZoneVerdict {
    pub fn status(&self) -> ZoneStatus {
        match self {
            ZoneVerdict::Authorized { .. } => ZoneStatus::Authorized,
            _ => ZoneStatus::Breach,
        }
    }
}

pub struct DecisionEngine {
    config: DecisionConfig,
    matcher: Arc<dyn Matcher>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig, matcher: Arc<dyn Matcher>) -> Self {
        Self { config, matcher }
    }

    pub fn with_linear_scan(config: DecisionConfig) -> Self {
        Self::new(config, Arc::new(LinearScanMatcher))
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn rank(&self, query: &[f32], entries: &[CachedEmbedding]) -> Vec<Candidate> {
        self.matcher.rank(query, entries)
    }

    /// Match confidence for the best distance; 0 with no candidate.
    pub fn match_confidence(&self, best: Option<f32>) -> f64 {
        let Some(d1) = best else { return 0.0 };
        let threshold = self.config.threshold as f64;
        if threshold <= 0.0 {
            return 0.0;
        }
        (self.config.confidence_scale as f64 * (1.0 - d1 as f64 / threshold)).max(0.0)
    }

    fn within_threshold<'a>(&self, candidate: Option<&'a Candidate>) -> Option<&'a Candidate> {
        candidate.filter(|c| c.distance <= self.config.threshold)
    }

    /// Classify ranked candidates for the attendance and intrusion paths.
    ///
    /// The ambiguity rule is checked first and wins over the threshold.
    pub fn assess(&self, ranked: &[Candidate]) -> Verdict {
        let best = ranked.first();
        let confidence = self.match_confidence(best.map(|c| c.distance));
        if let (Some(first), Some(second)) = (ranked.first(), ranked.get(1)) {
            // compared in f64
            let gap = second.distance as f64 - first.distance as f64;
            if gap < self.config.ambiguity_margin as f64 {
                tracing::warn!(
                    best = %first.user_id, best_distance = first.distance,
                    runner_up = %second.user_id, runner_up_distance = second.distance,
                    "ambiguous match"
                );
                return Verdict::Ambiguous {
                    user_id: first.user_id.clone(),
                    confidence: confidence.min(self.config.ambiguous_confidence_cap as f64),
                };
            }
        }
        match self.within_threshold(best) {
            Some(c) => Verdict::Matched { user_id: c.user_id.clone(), confidence },
            None => Verdict::Unmatched { confidence: self.config.confidence_scale as f64 - confidence },
        }
    }

    /// Attendance status for a matched face, given whether today's row already exists.
    pub fn attendance_status(already_marked: bool) -> FaceStatus {
        if already_marked {
            FaceStatus::AlreadyMarked
        } else {
            FaceStatus::Present
        }
    }

    /// Best match within the threshold for the zone path; no ambiguity rule.
    pub fn zone_match<'a>(&self, ranked: &'a [Candidate]) -> Option<&'a Candidate> {
        ranked.first().filter(|c| c.distance <= self.config.threshold)
    }

    /// Role gate for a face inside the boundary. `role` is `None` when the
    /// matched id has no user row; that is treated as an unknown intruder.
    pub fn zone_verdict(matched: Option<&str>, role: Option<Role>) -> ZoneVerdict {
        match (matched, role) {
            (Some(id), Some(role)) if role.zone_authorized() => ZoneVerdict::Authorized { user_id: id.to_string(), role },
            (Some(id), Some(_)) => ZoneVerdict::Breach { user_id: id.to_string() },
            _ => ZoneVerdict::UnknownIntruder,
        }
    }
}
