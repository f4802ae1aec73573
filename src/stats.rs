use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::models::event::FaceStatus;

pub struct Stats {
    attendance_requests: AtomicU64,
    intrusion_requests: AtomicU64,
    geofence_requests: AtomicU64,
    recognition_failures: AtomicU64,
    store_failures: AtomicU64,
    faces_detected: AtomicU64,
    faces_skipped: AtomicU64,
    present: AtomicU64,
    already_marked: AtomicU64,
    ambiguous: AtomicU64,
    visitors: AtomicU64,
    authorized: AtomicU64,
    zone_breaches: AtomicU64,
    zone_authorized: AtomicU64,
    trainings: AtomicU64,
    alerts_sent: AtomicU64,
    alerts_failed: AtomicU64,
    alerts_dropped: AtomicU64,
    started: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub attendance_requests: u64,
    pub intrusion_requests: u64,
    pub geofence_requests: u64,
    pub recognition_failures: u64,
    pub store_failures: u64,
    pub faces_detected: u64,
    pub faces_skipped: u64,
    pub present: u64,
    pub already_marked: u64,
    pub ambiguous: u64,
    pub visitors: u64,
    pub authorized: u64,
    pub zone_breaches: u64,
    pub zone_authorized: u64,
    pub trainings: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub alerts_dropped: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

fn load(v: &AtomicU64) -> u64 {
    v.load(Ordering::Relaxed)
}

impl Stats {
    pub fn new() -> Self {
        Self {
            attendance_requests: AtomicU64::new(0),
            intrusion_requests: AtomicU64::new(0),
            geofence_requests: AtomicU64::new(0),
            recognition_failures: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            faces_detected: AtomicU64::new(0),
            faces_skipped: AtomicU64::new(0),
            present: AtomicU64::new(0),
            already_marked: AtomicU64::new(0),
            ambiguous: AtomicU64::new(0),
            visitors: AtomicU64::new(0),
            authorized: AtomicU64::new(0),
            zone_breaches: AtomicU64::new(0),
            zone_authorized: AtomicU64::new(0),
            trainings: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
            alerts_failed: AtomicU64::new(0),
            alerts_dropped: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
    pub fn inc_attendance_requests(&self) { self.attendance_requests.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_intrusion_requests(&self) { self.intrusion_requests.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_geofence_requests(&self) { self.geofence_requests.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_recognition_failures(&self) { self.recognition_failures.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_store_failures(&self) { self.store_failures.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_faces(&self, detected: u64, skipped: u64) {
        self.faces_detected.fetch_add(detected, Ordering::Relaxed);
        self.faces_skipped.fetch_add(skipped, Ordering::Relaxed);
    }
    pub fn record_face(&self, status: FaceStatus) {
        let counter = match status {
            FaceStatus::Present => &self.present,
            FaceStatus::AlreadyMarked => &self.already_marked,
            FaceStatus::Ambiguous => &self.ambiguous,
            FaceStatus::Visitor => &self.visitors,
            FaceStatus::Authorized => &self.authorized,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_zone_breaches(&self) { self.zone_breaches.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_zone_authorized(&self) { self.zone_authorized.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_trainings(&self) { self.trainings.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_alerts_sent(&self) { self.alerts_sent.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_alerts_failed(&self) { self.alerts_failed.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_alerts_dropped(&self) { self.alerts_dropped.fetch_add(1, Ordering::Relaxed); }
    pub fn alerts_dropped(&self) -> u64 { load(&self.alerts_dropped) }
    pub fn uptime_secs(&self) -> u64 { self.started.elapsed().as_secs() }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.uptime_secs(),
            attendance_requests: load(&self.attendance_requests),
            intrusion_requests: load(&self.intrusion_requests),
            geofence_requests: load(&self.geofence_requests),
            recognition_failures: load(&self.recognition_failures),
            store_failures: load(&self.store_failures),
            faces_detected: load(&self.faces_detected),
            faces_skipped: load(&self.faces_skipped),
            present: load(&self.present),
            already_marked: load(&self.already_marked),
            ambiguous: load(&self.ambiguous),
            visitors: load(&self.visitors),
            authorized: load(&self.authorized),
            zone_breaches: load(&self.zone_breaches),
            zone_authorized: load(&self.zone_authorized),
            trainings: load(&self.trainings),
            alerts_sent: load(&self.alerts_sent),
            alerts_failed: load(&self.alerts_failed),
            alerts_dropped: load(&self.alerts_dropped),
        }
    }

    pub fn metrics_text(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();
        out.push_str(&format!("hostelwatch_uptime_seconds {}\n", s.uptime_secs));
        out.push_str(&format!("hostelwatch_faces_detected_total {}\n", s.faces_detected));
        out.push_str(&format!("hostelwatch_faces_skipped_total {}\n", s.faces_skipped));
        out.push_str(&format!("hostelwatch_attendance_present_total {}\n", s.present));
        out.push_str(&format!("hostelwatch_visitors_total {}\n", s.visitors));
        out.push_str(&format!("hostelwatch_zone_breaches_total {}\n", s.zone_breaches));
        out.push_str(&format!("hostelwatch_alerts_dropped_total {}\n", s.alerts_dropped));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_counters() {
        let stats = Stats::new();
        stats.record_face(FaceStatus::Present);
        stats.record_face(FaceStatus::Visitor);
        stats.record_face(FaceStatus::Visitor);
        stats.inc_faces(3, 1);
        let s = stats.snapshot();
        assert_eq!(s.present, 1);
        assert_eq!(s.visitors, 2);
        assert_eq!(s.faces_detected, 3);
        assert_eq!(s.faces_skipped, 1);
        assert!(stats.metrics_text().contains("hostelwatch_visitors_total 2"));
    }
}
