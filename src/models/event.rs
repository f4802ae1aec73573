use serde::{Deserialize, Serialize};

/// Per-face outcome of an attendance or intrusion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceStatus {
    Present,
    #[serde(rename = "Already Marked")]
    AlreadyMarked,
    Ambiguous,
    Visitor,
    Authorized,
}

impl FaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaceStatus::Present => "Present",
            FaceStatus::AlreadyMarked => "Already Marked",
            FaceStatus::Ambiguous => "Ambiguous",
            FaceStatus::Visitor => "Visitor",
            FaceStatus::Authorized => "Authorized",
        }
    }
}

/// Per-face outcome inside a geofence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneStatus {
    #[serde(rename = "Zone Breach")]
    Breach,
    #[serde(rename = "Authorized in Zone")]
    Authorized,
}

pub const VISITOR_STATUS: &str = "Visitor";
pub const BREACH_STATUS: &str = "Zone Breach";

/// One row of the per-face `results` array in recognition responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceResult {
    pub face: usize,
    pub status: FaceStatus,
    pub user_id: Option<String>,
    pub confidence: f64,
    pub detected_speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub user_id: String,
    pub date: String,
    pub time: String,
    pub status: String,
    pub confidence: f64,
    pub detection_latency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorEvent {
    pub timestamp: String,
    pub photo_path: String,
    pub status: String,
    pub confidence: Option<f64>,
    pub detection_latency: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceBreach {
    pub timestamp: String,
    pub photo_path: String,
    pub status: String,
    pub user_id: Option<String>,
}

/// Detector output box, in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Corners in order: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let (x, y) = (self.x as f64, self.y as f64);
        let (w, h) = (self.width as f64, self.height as f64);
        [(x, y), (x + w, y), (x + w, y + h), (x, y + h)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Round to `places` decimals for response payloads.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_status_serializes_with_display_names() {
        let json = serde_json::to_string(&FaceStatus::AlreadyMarked).unwrap();
        assert_eq!(json, "\"Already Marked\"");
        assert_eq!(FaceStatus::AlreadyMarked.as_str(), "Already Marked");
        let json = serde_json::to_string(&ZoneStatus::Breach).unwrap();
        assert_eq!(json, "\"Zone Breach\"");
    }

    #[test]
    fn test_detection_box_corners() {
        let raw = r#"{"box":{"x":1.0,"y":2.0,"width":3.0,"height":4.0},"confidence":0.95}"#;
        let det: Detection = serde_json::from_str(raw).unwrap();
        assert_eq!(det.bbox.corners()[2], (4.0, 6.0));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(66.66666, 2), 66.67);
        assert_eq!(round_to(0.123456, 4), 0.1235);
    }
}
