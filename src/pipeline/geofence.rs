use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::models::event::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Closed polygon of at least three points, in image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub const MIN_POINTS: usize = 3;

    pub fn new(points: Vec<Point>) -> anyhow::Result<Self> {
        if points.len() < Self::MIN_POINTS {
            anyhow::bail!("Invalid boundary: Minimum 3 points required");
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            anyhow::bail!("Invalid boundary point format");
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Ray-casting parity test. Points exactly on an edge or vertex may go
    /// either way.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let pts = &self.points;
        let mut inside = false;
        let mut j = pts.len() - 1;
        for i in 0..pts.len() {
            let (pi, pj) = (pts[i], pts[j]);
            if (pi.y > y) != (pj.y > y) && x < (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// True when any corner of the box is inside. A box straddling an edge
    /// with all four corners outside counts as outside.
    pub fn contains_box(&self, bbox: &BoundingBox) -> bool {
        bbox.corners().iter().any(|&(x, y)| self.contains(x, y))
    }
}

/// Current boundary, replaced by swapping the whole polygon.
#[derive(Default)]
pub struct BoundaryStore {
    current: RwLock<Option<Arc<Polygon>>>,
    saving: Mutex<()>,
}

impl BoundaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Polygon>> {
        self.current.read().clone()
    }

    pub fn replace(&self, polygon: Polygon) {
        *self.current.write() = Some(Arc::new(polygon));
    }

    /// Persist `polygon` with `write`, then swap it in. Saves are serialized
    /// so the live boundary always matches the last one written.
    pub fn save_with<E>(&self, polygon: Polygon, write: impl FnOnce(&Polygon) -> Result<(), E>) -> Result<(), E> {
        let _saving = self.saving.lock();
        write(&polygon)?;
        self.replace(polygon);
        Ok(())
    }

    /// Load the persisted boundary, if any. A malformed row is logged and ignored.
    pub fn load(&self, conn: &rusqlite::Connection) -> anyhow::Result<bool> {
        let Some(json) = crate::db::query::get_boundary(conn)? else {
            return Ok(false);
        };
        match serde_json::from_str::<Vec<Point>>(&json).map_err(anyhow::Error::from).and_then(Polygon::new) {
            Ok(polygon) => {
                tracing::info!(points = polygon.points().len(), "geofence boundary loaded");
                self.replace(polygon);
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "stored geofence boundary is invalid");
                Ok(false)
            }
        }
    }
}
