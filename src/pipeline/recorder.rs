use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use image::DynamicImage;
use rusqlite::TransactionBehavior;
use tracing::{debug, warn};

use crate::db::{query, writer, DbPool};
use crate::error::ProcessError;
use crate::models::event::{round_to, AttendanceRecord, GeofenceBreach, VisitorEvent, BREACH_STATUS, VISITOR_STATUS};
use crate::pipeline::alert::{Alert, AlertDispatcher, AlertPhoto};
use crate::pipeline::decision::{DecisionEngine, ZoneVerdict};
use crate::pipeline::photos::{PhotoKind, PhotoStore, StoredPhoto};

pub struct AttendanceWrite {
    pub face: usize,
    pub user_id: String,
    pub confidence: f64,
}

pub struct VisitorWrite {
    pub face: usize,
    pub crop: DynamicImage,
    pub confidence: f64,
}

/// Everything one attendance or intrusion request persists.
pub struct RecognitionBatch {
    pub attendance: Vec<AttendanceWrite>,
    pub visitors: Vec<VisitorWrite>,
    pub detection_latency: f64,
    /// Alert text before the " at <time>!" suffix.
    pub visitor_alert: &'static str,
}

/// A face inside the boundary, with its best match within the threshold.
pub struct ZoneFace {
    pub face: usize,
    pub crop: DynamicImage,
    pub matched: Option<String>,
}

/// Persists classified faces, writes event photos and raises alerts.
///
/// All rows from one request share one immediate transaction. Alerts for
/// negative outcomes go out even when the transaction fails.
pub struct EventRecorder {
    pool: DbPool,
    photos: Arc<PhotoStore>,
    alerts: AlertDispatcher,
}

impl EventRecorder {
    pub fn new(pool: DbPool, photos: Arc<PhotoStore>, alerts: AlertDispatcher) -> Self {
        Self { pool, photos, alerts }
    }

    pub fn photos(&self) -> &PhotoStore {
        &self.photos
    }

    fn save_photo(&self, kind: PhotoKind, face: usize, crop: &DynamicImage) -> Option<StoredPhoto> {
        match self.photos.save(kind, face, crop) {
            Ok(photo) => Some(photo),
            Err(e) => {
                warn!(face, kind = kind.prefix(), error = %e, "failed to write event photo");
                None
            }
        }
    }

    fn alert(message: String, photo: Option<StoredPhoto>) -> Alert {
        Alert { message, photo: photo.map(|p| AlertPhoto { file_name: p.file_name, jpeg: p.jpeg }) }
    }

    fn dispatch_all(&self, alerts: Vec<Alert>) {
        for alert in alerts {
            self.alerts.dispatch(alert);
        }
    }

    /// Persist attendance and visitor rows. Returns, per attendance face,
    /// whether this request inserted the day's row (`false` means already marked).
    pub fn record_recognition(&self, batch: RecognitionBatch) -> Result<HashMap<usize, bool>, ProcessError> {
        let now = Local::now();
        let timestamp = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let latency = round_to(batch.detection_latency, 4);

        let mut alerts = Vec::with_capacity(batch.visitors.len());
        let mut visitor_rows = Vec::with_capacity(batch.visitors.len());
        for v in &batch.visitors {
            let photo = self.save_photo(PhotoKind::Visitor, v.face, &v.crop);
            visitor_rows.push(VisitorEvent {
                timestamp: timestamp.clone(),
                photo_path: photo.as_ref().map(|p| p.file_name.clone()).unwrap_or_default(),
                status: VISITOR_STATUS.to_string(),
                confidence: Some(round_to(v.confidence, 2)),
                detection_latency: Some(latency),
            });
            alerts.push(Self::alert(format!("{} at {}!", batch.visitor_alert, timestamp), photo));
        }

        let records: Vec<(usize, AttendanceRecord)> = batch
            .attendance
            .iter()
            .map(|w| {
                (
                    w.face,
                    AttendanceRecord {
                        user_id: w.user_id.clone(),
                        date: now.format("%Y-%m-%d").to_string(),
                        time: now.format("%H:%M:%S").to_string(),
                        status: "Present".to_string(),
                        confidence: round_to(w.confidence, 2),
                        detection_latency: latency,
                    },
                )
            })
            .collect();

        let result = self.write_recognition(&records, &visitor_rows);
        self.dispatch_all(alerts);
        result
    }

    fn write_recognition(
        &self,
        records: &[(usize, AttendanceRecord)],
        visitors: &[VisitorEvent],
    ) -> Result<HashMap<usize, bool>, ProcessError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).map_err(ProcessError::store)?;

        let mut inserted = HashMap::with_capacity(records.len());
        let mut fresh: Vec<(usize, AttendanceRecord)> = Vec::new();
        for (face, record) in records {
            if query::attendance_exists(&tx, &record.user_id, &record.date).map_err(ProcessError::Store)? {
                inserted.insert(*face, false);
            } else {
                fresh.push((*face, record.clone()));
            }
        }
        let rows: Vec<AttendanceRecord> = fresh.iter().map(|(_, r)| r.clone()).collect();
        let flags = writer::insert_attendance_batch(&tx, &rows).map_err(ProcessError::Store)?;
        for ((face, record), ok) in fresh.iter().zip(flags) {
            if !ok {
                debug!(user_id = %record.user_id, face, "attendance already written for today");
            }
            inserted.insert(*face, ok);
        }
        for row in visitors {
            writer::insert_visitor(&tx, row).map_err(ProcessError::Store)?;
        }
        tx.commit().map_err(ProcessError::store)?;
        Ok(inserted)
    }

    /// Resolve roles for matched faces and persist breach rows.
    pub fn record_zone(&self, faces: Vec<ZoneFace>) -> Result<Vec<(usize, ZoneVerdict)>, ProcessError> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut alerts = Vec::new();
        let result = self.write_zone(faces, &timestamp, &mut alerts);
        self.dispatch_all(alerts);
        result
    }

    fn write_zone(
        &self,
        faces: Vec<ZoneFace>,
        timestamp: &str,
        alerts: &mut Vec<Alert>,
    ) -> Result<Vec<(usize, ZoneVerdict)>, ProcessError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).map_err(ProcessError::store)?;

        let mut outcomes = Vec::with_capacity(faces.len());
        for f in faces {
            let role = match f.matched.as_deref() {
                Some(id) => query::get_user_role(&tx, id).map_err(ProcessError::Store)?,
                None => None,
            };
            let verdict = DecisionEngine::zone_verdict(f.matched.as_deref(), role);
            if let ZoneVerdict::Authorized { .. } = verdict {
                outcomes.push((f.face, verdict));
                continue;
            }
            let breach_user = match &verdict {
                ZoneVerdict::Breach { user_id } => Some(user_id.clone()),
                _ => None,
            };
            let photo = self.save_photo(PhotoKind::Breach, f.face, &f.crop);
            let message = match &breach_user {
                Some(id) => format!("Zone Breach Detected for {} at {}!", id, timestamp),
                None => format!("An Unknown Zone Breach Detected at {}!", timestamp),
            };
            let row = GeofenceBreach {
                timestamp: timestamp.to_string(),
                photo_path: photo.as_ref().map(|p| p.file_name.clone()).unwrap_or_default(),
                status: BREACH_STATUS.to_string(),
                user_id: breach_user,
            };
            alerts.push(Self::alert(message, photo));
            writer::insert_breach(&tx, &row).map_err(ProcessError::Store)?;
            outcomes.push((f.face, verdict));
        }
        tx.commit().map_err(ProcessError::store)?;
        Ok(outcomes)
    }
}
