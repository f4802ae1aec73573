use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::models::event::{GeofenceBreach, VisitorEvent};
use crate::models::identity::Role;

#[derive(Debug, Clone, Serialize)]
pub struct PresentEntry {
    pub user_id: String,
    pub name: String,
    pub date: String,
    pub time: String,
    pub status: String,
    pub confidence: Option<f64>,
    pub detected_speed: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AbsentEntry {
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub date: String,
    pub time: String,
    pub status: String,
    pub confidence: Option<f64>,
}

pub fn decode_embedding_blob(blob: &[u8]) -> Result<Vec<f32>> {
    // Convert bytes back to f32 (little-endian)
    if blob.len() % 4 != 0 {
        anyhow::bail!("Embedding blob length is not a multiple of 4");
    }
    let mut embedding = Vec::with_capacity(blob.len() / 4);
    for chunk in blob.chunks_exact(4) {
        let bytes: [u8; 4] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        embedding.push(f32::from_le_bytes(bytes));
    }
    Ok(embedding)
}

/// All persisted embeddings, oldest first. Undecodable blobs are skipped.
pub fn load_embeddings(conn: &Connection) -> Result<Vec<(String, Vec<f32>)>> {
    let mut stmt = conn.prepare("SELECT user_id, embedding_blob FROM embeddings ORDER BY id")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        let (user_id, blob) = row?;
        match decode_embedding_blob(&blob) {
            Ok(embedding) => out.push((user_id, embedding)),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "skipping undecodable embedding"),
        }
    }
    Ok(out)
}

pub fn user_exists(conn: &Connection, user_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE user_id = ?1", params![user_id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn get_user_role(conn: &Connection, user_id: &str) -> Result<Option<Role>> {
    let role: Option<String> = conn
        .query_row("SELECT role FROM users WHERE user_id = ?1", params![user_id], |r| r.get(0))
        .optional()?;
    role.map(|r| r.parse()).transpose()
}

pub fn attendance_exists(conn: &Connection, user_id: &str, date: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM attendance WHERE user_id = ?1 AND date = ?2",
            params![user_id, date],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn attendance_for_date(conn: &Connection, date: &str) -> Result<Vec<PresentEntry>> {
    let mut stmt = conn.prepare(
        "SELECT a.user_id, u.name, a.date, a.time, a.status, a.confidence, a.detection_latency
         FROM attendance a
         JOIN users u ON a.user_id = u.user_id
         WHERE a.date = ?1
         ORDER BY a.time DESC",
    )?;
    let rows = stmt.query_map(params![date], |row| {
        Ok(PresentEntry {
            user_id: row.get(0)?,
            name: row.get(1)?,
            date: row.get(2)?,
            time: row.get(3)?,
            status: row.get(4)?,
            confidence: row.get(5)?,
            detected_speed: row.get(6)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn absent_for_date(conn: &Connection, date: &str) -> Result<Vec<AbsentEntry>> {
    let mut stmt = conn.prepare(
        "SELECT u.user_id, u.name FROM users u
         WHERE u.user_id NOT IN (SELECT user_id FROM attendance WHERE date = ?1 AND status = 'Present')
         ORDER BY u.user_id",
    )?;
    let rows = stmt.query_map(params![date], |row| {
        Ok(AbsentEntry { user_id: row.get(0)?, name: row.get(1)? })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn individual_history(conn: &Connection, user_id: &str) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT date, time, status, confidence FROM attendance
         WHERE user_id = ?1
         ORDER BY date DESC, time DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(HistoryEntry {
            date: row.get(0)?,
            time: row.get(1)?,
            status: row.get(2)?,
            confidence: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_visitors(conn: &Connection) -> Result<Vec<VisitorEvent>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, photo_path, status, confidence, detection_latency FROM visitors ORDER BY timestamp DESC, id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(VisitorEvent {
            timestamp: row.get(0)?,
            photo_path: row.get(1)?,
            status: row.get(2)?,
            confidence: row.get(3)?,
            detection_latency: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_breaches(conn: &Connection) -> Result<Vec<GeofenceBreach>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, photo_path, status, user_id FROM geo_fence ORDER BY timestamp DESC, id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(GeofenceBreach {
            timestamp: row.get(0)?,
            photo_path: row.get(1)?,
            status: row.get(2)?,
            user_id: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Breach counts for matched hostelites, highest first.
pub fn breach_counts_by_user(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, COUNT(*) FROM geo_fence
         WHERE status = 'Zone Breach' AND user_id IS NOT NULL
         GROUP BY user_id
         ORDER BY COUNT(*) DESC, user_id",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Present count per day on or after `since` (YYYY-MM-DD), oldest first.
pub fn daily_present_counts(conn: &Connection, since: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT date, COUNT(*) FROM attendance
         WHERE status = 'Present' AND date >= ?1
         GROUP BY date
         ORDER BY date",
    )?;
    let rows = stmt.query_map(params![since], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_boundary(conn: &Connection) -> Result<Option<String>> {
    let json: Option<String> = conn
        .query_row("SELECT points_json FROM geo_fence_boundary WHERE id = 1", [], |r| r.get(0))
        .optional()?;
    Ok(json)
}
