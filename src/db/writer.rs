use anyhow::Result;
use rusqlite::{params, Connection};

use crate::models::event::{AttendanceRecord, GeofenceBreach, VisitorEvent};
use crate::models::identity::Role;

/// Encode an embedding as little-endian f32 bytes.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Create or update an enrolled identity.
pub fn upsert_user(conn: &Connection, user_id: &str, role: Role, name: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO users (user_id, role, name, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET role = excluded.role, name = excluded.name",
        params![user_id, role.as_str(), name, now],
    )?;
    Ok(())
}

/// Store the trained embedding for a user, dropping any earlier one.
pub fn replace_embedding(conn: &Connection, user_id: &str, embedding: &[f32]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM embeddings WHERE user_id = ?1", params![user_id])?;
    tx.execute(
        "INSERT INTO embeddings (user_id, embedding_blob, updated_at) VALUES (?1, ?2, ?3)",
        params![user_id, encode_embedding(embedding), chrono::Utc::now().timestamp()],
    )?;
    tx.commit()?;
    Ok(())
}

/// Insert attendance rows, skipping any `(user_id, date)` already present.
///
/// Returns one flag per record: `true` if this call inserted it, `false` if a
/// row for that user and day already existed (including one inserted earlier
/// in the same batch). Any other failure is returned as an error so the
/// caller's transaction can roll back.
pub fn insert_attendance_batch(conn: &Connection, records: &[AttendanceRecord]) -> Result<Vec<bool>> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO attendance (user_id, date, time, status, confidence, detection_latency)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id, date) DO NOTHING",
    )?;
    let mut inserted = Vec::with_capacity(records.len());
    for r in records {
        let n = stmt.execute(params![
            r.user_id,
            r.date,
            r.time,
            r.status,
            r.confidence,
            r.detection_latency,
        ])?;
        inserted.push(n == 1);
    }
    Ok(inserted)
}

pub fn insert_visitor(conn: &Connection, event: &VisitorEvent) -> Result<i64> {
    conn.execute(
        "INSERT INTO visitors (timestamp, photo_path, status, confidence, detection_latency) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![event.timestamp, event.photo_path, event.status, event.confidence, event.detection_latency],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_breach(conn: &Connection, breach: &GeofenceBreach) -> Result<i64> {
    conn.execute(
        "INSERT INTO geo_fence (timestamp, photo_path, status, user_id) VALUES (?1, ?2, ?3, ?4)",
        params![breach.timestamp, breach.photo_path, breach.status, breach.user_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Replace the stored geofence boundary wholesale.
pub fn save_boundary(conn: &Connection, points_json: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO geo_fence_boundary (id, points_json, updated_at) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET points_json = excluded.points_json, updated_at = excluded.updated_at",
        params![points_json, chrono::Utc::now().timestamp()],
    )?;
    Ok(())
}

/// Delete every visitor and breach row. Returns `(visitors, breaches)` removed.
pub fn clear_notifications(conn: &Connection) -> Result<(usize, usize)> {
    let tx = conn.unchecked_transaction()?;
    let visitors = tx.execute("DELETE FROM visitors", [])?;
    let breaches = tx.execute("DELETE FROM geo_fence", [])?;
    tx.commit()?;
    Ok((visitors, breaches))
}
