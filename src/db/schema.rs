use anyhow::Result;
use rusqlite::Connection;
use std::time::Duration;

/// Per-connection settings; run for every pooled connection.
pub fn apply_connection_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    apply_connection_pragmas(conn)?;
    Ok(())
}

pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY,
  user_id TEXT NOT NULL UNIQUE,
  role TEXT NOT NULL CHECK (role IN ('hostelite', 'warden', 'support_staff')),
  name TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS embeddings (
  id INTEGER PRIMARY KEY,
  user_id TEXT NOT NULL,
  embedding_blob BLOB NOT NULL,
  updated_at INTEGER NOT NULL,
  FOREIGN KEY(user_id) REFERENCES users(user_id)
);

CREATE INDEX IF NOT EXISTS idx_embeddings_user ON embeddings(user_id);

CREATE TABLE IF NOT EXISTS attendance (
  id INTEGER PRIMARY KEY,
  user_id TEXT NOT NULL,
  date TEXT NOT NULL,
  time TEXT NOT NULL,
  status TEXT NOT NULL,
  confidence REAL,
  detection_latency REAL,
  FOREIGN KEY(user_id) REFERENCES users(user_id),
  UNIQUE(user_id, date)
);

CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date);

CREATE TABLE IF NOT EXISTS visitors (
  id INTEGER PRIMARY KEY,
  timestamp TEXT NOT NULL,
  photo_path TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'Visitor',
  confidence REAL,
  detection_latency REAL
);

CREATE TABLE IF NOT EXISTS geo_fence (
  id INTEGER PRIMARY KEY,
  timestamp TEXT NOT NULL,
  photo_path TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'Zone Breach',
  user_id TEXT,
  FOREIGN KEY(user_id) REFERENCES users(user_id)
);

CREATE INDEX IF NOT EXISTS idx_geo_fence_user ON geo_fence(user_id);

CREATE TABLE IF NOT EXISTS geo_fence_boundary (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  points_json TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
    "#,
    )?;
    Ok(())
}
