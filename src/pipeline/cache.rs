use std::sync::Arc;

use parking_lot::RwLock;
use rusqlite::Connection;
use thiserror::Error;

use crate::db::query;

const NORM_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug, PartialEq)]
pub enum CacheError {
    #[error("embedding is empty")]
    Empty,
    #[error("embedding norm {0} is not 1")]
    NotNormalized(f64),
}

/// One cached identity vector.
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    pub user_id: String,
    pub vector: Vec<f32>,
}

/// Immutable view handed to the matcher; ordered by user id.
pub type Snapshot = Arc<Vec<CachedEmbedding>>;

/// L2 norm, accumulated in f64.
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

/// Scale `v` to unit length. Returns `None` for an empty or all-zero vector.
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = l2_norm(v);
    if v.is_empty() || norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| (*x as f64 / norm) as f32).collect())
}

/// Identity-to-vector store shared by every request.
///
/// Readers take an `Arc` snapshot and never hold the lock while matching.
/// Writers rebuild the list and swap it in.
pub struct EmbeddingCache {
    inner: RwLock<Snapshot>,
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Arc::new(Vec::new())) }
    }

    /// Rebuild from the persisted embeddings table. Returns the identity count.
    ///
    /// Stored vectors are normalized on the way in; a user with several rows
    /// keeps the newest one.
    pub fn load(&self, conn: &Connection) -> anyhow::Result<usize> {
        let rows = query::load_embeddings(conn)?;
        let mut entries: Vec<CachedEmbedding> = Vec::with_capacity(rows.len());
        for (user_id, raw) in rows {
            let Some(vector) = normalize(&raw) else {
                tracing::warn!(user_id = %user_id, "skipping zero embedding");
                continue;
            };
            match entries.iter_mut().find(|e| e.user_id == user_id) {
                Some(existing) => existing.vector = vector,
                None => entries.push(CachedEmbedding { user_id, vector }),
            }
        }
        entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let count = entries.len();
        *self.inner.write() = Arc::new(entries);
        tracing::info!(identities = count, "embedding cache loaded");
        Ok(count)
    }

    /// Insert or replace one identity. The vector must already be unit length.
    pub fn upsert(&self, user_id: &str, vector: Vec<f32>) -> Result<(), CacheError> {
        if vector.is_empty() {
            return Err(CacheError::Empty);
        }
        let norm = l2_norm(&vector);
        if (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(CacheError::NotNormalized(norm));
        }
        let mut guard = self.inner.write();
        let mut entries: Vec<CachedEmbedding> = guard.as_ref().clone();
        match entries.binary_search_by(|e| e.user_id.as_str().cmp(user_id)) {
            Ok(pos) => entries[pos].vector = vector,
            Err(pos) => entries.insert(pos, CachedEmbedding { user_id: user_id.to_string(), vector }),
        }
        *guard = Arc::new(entries);
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
