use bytes::Bytes;
use futures_util::future::try_join_all;
use tracing::info;

use crate::db::{query, writer};
use crate::error::ProcessError;
use crate::pipeline::cache::normalize;
use crate::AppState;

/// Element-wise mean of equal-length vectors, in f64.
pub fn mean_embedding(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let mut sum = vec![0.0f64; dim];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += *x as f64;
        }
    }
    let n = vectors.len() as f64;
    Some(sum.into_iter().map(|s| (s / n) as f32).collect())
}

/// Build a user's embedding from dataset photos and make it live.
///
/// Returns the number of photos that yielded a usable face.
pub async fn train_user(state: &AppState, user_id: &str, photos: Vec<Bytes>) -> Result<usize, ProcessError> {
    let pool = state.pool.clone();
    let id = user_id.to_string();
    let known = tokio::task::spawn_blocking(move || -> Result<bool, ProcessError> {
        let conn = pool.get()?;
        query::user_exists(&conn, &id).map_err(ProcessError::Store)
    })
    .await??;
    if !known {
        return Err(ProcessError::UnknownUser(user_id.to_string()));
    }

    // Photos fan out; the inference semaphore bounds how many run at once.
    let embeddings = try_join_all(photos.into_iter().map(|p| state.frames.training_embedding(p))).await?;
    let valid: Vec<Vec<f32>> = embeddings.into_iter().flatten().collect();
    let needed = state.config.min_training_faces;
    if valid.len() < needed {
        return Err(ProcessError::input(format!("Insufficient valid faces ({}/{})", valid.len(), needed)));
    }

    let mean = mean_embedding(&valid)
        .ok_or_else(|| ProcessError::internal(anyhow::anyhow!("embeddings have inconsistent dimensions")))?;
    let unit = normalize(&mean).ok_or_else(|| ProcessError::input("Training produced a zero embedding"))?;

    let pool = state.pool.clone();
    let id = user_id.to_string();
    let stored = unit.clone();
    tokio::task::spawn_blocking(move || -> Result<(), ProcessError> {
        let conn = pool.get()?;
        writer::replace_embedding(&conn, &id, &stored).map_err(ProcessError::Store)
    })
    .await??;
    state.cache.upsert(user_id, unit).map_err(ProcessError::internal)?;
    state.stats.inc_trainings();
    info!(user_id = %user_id, faces = valid.len(), "training completed");
    Ok(valid.len())
}
