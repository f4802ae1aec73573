use crate::pipeline::cache::CachedEmbedding;

/// One ranked identity for a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub user_id: String,
    pub distance: f32,
}

/// Nearest-neighbour search over a cache snapshot.
///
/// Implementations return every enrolled identity ranked by ascending
/// distance; equal distances keep snapshot order.
pub trait Matcher: Send + Sync {
    fn rank(&self, query: &[f32], entries: &[CachedEmbedding]) -> Vec<Candidate>;
}

/// Exhaustive scan. Fine for a hostel-sized fleet.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearScanMatcher;

impl Matcher for LinearScanMatcher {
    fn rank(&self, query: &[f32], entries: &[CachedEmbedding]) -> Vec<Candidate> {
        let mut results: Vec<Candidate> = entries
            .iter()
            .filter_map(|e| match euclidean_distance(query, &e.vector) {
                Some(distance) => Some(Candidate { user_id: e.user_id.clone(), distance }),
                None => {
                    tracing::warn!(
                        user_id = %e.user_id, stored = e.vector.len(), query = query.len(),
                        "embedding dimension mismatch; entry skipped"
                    );
                    None
                }
            })
            .collect();
        // sort_by is stable
        results.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        results
    }
}

/// Euclidean distance, accumulated in f64. `None` when the lengths differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum();
    Some(sum.sqrt() as f32)
}
