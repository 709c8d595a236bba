// Vector math for embedding similarity

use crate::models::Item;

/// Cosine similarity in [-1, 1].
///
/// Returns 0 when the vectors differ in length, either has zero norm, or a
/// component is not finite: callers rank an unknown similarity last instead
/// of failing the batch. The result is never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    let cosine = dot / magnitude;
    if magnitude == 0.0 || !cosine.is_finite() {
        return 0.0;
    }

    (cosine as f32).clamp(-1.0, 1.0)
}

/// Similarity of two possibly missing embeddings (absent = 0).
pub fn similarity(a: Option<&[f32]>, b: Option<&[f32]>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => cosine_similarity(a, b),
        _ => 0.0,
    }
}

/// The `k` candidates most similar to `query`, best first.
///
/// Candidates without an embedding are skipped; ties keep input order.
pub fn top_k_similar<'a>(query: &[f32], candidates: &'a [Item], k: usize) -> Vec<(&'a Item, f32)> {
    let mut scored: Vec<(&Item, f32)> = candidates
        .iter()
        .filter_map(|item| {
            item.embedding
                .as_deref()
                .map(|embedding| (item, cosine_similarity(query, embedding)))
        })
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}
