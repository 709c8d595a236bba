// ============================================
// Embedding Module
// ============================================
//
// Text -> vector lookups in front of an expensive external model:
// 1. Model is loaded lazily, once per process (coalesced)
// 2. Results are memoized by a bounded text prefix
// 3. Concurrent requests for the same key share one computation
//
// Readiness is observable without blocking through ModelStatus.

pub mod cache;

pub use cache::{CacheStats, EmbeddingCache};

use crate::error::EmbeddingError;
use async_trait::async_trait;

/// External embedding model.
///
/// Implementations may be slow (model download, inference); the cache makes
/// sure each is called as rarely as possible.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Prepare the model. Retried on the next request if it fails.
    async fn load(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }

    /// Embed `text`. Every vector returned during a process lifetime must
    /// have the same length.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
