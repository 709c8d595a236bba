// ============================================
// Embedding Cache
// ============================================
//
// Memo keys are the first `key_chars` characters of the trimmed text. Texts
// that only differ past that prefix share an entry: this is an
// approximate-equality cache, not a content hash.

use super::Embedder;
use crate::config::CacheConfig;
use crate::error::EmbeddingError;
use crate::models::{Embedding, Item, ModelStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

type SharedEmbedding = Shared<BoxFuture<'static, Result<Embedding, EmbeddingError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
}

/// Coalescing, memoizing front for an [`Embedder`]. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    embedder: Arc<dyn Embedder>,
    config: CacheConfig,
    memo: DashMap<String, Embedding>,
    in_flight: DashMap<String, SharedEmbedding>,
    model: OnceCell<()>,
    status: watch::Sender<ModelStatus>,
    /// Vector length fixed by the first successful embedding; 0 until then
    dimension: AtomicUsize,
}

impl EmbeddingCache {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_config(embedder, CacheConfig::default())
    }

    pub fn with_config(embedder: Arc<dyn Embedder>, config: CacheConfig) -> Self {
        let (status, _) = watch::channel(ModelStatus::Idle);
        Self {
            inner: Arc::new(CacheInner {
                embedder,
                config,
                memo: DashMap::new(),
                in_flight: DashMap::new(),
                model: OnceCell::new(),
                status,
                dimension: AtomicUsize::new(0),
            }),
        }
    }

    pub fn status(&self) -> ModelStatus {
        *self.inner.status.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ModelStatus::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.status() == ModelStatus::Loading
    }

    /// Watch model status transitions (idle -> loading -> ready | error).
    pub fn subscribe_status(&self) -> watch::Receiver<ModelStatus> {
        self.inner.status.subscribe()
    }

    /// Start (or join) model initialization without embedding anything.
    pub async fn warm_up(&self) -> Result<(), EmbeddingError> {
        self.inner.ensure_loaded().await
    }

    /// Embedding dimensionality, once known.
    pub fn dimension(&self) -> Option<usize> {
        match self.inner.dimension.load(Ordering::Acquire) {
            0 => None,
            d => Some(d),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.memo.len(),
            in_flight: self.inner.in_flight.len(),
        }
    }

    pub fn cache_key(&self, text: &str) -> String {
        text.trim().chars().take(self.inner.config.key_chars).collect()
    }

    /// Embed `text`, computing it at most once per cache key.
    ///
    /// Callers arriving while the same key is being computed await that
    /// computation. Failures reach every waiter and are not memoized.
    pub async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let key = self.cache_key(text);
        if let Some(hit) = self.inner.memo.get(&key) {
            return Ok(hit.value().clone());
        }

        let computation = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(key_len = key.len(), "Joining in-flight embedding");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // The computation stores its result before leaving in_flight,
                // so a miss above may have been filled in the meantime.
                if let Some(hit) = self.inner.memo.get(&key) {
                    return Ok(hit.value().clone());
                }
                let input: String = text.chars().take(self.inner.config.max_input_chars).collect();
                let computation = compute(Arc::clone(&self.inner), key, input)
                    .boxed()
                    .shared();
                entry.insert(computation.clone());
                computation
            }
        };

        computation.await
    }

    pub async fn embed_item(&self, item: &Item) -> Result<Embedding, EmbeddingError> {
        self.embed(&item.embedding_text()).await
    }
}

async fn compute(
    inner: Arc<CacheInner>,
    key: String,
    input: String,
) -> Result<Embedding, EmbeddingError> {
    let result = async {
        inner.ensure_loaded().await?;
        let vector = inner.embedder.embed(&input).await?;
        inner.check_dimension(vector)
    }
    .await;

    match &result {
        Ok(embedding) => {
            inner.memo.insert(key.clone(), embedding.clone());
        }
        Err(e) => warn!(error = %e, "Embedding computation failed"),
    }
    inner.in_flight.remove(&key);

    result
}

impl CacheInner {
    async fn ensure_loaded(&self) -> Result<(), EmbeddingError> {
        self.model
            .get_or_try_init(|| async {
                self.status.send_replace(ModelStatus::Loading);
                info!("Loading embedding model");

                match self.embedder.load().await {
                    Ok(()) => {
                        self.status.send_replace(ModelStatus::Ready);
                        info!("Embedding model ready");
                        Ok(())
                    }
                    Err(e) => {
                        self.status.send_replace(ModelStatus::Error);
                        warn!(error = %e, "Embedding model failed to load");
                        Err(e)
                    }
                }
            })
            .await
            .map(|_| ())
    }

    fn check_dimension(&self, vector: Vec<f32>) -> Result<Embedding, EmbeddingError> {
        let actual = vector.len();
        if actual == 0 {
            return Err(EmbeddingError::Inference("embedder returned an empty vector".to_string()));
        }
        if let Some(index) = vector.iter().position(|x| !x.is_finite()) {
            return Err(EmbeddingError::Inference(format!(
                "embedder returned a non-finite component at index {}",
                index
            )));
        }

        match self
            .dimension
            .compare_exchange(0, actual, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug!(dimension = actual, "Embedding dimension fixed");
                Ok(vector.into())
            }
            Err(expected) if expected == actual => Ok(vector.into()),
            Err(expected) => Err(EmbeddingError::DimensionMismatch { expected, actual }),
        }
    }
}
