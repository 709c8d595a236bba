/// Recommendation Engine
///
/// Owns the feed queue, the seen set and the engagement history, and tops
/// the queue up in the background before the reader runs out of items.
use super::queue::FeedQueue;
use crate::config::EngineConfig;
use crate::error::{DiscoveryError, EmbeddingError, Result};
use crate::models::{
    Direction, Embedding, EngagementRecord, FeedSnapshot, Item, ModelStatus, RecommendationMode,
};
use crate::services::embedding::{Embedder, EmbeddingCache};
use crate::services::engagement::EngagementTracker;
use crate::services::provider::ContentProvider;
use crate::services::selection::CandidateSelector;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadOutcome {
    /// Another preload was already running
    Skipped,
    /// Number of items appended to the queue
    Appended(usize),
    /// The session was re-initialized while this preload ran
    Discarded,
}

struct FeedState {
    queue: FeedQueue,
    engagement: EngagementTracker,
    /// Bumped by every initialize(); preloads from older sessions are dropped
    generation: u64,
}

/// Clears the in-flight flag on every exit path.
struct PreloadGuard<'a>(&'a AtomicBool);

impl Drop for PreloadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RecommendationEngine {
    provider: Arc<dyn ContentProvider>,
    embeddings: EmbeddingCache,
    selector: CandidateSelector,
    config: EngineConfig,
    state: Mutex<FeedState>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    preloading: AtomicBool,
}

impl RecommendationEngine {
    /// The embedding cache in front of `embedder` is sized from `config.cache()`.
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            embeddings: EmbeddingCache::with_config(embedder, config.cache()),
            selector: CandidateSelector::new(config.batch_size),
            state: Mutex::new(FeedState {
                queue: FeedQueue::new(),
                engagement: EngagementTracker::new(config.engagement()),
                generation: 0,
            }),
            config,
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
            preloading: AtomicBool::new(false),
        }
    }

    /// Replace the random source used for shuffles and explore sampling.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn embeddings(&self) -> &EmbeddingCache {
        &self.embeddings
    }

    /// Begin loading the embedding model in the background.
    pub fn start_model_warmup(&self) -> Option<JoinHandle<std::result::Result<(), EmbeddingError>>> {
        let handle = Handle::try_current().ok()?;
        let embeddings = self.embeddings.clone();
        Some(handle.spawn(async move { embeddings.warm_up().await }))
    }

    /// Fetch a starting item and begin a new session with it, then schedule
    /// the first preload.
    ///
    /// Provider failures are returned as `Initialization` and not retried.
    pub async fn initialize(self: &Arc<Self>) -> Result<Item> {
        let mut item = self.provider.fetch_random_item().await.map_err(|e| {
            error!(error = %e, "Failed to fetch starting item");
            DiscoveryError::Initialization(e)
        })?;

        if self.embeddings.is_ready() {
            match self.embeddings.embed_item(&item).await {
                Ok(embedding) => item.embedding = Some(embedding),
                Err(e) => warn!(item_id = %item.id, error = %e, "Starting item left unembedded"),
            }
        }

        {
            let mut state = self.state();
            state.generation += 1;
            state.queue.reset(item.clone());
            state.engagement.start_tracking(item.id.clone());
        }

        info!(item_id = %item.id, embedded = item.embedding.is_some(), "Feed initialized");
        self.maybe_preload();
        Ok(item)
    }

    pub fn should_preload(&self) -> bool {
        self.state()
            .queue
            .should_preload(self.config.preload_trigger_remaining)
    }

    pub fn is_preloading(&self) -> bool {
        self.preloading.load(Ordering::Acquire)
    }

    fn try_begin_preload(&self) -> Option<PreloadGuard<'_>> {
        self.preloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PreloadGuard(&self.preloading))
    }

    /// Fetch, score and append the next batch after `current`.
    ///
    /// At most one preload runs at a time; overlapping calls return
    /// `Skipped`. On error the queue and seen set are left untouched.
    pub async fn preload_next(&self, current: &Item, exploration_ratio: f64) -> Result<PreloadOutcome> {
        let Some(_guard) = self.try_begin_preload() else {
            debug!(item_id = %current.id, "Preload already in flight");
            return Ok(PreloadOutcome::Skipped);
        };

        let generation = self.state().generation;

        let selected = match self.build_batch(current, exploration_ratio).await {
            Ok(selected) => selected,
            Err(e) => {
                warn!(item_id = %current.id, error = %e, "Preload failed");
                return Err(e);
            }
        };

        let mut state = self.state();
        if state.generation != generation {
            info!(item_id = %current.id, "Feed was re-initialized during preload, discarding batch");
            return Ok(PreloadOutcome::Discarded);
        }

        let appended = state.queue.append(selected);
        info!(
            item_id = %current.id,
            appended = appended,
            queue_len = state.queue.len(),
            exploration_ratio = exploration_ratio,
            "Preload appended"
        );
        Ok(PreloadOutcome::Appended(appended))
    }

    async fn build_batch(&self, current: &Item, exploration_ratio: f64) -> Result<Vec<Item>> {
        let related = self
            .provider
            .fetch_related_ids(&current.id, self.config.related_limit)
            .await
            .map_err(|e| DiscoveryError::Preload(format!("related ids for {}: {}", current.id, e)))?;

        let mut ids: Vec<String> = {
            let state = self.state();
            let mut unique = HashSet::new();
            related
                .into_iter()
                .filter(|id| !state.queue.is_seen(id) && unique.insert(id.clone()))
                .collect()
        };
        // Provider order (often alphabetical) must not bias the pool
        ids.shuffle(&mut **self.rng());

        let num_random = self
            .config
            .min_candidates
            .saturating_sub(ids.len())
            .max((exploration_ratio.clamp(0.0, 1.0) * self.config.random_injection_scale as f64) as usize);

        let random_items = self.fetch_random_items(num_random, &ids).await;
        debug!(
            item_id = %current.id,
            related = ids.len(),
            random = random_items.len(),
            "Candidate ids gathered"
        );

        let mut candidates = self.fetch_candidates(ids, random_items).await?;
        let reference = self.embed_pool(current, &mut candidates).await;

        let selected = {
            let mut rng = self.rng();
            self.selector
                .select(candidates, reference.as_deref(), exploration_ratio, &mut **rng)
        };

        Ok(selected.into_iter().map(|c| c.item).collect())
    }

    fn rng(&self) -> MutexGuard<'_, Box<dyn RngCore + Send>> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Random items not already seen or among `exclude`. Failed fetches are dropped.
    async fn fetch_random_items(&self, count: usize, exclude: &[String]) -> Vec<Item> {
        if count == 0 {
            return Vec::new();
        }

        let results = join_all((0..count).map(|_| self.provider.fetch_random_item())).await;

        let state = self.state();
        let mut taken: HashSet<String> = exclude.iter().cloned().collect();
        let mut items = Vec::with_capacity(count);
        for result in results {
            match result {
                Ok(item) => {
                    if !state.queue.is_seen(&item.id) && taken.insert(item.id.clone()) {
                        items.push(item);
                    }
                }
                Err(e) => warn!(error = %e, "Random item fetch failed, skipping"),
            }
        }
        items
    }

    /// Full content for up to `max_fetch_candidates` ids, related ids first.
    async fn fetch_candidates(&self, ids: Vec<String>, random_items: Vec<Item>) -> Result<Vec<Item>> {
        let cap = self.config.max_fetch_candidates;
        let related: Vec<String> = ids.into_iter().take(cap).collect();
        let random_room = cap - related.len();

        let fetched = if related.is_empty() {
            Vec::new()
        } else {
            self.provider
                .fetch_items_by_ids(&related)
                .await
                .map_err(|e| DiscoveryError::Preload(format!("candidate fetch: {}", e)))?
        };
        if fetched.len() < related.len() {
            debug!(
                requested = related.len(),
                fetched = fetched.len(),
                "Some candidates failed to load"
            );
        }

        let state = self.state();
        let mut unique = HashSet::new();
        let candidates: Vec<Item> = fetched
            .into_iter()
            .chain(random_items.into_iter().take(random_room))
            .filter(|item| !state.queue.is_seen(&item.id) && unique.insert(item.id.clone()))
            .collect();

        Ok(candidates)
    }

    /// Attach embeddings to the pool and return the reference embedding of
    /// `current`. `None` when the model is unavailable: the selector then
    /// falls back to provider order.
    async fn embed_pool(&self, current: &Item, candidates: &mut [Item]) -> Option<Embedding> {
        if !self.embeddings.is_ready() {
            debug!(
                status = self.embeddings.status().as_str(),
                "Embedding model unavailable, keeping provider order"
            );
            return None;
        }

        let results = join_all(candidates.iter().map(|item| async move {
            match &item.embedding {
                Some(embedding) => Ok(embedding.clone()),
                None => self.embeddings.embed_item(item).await,
            }
        }))
        .await;

        for (item, result) in candidates.iter_mut().zip(results) {
            match result {
                Ok(embedding) => item.embedding = Some(embedding),
                Err(e) => warn!(item_id = %item.id, error = %e, "Candidate left unembedded"),
            }
        }

        if let Some(embedding) = &current.embedding {
            return Some(embedding.clone());
        }
        match self.embeddings.embed_item(current).await {
            Ok(embedding) => {
                self.state().queue.attach_embedding(&current.id, &embedding);
                Some(embedding)
            }
            Err(e) => {
                warn!(item_id = %current.id, error = %e, "Current item could not be embedded");
                None
            }
        }
    }

    /// Spawn `preload_next` for the current item when the buffer is low and
    /// nothing is in flight.
    pub fn maybe_preload(self: &Arc<Self>) -> Option<JoinHandle<Result<PreloadOutcome>>> {
        if self.is_preloading() {
            return None;
        }

        let (current, ratio) = {
            let state = self.state();
            if !state.queue.should_preload(self.config.preload_trigger_remaining) {
                return None;
            }
            (state.queue.current()?.clone(), state.engagement.exploration_ratio())
        };

        let handle = Handle::try_current().ok()?;
        let engine = Arc::clone(self);
        Some(handle.spawn(async move { engine.preload_next(&current, ratio).await }))
    }

    /// Move the cursor. Returns the new current item, or `None` when the
    /// cursor could not move (start of feed, or nothing loaded ahead yet).
    ///
    /// Leaving an item forward records its engagement before the cursor moves.
    /// Every forward attempt, including one blocked at the end of the queue,
    /// gives a failed or skipped preload another chance to run.
    pub fn advance(self: &Arc<Self>, direction: Direction, did_expand: bool) -> Option<Item> {
        let next = {
            let mut guard = self.state();
            let state = &mut *guard;
            if !state.queue.can_move(direction) {
                debug!(direction = ?direction, position = state.queue.position(), "Cursor at edge");
                None
            } else {
                if direction == Direction::Forward {
                    if let Some(leaving) = state.queue.current() {
                        state.engagement.end_tracking(&leaving.id, did_expand);
                    }
                }
                state.queue.advance(direction);

                let next = state.queue.current().cloned();
                if let Some(item) = &next {
                    state.engagement.start_tracking(item.id.clone());
                }
                next
            }
        };

        if direction == Direction::Forward {
            self.maybe_preload();
        }
        next
    }

    pub fn current_item(&self) -> Option<Item> {
        self.state().queue.current().cloned()
    }

    pub fn position(&self) -> usize {
        self.state().queue.position()
    }

    pub fn queue_len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn queue_items(&self) -> Vec<Item> {
        self.state().queue.items().to_vec()
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.state().queue.is_seen(id)
    }

    pub fn seen_ids(&self) -> HashSet<String> {
        self.state().queue.seen().clone()
    }

    pub fn average_engagement(&self, recent_count: usize) -> f64 {
        self.state().engagement.average_engagement(recent_count)
    }

    pub fn exploration_ratio(&self) -> f64 {
        self.state().engagement.exploration_ratio()
    }

    pub fn recommendation_mode(&self) -> RecommendationMode {
        self.state().engagement.recommendation_mode()
    }

    pub fn engagement_history(&self) -> Vec<EngagementRecord> {
        self.state().engagement.history().cloned().collect()
    }

    pub fn model_status(&self) -> ModelStatus {
        self.embeddings.status()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state();
        let average = state.engagement.recent_average();
        FeedSnapshot {
            current: state.queue.current().cloned(),
            position: state.queue.position(),
            queue_len: state.queue.len(),
            viewed: state.queue.viewed(),
            average_engagement: average,
            exploration_ratio: state.engagement.ratio_for(average),
            mode: state.engagement.mode_for(average),
            is_preloading: self.is_preloading(),
            model_status: self.embeddings.status(),
            progress: state.queue.progress(),
        }
    }
}
