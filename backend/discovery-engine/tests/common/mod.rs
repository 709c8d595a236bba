#![allow(dead_code)]

use async_trait::async_trait;
use discovery_engine::{ContentProvider, Embedder, EmbeddingError, Item, ProviderError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn article(id: &str) -> Item {
    Item::new(id, format!("Summary of {}", id), format!("Body of {}", id))
}

/// In-memory catalogue with scripted related links and random draws.
#[derive(Default)]
pub struct FakeProvider {
    catalogue: Mutex<HashMap<String, Item>>,
    related: Mutex<HashMap<String, Vec<String>>>,
    randoms: Mutex<VecDeque<Item>>,
    broken_ids: Mutex<HashSet<String>>,
    fail_related: AtomicBool,
    /// When set, fetch_related_ids waits for a notification
    gate: Mutex<Option<Arc<Notify>>>,
    pub related_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub random_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, ids: &[&str]) {
        let mut catalogue = self.catalogue.lock().unwrap();
        for id in ids {
            catalogue.insert(id.to_string(), article(id));
        }
    }

    pub fn link(&self, from: &str, to: &[&str]) {
        self.add(to);
        self.related
            .lock()
            .unwrap()
            .insert(from.to_string(), to.iter().map(|s| s.to_string()).collect());
    }

    /// Queue items to be returned by successive fetch_random_item calls.
    pub fn queue_random(&self, ids: &[&str]) {
        self.add(ids);
        self.randoms
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| article(id)));
    }

    pub fn break_id(&self, id: &str) {
        self.broken_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_related(&self, fail: bool) {
        self.fail_related.store(fail, Ordering::SeqCst);
    }

    pub fn hold_related(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn release_related(&self) {
        *self.gate.lock().unwrap() = None;
    }

    pub fn related_calls(&self) -> usize {
        self.related_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn random_calls(&self) -> usize {
        self.random_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for FakeProvider {
    async fn fetch_random_item(&self) -> Result<Item, ProviderError> {
        self.random_calls.fetch_add(1, Ordering::SeqCst);
        self.randoms
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Request("random pool exhausted".to_string()))
    }

    async fn fetch_related_ids(&self, item_id: &str, limit: usize) -> Result<Vec<String>, ProviderError> {
        self.related_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_related.load(Ordering::SeqCst) {
            return Err(ProviderError::Request("links unavailable".to_string()));
        }

        let related = self.related.lock().unwrap();
        Ok(related
            .get(item_id)
            .map(|ids| ids.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_items_by_ids(&self, ids: &[String]) -> Result<Vec<Item>, ProviderError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let catalogue = self.catalogue.lock().unwrap();
        let broken = self.broken_ids.lock().unwrap();
        Ok(ids
            .iter()
            .filter(|id| !broken.contains(*id))
            .filter_map(|id| catalogue.get(id).cloned())
            .collect())
    }
}

/// Embeds an item by looking up the vector registered for its id.
/// Unregistered ids get a vector orthogonal to the x axis.
#[derive(Default)]
pub struct FakeEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    broken_ids: Mutex<HashSet<String>>,
    fail_load: AtomicBool,
    pub loads: AtomicUsize,
    pub embeds: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, id: &str, vector: Vec<f32>) {
        self.vectors.lock().unwrap().insert(id.to_string(), vector);
    }

    pub fn break_id(&self, id: &str) {
        self.broken_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_load(&self) {
        self.fail_load.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn load(&self) -> Result<(), EmbeddingError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(EmbeddingError::ModelLoad("model download failed".to_string()));
        }
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embeds.fetch_add(1, Ordering::SeqCst);
        let id = text.split_once(". ").map(|(id, _)| id).unwrap_or(text);
        if self.broken_ids.lock().unwrap().contains(id) {
            return Err(EmbeddingError::Inference(format!("cannot embed {}", id)));
        }
        Ok(self
            .vectors
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
    }
}
