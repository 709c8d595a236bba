use crate::models::{Direction, Embedding, Item};
use std::collections::HashSet;

/// Append-only feed with a read cursor and the set of ids ever queued.
///
/// Invariants: `position < items.len()` whenever the queue is non-empty,
/// and an id in `seen` is never removed.
#[derive(Debug, Default)]
pub struct FeedQueue {
    items: Vec<Item>,
    position: usize,
    /// Furthest position the cursor has reached in this session
    furthest: usize,
    seen: HashSet<String>,
}

impl FeedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session at `item`. The seen set carries over.
    pub fn reset(&mut self, item: Item) {
        self.seen.insert(item.id.clone());
        self.items = vec![item];
        self.position = 0;
        self.furthest = 0;
    }

    pub fn current(&self) -> Option<&Item> {
        self.items.get(self.position)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Items from the cursor to the end, current included.
    pub fn remaining(&self) -> usize {
        self.items.len() - self.position
    }

    pub fn should_preload(&self, trigger_remaining: usize) -> bool {
        self.remaining() <= trigger_remaining
    }

    pub fn viewed(&self) -> usize {
        if self.items.is_empty() {
            0
        } else {
            self.furthest + 1
        }
    }

    /// position / (len - 1); 0 when nothing lies ahead of a single item.
    pub fn progress(&self) -> f64 {
        if self.items.len() > 1 {
            self.position as f64 / (self.items.len() - 1) as f64
        } else {
            0.0
        }
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn seen(&self) -> &HashSet<String> {
        &self.seen
    }

    pub fn can_move(&self, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.position + 1 < self.items.len(),
            Direction::Backward => self.position > 0,
        }
    }

    /// Move the cursor one step. Returns false (and does nothing) at either end.
    pub fn advance(&mut self, direction: Direction) -> bool {
        if !self.can_move(direction) {
            return false;
        }
        match direction {
            Direction::Forward => {
                self.position += 1;
                self.furthest = self.furthest.max(self.position);
            }
            Direction::Backward => self.position -= 1,
        }
        true
    }

    /// Append unseen items, marking each as seen. Returns how many were added.
    pub fn append(&mut self, items: Vec<Item>) -> usize {
        let before = self.items.len();
        for item in items {
            if self.seen.insert(item.id.clone()) {
                self.items.push(item);
            }
        }
        self.items.len() - before
    }

    /// Attach a lazily computed embedding to every queued copy of `id`.
    pub fn attach_embedding(&mut self, id: &str, embedding: &Embedding) {
        for item in self.items.iter_mut().filter(|i| i.id == id && i.embedding.is_none()) {
            item.embedding = Some(embedding.clone());
        }
    }
}
