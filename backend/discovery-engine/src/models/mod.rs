use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fixed-length embedding vector. Shared so the cache, the queue and
/// candidate pools can hold the same allocation.
pub type Embedding = Arc<[f32]>;

/// A piece of content in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable content key (e.g. the article title)
    pub id: String,
    pub summary: String,
    pub body: String,
    pub media_ref: Option<String>,
    pub source_url: Option<String>,
    /// Attached lazily, the first time the item is scored
    #[serde(skip)]
    pub embedding: Option<Embedding>,
}

impl Item {
    pub fn new(id: impl Into<String>, summary: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            body: body.into(),
            media_ref: None,
            source_url: None,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Text handed to the embedder for this item
    pub fn embedding_text(&self) -> String {
        format!("{}. {} {}", self.id, self.summary, self.body)
    }
}

/// Engagement measured for one item when the user left it. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub item_id: String,
    pub dwell_time_ms: u64,
    pub expanded: bool,
    /// Always within [0, 1]
    pub score: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// Lifecycle of the embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Idle => "idle",
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationMode {
    Exploration, // low engagement, diversify
    Balanced,
    Exploitation, // high engagement, stay close to current interest
}

impl RecommendationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationMode::Exploration => "exploration",
            RecommendationMode::Balanced => "balanced",
            RecommendationMode::Exploitation => "exploitation",
        }
    }

    /// Status line shown next to the feed
    pub fn label(&self, preloading: bool) -> &'static str {
        if preloading {
            return "Loading next articles...";
        }
        match self {
            RecommendationMode::Exploration => "Exploring new areas...",
            RecommendationMode::Balanced => "Balancing discovery...",
            RecommendationMode::Exploitation => "Finding similar topics...",
        }
    }
}

/// Point-in-time view of a browsing session.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub current: Option<Item>,
    pub position: usize,
    pub queue_len: usize,
    /// Distinct items the cursor has landed on
    pub viewed: usize,
    pub average_engagement: f64,
    pub exploration_ratio: f64,
    pub mode: RecommendationMode,
    pub is_preloading: bool,
    pub model_status: ModelStatus,
    /// position / (queue_len - 1), 0 when there is nothing ahead
    pub progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_text_concatenates_fields() {
        let item = Item::new("Rust", "A language", "Systems programming.");
        assert_eq!(item.embedding_text(), "Rust. A language Systems programming.");
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(
            RecommendationMode::Exploitation.label(false),
            "Finding similar topics..."
        );
        assert_eq!(
            RecommendationMode::Exploration.label(true),
            "Loading next articles..."
        );
        assert_eq!(ModelStatus::Ready.as_str(), "ready");
    }
}
