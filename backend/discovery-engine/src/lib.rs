pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::EngineConfig;
pub use error::{DiscoveryError, EmbeddingError, ProviderError, Result};
pub use models::{Direction, Embedding, EngagementRecord, FeedSnapshot, Item, ModelStatus, RecommendationMode};
pub use services::{
    CandidateSelector, ContentProvider, Embedder, EmbeddingCache, EngagementTracker, PreloadOutcome,
    RecommendationEngine,
};
