pub mod embedding;
pub mod engagement;
pub mod feed;
pub mod provider;
pub mod selection;

pub use embedding::{Embedder, EmbeddingCache};
pub use engagement::EngagementTracker;
pub use feed::{FeedQueue, PreloadOutcome, RecommendationEngine};
pub use provider::ContentProvider;
pub use selection::{CandidateSelector, ScoredCandidate};
