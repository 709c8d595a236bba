// ============================================
// Feed Module
// ============================================
//
// Session lifecycle: Empty -> Seeded -> Steady-state (browsing <-> preloading)
//
// On each forward move:
// 1. Engagement for the item being left is recorded
// 2. If few items remain ahead, a background preload is spawned
// 3. The preload fetches related + random candidates, embeds them,
//    and appends an explore/exploit batch to the queue
//
// Only one preload runs at a time; browsing never waits on it.

pub mod engine;
pub mod queue;

pub use engine::{PreloadOutcome, RecommendationEngine};
pub use queue::FeedQueue;
