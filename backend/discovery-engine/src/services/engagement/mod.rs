// ============================================
// Engagement Tracker
// ============================================
//
// Turns browsing behavior into a bounded engagement score:
//   score = time_weight * min(dwell / max_dwell, 1) + expansion_weight * expanded
//
// The rolling average over the most recent records drives the
// exploration ratio used by candidate selection:
//   avg > 0.6 -> 0.25 (exploit), avg < 0.4 -> 0.75 (explore), else 0.5

use crate::config::EngagementConfig;
use crate::models::{EngagementRecord, RecommendationMode};
use chrono::Utc;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::debug;

/// Average engagement assumed before anything was recorded
pub const NEUTRAL_ENGAGEMENT: f64 = 0.5;

#[derive(Debug)]
struct OpenTracking {
    item_id: String,
    started_at: Instant,
}

/// Tracks one open item at a time and a bounded history of records.
#[derive(Debug)]
pub struct EngagementTracker {
    config: EngagementConfig,
    open: Option<OpenTracking>,
    /// Oldest first; evicted from the front when full
    history: VecDeque<EngagementRecord>,
}

impl Default for EngagementTracker {
    fn default() -> Self {
        Self::new(EngagementConfig::default())
    }
}

impl EngagementTracker {
    pub fn new(config: EngagementConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_capacity),
            config,
            open: None,
        }
    }

    /// Start timing `item_id`, replacing whatever was open.
    pub fn start_tracking(&mut self, item_id: impl Into<String>) {
        self.open = Some(OpenTracking {
            item_id: item_id.into(),
            started_at: Instant::now(),
        });
    }

    pub fn tracked_item(&self) -> Option<&str> {
        self.open.as_ref().map(|o| o.item_id.as_str())
    }

    /// Close the open tracking and record it. `None` if nothing was open.
    pub fn end_tracking(&mut self, item_id: &str, did_expand: bool) -> Option<EngagementRecord> {
        let open = self.open.take()?;
        if open.item_id != item_id {
            debug!(
                tracked = %open.item_id,
                item_id = %item_id,
                "Closing tracking for a different item than was opened"
            );
        }

        let dwell_time_ms = open.started_at.elapsed().as_millis() as u64;
        let record = EngagementRecord {
            item_id: item_id.to_string(),
            dwell_time_ms,
            expanded: did_expand,
            score: self.score(dwell_time_ms, did_expand),
            recorded_at: Utc::now(),
        };

        if self.history.len() == self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());

        debug!(
            item_id = %record.item_id,
            dwell_time_ms = record.dwell_time_ms,
            expanded = record.expanded,
            score = record.score,
            "Engagement recorded"
        );

        Some(record)
    }

    pub fn score(&self, dwell_time_ms: u64, did_expand: bool) -> f64 {
        let time_component = (dwell_time_ms as f64 / self.config.max_dwell_ms as f64).min(1.0);
        let expand_component = if did_expand { 1.0 } else { 0.0 };
        self.config.time_weight * time_component + self.config.expansion_weight * expand_component
    }

    /// Mean score of the `recent_count` newest records, or 0.5 with no history.
    pub fn average_engagement(&self, recent_count: usize) -> f64 {
        if self.history.is_empty() || recent_count == 0 {
            return NEUTRAL_ENGAGEMENT;
        }

        // Newest first; stable so equal timestamps keep insertion order
        let mut recent: Vec<&EngagementRecord> = self.history.iter().rev().collect();
        recent.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        recent.truncate(recent_count);

        recent.iter().map(|r| r.score).sum::<f64>() / recent.len() as f64
    }

    /// Average over the configured window.
    pub fn recent_average(&self) -> f64 {
        self.average_engagement(self.config.recent_window)
    }

    pub fn exploration_ratio(&self) -> f64 {
        self.ratio_for(self.recent_average())
    }

    /// Maps an average engagement to an exploration ratio. Thresholds are strict.
    pub fn ratio_for(&self, average: f64) -> f64 {
        match self.mode_for(average) {
            RecommendationMode::Exploitation => self.config.exploit_ratio,
            RecommendationMode::Exploration => self.config.explore_ratio,
            RecommendationMode::Balanced => self.config.balanced_ratio,
        }
    }

    pub fn recommendation_mode(&self) -> RecommendationMode {
        self.mode_for(self.recent_average())
    }

    pub fn mode_for(&self, average: f64) -> RecommendationMode {
        if average > self.config.high_engagement_threshold {
            RecommendationMode::Exploitation
        } else if average < self.config.low_engagement_threshold {
            RecommendationMode::Exploration
        } else {
            RecommendationMode::Balanced
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &EngagementRecord> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
