use crate::error::ConfigError;
use serde::Deserialize;

/// Engine tuning knobs. Every field can be overridden with a
/// `DISCOVERY_<FIELD>` environment variable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Items appended per preload (N)
    pub batch_size: usize,
    /// Preload once this many items (or fewer) remain ahead of the cursor
    pub preload_trigger_remaining: usize,
    /// Candidate pool floor before random items are injected
    pub min_candidates: usize,
    /// Related ids requested from the provider per preload
    pub related_limit: usize,
    /// Upper bound on candidate items fetched per preload
    pub max_fetch_candidates: usize,
    /// Random injections scale with floor(exploration_ratio * scale)
    pub random_injection_scale: usize,
    /// Length (in chars) of the embedding cache key prefix
    pub cache_key_chars: usize,
    /// Input is truncated to this many chars before inference
    pub max_embed_input_chars: usize,

    pub max_dwell_ms: u64,
    pub time_weight: f64,
    pub expansion_weight: f64,
    pub recent_window: usize,
    pub history_capacity: usize,
    pub high_engagement_threshold: f64,
    pub low_engagement_threshold: f64,
    pub exploit_ratio: f64,
    pub balanced_ratio: f64,
    pub explore_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 6,
            preload_trigger_remaining: 4,
            min_candidates: 4,
            related_limit: 20,
            max_fetch_candidates: 12,
            random_injection_scale: 4,
            cache_key_chars: 500,
            max_embed_input_chars: 512,
            max_dwell_ms: 5000,
            time_weight: 0.5,
            expansion_weight: 0.5,
            recent_window: 5,
            history_capacity: 100,
            high_engagement_threshold: 0.6,
            low_engagement_threshold: 0.4,
            exploit_ratio: 0.25,
            balanced_ratio: 0.5,
            explore_ratio: 0.75,
        }
    }
}

/// Engagement scoring subset of [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngagementConfig {
    pub max_dwell_ms: u64,
    pub time_weight: f64,
    pub expansion_weight: f64,
    pub recent_window: usize,
    pub history_capacity: usize,
    pub high_engagement_threshold: f64,
    pub low_engagement_threshold: f64,
    pub exploit_ratio: f64,
    pub balanced_ratio: f64,
    pub explore_ratio: f64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        EngineConfig::default().engagement()
    }
}

/// Embedding cache subset of [`EngineConfig`].
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub key_chars: usize,
    pub max_input_chars: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        EngineConfig::default().cache()
    }
}

impl EngineConfig {
    /// Load from `.env` and `DISCOVERY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Same as [`EngineConfig::from_env`] over an explicit variable set.
    /// Unset fields keep their defaults.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: EngineConfig = envy::prefixed("DISCOVERY_").from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.max_dwell_ms == 0 {
            return Err(invalid("max_dwell_ms", "must be at least 1"));
        }
        if self.recent_window == 0 || self.history_capacity < self.recent_window {
            return Err(invalid(
                "history_capacity",
                format!(
                    "must be >= recent_window ({}) and recent_window must be >= 1",
                    self.recent_window
                ),
            ));
        }
        for (field, value) in [
            ("time_weight", self.time_weight),
            ("expansion_weight", self.expansion_weight),
            ("exploit_ratio", self.exploit_ratio),
            ("balanced_ratio", self.balanced_ratio),
            ("explore_ratio", self.explore_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("{} is outside [0, 1]", value)));
            }
        }
        if self.time_weight + self.expansion_weight > 1.0 + f64::EPSILON {
            return Err(invalid(
                "expansion_weight",
                "time_weight + expansion_weight must not exceed 1",
            ));
        }
        if self.low_engagement_threshold >= self.high_engagement_threshold {
            return Err(invalid(
                "low_engagement_threshold",
                "must be below high_engagement_threshold",
            ));
        }
        Ok(())
    }

    pub fn engagement(&self) -> EngagementConfig {
        EngagementConfig {
            max_dwell_ms: self.max_dwell_ms,
            time_weight: self.time_weight,
            expansion_weight: self.expansion_weight,
            recent_window: self.recent_window,
            history_capacity: self.history_capacity,
            high_engagement_threshold: self.high_engagement_threshold,
            low_engagement_threshold: self.low_engagement_threshold,
            exploit_ratio: self.exploit_ratio,
            balanced_ratio: self.balanced_ratio,
            explore_ratio: self.explore_ratio,
        }
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            key_chars: self.cache_key_chars,
            max_input_chars: self.max_embed_input_chars,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
