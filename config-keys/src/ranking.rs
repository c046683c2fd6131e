use serde::{Deserialize, Serialize};

/// Feed ranking weights. These were tuned by hand; treat them as defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RankingConfig {
    pub freshness_weight: f64,
    pub relevance_weight: f64,
    pub trust_weight: f64,
    pub virality_weight: f64,
    pub personalized_weight: f64,
    /// Freshness loses half of its headroom above the floor every this many hours
    pub freshness_half_life_hours: f64,
    pub freshness_floor: f64,
    pub relevance_base: f64,
    pub hashtag_match_bonus: f64,
    pub keyword_match_bonus: f64,
    /// Neutral trust for uploaders without history
    pub default_trust: f64,
    /// Number of recent uploads considered for trust
    pub trust_history_len: usize,
    /// Engagement rate that maps to full trust
    pub trust_full_engagement: f64,
    pub trust_cache_ttl_ms: u64,
    /// Viewer engagement rate treated as average
    pub baseline_engagement: f64,
    pub skip_penalty: f64,
    pub min_engagement_rate: f64,
    pub max_engagement_boost: f64,
    pub virality_threshold: f64,
    pub viral_boost: f64,
    pub follow_boost: f64,
    pub diversity_factor: f64,
    /// Candidates fetched per query
    pub candidate_pool_size: usize,
    pub profile_cache_ttl_ms: u64,
    pub cache_capacity: usize,
    pub max_interests: usize,
    /// Smoothing of profile averages after each interaction
    pub profile_smoothing: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            freshness_weight: 0.3,
            relevance_weight: 0.2,
            trust_weight: 0.1,
            virality_weight: 0.3,
            personalized_weight: 0.7,
            freshness_half_life_hours: 24.0,
            freshness_floor: 10.0,
            relevance_base: 50.0,
            hashtag_match_bonus: 20.0,
            keyword_match_bonus: 10.0,
            default_trust: 50.0,
            trust_history_len: 10,
            trust_full_engagement: 0.2,
            trust_cache_ttl_ms: 10 * 60 * 1000,
            baseline_engagement: 0.1,
            skip_penalty: 20.0,
            min_engagement_rate: 0.05,
            max_engagement_boost: 3.0,
            virality_threshold: 70.0,
            viral_boost: 1.5,
            follow_boost: 1.2,
            diversity_factor: 0.4,
            candidate_pool_size: 100,
            profile_cache_ttl_ms: 15 * 60 * 1000,
            cache_capacity: 1_000,
            max_interests: 20,
            profile_smoothing: 0.1,
        }
    }
}
