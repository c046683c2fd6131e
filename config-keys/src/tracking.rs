use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ViewTrackingConfig {
    /// Watch time a session needs before it may count
    pub min_watch_time_ms: u64,
    /// Below this the session is suspended
    pub min_visibility_percent: f64,
    /// Sessions without an update for this long are swept
    pub session_timeout_ms: u64,
    pub cleanup_interval_ms: u64,
    /// Repeated starts for one video inside this window are rejected
    pub debounce_ms: u64,
    /// A (viewer, video) pair counts at most once per cooldown
    pub cooldown_ms: u64,
    pub ownership_cache_ttl_ms: u64,
    pub ownership_cache_capacity: usize,
    pub unique_view_cache_capacity: usize,
    pub max_views_per_hour: usize,
    pub rate_limit_window_ms: u64,
    /// Upper bound of the persisted view log
    pub view_log_capacity: usize,
}

impl Default for ViewTrackingConfig {
    fn default() -> Self {
        Self {
            min_watch_time_ms: 3_000,
            min_visibility_percent: 50.0,
            session_timeout_ms: 30_000,
            cleanup_interval_ms: 60_000,
            debounce_ms: 5_000,
            cooldown_ms: 24 * 60 * 60 * 1000,
            ownership_cache_ttl_ms: 5 * 60 * 1000,
            ownership_cache_capacity: 500,
            unique_view_cache_capacity: 2_000,
            max_views_per_hour: 10,
            rate_limit_window_ms: 60 * 60 * 1000,
            view_log_capacity: 500,
        }
    }
}
