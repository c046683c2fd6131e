/// Largest value list an `In` filter may carry
pub const MAX_IN_FILTER_VALUES: usize = 10;

pub const MAX_SUB_SCORE: f64 = 100.0;

/// Share of the freshness headroom that decays as `1 / (1 + age in half-lives)`
pub const FRESHNESS_TAIL_SCORE: f64 = 1.0;

/// Virality mix used when a video has no precomputed virality score
pub const VIRALITY_ENGAGEMENT_SHARE: f64 = 50.0;
pub const VIRALITY_RETENTION_SHARE: f64 = 30.0;
pub const VIRALITY_WATCH_SHARE: f64 = 20.0;
/// Average watch time, in seconds, that earns the full watch share
pub const VIRALITY_FULL_WATCH_SECS: f64 = 30.0;

/// Personalized score of a video that engages exactly as much as the viewer usually does
pub const NEUTRAL_PERSONALIZED_SCORE: f64 = 50.0;

pub const FOLLOWS_QUERY_LIMIT: usize = 500;
