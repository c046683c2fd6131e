use serde::{Deserialize, Serialize};
use types::post::{VideoData, VideoPerformance};

/// A video eligible for the feed
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub video: VideoData,
    pub from_followed: bool,
}

/// External signals looked up for one candidate
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Signals {
    pub performance: Option<VideoPerformance>,
    pub uploader_trust: f64,
}

/// Sub-scores of one (video, viewer) pair. Computed per request, never stored.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoRankingScore {
    pub freshness: f64,
    pub relevance: f64,
    pub trust: f64,
    pub virality: f64,
    pub personalized: f64,
    pub boost_factor: f64,
    pub follow_boost: f64,
    pub final_score: f64,
}

#[derive(Clone, Debug)]
pub struct ScoredVideo {
    pub video: VideoData,
    pub from_followed: bool,
    pub score: VideoRankingScore,
}

/// What a viewer did with one video
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub video_id: String,
    pub watch_time_secs: f64,
    pub liked: bool,
    pub commented: bool,
    pub shared: bool,
    pub skipped: bool,
}

impl Interaction {
    pub fn engaged(&self) -> bool {
        self.liked || self.commented || self.shared
    }
}
