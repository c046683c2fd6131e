use super::sealed_metric::SealedMetric;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct VideoDurationWatched {
    pub video_id: String,
    pub viewer_id: String,
    pub user_id: Option<String>,
    pub is_logged_in: bool,
    pub session_id: String,
    pub absolute_watched: f64,
    pub reached_threshold: bool,
}

impl SealedMetric for VideoDurationWatched {
    fn tag(&self) -> String {
        "video_duration_watched".to_string()
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}
