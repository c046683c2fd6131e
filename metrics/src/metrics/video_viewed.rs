use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::sealed_metric::SealedMetric;

/// A view that passed every check and was added to the public counter
#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct VideoViewed {
    pub video_id: String,
    pub publisher_user_id: Option<String>,
    /// user id when signed in, device fingerprint otherwise
    pub viewer_id: String,
    pub user_id: Option<String>,
    pub is_logged_in: bool,
    pub device_fingerprint: String,
    pub session_id: Option<String>,
    pub watch_time_ms: u64,
}

impl SealedMetric for VideoViewed {
    fn tag(&self) -> String {
        "video_viewed".to_string()
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}
