use super::sealed_metric::SealedMetric;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One personalized feed handed to a viewer
#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct FeedGenerated {
    pub user_id: String,
    pub requested: usize,
    pub returned: usize,
    pub candidates: usize,
    pub followed_candidates: usize,
}

impl SealedMetric for FeedGenerated {
    fn tag(&self) -> String {
        "feed_generated".to_string()
    }

    fn user_id(&self) -> Option<String> {
        Some(self.user_id.clone())
    }
}
