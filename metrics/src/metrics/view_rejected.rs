use super::sealed_metric::SealedMetric;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct ViewRejected {
    pub video_id: String,
    pub viewer_id: String,
    pub reason: String,
}

impl SealedMetric for ViewRejected {
    fn tag(&self) -> String {
        "view_rejected".to_string()
    }
}
