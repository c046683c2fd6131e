pub mod feed_generated;
pub mod video_duration_watched;
pub mod video_viewed;
pub mod view_rejected;

pub use feed_generated::FeedGenerated;
pub use video_duration_watched::VideoDurationWatched;
pub use video_viewed::VideoViewed;
pub use view_rejected::ViewRejected;

use sealed_metric::SealedMetric;
use serde::Serialize;
use serde_json::Value;
use web_time::{SystemTime, UNIX_EPOCH};

mod sealed_metric {
    use std::fmt::Debug;

    use serde::Serialize;

    pub trait SealedMetric: Serialize + Debug {
        fn tag(&self) -> String;

        fn user_id(&self) -> Option<String> {
            None
        }
    }
}

pub trait Metric: SealedMetric {}

impl<T: SealedMetric> Metric for T {}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSource {
    ViewTracker,
    FeedService,
}

#[derive(Serialize, Debug, Clone)]
pub struct MetricEvent<M: Metric> {
    pub source: EventSource,
    pub tag: String,
    pub user_id: Option<String>,
    pub metric: M,
    pub unix_timestamp_secs: u64,
}

impl<M: Metric> MetricEvent<M> {
    pub fn new(source: EventSource, metric: M) -> Self {
        Self {
            source,
            tag: metric.tag(),
            user_id: metric.user_id(),
            metric,
            unix_timestamp_secs: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }

    /// Replaces the typed payload with its JSON form so events of any metric
    /// type can travel through one queue.
    pub fn erase(self) -> Result<MetricEvent<RawMetric>, serde_json::Error> {
        let payload = serde_json::to_value(&self.metric)?;
        Ok(MetricEvent {
            source: self.source,
            tag: self.tag.clone(),
            user_id: self.user_id.clone(),
            metric: RawMetric {
                payload,
                tag: self.tag,
                user_id: self.user_id,
            },
            unix_timestamp_secs: self.unix_timestamp_secs,
        })
    }
}

/// An already serialized metric payload
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct RawMetric {
    pub payload: Value,
    #[serde(skip)]
    tag: String,
    #[serde(skip)]
    user_id: Option<String>,
}

impl SealedMetric for RawMetric {
    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}
