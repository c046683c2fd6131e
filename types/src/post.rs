use std::hash::{Hash, Hasher};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{UnixMillis, UserId, VideoId};

/// A video document as stored in the `videos` collection.
///
/// `id` is the document key and is not part of the stored fields.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoData {
    #[serde(skip)]
    pub id: VideoId,
    /// Uploader of the video
    pub user_id: UserId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub created_at: UnixMillis,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    #[serde(default)]
    pub last_viewed_at: Option<String>,
}

fn default_public() -> bool {
    true
}

impl PartialEq for VideoData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VideoData {}

impl Hash for VideoData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl VideoData {
    /// (likes + comments + shares) per view, 0 for unwatched videos
    pub fn engagement_rate(&self) -> f64 {
        if self.views == 0 {
            return 0.0;
        }
        (self.likes + self.comments + self.shares) as f64 / self.views as f64
    }

    pub fn hours_since_upload(&self, now: UnixMillis) -> f64 {
        now.saturating_sub(self.created_at) as f64 / crate::MILLIS_PER_HOUR as f64
    }
}

/// Precomputed per-video performance, stored in `video_performance`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoPerformance {
    #[serde(default)]
    pub engagement_rate: f64,
    #[serde(default)]
    pub skip_rate: f64,
    /// seconds
    #[serde(default)]
    pub avg_watch_time: f64,
    #[serde(default)]
    pub virality_score: Option<f64>,
}

/// Decodes a raw document into one of the typed shapes above.
pub fn from_document<T: DeserializeOwned>(doc: &Map<String, Value>) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(doc.clone()))
}

/// Encodes a typed value into raw document fields.
///
/// Values that do not serialize to a JSON object produce an empty document.
pub fn to_document<T: Serialize>(value: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

impl VideoData {
    pub fn from_document(id: impl Into<VideoId>, doc: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut video: VideoData = from_document(doc)?;
        video.id = id.into();
        Ok(video)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn video_document_uses_camel_case_fields() {
        let doc = json!({
            "userId": "alice",
            "title": "cats",
            "hashtags": ["cats", "funny"],
            "views": 10,
            "likes": 2,
            "comments": 1,
            "shares": 1,
            "createdAt": 1_000,
        });
        let Value::Object(doc) = doc else { unreachable!() };

        let video = VideoData::from_document("v1", &doc).unwrap();
        assert_eq!(video.id, "v1");
        assert_eq!(video.user_id, "alice");
        assert!(video.is_public);
        assert_eq!(video.hashtags.len(), 2);
        assert!((video.engagement_rate() - 0.4).abs() < f64::EPSILON);

        let back = to_document(&video).unwrap();
        assert!(back.contains_key("userId"));
        assert!(!back.contains_key("id"));
    }

    #[test]
    fn upload_age_never_goes_negative() {
        let video = VideoData {
            created_at: 10 * crate::MILLIS_PER_HOUR,
            ..Default::default()
        };
        assert_eq!(video.hours_since_upload(0), 0.0);
        assert_eq!(video.hours_since_upload(12 * crate::MILLIS_PER_HOUR), 2.0);
    }
}
