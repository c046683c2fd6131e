use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use store::{
    collections::{VIDEOS, VIDEO_VIEWS},
    DocumentStore, Query,
};

const MAX_VIEW_ENTRIES: usize = 1000;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewAnalytics {
    pub total_views: u64,
    pub unique_viewers: u64,
    /// seconds
    pub average_watch_time: f64,
    pub last_viewed: Option<String>,
}

/// Public view counter of a video. Missing videos and store failures read as 0.
pub async fn get_view_count<D: DocumentStore>(docs: &D, video_id: &str) -> u64 {
    match docs.get(VIDEOS, video_id).await {
        Ok(Some(doc)) => doc.get("views").and_then(|v| v.as_u64()).unwrap_or_default(),
        Ok(None) => 0,
        Err(e) => {
            log::warn!("failed to read view count of {video_id}: {e}");
            0
        }
    }
}

pub async fn get_view_analytics<D: DocumentStore>(docs: &D, video_id: &str) -> ViewAnalytics {
    let mut analytics = match docs.get(VIDEOS, video_id).await {
        Ok(Some(doc)) => ViewAnalytics {
            total_views: doc.get("views").and_then(|v| v.as_u64()).unwrap_or_default(),
            last_viewed: doc
                .get("lastViewedAt")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            ..Default::default()
        },
        Ok(None) => ViewAnalytics::default(),
        Err(e) => {
            log::warn!("failed to read video {video_id} for analytics: {e}");
            ViewAnalytics::default()
        }
    };

    let query = Query::new().eq("videoId", video_id).limit(MAX_VIEW_ENTRIES);
    let entries = match docs.query(VIDEO_VIEWS, &query).await {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("failed to query views of {video_id}: {e}");
            return analytics;
        }
    };
    if entries.is_empty() {
        return analytics;
    }

    let viewers: HashSet<&str> = entries
        .iter()
        .filter_map(|(_, doc)| doc.get("viewerId").and_then(|v| v.as_str()))
        .collect();
    let total_watch_ms: u64 = entries
        .iter()
        .filter_map(|(_, doc)| doc.get("watchTimeMs").and_then(|v| v.as_u64()))
        .sum();

    analytics.unique_viewers = viewers.len() as u64;
    analytics.average_watch_time = total_watch_ms as f64 / entries.len() as f64 / 1000.0;
    analytics
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use store::MemoryDocumentStore;

    use super::*;

    fn doc(v: Value) -> store::Document {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn view_count_defaults_to_zero() {
        let docs = MemoryDocumentStore::new();
        assert_eq!(get_view_count(&docs, "missing").await, 0);

        docs.insert(VIDEOS, "v1", doc(json!({ "views": 7 })));
        assert_eq!(get_view_count(&docs, "v1").await, 7);

        docs.set_offline(true);
        assert_eq!(get_view_count(&docs, "v1").await, 0);
    }

    #[tokio::test]
    async fn analytics_aggregate_counted_views() {
        let docs = MemoryDocumentStore::new();
        docs.insert(
            VIDEOS,
            "v1",
            doc(json!({ "views": 3, "lastViewedAt": "2026-01-01T00:00:00+00:00" })),
        );
        for (viewer, watch) in [("a", 4000), ("b", 6000), ("a", 5000)] {
            docs.add(
                VIDEO_VIEWS,
                doc(json!({ "videoId": "v1", "viewerId": viewer, "watchTimeMs": watch })),
            )
            .await
            .unwrap();
        }
        docs.add(VIDEO_VIEWS, doc(json!({ "videoId": "v2", "viewerId": "c", "watchTimeMs": 1 })))
            .await
            .unwrap();

        let analytics = get_view_analytics(&docs, "v1").await;
        assert_eq!(analytics.total_views, 3);
        assert_eq!(analytics.unique_viewers, 2);
        assert!((analytics.average_watch_time - 5.0).abs() < 1e-9);
        assert_eq!(
            analytics.last_viewed.as_deref(),
            Some("2026-01-01T00:00:00+00:00")
        );
    }

    #[tokio::test]
    async fn analytics_survive_a_failing_store() {
        let docs = MemoryDocumentStore::new();
        docs.set_offline(true);
        assert_eq!(get_view_analytics(&docs, "v1").await, ViewAnalytics::default());
    }
}
