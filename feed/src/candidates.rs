use std::collections::HashSet;

use serde_json::Value;
use store::{
    collections::{FOLLOWS, VIDEOS},
    Direction, Document, DocumentStore, FilterOp, Query,
};
use types::{post::VideoData, UserId};

use crate::{
    consts::{FOLLOWS_QUERY_LIMIT, MAX_IN_FILTER_VALUES},
    model::Candidate,
};

fn decode_videos(docs: Vec<(String, Document)>) -> Vec<VideoData> {
    docs.into_iter()
        .filter_map(|(id, doc)| {
            VideoData::from_document(id.clone(), &doc)
                .inspect_err(|e| log::warn!("skipping malformed video {id}: {e}"))
                .ok()
        })
        .collect()
}

pub async fn followed_creators<D: DocumentStore>(docs: &D, viewer_id: &str) -> Vec<UserId> {
    let query = Query::new()
        .eq("followerId", viewer_id)
        .limit(FOLLOWS_QUERY_LIMIT);
    match docs.query(FOLLOWS, &query).await {
        Ok(follows) => follows
            .into_iter()
            .filter_map(|(_, doc)| {
                doc.get("followingId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect(),
        Err(e) => {
            log::warn!("failed to load follows of {viewer_id}: {e}");
            Vec::new()
        }
    }
}

/// Videos of the given creators, queried in chunks the store accepts.
pub async fn followed_videos<D: DocumentStore>(docs: &D, creators: &[UserId], limit: usize) -> Vec<VideoData> {
    let mut videos = Vec::new();
    for chunk in creators.chunks(MAX_IN_FILTER_VALUES) {
        let ids = chunk.iter().map(|c| Value::from(c.as_str())).collect();
        let query = Query::new().filter("userId", FilterOp::In(ids)).limit(limit);
        match docs.query(VIDEOS, &query).await {
            Ok(found) => videos.extend(decode_videos(found)),
            Err(e) => log::warn!("failed to load videos of followed creators: {e}"),
        }
    }
    videos
}

/// Most recent public videos. Falls back to simpler queries when the store
/// rejects one, and to an empty pool when all of them fail.
pub async fn general_pool<D: DocumentStore>(docs: &D, limit: usize) -> Vec<VideoData> {
    let attempts = [
        Query::new()
            .eq("isPublic", true)
            .order_by("createdAt", Direction::Descending)
            .limit(limit),
        Query::new()
            .order_by("createdAt", Direction::Descending)
            .limit(limit),
        Query::new().limit(limit),
    ];

    for (i, query) in attempts.iter().enumerate() {
        match docs.query(VIDEOS, query).await {
            Ok(found) => {
                if i > 0 {
                    log::warn!("general video pool served by fallback query #{i}");
                }
                return decode_videos(found);
            }
            Err(e) => log::warn!("general video pool query #{i} failed: {e}"),
        }
    }
    Vec::new()
}

/// Followed creators' videos first, then the general pool. Deduplicated,
/// public only and without the viewer's own uploads.
pub async fn gather_candidates<D: DocumentStore>(docs: &D, viewer_id: &str, pool_size: usize) -> Vec<Candidate> {
    let creators = followed_creators(docs, viewer_id).await;
    let followed: HashSet<&str> = creators.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let from_follows = if creators.is_empty() {
        Vec::new()
    } else {
        followed_videos(docs, &creators, pool_size).await
    };
    let pool = general_pool(docs, pool_size).await;

    for video in from_follows.into_iter().chain(pool) {
        if !video.is_public || video.user_id == viewer_id || !seen.insert(video.id.clone()) {
            continue;
        }
        let from_followed = followed.contains(video.user_id.as_str());
        candidates.push(Candidate {
            video,
            from_followed,
        });
    }
    candidates
}
