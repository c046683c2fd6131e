use std::{collections::HashMap, sync::Mutex};

use config_keys::RankingConfig;
use metrics::{
    metric_sender::mock::MockMetricEventTx, metrics::FeedGenerated, EventSource, MetricEventTx,
    MetricTx,
};
use store::{
    collections::{USER_PROFILES, VIDEOS, VIDEO_PERFORMANCE},
    Clock, Direction, DocumentStore, Query, TtlCache,
};
use thiserror::Error;
use types::{
    post::{from_document, to_document, VideoData, VideoPerformance},
    profile::UserProfile,
    UnixMillis, UserId,
};

use crate::{
    candidates::gather_candidates,
    lock,
    model::{Interaction, ScoredVideo, Signals},
    profile::apply_interaction,
    scoring::{rank, trust_score},
};

#[derive(Debug, Error)]
pub enum ProfileError<E: std::error::Error + 'static> {
    #[error("profile store: {0}")]
    Store(#[source] E),
    #[error("failed to encode profile: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Builds personalized feeds and keeps the feed-side viewer profiles.
pub struct FeedService<D, C, Tx = MockMetricEventTx> {
    docs: D,
    clock: C,
    metrics: MetricTx<Tx>,
    config: RankingConfig,
    profiles: Mutex<TtlCache<UserId, UserProfile>>,
    trust: Mutex<TtlCache<UserId, f64>>,
}

impl<D, C, Tx> FeedService<D, C, Tx>
where
    D: DocumentStore,
    C: Clock,
    Tx: MetricEventTx + Sync,
{
    pub fn new(docs: D, clock: C, metrics: Tx, config: RankingConfig) -> Self {
        Self {
            docs,
            clock,
            metrics: MetricTx::new(EventSource::FeedService, metrics),
            profiles: Mutex::new(TtlCache::new(config.cache_capacity, config.profile_cache_ttl_ms)),
            trust: Mutex::new(TtlCache::new(config.cache_capacity, config.trust_cache_ttl_ms)),
            config,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Returns the viewer's profile, creating and storing a fresh one on first use.
    /// Store failures yield an unsaved fresh profile.
    pub async fn get_user_profile(&self, user_id: &str) -> UserProfile {
        let now = self.clock.now();
        let cached = lock(&self.profiles).get(user_id, now).cloned();
        if let Some(profile) = cached {
            return profile;
        }

        let stored = match self.docs.get(USER_PROFILES, user_id).await {
            Ok(doc) => doc.and_then(|doc| {
                from_document::<UserProfile>(&doc)
                    .inspect_err(|e| log::warn!("ignoring malformed profile of {user_id}: {e}"))
                    .ok()
            }),
            Err(e) => {
                log::warn!("failed to load profile of {user_id}: {e}");
                return UserProfile::new(user_id, now);
            }
        };

        let profile = match stored {
            Some(profile) => profile,
            None => {
                let profile = UserProfile::new(user_id, now);
                if let Err(e) = self.save_profile(&profile).await {
                    log::warn!("failed to create profile of {user_id}: {e}");
                }
                log::debug!("created feed profile for {user_id}");
                profile
            }
        };
        lock(&self.profiles).insert(user_id.to_string(), profile.clone(), now);
        profile
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), ProfileError<D::Error>> {
        let fields = to_document(profile)?;
        self.docs
            .set_merge(USER_PROFILES, &profile.user_id, fields)
            .await
            .map_err(ProfileError::Store)
    }

    pub fn invalidate_profile(&self, user_id: &str) {
        lock(&self.profiles).invalidate(user_id);
    }

    /// Folds an interaction into the viewer's profile and stores it.
    pub async fn record_interaction(
        &self,
        user_id: &str,
        interaction: &Interaction,
    ) -> Result<UserProfile, ProfileError<D::Error>> {
        let now = self.clock.now();
        let mut profile = self.get_user_profile(user_id).await;

        let hashtags = match self.docs.get(VIDEOS, &interaction.video_id).await {
            Ok(Some(doc)) => VideoData::from_document(interaction.video_id.clone(), &doc)
                .map(|v| v.hashtags)
                .unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("failed to load hashtags of {}: {e}", interaction.video_id);
                Vec::new()
            }
        };

        apply_interaction(&mut profile, interaction, &hashtags, &self.config, now);
        self.invalidate_profile(user_id);
        self.save_profile(&profile).await?;
        Ok(profile)
    }

    async fn performance(&self, video_id: &str) -> Option<VideoPerformance> {
        match self.docs.get(VIDEO_PERFORMANCE, video_id).await {
            Ok(doc) => doc.and_then(|doc| from_document(&doc).ok()),
            Err(e) => {
                log::warn!("failed to load performance of {video_id}: {e}");
                None
            }
        }
    }

    async fn recent_uploads(&self, creator: &str) -> Option<Vec<VideoData>> {
        let limit = self.config.trust_history_len;
        let ordered = Query::new()
            .eq("userId", creator)
            .order_by("createdAt", Direction::Descending)
            .limit(limit);
        let found = match self.docs.query(VIDEOS, &ordered).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("uploader history query failed, retrying unordered: {e}");
                let unordered = Query::new().eq("userId", creator);
                match self.docs.query(VIDEOS, &unordered).await {
                    Ok(found) => found,
                    Err(e) => {
                        log::warn!("failed to load uploads of {creator}: {e}");
                        return None;
                    }
                }
            }
        };

        let mut videos: Vec<VideoData> = found
            .into_iter()
            .filter_map(|(id, doc)| VideoData::from_document(id, &doc).ok())
            .collect();
        videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        videos.truncate(limit);
        Some(videos)
    }

    /// Trust of an uploader, cached. Unknown on failure, then `default_trust`.
    pub async fn uploader_trust(&self, creator: &str) -> f64 {
        let now = self.clock.now();
        let cached = lock(&self.trust).get(creator, now).copied();
        if let Some(trust) = cached {
            return trust;
        }

        let Some(uploads) = self.recent_uploads(creator).await else {
            return self.config.default_trust;
        };
        let trust = trust_score(&uploads, &self.config);
        lock(&self.trust).insert(creator.to_string(), trust, now);
        trust
    }

    /// Ranked candidates with their scores. See [`FeedService::get_personalized_feed`].
    pub async fn rank_feed(&self, viewer_id: &str, feed_size: usize) -> Vec<ScoredVideo> {
        if feed_size == 0 {
            return Vec::new();
        }
        let now: UnixMillis = self.clock.now();
        let profile = self.get_user_profile(viewer_id).await;
        let candidates =
            gather_candidates(&self.docs, viewer_id, self.config.candidate_pool_size).await;
        let total = candidates.len();
        let followed = candidates.iter().filter(|c| c.from_followed).count();

        let mut trust_by_creator: HashMap<UserId, f64> = HashMap::new();
        let mut with_signals = Vec::with_capacity(total);
        for candidate in candidates {
            let creator = candidate.video.user_id.clone();
            let uploader_trust = match trust_by_creator.get(&creator) {
                Some(trust) => *trust,
                None => {
                    let trust = self.uploader_trust(&creator).await;
                    trust_by_creator.insert(creator, trust);
                    trust
                }
            };
            let performance = self.performance(&candidate.video.id).await;
            with_signals.push((
                candidate,
                Signals {
                    performance,
                    uploader_trust,
                },
            ));
        }

        let feed = rank(with_signals, &profile, &self.config, feed_size, now);
        log::debug!(
            "feed for {viewer_id}: {} of {total} candidates ({followed} followed)",
            feed.len()
        );
        self.metrics
            .push_or_log(FeedGenerated {
                user_id: viewer_id.to_string(),
                requested: feed_size,
                returned: feed.len(),
                candidates: total,
                followed_candidates: followed,
            })
            .await;
        feed
    }

    /// Up to `feed_size` videos ordered for the viewer. Never fails: store
    /// errors shrink the candidate pool, down to an empty feed.
    pub async fn get_personalized_feed(&self, viewer_id: &str, feed_size: usize) -> Vec<VideoData> {
        self.rank_feed(viewer_id, feed_size)
            .await
            .into_iter()
            .map(|scored| scored.video)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use metrics::metric_sender::mock::RecordingMetricEventTx;
    use serde_json::{json, Value};
    use store::{collections::FOLLOWS, Document, ManualClock, MemoryDocumentStore};
    use types::MILLIS_PER_HOUR;

    use super::*;

    const NOW: UnixMillis = 10_000 * MILLIS_PER_HOUR;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn service(docs: MemoryDocumentStore) -> FeedService<MemoryDocumentStore, ManualClock, RecordingMetricEventTx> {
        FeedService::new(
            docs,
            ManualClock::new(NOW),
            RecordingMetricEventTx::default(),
            RankingConfig::default(),
        )
    }

    fn insert_video(docs: &MemoryDocumentStore, id: &str, creator: &str, age_hours: u64) {
        docs.insert(
            VIDEOS,
            id,
            doc(json!({
                "userId": creator,
                "isPublic": true,
                "createdAt": NOW - age_hours * MILLIS_PER_HOUR,
                "views": 0,
            })),
        );
    }

    #[tokio::test]
    async fn one_creator_gets_at_most_its_share() {
        let docs = MemoryDocumentStore::new();
        for i in 0..15 {
            insert_video(&docs, &format!("x{i}"), "x", i);
        }
        for i in 0..5 {
            insert_video(&docs, &format!("o{i}"), &format!("creator{i}"), 50 + i);
        }

        let feed = service(docs).get_personalized_feed("viewer", 20).await;
        assert_eq!(feed.iter().filter(|v| v.user_id == "x").count(), 8);
        assert_eq!(feed.len(), 13);
    }

    #[tokio::test]
    async fn newer_video_ranks_first_when_otherwise_equal() {
        let docs = MemoryDocumentStore::new();
        insert_video(&docs, "old", "a", 48);
        insert_video(&docs, "new", "b", 1);

        let feed = service(docs).get_personalized_feed("viewer", 10).await;
        let ids: Vec<_> = feed.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn followed_creator_outranks_equal_stranger() {
        let docs = MemoryDocumentStore::new();
        insert_video(&docs, "stranger", "s", 2);
        insert_video(&docs, "friend", "f", 2);
        docs.add(FOLLOWS, doc(json!({ "followerId": "viewer", "followingId": "f" })))
            .await
            .unwrap();

        let ranked = service(docs).rank_feed("viewer", 10).await;
        assert_eq!(ranked[0].video.id, "friend");
        assert_eq!(ranked[0].score.follow_boost, 1.2);
        assert_eq!(ranked[1].score.follow_boost, 1.0);
    }

    #[tokio::test]
    async fn own_uploads_are_never_served() {
        let docs = MemoryDocumentStore::new();
        insert_video(&docs, "mine", "viewer", 0);
        insert_video(&docs, "theirs", "other", 5);

        let feed = service(docs).get_personalized_feed("viewer", 10).await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, "theirs");
    }

    #[tokio::test]
    async fn missing_indexes_and_outages_never_fail_the_feed() {
        let docs = MemoryDocumentStore::new();
        insert_video(&docs, "v1", "a", 1);
        let feed = service(docs.clone());

        docs.set_max_query_complexity(0);
        assert_eq!(feed.get_personalized_feed("viewer", 10).await.len(), 1);

        docs.set_offline(true);
        assert!(feed.get_personalized_feed("viewer", 10).await.is_empty());
    }

    #[tokio::test]
    async fn profile_is_created_lazily_and_updated() {
        let docs = MemoryDocumentStore::new();
        docs.insert(VIDEOS, "v1", doc(json!({ "userId": "a", "hashtags": ["cats"] })));
        let feed = service(docs.clone());

        let profile = feed.get_user_profile("viewer").await;
        assert!(profile.interests.is_empty());
        assert_eq!(docs.count(USER_PROFILES), 1);

        let interaction = Interaction {
            video_id: "v1".into(),
            watch_time_secs: 12.0,
            liked: true,
            ..Default::default()
        };
        let updated = feed.record_interaction("viewer", &interaction).await.unwrap();
        assert_eq!(updated.interests, vec!["cats"]);
        assert_eq!(feed.get_user_profile("viewer").await, updated);
    }

    #[tokio::test]
    async fn uploader_trust_is_cached() {
        let docs = MemoryDocumentStore::new();
        docs.insert(
            VIDEOS,
            "v1",
            doc(json!({ "userId": "a", "createdAt": 1, "views": 10, "likes": 2 })),
        );
        let feed = service(docs.clone());
        assert_eq!(feed.uploader_trust("a").await, 100.0);

        docs.set_offline(true);
        assert_eq!(feed.uploader_trust("a").await, 100.0);
        assert_eq!(feed.uploader_trust("b").await, 50.0);
    }

    #[tokio::test]
    async fn reports_each_generated_feed() {
        let docs = MemoryDocumentStore::new();
        insert_video(&docs, "v1", "a", 1);
        let feed = service(docs);
        feed.get_personalized_feed("viewer", 5).await;

        let events = feed.metrics.inner().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["tag"], "feed_generated");
        assert_eq!(events[0]["metric"]["returned"], 1);
    }
}
