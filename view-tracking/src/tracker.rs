use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use config_keys::ViewTrackingConfig;
use metrics::{
    metric_sender::mock::MockMetricEventTx,
    metrics::{VideoDurationWatched, VideoViewed, ViewRejected},
    EventSource, MetricEventTx, MetricTx,
};
use serde_json::{json, Map, Value};
use store::{
    collections::{VIDEOS, VIDEO_VIEWS},
    Clock, DocumentStore, LocalStorage, TtlCache,
};
use tokio::task::JoinHandle;
use types::{viewer::ViewerIdentity, UnixMillis, UserId, VideoId};
use uuid::Uuid;

use crate::{
    analytics::{self, ViewAnalytics},
    error::TrackError,
    fingerprint::{get_or_create_fingerprint, PlatformInfo},
    guard::{DuplicateViewGuard, SeenVerdict, UNIQUE_VIEW_KEY_PREFIX},
    lock,
    session::{SessionState, Thresholds, ViewSession},
    spam::{SpamGuard, ViewLogEntry, VIEW_LOG_KEY},
};

/// Tracks playback sessions and records countable views.
///
/// Construct one per process (or per test) and call [`ViewTracker::init`] to
/// start the stale session sweeper. The device's view log is loaded on the
/// first admission check if `init` has not loaded it yet.
pub struct ViewTracker<D, L, C, Tx = MockMetricEventTx> {
    docs: D,
    local: L,
    clock: C,
    metrics: MetricTx<Tx>,
    config: ViewTrackingConfig,
    thresholds: Thresholds,
    platform: PlatformInfo,
    user_id: Mutex<Option<UserId>>,
    fingerprint: Mutex<Option<String>>,
    sessions: Mutex<HashMap<String, ViewSession>>,
    tracking_attempts: Mutex<HashMap<VideoId, UnixMillis>>,
    owners: Mutex<TtlCache<VideoId, Option<UserId>>>,
    guard: DuplicateViewGuard,
    spam: SpamGuard,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<D, L, C, Tx> ViewTracker<D, L, C, Tx>
where
    D: DocumentStore,
    L: LocalStorage,
    C: Clock,
    Tx: MetricEventTx + Sync,
{
    pub fn new(docs: D, local: L, clock: C, metrics: Tx, config: ViewTrackingConfig) -> Self {
        Self {
            docs,
            local,
            clock,
            metrics: MetricTx::new(EventSource::ViewTracker, metrics),
            thresholds: Thresholds::from(&config),
            platform: PlatformInfo::detect(),
            user_id: Mutex::new(None),
            fingerprint: Mutex::new(None),
            sessions: Mutex::new(HashMap::new()),
            tracking_attempts: Mutex::new(HashMap::new()),
            owners: Mutex::new(TtlCache::new(
                config.ownership_cache_capacity,
                config.ownership_cache_ttl_ms,
            )),
            guard: DuplicateViewGuard::new(config.unique_view_cache_capacity, config.cooldown_ms),
            spam: SpamGuard::new(&config),
            sweeper: Mutex::new(None),
            config,
        }
    }

    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(&self) -> &ViewTrackingConfig {
        &self.config
    }

    pub fn docs(&self) -> &D {
        &self.docs
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    /// Switches the primary identity to `user_id`, or back to the device
    /// fingerprint on sign-out.
    pub fn set_authenticated_user(&self, user_id: Option<UserId>) {
        *lock(&self.user_id) = user_id;
    }

    pub async fn device_fingerprint(&self) -> String {
        let cached = lock(&self.fingerprint).clone();
        if let Some(fingerprint) = cached {
            return fingerprint;
        }
        let fingerprint =
            get_or_create_fingerprint(&self.local, &self.platform, self.clock.now()).await;
        lock(&self.fingerprint)
            .get_or_insert(fingerprint)
            .clone()
    }

    pub async fn viewer(&self) -> ViewerIdentity {
        let device_fingerprint = self.device_fingerprint().await;
        let user_id = lock(&self.user_id).clone();
        ViewerIdentity {
            user_id,
            device_fingerprint,
        }
    }

    pub fn active_session(&self, session_id: &str) -> Option<ViewSession> {
        lock(&self.sessions).get(session_id).cloned()
    }

    pub fn active_session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    async fn video_owner(&self, video_id: &str, now: UnixMillis) -> Option<UserId> {
        let cached = lock(&self.owners).get(video_id, now).cloned();
        if let Some(owner) = cached {
            return owner;
        }

        let owner = match self.docs.get(VIDEOS, video_id).await {
            Ok(doc) => doc.and_then(|doc| {
                doc.get("userId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            }),
            Err(e) => {
                // not cached, the next start retries
                log::warn!("owner lookup for {video_id} failed: {e}");
                return None;
            }
        };
        lock(&self.owners).insert(video_id.to_string(), owner.clone(), now);
        owner
    }

    async fn reject(&self, video_id: &str, viewer_id: &str, err: TrackError) -> TrackError {
        log::debug!("view of {video_id} by {viewer_id} rejected: {err}");
        self.metrics
            .push_or_log(ViewRejected {
                video_id: video_id.to_string(),
                viewer_id: viewer_id.to_string(),
                reason: err.reason().to_string(),
            })
            .await;
        err
    }

    /// Owner, rate limit and duplicate checks shared by both entry points.
    async fn admit(&self, video_id: &str, viewer: &ViewerIdentity, now: UnixMillis) -> Result<(), TrackError> {
        if let Some(user_id) = &viewer.user_id {
            if self.video_owner(video_id, now).await.as_ref() == Some(user_id) {
                return Err(TrackError::OwnerExcluded);
            }
        }

        self.spam.ensure_loaded(&self.local).await;
        if !self
            .spam
            .check_spam_protection(&viewer.device_fingerprint, now)
        {
            return Err(TrackError::RateLimited);
        }

        match self
            .guard
            .has_viewer_seen_video(&self.docs, &self.local, viewer, video_id, now)
            .await
        {
            SeenVerdict::NotSeen => Ok(()),
            SeenVerdict::AlreadyViewed(reason) => Err(TrackError::DuplicateView { reason }),
        }
    }

    async fn log_view(&self, video_id: &str, viewer: &ViewerIdentity, session_id: &str, now: UnixMillis) {
        let entry = ViewLogEntry {
            user_id: viewer.user_id.clone(),
            device_fingerprint: viewer.device_fingerprint.clone(),
            video_id: video_id.to_string(),
            timestamp: now,
            session_id: session_id.to_string(),
        };
        self.spam.record(&self.docs, &self.local, entry, now).await;
    }

    /// Opens a session for `video_id` and returns its id.
    pub async fn start_view_tracking(&self, video_id: &str) -> Result<String, TrackError> {
        let now = self.clock.now();

        let debounced = {
            let mut attempts = lock(&self.tracking_attempts);
            let debounced = attempts
                .get(video_id)
                .is_some_and(|last| now.saturating_sub(*last) < self.config.debounce_ms);
            attempts.insert(video_id.to_string(), now);
            debounced
        };

        let viewer = self.viewer().await;
        if debounced {
            return Err(self
                .reject(video_id, viewer.primary_id(), TrackError::Debounced)
                .await);
        }
        if !viewer.is_valid() {
            return Err(self
                .reject(video_id, viewer.primary_id(), TrackError::InvalidViewer)
                .await);
        }
        if let Err(e) = self.admit(video_id, &viewer, now).await {
            return Err(self.reject(video_id, viewer.primary_id(), e).await);
        }

        let session_id = Uuid::new_v4().to_string();
        self.log_view(video_id, &viewer, &session_id, now).await;

        let session = ViewSession::new(session_id.clone(), video_id.to_string(), viewer, now);
        lock(&self.sessions).insert(session_id.clone(), session);
        log::debug!("started view session {session_id} for {video_id}");

        Ok(session_id)
    }

    /// Heartbeat. Returns the session's state, or `None` for an unknown session.
    pub async fn update_view_progress(&self, session_id: &str) -> Option<SessionState> {
        let now = self.clock.now();

        let (state, to_record) = {
            let mut sessions = lock(&self.sessions);
            let session = sessions.get_mut(session_id)?;
            match session.progress(now, &self.thresholds) {
                Ok(t) if t.crossed_threshold() => {
                    log::debug!("session {session_id} reached the watch threshold")
                }
                Ok(_) => {}
                Err(e) => log::debug!("session {session_id}: {e}"),
            }
            let to_record = session.begin_recording().then(|| session.clone());
            (session.state(), to_record)
        };

        if let Some(session) = to_record {
            self.record_session(&session, now).await;
            if let Some(session) = lock(&self.sessions).get_mut(session_id) {
                session.finish_recording();
            }
        }

        Some(state)
    }

    pub fn update_visibility(&self, session_id: &str, percent: f64) -> Option<SessionState> {
        let now = self.clock.now();
        let mut sessions = lock(&self.sessions);
        let session = sessions.get_mut(session_id)?;
        if let Err(e) = session.set_visibility(percent, now, &self.thresholds) {
            log::debug!("session {session_id}: {e}");
        }
        Some(session.state())
    }

    /// Ends a session, recording the view if it crossed the threshold and was
    /// not recorded yet. Unknown or already stopped sessions are ignored.
    pub async fn stop_view_tracking(&self, session_id: &str) {
        let now = self.clock.now();

        let Some(mut session) = lock(&self.sessions).remove(session_id) else {
            log::debug!("stop for unknown session {session_id}");
            return;
        };
        if let Err(e) = session.stop(now, &self.thresholds) {
            log::debug!("session {session_id}: {e}");
        }

        if session.begin_recording() {
            self.record_session(&session, now).await;
            session.finish_recording();
        }

        let viewer = &session.viewer;
        self.metrics
            .push_or_log(VideoDurationWatched {
                video_id: session.video_id.clone(),
                viewer_id: viewer.primary_id().to_string(),
                user_id: viewer.user_id.clone(),
                is_logged_in: viewer.is_logged_in(),
                session_id: session.session_id.clone(),
                absolute_watched: session.watch_time_ms() as f64 / 1000.0,
                reached_threshold: session.has_reached_threshold(),
            })
            .await;
    }

    /// One-shot recording for callers that already know the final watch time.
    /// Skips the debounce. Returns whether a view was counted.
    pub async fn record_view(&self, video_id: &str, watch_time_secs: f64) -> bool {
        let now = self.clock.now();
        let viewer = self.viewer().await;
        if !viewer.is_valid() {
            self.reject(video_id, viewer.primary_id(), TrackError::InvalidViewer)
                .await;
            return false;
        }

        let watch_time_ms = (watch_time_secs.max(0.0) * 1000.0) as u64;
        if watch_time_ms < self.config.min_watch_time_ms {
            log::debug!("watch of {video_id} too short to count: {watch_time_ms}ms");
            return false;
        }

        if let Err(e) = self.admit(video_id, &viewer, now).await {
            self.reject(video_id, viewer.primary_id(), e).await;
            return false;
        }

        let session_id = Uuid::new_v4().to_string();
        self.log_view(video_id, &viewer, &session_id, now).await;
        self.persist_view(video_id, &viewer, Some(&session_id), watch_time_ms, now)
            .await
    }

    async fn record_session(&self, session: &ViewSession, now: UnixMillis) -> bool {
        self.persist_view(
            &session.video_id,
            &session.viewer,
            Some(&session.session_id),
            session.watch_time_ms(),
            now,
        )
        .await
    }

    /// Marks the view as seen and bumps the public counter. Store failures past
    /// the duplicate check are logged, the view is then simply lost.
    async fn persist_view(
        &self,
        video_id: &str,
        viewer: &ViewerIdentity,
        session_id: Option<&str>,
        watch_time_ms: u64,
        now: UnixMillis,
    ) -> bool {
        if let SeenVerdict::AlreadyViewed(reason) = self
            .guard
            .has_viewer_seen_video(&self.docs, &self.local, viewer, video_id, now)
            .await
        {
            log::debug!(
                "not counting view of {video_id} by {}: {reason}",
                viewer.primary_id()
            );
            return false;
        }
        self.guard
            .mark_viewed(&self.docs, &self.local, viewer, video_id, now)
            .await;

        if let Err(e) = self.docs.increment(VIDEOS, video_id, "views", 1).await {
            log::warn!("failed to increment views of {video_id}: {e}");
        }

        let mut fields = Map::new();
        if let Some(at) = DateTime::<Utc>::from_timestamp_millis(now as i64) {
            fields.insert("lastViewedAt".into(), Value::String(at.to_rfc3339()));
        }
        if let Err(e) = self.docs.set_merge(VIDEOS, video_id, fields).await {
            log::warn!("failed to update lastViewedAt of {video_id}: {e}");
        }

        let entry = json!({
            "videoId": video_id,
            "viewerId": viewer.primary_id(),
            "userId": viewer.user_id,
            "deviceFingerprint": viewer.device_fingerprint,
            "sessionId": session_id,
            "watchTimeMs": watch_time_ms,
            "timestamp": now,
        });
        if let Value::Object(entry) = entry {
            if let Err(e) = self.docs.add(VIDEO_VIEWS, entry).await {
                log::warn!("failed to log counted view of {video_id}: {e}");
            }
        }

        log::info!(
            "counted view of {video_id} by {} ({watch_time_ms}ms)",
            viewer.primary_id()
        );
        let publisher_user_id = self.video_owner(video_id, now).await;
        self.metrics
            .push_or_log(VideoViewed {
                video_id: video_id.to_string(),
                publisher_user_id,
                viewer_id: viewer.primary_id().to_string(),
                user_id: viewer.user_id.clone(),
                is_logged_in: viewer.is_logged_in(),
                device_fingerprint: viewer.device_fingerprint.clone(),
                session_id: session_id.map(str::to_string),
                watch_time_ms,
            })
            .await;

        true
    }

    /// Drops abandoned sessions and expired housekeeping entries. Returns the
    /// number of sessions removed.
    pub fn cleanup_stale_sessions(&self) -> usize {
        let now = self.clock.now();
        let timeout = self.config.session_timeout_ms;

        let removed = {
            let mut sessions = lock(&self.sessions);
            let before = sessions.len();
            sessions.retain(|_, s| !s.is_stale(now, timeout));
            before - sessions.len()
        };
        lock(&self.tracking_attempts)
            .retain(|_, last| now.saturating_sub(*last) < self.config.debounce_ms);
        lock(&self.owners).purge_expired(now);

        if removed > 0 {
            log::info!("removed {removed} stale view sessions");
        }
        removed
    }

    /// Forgets every duplicate marker and the view log of this device.
    /// Returns the number of local keys removed.
    pub async fn clear_local_view_data(&self) -> Result<usize, L::Error> {
        let keys: Vec<String> = self
            .local
            .get_all_keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(UNIQUE_VIEW_KEY_PREFIX) || k == VIEW_LOG_KEY)
            .collect();
        if !keys.is_empty() {
            self.local.remove(&keys).await?;
        }
        self.guard.clear_memory();
        self.spam.clear();

        log::info!("cleared {} local view records", keys.len());
        Ok(keys.len())
    }

    pub async fn get_view_count(&self, video_id: &str) -> u64 {
        analytics::get_view_count(&self.docs, video_id).await
    }

    pub async fn get_view_analytics(&self, video_id: &str) -> ViewAnalytics {
        analytics::get_view_analytics(&self.docs, video_id).await
    }

    /// Stops the sweeper. Sessions stay in memory.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.sweeper).take() {
            handle.abort();
            log::info!("view tracker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.sweeper)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl<D, L, C, Tx> ViewTracker<D, L, C, Tx>
where
    D: DocumentStore + 'static,
    L: LocalStorage + 'static,
    C: Clock + 'static,
    Tx: MetricEventTx + Sync + 'static,
{
    /// Loads the fingerprint and the persisted view log, then starts the
    /// periodic sweep. Calling it again restarts the sweeper.
    pub async fn init(self: &Arc<Self>) {
        let fingerprint = self.device_fingerprint().await;
        self.spam.load(&self.local).await;

        let tracker = Arc::downgrade(self);
        let period = Duration::from_millis(self.config.cleanup_interval_ms.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(tracker) = tracker.upgrade() else {
                    break;
                };
                tracker.cleanup_stale_sessions();
            }
        });

        if let Some(previous) = lock(&self.sweeper).replace(handle) {
            previous.abort();
        }
        log::info!("view tracker started for device {fingerprint}");
    }
}
