use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use store::{collections::UNIQUE_VIEWS, DocumentStore, LocalStorage, TtlCache};
use types::{
    post::{from_document, to_document},
    viewer::ViewerIdentity,
    UnixMillis, UserId,
};

use crate::{error::DuplicateReason, lock};

pub const UNIQUE_VIEW_KEY_PREFIX: &str = "unique_view_";

pub fn unique_view_key(primary_id: &str, video_id: &str) -> String {
    format!("{UNIQUE_VIEW_KEY_PREFIX}{primary_id}_{video_id}")
}

fn cross_device_id(user_id: &str, video_id: &str) -> String {
    format!("{user_id}_{video_id}")
}

/// Bookkeeping for one (viewer, video) pair.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UniqueViewRecord {
    pub viewer_id: String,
    pub video_id: String,
    pub first_view_time: UnixMillis,
    pub device_fingerprints: Vec<String>,
    pub last_view_attempt: UnixMillis,
    pub total_attempts: u64,
}

impl UniqueViewRecord {
    pub fn new(viewer_id: &str, video_id: &str, fingerprint: &str, now: UnixMillis) -> Self {
        Self {
            viewer_id: viewer_id.to_string(),
            video_id: video_id.to_string(),
            first_view_time: now,
            device_fingerprints: vec![fingerprint.to_string()],
            last_view_attempt: now,
            total_attempts: 1,
        }
    }

    pub fn within_cooldown(&self, now: UnixMillis, cooldown_ms: u64) -> bool {
        now.saturating_sub(self.last_view_attempt) < cooldown_ms
    }

    pub fn note_attempt(&mut self, fingerprint: &str, now: UnixMillis) {
        self.last_view_attempt = now;
        self.total_attempts += 1;
        if !self.device_fingerprints.iter().any(|f| f == fingerprint) {
            self.device_fingerprints.push(fingerprint.to_string());
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeenVerdict {
    NotSeen,
    AlreadyViewed(DuplicateReason),
}

/// Decides whether a would-be view may add to the public counter.
///
/// Records live in memory, in local storage under [`unique_view_key`] and, for
/// signed-in viewers, in the `unique_views` collection so other devices see them.
/// Both copies get the same bookkeeping on every attempt.
pub struct DuplicateViewGuard {
    records: Mutex<TtlCache<String, UniqueViewRecord>>,
    cooldown_ms: u64,
}

impl DuplicateViewGuard {
    pub fn new(capacity: usize, cooldown_ms: u64) -> Self {
        Self {
            records: Mutex::new(TtlCache::new(capacity, cooldown_ms)),
            cooldown_ms,
        }
    }

    pub fn clear_memory(&self) {
        lock(&self.records).clear();
    }

    async fn local_record<L: LocalStorage>(&self, local: &L, key: &str, now: UnixMillis) -> Option<UniqueViewRecord> {
        if let Some(record) = lock(&self.records).get(key, now) {
            return Some(record.clone());
        }

        let raw = match local.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("failed to read view record {key}: {e}");
                return None;
            }
        };
        match serde_json::from_str::<UniqueViewRecord>(&raw) {
            Ok(record) => {
                lock(&self.records).insert(key.to_string(), record.clone(), now);
                Some(record)
            }
            Err(e) => {
                log::warn!("ignoring malformed view record {key}: {e}");
                None
            }
        }
    }

    async fn save_local<L: LocalStorage>(&self, local: &L, key: &str, record: UniqueViewRecord, now: UnixMillis) {
        match serde_json::to_string(&record) {
            Ok(raw) => {
                if let Err(e) = local.set(key, raw).await {
                    log::warn!("failed to persist view record {key}: {e}");
                }
            }
            Err(e) => log::warn!("failed to encode view record {key}: {e}"),
        }
        lock(&self.records).insert(key.to_string(), record, now);
    }

    async fn remote_record<D: DocumentStore>(&self, docs: &D, user_id: &UserId, video_id: &str) -> Option<UniqueViewRecord> {
        let id = cross_device_id(user_id, video_id);
        match docs.get(UNIQUE_VIEWS, &id).await {
            Ok(Some(doc)) => from_document(&doc)
                .inspect_err(|e| log::warn!("ignoring malformed cross-device record {id}: {e}"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                log::warn!("cross-device view check for {id} failed: {e}");
                None
            }
        }
    }

    async fn save_remote<D: DocumentStore>(&self, docs: &D, user_id: &UserId, video_id: &str, record: &UniqueViewRecord) {
        let id = cross_device_id(user_id, video_id);
        let fields = match to_document(record) {
            Ok(fields) => fields,
            Err(e) => {
                log::warn!("failed to encode cross-device record {id}: {e}");
                return;
            }
        };
        if let Err(e) = docs.set_merge(UNIQUE_VIEWS, &id, fields).await {
            log::warn!("failed to write cross-device record {id}: {e}");
        }
    }

    /// Checks for a previous view inside the cooldown window.
    ///
    /// A hit is itself an attempt: the record's `last_view_attempt` and
    /// `total_attempts` are updated, but nothing is counted.
    pub async fn has_viewer_seen_video<D: DocumentStore, L: LocalStorage>(
        &self,
        docs: &D,
        local: &L,
        viewer: &ViewerIdentity,
        video_id: &str,
        now: UnixMillis,
    ) -> SeenVerdict {
        let fingerprint = viewer.device_fingerprint.as_str();
        let key = unique_view_key(viewer.primary_id(), video_id);

        if let Some(mut record) = self.local_record(local, &key, now).await {
            if record.within_cooldown(now, self.cooldown_ms) {
                record.note_attempt(fingerprint, now);
                self.save_local(local, &key, record, now).await;
                if let Some(user_id) = &viewer.user_id {
                    if let Some(mut remote) = self.remote_record(docs, user_id, video_id).await {
                        remote.note_attempt(fingerprint, now);
                        self.save_remote(docs, user_id, video_id, &remote).await;
                    }
                }
                return SeenVerdict::AlreadyViewed(DuplicateReason::WithinCooldownPeriod);
            }
        }

        let Some(user_id) = &viewer.user_id else {
            return SeenVerdict::NotSeen;
        };

        let Some(mut remote) = self.remote_record(docs, user_id, video_id).await else {
            return SeenVerdict::NotSeen;
        };
        if !remote.within_cooldown(now, self.cooldown_ms) {
            return SeenVerdict::NotSeen;
        }

        let reason = if remote.device_fingerprints.iter().any(|f| f == fingerprint) {
            DuplicateReason::WithinCooldownPeriod
        } else {
            DuplicateReason::ViewedOnAnotherDevice
        };
        remote.note_attempt(fingerprint, now);
        self.save_remote(docs, user_id, video_id, &remote).await;
        // keep this device's copy in step with the shared one
        self.save_local(local, &key, remote, now).await;

        SeenVerdict::AlreadyViewed(reason)
    }

    /// Records a counted view for the viewer.
    pub async fn mark_viewed<D: DocumentStore, L: LocalStorage>(
        &self,
        docs: &D,
        local: &L,
        viewer: &ViewerIdentity,
        video_id: &str,
        now: UnixMillis,
    ) {
        let fingerprint = viewer.device_fingerprint.as_str();
        let key = unique_view_key(viewer.primary_id(), video_id);

        let record = match self.local_record(local, &key, now).await {
            Some(mut record) => {
                record.note_attempt(fingerprint, now);
                record
            }
            None => UniqueViewRecord::new(viewer.primary_id(), video_id, fingerprint, now),
        };
        self.save_local(local, &key, record, now).await;

        if let Some(user_id) = &viewer.user_id {
            let remote = match self.remote_record(docs, user_id, video_id).await {
                Some(mut remote) => {
                    remote.note_attempt(fingerprint, now);
                    remote
                }
                None => UniqueViewRecord::new(user_id, video_id, fingerprint, now),
            };
            self.save_remote(docs, user_id, video_id, &remote).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use store::{MemoryDocumentStore, MemoryLocalStorage};

    use super::*;

    const DAY: u64 = 24 * 60 * 60 * 1000;

    fn guard() -> DuplicateViewGuard {
        DuplicateViewGuard::new(100, DAY)
    }

    #[tokio::test]
    async fn seen_within_cooldown_only() {
        let (docs, local) = (MemoryDocumentStore::new(), MemoryLocalStorage::new());
        let g = guard();
        let viewer = ViewerIdentity::anonymous("fp-a");

        assert_eq!(
            g.has_viewer_seen_video(&docs, &local, &viewer, "v1", 0).await,
            SeenVerdict::NotSeen
        );
        g.mark_viewed(&docs, &local, &viewer, "v1", 0).await;
        assert_eq!(
            g.has_viewer_seen_video(&docs, &local, &viewer, "v1", 1_000).await,
            SeenVerdict::AlreadyViewed(DuplicateReason::WithinCooldownPeriod)
        );
        assert_eq!(
            g.has_viewer_seen_video(&docs, &local, &viewer, "v1", 1_000 + DAY).await,
            SeenVerdict::NotSeen
        );
    }

    #[tokio::test]
    async fn duplicate_attempts_are_booked() {
        let (docs, local) = (MemoryDocumentStore::new(), MemoryLocalStorage::new());
        let g = guard();
        let viewer = ViewerIdentity::anonymous("fp-a");

        g.mark_viewed(&docs, &local, &viewer, "v1", 0).await;
        g.has_viewer_seen_video(&docs, &local, &viewer, "v1", 10).await;
        g.has_viewer_seen_video(&docs, &local, &viewer, "v1", 20).await;

        let raw = local
            .get(&unique_view_key("fp-a", "v1"))
            .await
            .unwrap()
            .unwrap();
        let record: UniqueViewRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.total_attempts, 3);
        assert_eq!(record.last_view_attempt, 20);
        assert_eq!(record.first_view_time, 0);
    }

    #[tokio::test]
    async fn records_survive_a_restart() {
        let (docs, local) = (MemoryDocumentStore::new(), MemoryLocalStorage::new());
        let viewer = ViewerIdentity::anonymous("fp-a");
        guard().mark_viewed(&docs, &local, &viewer, "v1", 0).await;

        let fresh = guard();
        assert_eq!(
            fresh.has_viewer_seen_video(&docs, &local, &viewer, "v1", 5).await,
            SeenVerdict::AlreadyViewed(DuplicateReason::WithinCooldownPeriod)
        );
    }

    #[tokio::test]
    async fn malformed_local_record_is_a_miss() {
        let (docs, local) = (MemoryDocumentStore::new(), MemoryLocalStorage::new());
        local
            .set(&unique_view_key("fp-a", "v1"), "{not json".into())
            .await
            .unwrap();

        let viewer = ViewerIdentity::anonymous("fp-a");
        assert_eq!(
            guard().has_viewer_seen_video(&docs, &local, &viewer, "v1", 5).await,
            SeenVerdict::NotSeen
        );
    }

    #[tokio::test]
    async fn signed_in_views_follow_the_user_across_devices() {
        let docs = MemoryDocumentStore::new();
        let phone = ViewerIdentity::authenticated("u1", "fp-phone");
        let tablet = ViewerIdentity::authenticated("u1", "fp-tablet");

        guard()
            .mark_viewed(&docs, &MemoryLocalStorage::new(), &phone, "v1", 0)
            .await;

        let tablet_local = MemoryLocalStorage::new();
        let g = guard();
        assert_eq!(
            g.has_viewer_seen_video(&docs, &tablet_local, &tablet, "v1", 100).await,
            SeenVerdict::AlreadyViewed(DuplicateReason::ViewedOnAnotherDevice)
        );

        let shared = docs.get(UNIQUE_VIEWS, "u1_v1").await.unwrap().unwrap();
        let shared: UniqueViewRecord = from_document(&shared).unwrap();
        assert_eq!(shared.total_attempts, 2);
        assert_eq!(shared.device_fingerprints, vec!["fp-phone", "fp-tablet"]);

        // the tablet now holds the same bookkeeping locally
        assert_eq!(
            g.has_viewer_seen_video(&docs, &tablet_local, &tablet, "v1", 200).await,
            SeenVerdict::AlreadyViewed(DuplicateReason::WithinCooldownPeriod)
        );
    }

    #[tokio::test]
    async fn unreachable_cross_device_store_does_not_block() {
        let docs = MemoryDocumentStore::new();
        docs.set_offline(true);
        let viewer = ViewerIdentity::authenticated("u1", "fp");

        assert_eq!(
            guard()
                .has_viewer_seen_video(&docs, &MemoryLocalStorage::new(), &viewer, "v1", 0)
                .await,
            SeenVerdict::NotSeen
        );
    }
}
