use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use config_keys::ViewTrackingConfig;
use serde::{Deserialize, Serialize};
use store::{collections::VIEW_LOGS, DocumentStore, LocalStorage};
use types::{post::to_document, UnixMillis, UserId, VideoId};

use crate::lock;

pub const VIEW_LOG_KEY: &str = "view_log_cache";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewLogEntry {
    pub user_id: Option<UserId>,
    pub device_fingerprint: String,
    pub video_id: VideoId,
    pub timestamp: UnixMillis,
    pub session_id: String,
}

/// Sliding-window rate limit over the device's recent view log.
pub struct SpamGuard {
    log: Mutex<VecDeque<ViewLogEntry>>,
    loaded: AtomicBool,
    max_per_window: usize,
    window_ms: u64,
    capacity: usize,
}

impl SpamGuard {
    pub fn new(config: &ViewTrackingConfig) -> Self {
        Self {
            log: Mutex::new(VecDeque::new()),
            loaded: AtomicBool::new(false),
            max_per_window: config.max_views_per_hour,
            window_ms: config.rate_limit_window_ms,
            capacity: config.view_log_capacity.max(config.max_views_per_hour),
        }
    }

    /// Replaces the in-memory log with the persisted one. A missing or
    /// malformed cache starts an empty log.
    pub async fn load<L: LocalStorage>(&self, local: &L) {
        let entries = match local.get(VIEW_LOG_KEY).await {
            Ok(Some(raw)) => serde_json::from_str::<Vec<ViewLogEntry>>(&raw).unwrap_or_else(|e| {
                log::warn!("discarding malformed view log cache: {e}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("failed to load view log cache: {e}");
                Vec::new()
            }
        };
        *lock(&self.log) = entries.into();
        self.loaded.store(true, Ordering::Release);
    }

    /// Loads the persisted log unless this guard already did.
    pub async fn ensure_loaded<L: LocalStorage>(&self, local: &L) {
        if !self.loaded.load(Ordering::Acquire) {
            self.load(local).await;
        }
    }

    pub fn recent_count(&self, fingerprint: &str, now: UnixMillis) -> usize {
        lock(&self.log)
            .iter()
            .filter(|e| e.device_fingerprint == fingerprint)
            .filter(|e| now.saturating_sub(e.timestamp) < self.window_ms)
            .count()
    }

    /// True when the device may log another view.
    pub fn check_spam_protection(&self, fingerprint: &str, now: UnixMillis) -> bool {
        let allowed = self.recent_count(fingerprint, now) < self.max_per_window;
        if !allowed {
            log::debug!("device {fingerprint} hit the view rate limit");
        }
        allowed
    }

    /// Appends to the log, locally and to the `view_logs` collection.
    pub async fn record<D: DocumentStore, L: LocalStorage>(
        &self,
        docs: &D,
        local: &L,
        entry: ViewLogEntry,
        now: UnixMillis,
    ) {
        let remote = to_document(&entry);
        let snapshot = {
            let mut log = lock(&self.log);
            log.retain(|e| now.saturating_sub(e.timestamp) < self.window_ms);
            log.push_back(entry);
            while log.len() > self.capacity {
                log.pop_front();
            }
            serde_json::to_string(&*log)
        };

        match snapshot {
            Ok(raw) => {
                if let Err(e) = local.set(VIEW_LOG_KEY, raw).await {
                    log::warn!("failed to persist view log cache: {e}");
                }
            }
            Err(e) => log::warn!("failed to encode view log cache: {e}"),
        }

        match remote {
            Ok(fields) => {
                if let Err(e) = docs.add(VIEW_LOGS, fields).await {
                    log::warn!("failed to append view log: {e}");
                }
            }
            Err(e) => log::warn!("failed to encode view log entry: {e}"),
        }
    }

    pub fn clear(&self) {
        lock(&self.log).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.log).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
