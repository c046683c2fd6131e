//! Counts video views once per viewer per cooldown window.
//!
//! [`ViewTracker`] owns the playback sessions. It rejects views from owners,
//! from rate-limited devices and from viewers that were already counted, and
//! persists a view the first time a session crosses the watch threshold.

pub mod analytics;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod session;
pub mod spam;
pub mod tracker;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use analytics::ViewAnalytics;
pub use error::{DuplicateReason, TrackError};
pub use fingerprint::{get_or_create_fingerprint, PlatformInfo};
pub use guard::{DuplicateViewGuard, SeenVerdict, UniqueViewRecord};
pub use session::{SessionState, ViewSession};
pub use spam::{SpamGuard, ViewLogEntry};
pub use tracker::ViewTracker;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
