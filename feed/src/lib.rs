//! Personalized feed ranking.
//!
//! Candidates come from followed creators and the recent public pool. Each is
//! scored on freshness, relevance, uploader trust, virality and fit with the
//! viewer, then a diversity pass caps how much of the feed one creator gets.

pub mod candidates;
pub mod consts;
pub mod model;
pub mod profile;
pub mod scoring;
pub mod service;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use model::{Candidate, Interaction, ScoredVideo, Signals, VideoRankingScore};
pub use service::{FeedService, ProfileError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
