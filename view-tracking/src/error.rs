use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    WithinCooldownPeriod,
    ViewedOnAnotherDevice,
}

impl Display for DuplicateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WithinCooldownPeriod => f.write_str("within_cooldown_period"),
            Self::ViewedOnAnotherDevice => f.write_str("viewed_on_another_device"),
        }
    }
}

/// Reasons a view is refused. These are policy outcomes, not failures.
#[derive(Serialize, Deserialize, Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TrackError {
    #[error("view tracking for this video was started moments ago")]
    Debounced,
    #[error("owners do not add views to their own videos")]
    OwnerExcluded,
    #[error("viewer has neither a user id nor a device fingerprint")]
    InvalidViewer,
    #[error("video already viewed: {reason}")]
    DuplicateView { reason: DuplicateReason },
    #[error("too many views from this device, try again later")]
    RateLimited,
}

impl TrackError {
    /// Rejections the UI should swallow without telling the viewer
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            Self::Debounced | Self::OwnerExcluded | Self::DuplicateView { .. }
        )
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Debounced => "debounced",
            Self::OwnerExcluded => "owner_excluded",
            Self::InvalidViewer => "invalid_viewer",
            Self::DuplicateView {
                reason: DuplicateReason::WithinCooldownPeriod,
            } => "within_cooldown_period",
            Self::DuplicateView {
                reason: DuplicateReason::ViewedOnAnotherDevice,
            } => "viewed_on_another_device",
            Self::RateLimited => "rate_limited",
        }
    }
}
