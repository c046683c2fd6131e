use config_keys::ViewTrackingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::{viewer::ViewerIdentity, UnixMillis, VideoId};

/// Lifecycle of one playback.
///
/// ```text
/// Pending ─progress─▶ Active ─progress ≥ min watch─▶ ThresholdMet
///    │                 ▲  │
///    └──low visibility─┼──▼
///                   Suspended
/// any ─stop─▶ Stopped (terminal)
/// ```
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Active,
    Suspended,
    ThresholdMet,
    Stopped { reached_threshold: bool },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionEvent {
    /// Heartbeat with the total time since playback started
    Progress { elapsed_ms: u64 },
    Visibility { percent: f64 },
    Stop,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Visibility { .. } => "visibility",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{event} is not allowed once the session is {state:?}")]
pub struct InvalidTransition {
    pub state: SessionState,
    pub event: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub min_watch_time_ms: u64,
    pub min_visibility_percent: f64,
}

impl From<&ViewTrackingConfig> for Thresholds {
    fn from(config: &ViewTrackingConfig) -> Self {
        Self {
            min_watch_time_ms: config.min_watch_time_ms,
            min_visibility_percent: config.min_visibility_percent,
        }
    }
}

impl SessionState {
    pub fn apply(self, event: SessionEvent, thresholds: &Thresholds) -> Result<Self, InvalidTransition> {
        use SessionState::*;

        let next = match (self, event) {
            (Stopped { .. }, _) => {
                return Err(InvalidTransition {
                    state: self,
                    event: event.name(),
                })
            }
            (ThresholdMet, SessionEvent::Stop) => Stopped {
                reached_threshold: true,
            },
            (_, SessionEvent::Stop) => Stopped {
                reached_threshold: false,
            },
            (ThresholdMet, _) => ThresholdMet,
            (Pending | Active, SessionEvent::Progress { elapsed_ms }) => {
                if elapsed_ms >= thresholds.min_watch_time_ms {
                    ThresholdMet
                } else {
                    Active
                }
            }
            // the clock keeps running while hidden, only counting is held back
            (Suspended, SessionEvent::Progress { .. }) => Suspended,
            (state, SessionEvent::Visibility { percent }) => {
                if percent < thresholds.min_visibility_percent {
                    Suspended
                } else if state == Pending {
                    Pending
                } else {
                    Active
                }
            }
        };

        Ok(next)
    }

    pub fn has_reached_threshold(&self) -> bool {
        matches!(
            self,
            Self::ThresholdMet
                | Self::Stopped {
                    reached_threshold: true
                }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

impl Transition {
    pub fn crossed_threshold(&self) -> bool {
        !self.from.has_reached_threshold() && self.to.has_reached_threshold()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Recording {
    NotRecorded,
    InFlight,
    Recorded,
}

#[derive(Clone, Debug)]
pub struct ViewSession {
    pub session_id: String,
    pub video_id: VideoId,
    pub viewer: ViewerIdentity,
    pub start_time: UnixMillis,
    pub last_update_time: UnixMillis,
    pub visibility_percentage: f64,
    /// Last visibility reading was at or above the minimum
    visible: bool,
    state: SessionState,
    recording: Recording,
}

impl ViewSession {
    pub fn new(session_id: String, video_id: VideoId, viewer: ViewerIdentity, now: UnixMillis) -> Self {
        Self {
            session_id,
            video_id,
            viewer,
            start_time: now,
            last_update_time: now,
            visibility_percentage: 100.0,
            visible: true,
            state: SessionState::Pending,
            recording: Recording::NotRecorded,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// False while the player is mostly hidden, even after the threshold was met.
    pub fn is_valid(&self) -> bool {
        self.visible
            && !matches!(
                self.state,
                SessionState::Suspended | SessionState::Stopped { .. }
            )
    }

    pub fn has_reached_threshold(&self) -> bool {
        self.state.has_reached_threshold()
    }

    pub fn watch_time_ms(&self) -> u64 {
        self.last_update_time.saturating_sub(self.start_time)
    }

    pub fn is_stale(&self, now: UnixMillis, timeout_ms: u64) -> bool {
        now.saturating_sub(self.last_update_time) > timeout_ms
    }

    fn apply(&mut self, event: SessionEvent, thresholds: &Thresholds) -> Result<Transition, InvalidTransition> {
        let from = self.state;
        self.state = from.apply(event, thresholds)?;
        Ok(Transition {
            from,
            to: self.state,
        })
    }

    pub fn progress(&mut self, now: UnixMillis, thresholds: &Thresholds) -> Result<Transition, InvalidTransition> {
        // out of order ticks never move time backwards
        self.last_update_time = self.last_update_time.max(now);
        let elapsed_ms = self.watch_time_ms();
        self.apply(SessionEvent::Progress { elapsed_ms }, thresholds)
    }

    pub fn set_visibility(
        &mut self,
        percent: f64,
        now: UnixMillis,
        thresholds: &Thresholds,
    ) -> Result<Transition, InvalidTransition> {
        let transition = self.apply(SessionEvent::Visibility { percent }, thresholds)?;
        self.visibility_percentage = percent;
        self.visible = percent >= thresholds.min_visibility_percent;
        self.last_update_time = self.last_update_time.max(now);
        Ok(transition)
    }

    /// Takes a final progress reading and stops the session.
    pub fn stop(&mut self, now: UnixMillis, thresholds: &Thresholds) -> Result<Transition, InvalidTransition> {
        let from = self.state;
        self.progress(now, thresholds)?;
        self.apply(SessionEvent::Stop, thresholds)?;
        Ok(Transition {
            from,
            to: self.state,
        })
    }

    /// Claims the right to persist this view. Returns true at most once per session.
    pub fn begin_recording(&mut self) -> bool {
        if self.has_reached_threshold() && self.recording == Recording::NotRecorded {
            self.recording = Recording::InFlight;
            return true;
        }
        false
    }

    pub fn finish_recording(&mut self) {
        self.recording = Recording::Recorded;
    }

    pub fn is_recorded(&self) -> bool {
        self.recording == Recording::Recorded
    }
}
