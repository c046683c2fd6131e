use serde::{Deserialize, Serialize};

use crate::{UnixMillis, UserId};

/// Feed-side viewer profile, stored in `user_profiles`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub interests: Vec<String>,
    /// seconds
    #[serde(default)]
    pub avg_watch_time: f64,
    #[serde(default)]
    pub engagement_rate: f64,
    /// fraction of videos skipped early, 0..=1
    #[serde(default)]
    pub skip_pattern: f64,
    #[serde(default)]
    pub last_active: UnixMillis,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl UserProfile {
    pub fn new(user_id: impl Into<UserId>, now: UnixMillis) -> Self {
        Self {
            user_id: user_id.into(),
            interests: Vec::new(),
            avg_watch_time: 0.0,
            engagement_rate: 0.0,
            skip_pattern: 0.0,
            last_active: now,
            language: default_language(),
        }
    }

    pub fn has_interest(&self, tag: &str) -> bool {
        self.interests.iter().any(|i| i.eq_ignore_ascii_case(tag))
    }
}
