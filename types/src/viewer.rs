use serde::{Deserialize, Serialize};

use crate::UserId;

/// Who is watching: the signed-in user (if any) and the install's fingerprint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ViewerIdentity {
    pub user_id: Option<UserId>,
    pub device_fingerprint: String,
}

impl ViewerIdentity {
    pub fn anonymous(device_fingerprint: impl Into<String>) -> Self {
        Self {
            user_id: None,
            device_fingerprint: device_fingerprint.into(),
        }
    }

    pub fn authenticated(user_id: impl Into<UserId>, device_fingerprint: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            device_fingerprint: device_fingerprint.into(),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    /// The authenticated user id if signed in, else the device fingerprint.
    pub fn primary_id(&self) -> &str {
        self.user_id
            .as_deref()
            .unwrap_or(self.device_fingerprint.as_str())
    }

    /// A viewer with neither a user id nor a fingerprint cannot be attributed
    pub fn is_valid(&self) -> bool {
        self.user_id.as_deref().is_some_and(|id| !id.is_empty())
            || !self.device_fingerprint.is_empty()
    }
}
