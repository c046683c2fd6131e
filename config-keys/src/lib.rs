mod ranking;
mod tracking;

use std::fmt::Display;

use serde::{de::DeserializeOwned, Serialize};

pub use ranking::RankingConfig;
pub use tracking::ViewTrackingConfig;

pub trait ConfigKey: Display {
    type Value: Serialize + DeserializeOwned;

    fn fallback() -> Option<Self::Value>;
}

#[macro_export]
macro_rules! key_derive {
    ($key:ident => $value:ty) => {
        impl $crate::ConfigKey for $key {
            type Value = $value;

            fn fallback() -> Option<Self::Value> {
                None
            }
        }
    };

    ($key:ident => $value:ty|$fallback:expr) => {
        impl $crate::ConfigKey for $key {
            type Value = $value;

            fn fallback() -> Option<Self::Value> {
                Some($fallback)
            }
        }
    };
}

/// Thresholds and windows used by view tracking
#[derive(Clone, Copy, Debug, Default)]
pub struct ViewTrackingKey;

impl Display for ViewTrackingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("view-tracking")
    }
}

key_derive!(ViewTrackingKey => ViewTrackingConfig | ViewTrackingConfig::default());

/// Weights and boosts used by feed ranking
#[derive(Clone, Copy, Debug, Default)]
pub struct RankingKey;

impl Display for RankingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("feed-ranking")
    }
}

key_derive!(RankingKey => RankingConfig | RankingConfig::default());
