pub mod post;
pub mod profile;
pub mod viewer;

/// Milliseconds since the unix epoch.
pub type UnixMillis = u64;

pub type VideoId = String;
pub type UserId = String;

pub const MILLIS_PER_HOUR: u64 = 60 * 60 * 1000;
