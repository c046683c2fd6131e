//! Seams the view tracking and feed services are built on: a document store,
//! a local key-value cache, a wall clock and a bounded in-process cache.

pub mod cache;
pub mod clock;
pub mod document;
pub mod local;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_storage;

pub use cache::TtlCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{Direction, Document, DocumentStore, Filter, FilterOp, Query};
pub use local::LocalStorage;
pub use memory::{MemoryDocumentStore, MemoryLocalStorage, MemoryStoreError};

/// Collection names shared by the services
pub mod collections {
    pub const VIDEOS: &str = "videos";
    pub const VIDEO_PERFORMANCE: &str = "video_performance";
    pub const UNIQUE_VIEWS: &str = "unique_views";
    pub const VIEW_LOGS: &str = "view_logs";
    pub const VIDEO_VIEWS: &str = "video_views";
    pub const FOLLOWS: &str = "follows";
    pub const USER_PROFILES: &str = "user_profiles";
}
