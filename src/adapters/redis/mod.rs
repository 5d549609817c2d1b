//! Redis adapter.
//!
//! Redis-backed implementations of:
//! - `StreamRepository` for stream records (JSON documents plus a unique
//!   `streamKey -> userId` index)
//! - `JobQueue` for the per-quality transcode queues
//! - `DedupLock` for the admission marker (SET NX EX)

mod error;
mod pool;
mod queue;
mod repository;

pub use error::StoreError;
pub use pool::RedisPool;

/// Redis key constants
const TRANSCODE_QUEUE_PREFIX: &str = "caruso:transcode:";
const STREAM_PREFIX: &str = "caruso:stream:";
const STREAM_KEY_INDEX_PREFIX: &str = "caruso:stream_key:";

fn queue_key(quality: crate::domain::stream::Quality) -> String {
    format!("{}{}", TRANSCODE_QUEUE_PREFIX, quality)
}

fn dedup_key(quality: crate::domain::stream::Quality, public_key: &str) -> String {
    format!("{}{}:started:{}", TRANSCODE_QUEUE_PREFIX, quality, public_key)
}
