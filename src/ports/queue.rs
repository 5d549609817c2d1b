use crate::domain::jobs::TranscodeJob;
use crate::domain::stream::Quality;
use async_trait::async_trait;
use std::error::Error;

/// Per-quality transcode job queues.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job onto the queue for its quality.
    async fn enqueue(&self, job: &TranscodeJob) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Dequeue a job for one quality (blocking with timeout).
    /// timeout_secs: 0.0 for infinite, >0.0 for specific timeout
    async fn dequeue(
        &self,
        quality: Quality,
        timeout_secs: f64,
    ) -> Result<Option<TranscodeJob>, Box<dyn Error + Send + Sync>>;
}

/// Cross-request admission control: a time-bounded marker per
/// (public key, quality) that caps duplicate encode starts to one per
/// cool-down window. Must be an atomic check-and-set with TTL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DedupLock: Send + Sync {
    /// Returns true if this caller acquired the marker, false if it was
    /// already held by an earlier request within the TTL window.
    async fn try_acquire(
        &self,
        public_key: &str,
        quality: Quality,
        ttl_secs: u64,
    ) -> Result<bool, Box<dyn Error + Send + Sync>>;

    /// Drop the marker before its TTL lapses, so the next request may
    /// retry after an admission that failed to produce a job.
    async fn release(
        &self,
        public_key: &str,
        quality: Quality,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}
