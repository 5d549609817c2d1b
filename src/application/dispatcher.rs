//! On-demand job dispatcher.
//!
//! A viewer asking for a playlist that does not exist yet lands here. The
//! dedup lock is the admission-control device: across any number of
//! concurrent requests for the same (output key, quality), exactly one job
//! enters the queue per cool-down window. The viewer never waits on the
//! transcode; playback starts once the segments appear on disk.

use crate::domain::jobs::TranscodeJob;
use crate::domain::publish::{ParseError, ViewerTarget};
use crate::ports::queue::{DedupLock, JobQueue};
use crate::ports::repository::StreamRepository;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long one admission suppresses further enqueues for the same target.
pub const DEDUP_TTL_SECS: u64 = 60;

#[derive(Debug)]
pub enum DispatchError {
    InvalidUri(ParseError),
    UnknownStream(String),
    Internal(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::InvalidUri(e) => write!(f, "invalid uri: {}", e),
            DispatchError::UnknownStream(user_id) => write!(f, "unknown stream: {}", user_id),
            DispatchError::Internal(e) => write!(f, "internal error: {}", e),
        }
    }
}

impl Error for DispatchError {}

#[derive(Clone)]
pub struct DispatchService {
    repo: Arc<dyn StreamRepository>,
    queue: Arc<dyn JobQueue>,
    lock: Arc<dyn DedupLock>,
}

impl DispatchService {
    pub fn new(
        repo: Arc<dyn StreamRepository>,
        queue: Arc<dyn JobQueue>,
        lock: Arc<dyn DedupLock>,
    ) -> Self {
        Self { repo, queue, lock }
    }

    /// Admit at most one transcode job for the requested playlist.
    /// Ok either way: a held lock means someone else already triggered it.
    pub async fn request_rendition(&self, uri: &str) -> Result<(), DispatchError> {
        let target = ViewerTarget::parse(uri).map_err(DispatchError::InvalidUri)?;

        let acquired = self
            .lock
            .try_acquire(&target.public_key, target.quality, DEDUP_TTL_SECS)
            .await
            .map_err(DispatchError::Internal)?;
        if !acquired {
            debug!(
                "transcode already triggered for {} @ {}",
                target.public_key, target.quality
            );
            return Ok(());
        }

        // The marker is held; give it back on any failure below so a
        // transient store error does not black out the rendition for the
        // full cool-down window.
        if let Err(e) = self.enqueue_job(&target).await {
            if let Err(rel) = self.lock.release(&target.public_key, target.quality).await {
                warn!(
                    "failed to release admission marker for {} @ {}: {}",
                    target.public_key, target.quality, rel
                );
            }
            return Err(e);
        }
        Ok(())
    }

    async fn enqueue_job(&self, target: &ViewerTarget) -> Result<(), DispatchError> {
        let stream = self
            .repo
            .find_by_user_id(&target.user_id)
            .await
            .map_err(DispatchError::Internal)?
            .ok_or_else(|| DispatchError::UnknownStream(target.user_id.clone()))?;

        let job = TranscodeJob {
            id: Uuid::new_v4().to_string(),
            user_id: target.user_id.clone(),
            stream_key: stream.stream_key,
            public_key: target.public_key.clone(),
            quality: target.quality,
        };
        self.queue
            .enqueue(&job)
            .await
            .map_err(DispatchError::Internal)?;
        info!("enqueued transcode {} @ {}", job.public_key, job.quality);
        Ok(())
    }
}
