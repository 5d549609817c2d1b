use crate::domain::stream::Stream;
use async_trait::async_trait;
use std::error::Error;

/// Durable store of stream records, one per user. Reads and writes are
/// last-write-wins at record granularity; callers re-fetch before mutating.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamRepository: Send + Sync {
    async fn find_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Stream>, Box<dyn Error + Send + Sync>>;

    async fn find_by_stream_key(
        &self,
        stream_key: &str,
    ) -> Result<Option<Stream>, Box<dyn Error + Send + Sync>>;

    /// Create a new record. Fails if the stream key is already taken.
    async fn create_stream(&self, stream: &Stream) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Replace the secret key, keeping the unique key index consistent.
    async fn rotate_stream_key(
        &self,
        user_id: &str,
        new_key: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Persist a mutated record, last write wins.
    async fn save(&self, stream: &Stream) -> Result<(), Box<dyn Error + Send + Sync>>;
}
