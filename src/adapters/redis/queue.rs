//! Redis JobQueue and DedupLock implementations.

use super::error::StoreError;
use super::pool::RedisPool;
use super::{dedup_key, queue_key};
use crate::domain::jobs::TranscodeJob;
use crate::domain::stream::Quality;
use crate::ports::queue::{DedupLock, JobQueue};
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;

#[async_trait]
impl JobQueue for RedisPool {
    async fn enqueue(
        &self,
        job: &TranscodeJob,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let json = serde_json::to_string(job)?;
        conn.lpush::<_, _, ()>(queue_key(job.quality), json)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn dequeue(
        &self,
        quality: Quality,
        timeout_secs: f64,
    ) -> Result<Option<TranscodeJob>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;

        // BRPOP suspends on the queue itself, no poll interval
        let result: Option<(String, String)> = conn
            .brpop(queue_key(quality), timeout_secs)
            .await
            .map_err(StoreError::from)?;
        match result {
            Some((_, json)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DedupLock for RedisPool {
    async fn try_acquire(
        &self,
        public_key: &str,
        quality: Quality,
        ttl_secs: u64,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;

        // SET NX EX is the atomic check-and-set; the TTL is the cool-down
        let reply: Option<String> = deadpool_redis::redis::cmd("SET")
            .arg(dedup_key(quality, public_key))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(reply.is_some())
    }

    async fn release(
        &self,
        public_key: &str,
        quality: Quality,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        conn.del::<_, ()>(dedup_key(quality, public_key))
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}
