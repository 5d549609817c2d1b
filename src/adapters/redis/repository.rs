//! Redis StreamRepository implementation.
//!
//! One JSON document per user under `caruso:stream:<userId>`, plus a
//! `caruso:stream_key:<key> -> userId` index kept unique with SET NX.
//! Writes are last-write-wins at document granularity.

use super::error::StoreError;
use super::pool::RedisPool;
use super::{STREAM_KEY_INDEX_PREFIX, STREAM_PREFIX};
use crate::domain::stream::Stream;
use crate::ports::repository::StreamRepository;
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;

fn record_key(user_id: &str) -> String {
    format!("{}{}", STREAM_PREFIX, user_id)
}

fn index_key(stream_key: &str) -> String {
    format!("{}{}", STREAM_KEY_INDEX_PREFIX, stream_key)
}

#[async_trait]
impl StreamRepository for RedisPool {
    async fn find_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Stream>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let json: Option<String> = conn
            .get(record_key(user_id))
            .await
            .map_err(StoreError::from)?;
        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn find_by_stream_key(
        &self,
        stream_key: &str,
    ) -> Result<Option<Stream>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let user_id: Option<String> = conn
            .get(index_key(stream_key))
            .await
            .map_err(StoreError::from)?;
        match user_id {
            Some(id) => self.find_by_user_id(&id).await,
            None => Ok(None),
        }
    }

    async fn create_stream(
        &self,
        stream: &Stream,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;

        let claimed: bool = conn
            .set_nx(index_key(&stream.stream_key), &stream.user_id)
            .await
            .map_err(StoreError::from)?;
        if !claimed {
            return Err(Box::new(StoreError::DuplicateStreamKey(
                stream.stream_key.clone(),
            )));
        }

        let json = serde_json::to_string(stream)?;
        conn.set::<_, _, ()>(record_key(&stream.user_id), json)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn rotate_stream_key(
        &self,
        user_id: &str,
        new_key: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut stream = self
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;

        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let claimed: bool = conn
            .set_nx(index_key(new_key), user_id)
            .await
            .map_err(StoreError::from)?;
        if !claimed {
            return Err(Box::new(StoreError::DuplicateStreamKey(new_key.to_string())));
        }

        conn.del::<_, ()>(index_key(&stream.stream_key))
            .await
            .map_err(StoreError::from)?;
        stream.stream_key = new_key.to_string();
        let json = serde_json::to_string(&stream)?;
        conn.set::<_, _, ()>(record_key(user_id), json)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn save(&self, stream: &Stream) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.get().await.map_err(StoreError::from)?;
        let json = serde_json::to_string(stream)?;
        conn.set::<_, _, ()>(record_key(&stream.user_id), json)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}
