//! Redis error types.

use deadpool_redis::CreatePoolError;
use std::fmt;

pub type RedisError = deadpool_redis::redis::RedisError;
pub type PoolError = deadpool_redis::PoolError;

#[derive(Debug)]
pub enum StoreError {
    Redis(RedisError),
    Pool(PoolError),
    Serialization(serde_json::Error),
    CreatePool(String),
    /// Unique-index violation on streamKey.
    DuplicateStreamKey(String),
    NotFound(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Redis(e) => write!(f, "Redis error: {}", e),
            StoreError::Pool(e) => write!(f, "Pool error: {}", e),
            StoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
            StoreError::CreatePool(e) => write!(f, "Create pool error: {}", e),
            StoreError::DuplicateStreamKey(key) => write!(f, "stream key already taken: {}", key),
            StoreError::NotFound(id) => write!(f, "no stream record for: {}", id),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Redis(e) => Some(e),
            StoreError::Pool(e) => Some(e),
            StoreError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        StoreError::Redis(err)
    }
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        StoreError::Pool(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

impl From<CreatePoolError> for StoreError {
    fn from(err: CreatePoolError) -> Self {
        StoreError::CreatePool(format!("{}", err))
    }
}
