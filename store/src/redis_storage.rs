use redis::AsyncCommands;
use thiserror::Error;

use crate::local::LocalStorage;

pub type RedisPool = bb8::Pool<bb8_redis::RedisConnectionManager>;

pub const LOCAL_CACHE_REDIS_URL_ENV: &str = "CLIPFEED_LOCAL_CACHE_REDIS_URL";

#[derive(Debug, Error)]
pub enum RedisStorageError {
    #[error("CLIPFEED_LOCAL_CACHE_REDIS_URL must be set")]
    MissingUrl,
    #[error("redis pool error: {0}")]
    Pool(#[from] bb8::RunError<redis::RedisError>),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// [`LocalStorage`] kept in redis, every key namespaced under `prefix`.
#[derive(Clone)]
pub struct RedisLocalStorage {
    pool: RedisPool,
    prefix: String,
}

impl RedisLocalStorage {
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> Result<Self, RedisStorageError> {
        let manager = bb8_redis::RedisConnectionManager::new(redis_url)?;
        let pool = RedisPool::builder().build(manager).await?;
        Ok(Self {
            pool,
            prefix: prefix.into(),
        })
    }

    pub async fn from_env(prefix: impl Into<String>) -> Result<Self, RedisStorageError> {
        let redis_url =
            std::env::var(LOCAL_CACHE_REDIS_URL_ENV).map_err(|_| RedisStorageError::MissingUrl)?;
        Self::connect(&redis_url, prefix).await
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl LocalStorage for RedisLocalStorage {
    type Error = RedisStorageError;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let mut conn = self.pool.get().await?;
        let value = conn.get::<String, Option<String>>(self.key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), Self::Error> {
        let mut conn = self.pool.get().await?;
        conn.set::<String, String, ()>(self.key(key), value).await?;
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<(), Self::Error> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        let mut conn = self.pool.get().await?;
        conn.del::<Vec<String>, ()>(keys).await?;
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, Self::Error> {
        let mut conn = self.pool.get().await?;
        let keys = conn
            .keys::<String, Vec<String>>(format!("{}*", self.prefix))
            .await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }
}
