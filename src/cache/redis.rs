//! Redis cache backend shared by every application instance.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, redis::AsyncCommands};
use tracing::debug;

use super::backend::{BackendError, CacheBackend};

pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Build a lazily connecting pool; no connection is opened until first use.
    pub fn connect(url: &str, pool_size: usize) -> Result<Self, BackendError> {
        let mut config = Config::from_url(url);
        config.pool = Some(PoolConfig::new(pool_size.max(1)));
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| BackendError::unavailable(format!("failed to create Redis pool: {err}")))?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<Connection, BackendError> {
        self.pool.get().await.map_err(|err| {
            BackendError::unavailable(format!("failed to get Redis connection: {err}"))
        })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|err| BackendError::command("GET", err.to_string()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(key, value, seconds)
                    .await
                    .map_err(|err| BackendError::command("SETEX", err.to_string()))?;
                debug!(key, ttl_secs = seconds, "stored cache entry in redis");
            }
            None => {
                conn.set::<_, _, ()>(key, value)
                    .await
                    .map_err(|err| BackendError::command("SET", err.to_string()))?;
            }
        }
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, BackendError> {
        let mut conn = self.connection().await?;
        conn.incr(key, 1_i64)
            .await
            .map_err(|err| BackendError::command("INCR", err.to_string()))
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        let _pong: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|err| BackendError::command("PING", err.to_string()))?;
        Ok(())
    }
}
