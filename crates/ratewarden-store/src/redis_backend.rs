//! [`CounterBackend`] implementation over a real Redis-protocol server,
//! via `redis`'s async connection manager (auto-reconnecting, pooled by
//! the caller per spec.md §5 "scoped store connection").

use crate::backend::CounterBackend;
use crate::error::StoreError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// A [`CounterBackend`] backed by a live Redis (or Redis-protocol
/// compatible) server.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to `addr` (`host:port`), optionally authenticating, and
    /// wrap the connection in an auto-reconnecting manager.
    pub async fn connect(addr: &str, auth: Option<&str>) -> Result<Self, StoreError> {
        let url = match auth {
            Some(pass) if !pass.is_empty() => format!("redis://:{pass}@{addr}"),
            _ => format!("redis://{addr}"),
        };
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }

    /// `PING` the server, for the `monitor/alive` health probe.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

fn err(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl CounterBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let v: Option<i64> = conn.get(key).await.map_err(err)?;
        Ok(v.unwrap_or(0))
    }

    async fn setex(&self, key: &str, ttl_secs: i64, value: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let ttl = ttl_secs.max(1) as u64;
        conn.set_ex::<_, _, ()>(key, value, ttl).await.map_err(err)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1).await.map_err(err)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(err)
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl_secs.max(1)).await.map_err(err)
    }

    async fn llen(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        conn.llen(key).await.map_err(err)
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        conn.lindex(key, index as isize).await.map_err(err)
    }

    async fn lpush(&self, key: &str, value: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(key, value).await.map_err(err)
    }

    async fn lpop(&self, key: &str, count: usize) -> Result<Vec<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let popped: Vec<i64> = conn
            .lpop(key, std::num::NonZeroUsize::new(count))
            .await
            .map_err(err)?;
        Ok(popped)
    }

    async fn rpop(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        conn.rpop(key, None).await.map_err(err)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<i64>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        conn.mget(keys).await.map_err(err)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        RedisBackend::ping(self).await
    }
}
