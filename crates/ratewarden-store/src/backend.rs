//! The command vocabulary the counter algorithms issue against the store
//! (spec.md §4.5): `GET`, `SETEX`, `INCR`, `EXISTS`, `LLEN`, `LINDEX`,
//! `LPUSH`, `LPOP`, `RPOP`, `EXPIRE`, `MGET`. A missing key on `GET`/`LLEN`
//! is treated as value 0 / length 0, not an error.

use crate::error::StoreError;
use std::collections::HashMap;
use std::sync::Mutex;

/// A Redis-like key-value backend exposing exactly the commands the
/// counter algorithms need.
pub trait CounterBackend: Send + Sync {
    /// `GET key`; absent key reads as `0`.
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<i64, StoreError>> + Send;
    /// `SETEX key ttl value`.
    fn setex(
        &self,
        key: &str,
        ttl_secs: i64,
        value: i64,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
    /// `INCR key`; returns the post-increment value.
    fn incr(&self, key: &str) -> impl std::future::Future<Output = Result<i64, StoreError>> + Send;
    /// `EXISTS key`.
    fn exists(&self, key: &str) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;
    /// `EXPIRE key ttl`.
    fn expire(
        &self,
        key: &str,
        ttl_secs: i64,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
    /// `LLEN key`; absent key reads as `0`.
    fn llen(&self, key: &str) -> impl std::future::Future<Output = Result<i64, StoreError>> + Send;
    /// `LINDEX key index`, zero-based from the head.
    fn lindex(
        &self,
        key: &str,
        index: i64,
    ) -> impl std::future::Future<Output = Result<Option<i64>, StoreError>> + Send;
    /// `LPUSH key value`.
    fn lpush(
        &self,
        key: &str,
        value: i64,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
    /// `LPOP key count`, returns the popped elements (head-first).
    fn lpop(
        &self,
        key: &str,
        count: usize,
    ) -> impl std::future::Future<Output = Result<Vec<i64>, StoreError>> + Send;
    /// `RPOP key`, returns the popped tail element, if any.
    fn rpop(&self, key: &str) -> impl std::future::Future<Output = Result<Option<i64>, StoreError>> + Send;
    /// `MGET keys`, one optional value per key, in order.
    fn mget(
        &self,
        keys: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Option<i64>>, StoreError>> + Send;
    /// `PING`, the `monitor/alive` liveness probe (spec.md §6).
    fn ping(&self) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Clone, Default)]
struct ListValue {
    int: Option<i64>,
    list: Vec<i64>,
}

/// An in-process fake backend for unit tests (no network, no external
/// process): a plain mutex-guarded map standing in for the remote store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<String, ListValue>>,
}

impl MemoryBackend {
    /// An empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(key)
            .and_then(|v| v.int)
            .unwrap_or(0))
    }

    async fn setex(&self, key: &str, _ttl_secs: i64, value: i64) -> Result<(), StoreError> {
        self.data.lock().unwrap().insert(
            key.to_string(),
            ListValue {
                int: Some(value),
                list: Vec::new(),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut guard = self.data.lock().unwrap();
        let entry = guard.entry(key.to_string()).or_default();
        let next = entry.int.unwrap_or(0) + 1;
        entry.int = Some(next);
        Ok(next)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.lock().unwrap().contains_key(key))
    }

    async fn expire(&self, _key: &str, _ttl_secs: i64) -> Result<(), StoreError> {
        Ok(())
    }

    async fn llen(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(key)
            .map(|v| v.list.len() as i64)
            .unwrap_or(0))
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<i64>, StoreError> {
        if index < 0 {
            return Ok(None);
        }
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(key)
            .and_then(|v| v.list.get(index as usize).copied()))
    }

    async fn lpush(&self, key: &str, value: i64) -> Result<(), StoreError> {
        let mut guard = self.data.lock().unwrap();
        let entry = guard.entry(key.to_string()).or_default();
        entry.list.insert(0, value);
        Ok(())
    }

    async fn lpop(&self, key: &str, count: usize) -> Result<Vec<i64>, StoreError> {
        let mut guard = self.data.lock().unwrap();
        let Some(entry) = guard.get_mut(key) else {
            return Ok(Vec::new());
        };
        let n = count.min(entry.list.len());
        Ok(entry.list.drain(0..n).collect())
    }

    async fn rpop(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut guard = self.data.lock().unwrap();
        let Some(entry) = guard.get_mut(key) else {
            return Ok(None);
        };
        Ok(entry.list.pop())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<i64>>, StoreError> {
        let guard = self.data.lock().unwrap();
        Ok(keys
            .iter()
            .map(|k| guard.get(k).and_then(|v| v.int))
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_reads_as_zero() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("missing").await.unwrap(), 0);
        assert_eq!(backend.llen("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn incr_creates_and_increments() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.incr("k").await.unwrap(), 1);
        assert_eq!(backend.incr("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn lpush_then_lindex_is_head_first() {
        let backend = MemoryBackend::new();
        backend.lpush("q", 1).await.unwrap();
        backend.lpush("q", 2).await.unwrap();
        assert_eq!(backend.lindex("q", 0).await.unwrap(), Some(2));
        assert_eq!(backend.lindex("q", 1).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn mget_returns_none_for_absent_keys() {
        let backend = MemoryBackend::new();
        backend.setex("a", 60, 7).await.unwrap();
        let got = backend
            .mget(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(got, vec![Some(7), None]);
    }
}
