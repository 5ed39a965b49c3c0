//! The four throttling algorithms (spec.md §4.5): `count` (fixed window),
//! `base` (ramp then throttle), `leak` (sliding-window queue). `direct`
//! needs no store interaction and has no function here.

use crate::backend::CounterBackend;
use crate::error::StoreError;
use ratewarden_core::time::{now_unix, seconds_until_day_end};

/// `count` browse: deny iff the stored value is at or above the threshold.
pub async fn count_browse<B: CounterBackend>(
    backend: &B,
    key: &str,
    count_threshold: i32,
) -> Result<bool, StoreError> {
    let stored = backend.get(key).await?;
    Ok(stored >= i64::from(count_threshold))
}

/// `count` update: create with a day-aligned TTL when `time == 86400`,
/// otherwise a flat `time`-second TTL; increment on subsequent calls.
pub async fn count_update<B: CounterBackend>(
    backend: &B,
    key: &str,
    time_secs: i32,
    day_offset_minutes: i32,
) -> Result<(), StoreError> {
    if backend.exists(key).await? {
        backend.incr(key).await?;
    } else {
        let ttl = if time_secs == 86_400 {
            seconds_until_day_end(day_offset_minutes, now_unix())
        } else {
            i64::from(time_secs)
        };
        backend.setex(key, ttl, 1).await?;
    }
    Ok(())
}

/// `base` browse: the primary bucket ramps freely up to `base`; beyond
/// that, the secondary `_B` bucket throttles at `count`.
pub async fn base_browse<B: CounterBackend>(
    backend: &B,
    primary_key: &str,
    base_threshold: i32,
    count_threshold: i32,
) -> Result<bool, StoreError> {
    let primary = backend.get(primary_key).await?;
    if primary < i64::from(base_threshold) {
        return Ok(false);
    }
    let secondary_key = format!("{primary_key}_B");
    let secondary = backend.get(&secondary_key).await?;
    Ok(secondary >= i64::from(count_threshold))
}

/// `base` update: primary bucket uses calendar-day (UTC) expiry; once it
/// reaches `base`, the secondary bucket accrues with TTL `time`.
pub async fn base_update<B: CounterBackend>(
    backend: &B,
    primary_key: &str,
    base_threshold: i32,
    time_secs: i32,
) -> Result<(), StoreError> {
    let primary = if backend.exists(primary_key).await? {
        backend.incr(primary_key).await?
    } else {
        let ttl = seconds_until_day_end(0, now_unix());
        backend.setex(primary_key, ttl, 1).await?;
        1
    };
    if primary < i64::from(base_threshold) {
        return Ok(());
    }
    let secondary_key = format!("{primary_key}_B");
    if backend.exists(&secondary_key).await? {
        backend.incr(&secondary_key).await?;
    } else {
        backend.setex(&secondary_key, i64::from(time_secs), 1).await?;
    }
    Ok(())
}

/// `leak` browse: a timestamp-log sliding window. If the queue is short
/// enough, allow outright; otherwise deny iff the `count`-th-from-head
/// timestamp is still within `time` seconds of now.
pub async fn leak_browse<B: CounterBackend>(
    backend: &B,
    key: &str,
    count_threshold: i32,
    time_secs: i32,
    now: i64,
) -> Result<bool, StoreError> {
    let len = backend.llen(key).await?;
    if len <= i64::from(count_threshold) {
        return Ok(false);
    }
    let Some(boundary_ts) = backend.lindex(key, i64::from(count_threshold)).await? else {
        return Ok(false);
    };
    Ok(now - boundary_ts <= i64::from(time_secs))
}

/// `leak` update: push the current timestamp and refresh the queue's TTL.
pub async fn leak_update<B: CounterBackend>(
    backend: &B,
    key: &str,
    time_secs: i32,
    now: i64,
) -> Result<(), StoreError> {
    backend.lpush(key, now).await?;
    backend.expire(key, i64::from(time_secs)).await?;
    Ok(())
}

/// `leak` housekeeping: after a deny-browse, trim the tail down to
/// `count + 1` elements. Best-effort; failures are logged by the caller
/// and otherwise ignored (this is a fire-and-forget cleanup task).
pub async fn leak_trim<B: CounterBackend>(
    backend: &B,
    key: &str,
    count_threshold: i32,
) -> Result<(), StoreError> {
    loop {
        let len = backend.llen(key).await?;
        if len <= i64::from(count_threshold) + 1 {
            return Ok(());
        }
        if backend.rpop(key).await?.is_none() {
            return Ok(());
        }
    }
}

/// `leak` feedback: refund quota by popping `n` elements from the head.
pub async fn leak_feedback<B: CounterBackend>(
    backend: &B,
    key: &str,
    n: i32,
) -> Result<(), StoreError> {
    if n <= 0 {
        return Ok(());
    }
    backend.lpop(key, n as usize).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn count_at_threshold_scenario_1() {
        let backend = MemoryBackend::new();
        for _ in 0..3 {
            count_update(&backend, "k", 60, 480).await.unwrap();
        }
        assert_eq!(backend.get("k").await.unwrap(), 3);
        assert!(count_browse(&backend, "k", 3).await.unwrap());
        count_update(&backend, "k", 60, 480).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), 4);
        assert!(count_browse(&backend, "k", 3).await.unwrap());
    }

    #[tokio::test]
    async fn base_ramp_scenario_2() {
        let backend = MemoryBackend::new();
        for _ in 0..3 {
            base_update(&backend, "p", 2, 10).await.unwrap();
        }
        assert_eq!(backend.get("p").await.unwrap(), 3);
        assert_eq!(backend.get("p_B").await.unwrap(), 1);
        assert!(!base_browse(&backend, "p", 2, 2).await.unwrap());
        base_update(&backend, "p", 2, 10).await.unwrap();
        assert_eq!(backend.get("p_B").await.unwrap(), 2);
        assert!(base_browse(&backend, "p", 2, 2).await.unwrap());
    }

    #[tokio::test]
    async fn leak_sliding_scenario_3() {
        let backend = MemoryBackend::new();
        for t in [0, 1, 2, 3] {
            leak_update(&backend, "q", 5, t).await.unwrap();
        }
        assert!(leak_browse(&backend, "q", 2, 5, 3).await.unwrap());
        assert!(!leak_browse(&backend, "q", 2, 5, 10).await.unwrap());
    }

    #[tokio::test]
    async fn leak_trim_reduces_to_count_plus_one() {
        let backend = MemoryBackend::new();
        for t in 0..10 {
            leak_update(&backend, "q", 5, t).await.unwrap();
        }
        leak_trim(&backend, "q", 2).await.unwrap();
        assert_eq!(backend.llen("q").await.unwrap(), 3);
    }
}
