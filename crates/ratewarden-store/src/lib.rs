//! Counter store adapter: the four throttling algorithms (spec.md §4.5)
//! over a Redis-like key-value backend.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod algorithms;
mod backend;
mod error;
mod redis_backend;

pub use algorithms::{
    base_browse, base_update, count_browse, count_update, leak_browse, leak_feedback, leak_trim,
    leak_update,
};
pub use backend::{CounterBackend, MemoryBackend};
pub use error::StoreError;
pub use redis_backend::RedisBackend;
