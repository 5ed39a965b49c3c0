//! The decision engine: cache-key fingerprint and the browse /
//! browse-complete / update / multi-browse flows (spec.md §4.3, §4.4, §4.9).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache_key;
mod engine;
mod multi;

pub use cache_key::cache_key;
pub use engine::Engine;
pub use multi::{Job, JobResult};
