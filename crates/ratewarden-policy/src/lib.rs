//! Rule-policy text format parser, key predicates, and matching engine
//! (spec.md §3, §4.1, §4.2).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod policy;
mod result;
mod rule;

pub use error::PolicyError;
pub use key::{GroupKey, Key, RangeKey, Scope};
pub use policy::Policy;
pub use result::ResultEntry;
pub use rule::{Method, Rule};
