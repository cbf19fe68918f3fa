//! Key-value backends for the `TokenStore` and `SessionStore` capabilities.
//!
//! Both backends keep the key layout in `crate::core::keys`, so a deployment
//! can move between them without rewriting records.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
