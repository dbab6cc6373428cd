//! Folio Cache System
//!
//! Versioned, cluster-wide caching for the portfolio backend:
//!
//! - **Query cache**: serialized list results and paginated pages
//! - **Response cache**: complete HTTP responses of read routes
//!
//! Every entry is keyed by a fingerprint plus the current version of the
//! resource it depends on. Writes never delete entries; they bump versions
//! through the [`InvalidationTrigger`], and stale entries expire by TTL.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `folio.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! enable_response_cache = true
//! redis_url = "redis://127.0.0.1:6379/0"
//! query_ttl_secs = 300
//! # ... see config.rs for all options
//! ```

mod backend;
mod config;
pub mod deps;
mod envelope;
mod keys;
mod lock;
mod memory;
mod middleware;
mod query;
mod redis;
mod store;
#[cfg(test)]
mod testing;
mod trigger;
mod version;

pub use backend::{BackendError, CacheBackend};
pub use config::CacheConfig;
pub use envelope::{CachePayload, PageEnvelope, ResponseSnapshot};
pub use keys::{BaseKey, KeyKind, VersionedKey, version_counter_key};
pub use memory::MemoryBackend;
pub use middleware::{
    CACHE_STATUS_HEADER, CacheState, ResponseCachePolicy, RouteCacheState, response_cache_layer,
};
pub use query::{QueryCacheManager, QueryError};
pub use redis::RedisBackend;
pub use store::VersionedCacheStore;
pub use trigger::{InvalidationTrigger, MutationKind};
pub use version::VersionStore;
