//! COALESCE Core - Identity, Value and Configuration Types
//!
//! Pure data structures with no behavior. The cache mechanism in
//! `coalesce-cache` depends on this crate; nothing here performs I/O,
//! holds locks, or touches a network.

pub mod config;
pub mod error;
pub mod identity;
pub mod value;

pub use config::{CacheConfig, MergeConflictPolicy, Ttl};
pub use error::{
    CacheError, CacheResult, ConfigError, CorruptionError, ResolutionError,
};
pub use identity::{canonical_variables, CacheKey, QueryIdentity, ScopeTag, Timestamp};
pub use value::{CacheObject, FieldValue};
