pub mod error;
pub mod redis_cache;

pub use error::{CacheError, Result};
pub use redis_cache::{activity_marker_key, Cache, CacheConfig};
