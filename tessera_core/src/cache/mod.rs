//! The resource cache consumed by every fetch path.
//!
//! A cache maps a resource key (usually the full resource URI) to the bytes last
//! fetched for it. Presence means "known content", absence means "must fetch";
//! nothing here validates freshness beyond an optional per-backend TTL.

mod cache_config;
mod file_cache;
mod memory_cache;
mod no_cache;
mod traits;

pub use cache_config::CacheConfig;
pub use file_cache::FileCache;
pub use memory_cache::MemoryCache;
pub use no_cache::NoCache;
pub use traits::TileCache;
