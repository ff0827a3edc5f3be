//! Shared building blocks: byte buffers, byte ranges, tile coordinates and the resource cache.

pub mod cache;
pub mod types;

pub use cache::{CacheConfig, FileCache, MemoryCache, NoCache, TileCache};
pub use types::*;
