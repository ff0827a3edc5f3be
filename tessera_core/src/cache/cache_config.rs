use super::{FileCache, MemoryCache, NoCache, TileCache};
use anyhow::{Result, ensure};
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Which cache backend to use, as read from the service configuration.
///
/// ```yaml
/// cache:
///   kind: memory
///   max_bytes: 268435456
///   ttl_secs: 3600
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum CacheConfig {
	#[default]
	None,
	Memory {
		#[serde(default = "default_max_bytes")]
		max_bytes: u64,
		#[serde(default)]
		ttl_secs: Option<u64>,
	},
	File {
		dir: PathBuf,
		#[serde(default)]
		ttl_secs: Option<u64>,
	},
}

fn default_max_bytes() -> u64 {
	256 * 1024 * 1024
}

impl CacheConfig {
	pub fn build(&self) -> Result<Arc<dyn TileCache>> {
		Ok(match self {
			CacheConfig::None => Arc::new(NoCache),
			CacheConfig::Memory { max_bytes, ttl_secs } => {
				ensure!(*max_bytes > 0, "memory cache needs max_bytes > 0");
				Arc::new(MemoryCache::new(*max_bytes, ttl_secs.map(Duration::from_secs)))
			}
			CacheConfig::File { dir, ttl_secs } => Arc::new(FileCache::new(dir, ttl_secs.map(Duration::from_secs))),
		})
	}
}
