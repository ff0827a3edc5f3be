use super::TileCache;
use crate::Blob;
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use std::{fmt::Debug, time::Duration};

/// In-process cache, bounded by the total byte size of its values.
#[derive(Clone)]
pub struct MemoryCache {
	cache: MokaCache<String, Blob>,
}

impl MemoryCache {
	/// Creates a cache holding at most `max_bytes` of values, each living at most `ttl` if given.
	pub fn new(max_bytes: u64, ttl: Option<Duration>) -> Self {
		let mut builder = MokaCache::builder()
			.weigher(|_key: &String, value: &Blob| -> u32 { value.len().min(u64::from(u32::MAX)) as u32 })
			.max_capacity(max_bytes);

		if let Some(ttl) = ttl {
			builder = builder.time_to_live(ttl);
		}

		Self { cache: builder.build() }
	}

	pub fn entry_count(&self) -> u64 {
		self.cache.entry_count()
	}
}

#[async_trait]
impl TileCache for MemoryCache {
	async fn get(&self, key: &str) -> Option<Blob> {
		self.cache.get(key).await
	}

	async fn set(&self, key: &str, value: Blob) {
		self.cache.insert(key.to_string(), value).await;
	}

	fn name(&self) -> &str {
		"memory"
	}
}

impl Debug for MemoryCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryCache")
			.field("entries", &self.cache.entry_count())
			.field("weighted_size", &self.cache.weighted_size())
			.finish()
	}
}
