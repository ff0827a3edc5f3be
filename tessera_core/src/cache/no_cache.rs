use super::TileCache;
use crate::Blob;
use async_trait::async_trait;

/// A cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl TileCache for NoCache {
	async fn get(&self, _key: &str) -> Option<Blob> {
		None
	}

	async fn set(&self, _key: &str, _value: Blob) {}

	fn name(&self) -> &str {
		"none"
	}
}
