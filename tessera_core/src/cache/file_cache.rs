use super::TileCache;
use crate::Blob;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{
	path::{Path, PathBuf},
	time::{Duration, SystemTime},
};
use uuid::Uuid;

/// Cache persisted in a directory, one file per key.
///
/// File names are the UUIDv5 of the key, so arbitrary URIs map to safe, fixed-length names.
/// With a TTL, entries whose file is older than the TTL are reported absent.
#[derive(Debug, Clone)]
pub struct FileCache {
	dir: PathBuf,
	ttl: Option<Duration>,
}

impl FileCache {
	pub fn new(dir: &Path, ttl: Option<Duration>) -> Self {
		Self {
			dir: dir.to_path_buf(),
			ttl,
		}
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.dir.join(Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string())
	}

	fn is_expired(&self, modified: SystemTime) -> bool {
		match self.ttl {
			Some(ttl) => modified.elapsed().map(|age| age > ttl).unwrap_or(false),
			None => false,
		}
	}

	async fn write(&self, key: &str, value: &Blob) -> Result<()> {
		tokio::fs::create_dir_all(&self.dir)
			.await
			.with_context(|| format!("creating cache directory {:?}", self.dir))?;

		// write next to the target and rename, so readers never see a partial file
		let path = self.path_for(key);
		let part = path.with_extension(format!("part-{}", Uuid::new_v4().simple()));
		tokio::fs::write(&part, value.as_slice())
			.await
			.with_context(|| format!("writing {part:?}"))?;
		tokio::fs::rename(&part, &path)
			.await
			.with_context(|| format!("renaming {part:?} to {path:?}"))?;
		Ok(())
	}
}

#[async_trait]
impl TileCache for FileCache {
	async fn get(&self, key: &str) -> Option<Blob> {
		let path = self.path_for(key);
		let metadata = tokio::fs::metadata(&path).await.ok()?;
		if let Ok(modified) = metadata.modified()
			&& self.is_expired(modified)
		{
			log::trace!("cache entry for '{key}' expired");
			return None;
		}
		match tokio::fs::read(&path).await {
			Ok(bytes) => Some(Blob::from(bytes)),
			Err(err) => {
				log::warn!("failed to read cache entry {path:?}: {err}");
				None
			}
		}
	}

	async fn set(&self, key: &str, value: Blob) {
		if let Err(err) = self.write(key, &value).await {
			log::warn!("failed to store '{key}' in file cache: {err:#}");
		}
	}

	fn name(&self) -> &str {
		"file"
	}
}
