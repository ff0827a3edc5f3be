use crate::interceptor::MIN_VECTOR_TILE_SIZE;
use anyhow::{Result, ensure};
use serde::Deserialize;
use std::{fs::File, io::BufReader, io::Read, path::Path, time::Duration};
use tessera_core::CacheConfig;
use tessera_derive::context;
use tessera_source::{FetchConfig, ObjectStoreConfig};

/// Everything a [`TileService`](crate::TileService) is configured with.
///
/// ```yaml
/// cache:
///   kind: file
///   dir: /var/cache/tessera
/// pool:
///   min_size: 1
///   max_size: 8
/// render:
///   tile_size: 256
/// fetch:
///   timeout_secs: 10
/// object_store:
///   region: eu-central-1
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
	#[serde(default)]
	pub cache: CacheConfig,

	#[serde(default)]
	pub pool: PoolConfig,

	#[serde(default)]
	pub render: RenderConfig,

	#[serde(default)]
	pub fetch: FetchConfig,

	#[serde(default)]
	pub object_store: ObjectStoreConfig,
}

impl ServiceConfig {
	pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
		let config: ServiceConfig = serde_yaml_ng::from_reader(reader)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_string(text: &str) -> Result<Self> {
		let config: ServiceConfig = serde_yaml_ng::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	#[context("loading configuration from {path:?}")]
	pub fn from_path(path: &Path) -> Result<Self> {
		ServiceConfig::from_reader(BufReader::new(File::open(path)?))
	}

	pub fn validate(&self) -> Result<()> {
		ensure!(self.pool.max_size > 0, "pool.max_size must be at least 1");
		ensure!(
			self.pool.min_size <= self.pool.max_size,
			"pool.min_size ({}) must not exceed pool.max_size ({})",
			self.pool.min_size,
			self.pool.max_size
		);
		ensure!(self.render.tile_size > 0, "render.tile_size must be positive");
		ensure!(self.fetch.timeout_secs > 0, "fetch.timeout_secs must be positive");
		Ok(())
	}
}

/// Sizing and lifetime of each render context pool.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
	/// Contexts created as soon as a pool is created.
	#[serde(default)]
	pub min_size: usize,

	/// Upper bound of live contexts per pool; further acquires wait.
	#[serde(default = "default_max_size")]
	pub max_size: usize,

	/// How long an acquire waits for a free context before failing. No limit if unset.
	#[serde(default = "default_acquire_timeout_secs")]
	pub acquire_timeout_secs: Option<u64>,

	/// Idle contexts older than this are destroyed by the idle sweeper. Never if unset.
	#[serde(default = "default_idle_timeout_secs")]
	pub idle_timeout_secs: Option<u64>,
}

fn default_max_size() -> usize {
	4
}

fn default_acquire_timeout_secs() -> Option<u64> {
	Some(60)
}

fn default_idle_timeout_secs() -> Option<u64> {
	Some(300)
}

impl PoolConfig {
	pub fn acquire_timeout(&self) -> Option<Duration> {
		self.acquire_timeout_secs.map(Duration::from_secs)
	}

	pub fn idle_timeout(&self) -> Option<Duration> {
		self.idle_timeout_secs.map(Duration::from_secs)
	}
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			min_size: 0,
			max_size: default_max_size(),
			acquire_timeout_secs: default_acquire_timeout_secs(),
			idle_timeout_secs: default_idle_timeout_secs(),
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
	/// Edge length of a rendered tile in pixels.
	#[serde(default = "default_tile_size")]
	pub tile_size: u32,

	/// Vector tiles shorter than this many bytes are passed to the engine as empty buffers.
	#[serde(default = "default_min_vector_tile_size")]
	pub min_vector_tile_size: u64,
}

fn default_tile_size() -> u32 {
	512
}

fn default_min_vector_tile_size() -> u64 {
	MIN_VECTOR_TILE_SIZE
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self {
			tile_size: default_tile_size(),
			min_vector_tile_size: default_min_vector_tile_size(),
		}
	}
}
