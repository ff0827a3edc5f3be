use super::{ContextManager, RenderContext, RenderPool};
use crate::{
	PoolConfig,
	engine::{RenderEngine, RenderMode, ResourceHandler},
};
use anyhow::{Context, Result, anyhow, ensure};
use dashmap::DashMap;
use std::{
	fmt,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};
use tessera_core::TileCache;
use tessera_derive::context;
use tessera_source::SourceResolver;
use tokio::sync::OnceCell;

/// Identifies one pool: the style location as given by the caller, and the render mode.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct PoolKey {
	pub style: String,
	pub mode: RenderMode,
}

impl PoolKey {
	pub fn new(style: &str, mode: RenderMode) -> Self {
		Self {
			style: style.to_string(),
			mode,
		}
	}
}

impl fmt::Display for PoolKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "'{}' ({})", self.style, self.mode)
	}
}

/// Creates render pools on first use and hands out the same pool for the same key afterwards.
///
/// Concurrent first requests for one key wait on a single creation. If creation
/// fails (style missing, invalid or rejected by the engine) the error goes to
/// every waiter and the next request tries again.
///
/// After [`close_all`](Self::close_all) the registry refuses to hand out pools or contexts.
pub struct PoolRegistry {
	pools: DashMap<PoolKey, Arc<OnceCell<Arc<RenderPool>>>>,
	closed: AtomicBool,
	engine: Arc<dyn RenderEngine>,
	handler: Arc<dyn ResourceHandler>,
	cache: Arc<dyn TileCache>,
	resolver: Arc<SourceResolver>,
	config: PoolConfig,
}

impl PoolRegistry {
	pub fn new(
		engine: Arc<dyn RenderEngine>,
		handler: Arc<dyn ResourceHandler>,
		cache: Arc<dyn TileCache>,
		resolver: Arc<SourceResolver>,
		config: PoolConfig,
	) -> PoolRegistry {
		PoolRegistry {
			pools: DashMap::new(),
			closed: AtomicBool::new(false),
			engine,
			handler,
			cache,
			resolver,
			config,
		}
	}

	pub async fn get_pool(&self, style: &str, mode: RenderMode) -> Result<Arc<RenderPool>> {
		self.ensure_open()?;
		let key = PoolKey::new(style, mode);
		let cell = self.pools.entry(key.clone()).or_default().clone();
		let pool = cell.get_or_try_init(|| self.create_pool(&key)).await?;

		// closed while this pool was being created
		if self.is_closed() {
			pool.close();
			self.pools.clear();
		}
		self.ensure_open()?;
		Ok(pool.clone())
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	fn ensure_open(&self) -> Result<()> {
		ensure!(!self.is_closed(), "render pools are shut down");
		Ok(())
	}

	#[context("creating render pool for {key}")]
	async fn create_pool(&self, key: &PoolKey) -> Result<Arc<RenderPool>> {
		let manager = self.manager(key).await?;
		let pool = RenderPool::new(key.clone(), manager, &self.config)?;
		pool.warm_up().await?;
		log::debug!("created render pool for {key}");
		Ok(Arc::new(pool))
	}

	/// A context for `style` that belongs to no pool. It is released when dropped.
	pub async fn create_context(&self, style: &str, mode: RenderMode) -> Result<RenderContext> {
		self.ensure_open()?;
		let key = PoolKey::new(style, mode);
		self.manager(&key).await?.create_context()
	}

	async fn manager(&self, key: &PoolKey) -> Result<ContextManager> {
		let style = self.load_style(&key.style).await?;
		Ok(ContextManager::new(
			self.engine.clone(),
			key.mode,
			style,
			self.handler.clone(),
		))
	}

	/// Fetches the style document through the cache and checks that it is a JSON object.
	async fn load_style(&self, location: &str) -> Result<Arc<str>> {
		let blob = match self.cache.get(location).await {
			Some(blob) => blob,
			None => {
				let blob = self
					.resolver
					.fetch(location, self.cache.as_ref())
					.await?
					.ok_or_else(|| anyhow!("style not found: '{location}'"))?;
				self.cache.set(location, blob.clone()).await;
				blob
			}
		};

		let text = String::from_utf8(blob.into_vec()).context("style is not valid UTF-8")?;
		let json: serde_json::Value = serde_json::from_str(&text).context("style is not valid JSON")?;
		ensure!(json.is_object(), "style must be a JSON object");
		Ok(Arc::from(text))
	}

	/// Number of pools created so far.
	pub fn len(&self) -> usize {
		self.pools.iter().filter(|cell| cell.value().initialized()).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn live_pools(&self) -> Vec<Arc<RenderPool>> {
		self.pools.iter().filter_map(|cell| cell.value().get().cloned()).collect()
	}

	/// Destroys idle contexts in every pool. Returns the total number destroyed.
	pub fn evict_idle(&self, max_idle: Duration) -> usize {
		self.live_pools().iter().map(|pool| pool.evict_idle(max_idle)).sum()
	}

	/// Closes every pool and forgets all of them. Later requests fail.
	pub fn close_all(&self) {
		self.closed.store(true, Ordering::Release);
		let pools = self.live_pools();
		log::debug!("closing {} render pools", pools.len());
		for pool in pools {
			pool.close();
		}
		self.pools.clear();
	}
}

impl fmt::Debug for PoolRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PoolRegistry")
			.field("pools", &self.len())
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}
