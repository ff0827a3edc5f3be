//! Pools of render contexts, one per style and render mode.
//!
//! A [`RenderContext`] wraps one engine map with its style loaded. Contexts are
//! expensive to create, so [`RenderPool`] keeps them between renders and hands
//! each one to a single caller at a time. [`PoolRegistry`] creates pools on
//! first use and returns the same pool for the same [`PoolKey`] afterwards.

mod manager;
mod registry;

pub(crate) use manager::ContextManager;
pub use registry::{PoolKey, PoolRegistry};

use crate::{
	PoolConfig,
	engine::{EngineMap, RenderOptions},
};
use anyhow::{Context, Result, anyhow};
use deadpool::{
	Runtime,
	managed::{Object, Pool, Status},
};
use futures::future::try_join_all;
use std::{
	fmt,
	ops::{Deref, DerefMut},
	time::Duration,
};
use tessera_core::Blob;

/// An engine map with its style loaded. Releases the map when dropped.
pub struct RenderContext {
	map: Box<dyn EngineMap>,
	renders: u64,
}

impl RenderContext {
	pub(crate) fn new(map: Box<dyn EngineMap>) -> Self {
		Self { map, renders: 0 }
	}

	pub(crate) fn load_style(&mut self, style: &str) -> Result<()> {
		self.map.load_style(style)
	}

	pub async fn render(&mut self, options: &RenderOptions) -> Result<Blob> {
		self.renders += 1;
		self.map.render(options).await
	}

	/// Number of renders issued on this context.
	pub fn renders(&self) -> u64 {
		self.renders
	}
}

impl Drop for RenderContext {
	fn drop(&mut self) {
		self.map.release();
	}
}

impl fmt::Debug for RenderContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderContext").field("renders", &self.renders).finish()
	}
}

/// A context checked out of a [`RenderPool`]. Goes back to the pool when dropped.
pub struct PooledContext(Object<ContextManager>);

impl Deref for PooledContext {
	type Target = RenderContext;
	fn deref(&self) -> &RenderContext {
		&self.0
	}
}

impl DerefMut for PooledContext {
	fn deref_mut(&mut self) -> &mut RenderContext {
		&mut self.0
	}
}

impl fmt::Debug for PooledContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("PooledContext").field(&**self).finish()
	}
}

/// A bounded pool of render contexts for one [`PoolKey`].
pub struct RenderPool {
	key: PoolKey,
	pool: Pool<ContextManager>,
	min_size: usize,
}

impl RenderPool {
	pub(crate) fn new(key: PoolKey, manager: ContextManager, config: &PoolConfig) -> Result<RenderPool> {
		let pool = Pool::builder(manager)
			.max_size(config.max_size.max(1))
			.wait_timeout(config.acquire_timeout())
			.runtime(Runtime::Tokio1)
			.build()
			.with_context(|| format!("building render pool for {key}"))?;

		Ok(RenderPool {
			key,
			pool,
			min_size: config.min_size.min(config.max_size.max(1)),
		})
	}

	pub fn key(&self) -> &PoolKey {
		&self.key
	}

	/// Checks out an idle context, creates one below the size limit, or waits for a release.
	pub async fn acquire(&self) -> Result<PooledContext> {
		let object = self
			.pool
			.get()
			.await
			.map_err(|e| anyhow!("acquiring render context for {}: {e}", self.key))?;
		Ok(PooledContext(object))
	}

	/// Returns a context to the idle set.
	pub fn release(&self, context: PooledContext) {
		drop(context);
	}

	/// Removes a context from the pool and releases its engine map. Frees a slot for a new context.
	pub fn destroy(&self, context: PooledContext) {
		let context = Object::take(context.0);
		log::debug!("destroying render context of {} after {} renders", self.key, context.renders());
		drop(context);
	}

	/// Creates contexts until `min_size` exist.
	pub async fn warm_up(&self) -> Result<()> {
		let missing = self.min_size.saturating_sub(self.pool.status().size);
		if missing == 0 {
			return Ok(());
		}
		log::debug!("warming up {} with {missing} contexts", self.key);
		let contexts = try_join_all((0..missing).map(|_| self.acquire())).await?;
		drop(contexts);
		Ok(())
	}

	/// Destroys idle contexts unused for longer than `max_idle`. Returns how many were destroyed.
	pub fn evict_idle(&self, max_idle: Duration) -> usize {
		let result = self.pool.retain(|_, metrics| metrics.last_used() < max_idle);
		if !result.removed.is_empty() {
			log::debug!("evicted {} idle contexts from {}", result.removed.len(), self.key);
		}
		result.removed.len()
	}

	/// Closes the pool: idle contexts are released now, checked-out ones when they come back.
	pub fn close(&self) {
		self.pool.close();
	}

	pub fn is_closed(&self) -> bool {
		self.pool.is_closed()
	}

	pub fn status(&self) -> Status {
		self.pool.status()
	}
}

impl fmt::Debug for RenderPool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderPool")
			.field("key", &self.key)
			.field("status", &self.pool.status())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		engine::{RenderMode, ResourceCallback, ResourceHandler, ResourceRequest},
		testing::{MockEngine, MockStats},
	};
	use std::sync::Arc;
	use tokio::time::timeout;

	struct EmptyResources;

	impl ResourceHandler for EmptyResources {
		fn request(&self, _request: ResourceRequest, callback: ResourceCallback) {
			callback(Blob::new_empty());
		}
	}

	fn pool(config: PoolConfig) -> (RenderPool, Arc<MockStats>) {
		let engine = MockEngine::new();
		let stats = engine.stats();
		let manager = ContextManager::new(
			Arc::new(engine),
			RenderMode::Tile,
			Arc::from("{\"version\":8,\"sources\":{}}"),
			Arc::new(EmptyResources),
		);
		let key = PoolKey::new("style.json", RenderMode::Tile);
		(RenderPool::new(key, manager, &config).unwrap(), stats)
	}

	fn sized(min_size: usize, max_size: usize) -> PoolConfig {
		PoolConfig {
			min_size,
			max_size,
			acquire_timeout_secs: None,
			idle_timeout_secs: None,
		}
	}

	fn options() -> RenderOptions {
		RenderOptions {
			zoom: 1.0,
			width: 512,
			height: 512,
			center: [0.0, 0.0],
			bearing: 0.0,
			pitch: 0.0,
			ratio: 1.0,
		}
	}

	#[tokio::test]
	async fn released_contexts_are_reused() -> Result<()> {
		let (pool, stats) = pool(sized(0, 2));
		for _ in 0..3 {
			let mut context = pool.acquire().await?;
			context.render(&options()).await?;
			pool.release(context);
		}
		assert_eq!(stats.created(), 1);
		assert_eq!(stats.renders(), 3);
		assert_eq!(pool.status().size, 1);
		assert_eq!(pool.status().available, 1);
		Ok(())
	}

	#[tokio::test]
	async fn pooled_contexts_are_debuggable() -> Result<()> {
		let (pool, _) = pool(sized(0, 1));
		let mut context = pool.acquire().await?;
		context.render(&options()).await?;
		assert_eq!(format!("{context:?}"), "PooledContext(RenderContext { renders: 1 })");
		Ok(())
	}

	#[tokio::test]
	async fn acquire_waits_at_capacity() -> Result<()> {
		let (pool, stats) = pool(sized(0, 1));
		let pool = Arc::new(pool);
		let first = pool.acquire().await?;

		let waiter = tokio::spawn({
			let pool = pool.clone();
			async move { pool.acquire().await.map(|context| context.renders()) }
		});
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert!(!waiter.is_finished());
		assert_eq!(pool.status().waiting, 1);

		pool.release(first);
		timeout(Duration::from_secs(5), waiter).await???;
		assert_eq!(stats.created(), 1);
		Ok(())
	}

	#[tokio::test]
	async fn acquire_times_out() -> Result<()> {
		let config = PoolConfig {
			acquire_timeout_secs: Some(1),
			..sized(0, 1)
		};
		let (pool, _) = pool(config);
		let _held = pool.acquire().await?;
		let err = pool.acquire().await.unwrap_err();
		assert!(err.to_string().starts_with("acquiring render context for 'style.json' (tile)"));
		Ok(())
	}

	#[tokio::test]
	async fn destroyed_contexts_are_released_and_replaced() -> Result<()> {
		let (pool, stats) = pool(sized(0, 1));
		let context = pool.acquire().await?;
		pool.destroy(context);
		assert_eq!(stats.released(), 1);
		assert_eq!(pool.status().size, 0);

		let _context = pool.acquire().await?;
		assert_eq!(stats.created(), 2);
		Ok(())
	}

	#[tokio::test]
	async fn warm_up_creates_min_size_contexts() -> Result<()> {
		let (pool, stats) = pool(sized(2, 4));
		pool.warm_up().await?;
		assert_eq!(stats.created(), 2);
		assert_eq!(pool.status().available, 2);

		pool.warm_up().await?;
		assert_eq!(stats.created(), 2);
		Ok(())
	}

	#[tokio::test]
	async fn evicts_idle_contexts() -> Result<()> {
		let (pool, stats) = pool(sized(0, 2));
		let (a, b) = (pool.acquire().await?, pool.acquire().await?);
		pool.release(a);
		pool.release(b);

		assert_eq!(pool.evict_idle(Duration::from_secs(3600)), 0);
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(pool.evict_idle(Duration::from_millis(10)), 2);
		assert_eq!(stats.released(), 2);
		assert_eq!(pool.status().size, 0);
		Ok(())
	}

	#[tokio::test]
	async fn closed_pool_refuses_acquire() -> Result<()> {
		let (pool, stats) = pool(sized(1, 1));
		pool.warm_up().await?;
		pool.close();
		assert!(pool.is_closed());
		assert!(pool.acquire().await.is_err());
		assert_eq!(stats.released(), 1);
		Ok(())
	}
}
