use crate::{
	PoolRegistry, ResourceInterceptor, ServiceConfig, StaticRequest, TileRenderer,
	engine::RenderEngine,
};
use anyhow::{Context, Result, ensure};
use std::{sync::Arc, time::Duration};
use tessera_core::{Blob, TileCache};
use tessera_source::{CloudStoreProvider, ObjectStoreProvider, SourceResolver};
use tokio::{runtime::Handle, time::interval};
use tokio_util::sync::CancellationToken;

/// The top-level service context.
///
/// Owns the cache, the source resolver with its archive handles, and the pool
/// registry, and passes them to every component that needs them. Cheap to
/// clone. [`shutdown`](Self::shutdown) cancels outstanding fetches, closes every
/// pool and drops every open archive. Requests after that fail.
#[derive(Clone, Debug)]
pub struct TileService {
	inner: Arc<ServiceInner>,
}

#[derive(Debug)]
struct ServiceInner {
	config: ServiceConfig,
	cache: Arc<dyn TileCache>,
	resolver: Arc<SourceResolver>,
	registry: Arc<PoolRegistry>,
	renderer: TileRenderer,
	cancel: CancellationToken,
}

impl TileService {
	pub fn builder(engine: Arc<dyn RenderEngine>) -> ServiceBuilder {
		ServiceBuilder::new(engine)
	}

	pub fn config(&self) -> &ServiceConfig {
		&self.inner.config
	}

	pub fn cache(&self) -> &Arc<dyn TileCache> {
		&self.inner.cache
	}

	pub fn resolver(&self) -> &SourceResolver {
		&self.inner.resolver
	}

	pub fn pools(&self) -> &PoolRegistry {
		&self.inner.registry
	}

	pub fn renderer(&self) -> &TileRenderer {
		&self.inner.renderer
	}

	/// Fetches any resource through the resolver and the service cache.
	pub async fn fetch(&self, uri: &str) -> Result<Option<Blob>> {
		self.ensure_running()?;
		self.inner.resolver.fetch(uri, self.inner.cache.as_ref()).await
	}

	pub async fn render_tile(&self, style: &str, level: u8, x: u32, y: u32) -> Result<Blob> {
		self.ensure_running()?;
		self.inner.renderer.render(style, level, x, y).await
	}

	pub async fn render_static(&self, style: &str, request: &StaticRequest) -> Result<Blob> {
		self.ensure_running()?;
		self.inner.renderer.render_static(style, request).await
	}

	pub fn is_shut_down(&self) -> bool {
		self.inner.cancel.is_cancelled()
	}

	fn ensure_running(&self) -> Result<()> {
		ensure!(!self.is_shut_down(), "tile service is shut down");
		Ok(())
	}

	pub fn shutdown(&self) {
		log::info!("shutting down tile service");
		self.inner.cancel.cancel();
		self.inner.registry.close_all();
		self.inner.resolver.archives().clear();
	}
}

/// Builds a [`TileService`]. Everything except the engine has a default.
pub struct ServiceBuilder {
	engine: Arc<dyn RenderEngine>,
	config: ServiceConfig,
	cache: Option<Arc<dyn TileCache>>,
	object_stores: Option<Arc<dyn ObjectStoreProvider>>,
	runtime: Option<Handle>,
}

impl ServiceBuilder {
	pub fn new(engine: Arc<dyn RenderEngine>) -> Self {
		Self {
			engine,
			config: ServiceConfig::default(),
			cache: None,
			object_stores: None,
			runtime: None,
		}
	}

	pub fn config(mut self, config: ServiceConfig) -> Self {
		self.config = config;
		self
	}

	/// Uses `cache` instead of building one from the cache configuration.
	pub fn cache(mut self, cache: Arc<dyn TileCache>) -> Self {
		self.cache = Some(cache);
		self
	}

	/// Uses `provider` for object storage instead of S3 and GCS clients built from the configuration.
	pub fn object_stores(mut self, provider: Arc<dyn ObjectStoreProvider>) -> Self {
		self.object_stores = Some(provider);
		self
	}

	/// Runtime on which resource fetches are spawned. Defaults to the current one.
	pub fn runtime(mut self, runtime: Handle) -> Self {
		self.runtime = Some(runtime);
		self
	}

	pub fn build(self) -> Result<TileService> {
		let config = self.config;
		config.validate()?;

		let runtime = match self.runtime {
			Some(runtime) => runtime,
			None => Handle::try_current().context("tile service must be built inside a tokio runtime")?,
		};
		let cache = match self.cache {
			Some(cache) => cache,
			None => config.cache.build()?,
		};
		let object_stores = self.object_stores.unwrap_or_else(|| {
			Arc::new(CloudStoreProvider::new(config.object_store.clone().with_env_overrides()))
		});
		let resolver = Arc::new(SourceResolver::new(object_stores, config.fetch.clone())?);
		let cancel = CancellationToken::new();

		let interceptor = ResourceInterceptor::new(
			cache.clone(),
			resolver.clone(),
			runtime.clone(),
			cancel.clone(),
			config.render.min_vector_tile_size,
		);
		let registry = Arc::new(PoolRegistry::new(
			self.engine,
			Arc::new(interceptor),
			cache.clone(),
			resolver.clone(),
			config.pool.clone(),
		));
		let renderer = TileRenderer::new(registry.clone(), config.render.tile_size);

		if let Some(max_idle) = config.pool.idle_timeout() {
			spawn_idle_sweeper(&runtime, registry.clone(), max_idle, cancel.clone());
		}

		log::debug!("tile service ready (cache: {})", cache.name());
		Ok(TileService {
			inner: Arc::new(ServiceInner {
				config,
				cache,
				resolver,
				registry,
				renderer,
				cancel,
			}),
		})
	}
}

fn spawn_idle_sweeper(runtime: &Handle, registry: Arc<PoolRegistry>, max_idle: Duration, cancel: CancellationToken) {
	let period = (max_idle / 2).max(Duration::from_secs(1));
	runtime.spawn(async move {
		let mut ticks = interval(period);
		loop {
			tokio::select! {
				() = cancel.cancelled() => break,
				_ = ticks.tick() => {
					registry.evict_idle(max_idle);
				}
			}
		}
	});
}
