//! Rendering map tiles with pooled render-engine contexts.
//!
//! - [`engine`]: the traits a render-engine binding implements
//! - [`ResourceInterceptor`]: answers the engine's resource requests from cache and sources
//! - [`pool`]: render context pools, one per style and mode, and their registry
//! - [`TileRenderer`]: renders tiles and static images
//! - [`TileService`]: owns all of the above and shuts it down
//!
//! ```no_run
//! # async fn run(engine: std::sync::Arc<dyn tessera_render::engine::RenderEngine>) -> anyhow::Result<()> {
//! use tessera_render::{ServiceConfig, TileService};
//!
//! let config = ServiceConfig::from_string("pool:\n  max_size: 8\nrender:\n  tile_size: 256")?;
//! let service = TileService::builder(engine).config(config).build()?;
//! let png = service.render_tile("https://example.org/style.json", 3, 2, 1).await?;
//! service.shutdown();
//! # Ok(())
//! # }
//! ```

mod config;
pub mod engine;
mod interceptor;
pub mod placeholder;
pub mod pool;
mod renderer;
mod service;
#[cfg(any(test, feature = "test"))]
pub mod testing;

pub use config::{PoolConfig, RenderConfig, ServiceConfig};
pub use interceptor::{MIN_VECTOR_TILE_SIZE, ResourceInterceptor};
pub use pool::{PoolKey, PoolRegistry, PooledContext, RenderContext, RenderPool};
pub use renderer::{RenderParams, StaticRequest, TileRenderer, tile_center};
pub use service::{ServiceBuilder, TileService};
