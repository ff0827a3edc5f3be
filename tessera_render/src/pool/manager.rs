use super::RenderContext;
use crate::engine::{RenderEngine, RenderMode, ResourceHandler};
use anyhow::Result;
use deadpool::managed::{Manager, Metrics, RecycleResult};
use std::sync::Arc;

/// Creates render contexts for one pool: same engine, mode, style and interceptor.
pub(crate) struct ContextManager {
	engine: Arc<dyn RenderEngine>,
	mode: RenderMode,
	style: Arc<str>,
	handler: Arc<dyn ResourceHandler>,
}

impl ContextManager {
	pub(crate) fn new(
		engine: Arc<dyn RenderEngine>,
		mode: RenderMode,
		style: Arc<str>,
		handler: Arc<dyn ResourceHandler>,
	) -> Self {
		Self {
			engine,
			mode,
			style,
			handler,
		}
	}

	/// Builds a context outside of any pool.
	pub(crate) fn create_context(&self) -> Result<RenderContext> {
		let map = self.engine.create_map(self.mode, self.handler.clone())?;
		let mut context = RenderContext::new(map);
		context.load_style(&self.style)?;
		Ok(context)
	}
}

impl Manager for ContextManager {
	type Type = RenderContext;
	type Error = anyhow::Error;

	async fn create(&self) -> Result<RenderContext> {
		let context = self.create_context()?;
		log::debug!("created {} render context", self.mode);
		Ok(context)
	}

	async fn recycle(&self, _context: &mut RenderContext, _metrics: &Metrics) -> RecycleResult<anyhow::Error> {
		Ok(())
	}
}
