//! The render engine as seen from this crate.
//!
//! The engine itself (style evaluation, rasterisation, image encoding) lives
//! outside this workspace. A binding implements [`RenderEngine`] and
//! [`EngineMap`]; everything the engine needs from the outside world it asks
//! for through the [`ResourceHandler`] it was created with.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::{fmt, sync::Arc};
use tessera_core::Blob;

/// How a map renders: fixed tiles with symbol placement across tile edges, or free-form images.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
	#[default]
	Tile,
	Static,
}

impl fmt::Display for RenderMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			RenderMode::Tile => "tile",
			RenderMode::Static => "static",
		})
	}
}

/// Camera and canvas of a single render call.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOptions {
	pub zoom: f64,
	pub width: u32,
	pub height: u32,
	/// `[longitude, latitude]`
	pub center: [f64; 2],
	pub bearing: f64,
	pub pitch: f64,
	/// Device pixel ratio.
	pub ratio: f64,
}

/// A resource the engine needs: style-referenced tiles, sprites, glyphs, images.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRequest {
	pub url: String,
}

impl ResourceRequest {
	pub fn new(url: impl Into<String>) -> Self {
		ResourceRequest { url: url.into() }
	}
}

/// Completion for one [`ResourceRequest`]. Called exactly once, possibly from another thread.
pub type ResourceCallback = Box<dyn FnOnce(Blob) + Send + 'static>;

/// Answers the engine's resource requests.
///
/// `request` is called synchronously from inside the engine and must not block;
/// the answer is delivered later through `callback`.
pub trait ResourceHandler: Send + Sync {
	fn request(&self, request: ResourceRequest, callback: ResourceCallback);
}

/// Factory for engine maps.
pub trait RenderEngine: fmt::Debug + Send + Sync {
	fn create_map(&self, mode: RenderMode, handler: Arc<dyn ResourceHandler>) -> Result<Box<dyn EngineMap>>;
}

/// One stateful engine handle. Renders one image at a time.
#[async_trait]
pub trait EngineMap: Send {
	/// Loads the raw style JSON. Called once, before the first render.
	fn load_style(&mut self, style: &str) -> Result<()>;

	async fn render(&mut self, options: &RenderOptions) -> Result<Blob>;

	/// Frees the engine's resources. The map is not used afterwards.
	fn release(&mut self);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mode_names() {
		assert_eq!(RenderMode::Tile.to_string(), "tile");
		assert_eq!(RenderMode::Static.to_string(), "static");
		assert_eq!(RenderMode::default(), RenderMode::Tile);
		let mode: RenderMode = serde_yaml_ng::from_str("static").unwrap();
		assert_eq!(mode, RenderMode::Static);
	}
}
