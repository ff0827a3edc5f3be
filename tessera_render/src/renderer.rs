//! Rendering single tiles and static images with pooled or ad-hoc contexts.

use crate::{
	PoolRegistry,
	engine::{RenderMode, RenderOptions},
};
use anyhow::{Result, ensure};
use std::sync::Arc;
use tessera_core::{Blob, TileCoord};

/// Zoom, canvas and pixel ratio for rendering one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParams {
	pub zoom: f64,
	pub width: u32,
	pub height: u32,
	pub ratio: f64,
}

impl RenderParams {
	/// The engine renders 512 px per zoom level. A 256 px tile therefore renders one zoom
	/// level lower, except at zoom 0: the world at zoom 0 is 512×512, so it is rendered
	/// that size at half ratio.
	pub fn for_tile(level: u8, tile_size: u32) -> RenderParams {
		if tile_size == 256 && level == 0 {
			return RenderParams {
				zoom: 0.0,
				width: 512,
				height: 512,
				ratio: 0.5,
			};
		}
		RenderParams {
			zoom: f64::from(i32::from(level) - 1 + (tile_size / 512) as i32),
			width: tile_size,
			height: tile_size,
			ratio: 1.0,
		}
	}
}

/// `[lon, lat]` of the centre pixel of tile `level/x/y`.
pub fn tile_center(level: u8, x: u32, y: u32, tile_size: u32) -> [f64; 2] {
	TileCoord { level, x, y }.center(tile_size)
}

/// A free-form image request, for the static render mode.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticRequest {
	/// `[lon, lat]`
	pub center: [f64; 2],
	pub zoom: f64,
	pub width: u32,
	pub height: u32,
	pub bearing: f64,
	pub pitch: f64,
	pub ratio: f64,
}

impl StaticRequest {
	pub fn new(center: [f64; 2], zoom: f64, width: u32, height: u32) -> StaticRequest {
		StaticRequest {
			center,
			zoom,
			width,
			height,
			bearing: 0.0,
			pitch: 0.0,
			ratio: 1.0,
		}
	}

	fn options(&self) -> Result<RenderOptions> {
		ensure!(self.width > 0 && self.height > 0, "image size must be positive");
		ensure!(
			(-180.0..=180.0).contains(&self.center[0]) && (-90.0..=90.0).contains(&self.center[1]),
			"center {:?} is not a valid longitude/latitude",
			self.center
		);
		Ok(RenderOptions {
			zoom: self.zoom,
			width: self.width,
			height: self.height,
			center: self.center,
			bearing: self.bearing,
			pitch: self.pitch,
			ratio: self.ratio,
		})
	}
}

/// Renders tiles and static images with contexts from a [`PoolRegistry`].
///
/// Failed renders are never retried. The context of a failed render is destroyed
/// instead of being returned to its pool.
#[derive(Clone, Debug)]
pub struct TileRenderer {
	registry: Arc<PoolRegistry>,
	tile_size: u32,
}

impl TileRenderer {
	pub fn new(registry: Arc<PoolRegistry>, tile_size: u32) -> TileRenderer {
		TileRenderer { registry, tile_size }
	}

	pub fn tile_size(&self) -> u32 {
		self.tile_size
	}

	/// Coordinates are not validated.
	pub fn tile_options(&self, level: u8, x: u32, y: u32) -> RenderOptions {
		let params = RenderParams::for_tile(level, self.tile_size);
		RenderOptions {
			zoom: params.zoom,
			width: params.width,
			height: params.height,
			center: tile_center(level, x, y, self.tile_size),
			bearing: 0.0,
			pitch: 0.0,
			ratio: params.ratio,
		}
	}

	/// Renders tile `level/x/y` of `style` with a pooled context.
	pub async fn render(&self, style: &str, level: u8, x: u32, y: u32) -> Result<Blob> {
		log::trace!("render tile {level}/{x}/{y} of '{style}'");
		let options = self.tile_options(level, x, y);
		self.render_pooled(style, RenderMode::Tile, &options).await
	}

	/// Renders tile `level/x/y` of `style` with a context created for this call alone.
	pub async fn render_once(&self, style: &str, level: u8, x: u32, y: u32) -> Result<Blob> {
		let options = self.tile_options(level, x, y);
		let mut context = self.registry.create_context(style, RenderMode::Tile).await?;
		let result = context.render(&options).await;
		drop(context);
		result.map_err(|e| e.context(format!("rendering tile {level}/{x}/{y} of '{style}'")))
	}

	/// Renders a free-form image of `style` with a pooled static-mode context.
	pub async fn render_static(&self, style: &str, request: &StaticRequest) -> Result<Blob> {
		let options = request.options()?;
		self.render_pooled(style, RenderMode::Static, &options).await
	}

	async fn render_pooled(&self, style: &str, mode: RenderMode, options: &RenderOptions) -> Result<Blob> {
		let pool = self.registry.get_pool(style, mode).await?;
		let mut context = pool.acquire().await?;
		match context.render(options).await {
			Ok(image) => {
				pool.release(context);
				Ok(image)
			}
			Err(err) => {
				pool.destroy(context);
				Err(err.context(format!(
					"rendering {mode} image of '{style}' at zoom {} around {:?}",
					options.zoom, options.center
				)))
			}
		}
	}
}
