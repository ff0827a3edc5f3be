//! Tile coordinates in the Web Mercator quadtree.
//!
//! Besides the plain `(level, x, y)` triple this module knows two projections the
//! rest of the workspace needs: the Hilbert curve index used by tile archives to
//! address tiles, and the spherical-mercator pixel to longitude/latitude
//! conversion used to centre a render on a tile.

use anyhow::{Result, ensure};
use std::{
	f64::consts::PI,
	fmt::{self, Debug},
};

/// A tile address: zoom `level` plus column `x` and row `y`.
#[derive(Eq, PartialEq, Clone, Copy, Hash)]
pub struct TileCoord {
	pub level: u8,
	pub x: u32,
	pub y: u32,
}

impl TileCoord {
	/// Creates a coordinate, checking `level <= 31` and `x, y < 2^level`.
	pub fn new(level: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(level <= 31, "level ({level}) must be <= 31");
		let max = 1u32 << level;
		ensure!(x < max, "x ({x}) out of bounds for level {level}");
		ensure!(y < max, "y ({y}) out of bounds for level {level}");
		Ok(TileCoord { level, x, y })
	}

	/// Position of the tile on the Hilbert curve across all levels, as used by PMTiles.
	///
	/// All tiles of lower levels come first, so level 0 is id 0 and level 1 starts at id 1.
	pub fn hilbert_index(&self) -> Result<u64> {
		ensure!(self.level <= 31, "level ({}) must be <= 31", self.level);
		let n = 1u64 << self.level;
		ensure!(
			u64::from(self.x) < n && u64::from(self.y) < n,
			"tile {self:?} is outside of its level"
		);

		// number of tiles on all lower levels: (4^level - 1) / 3
		let base = ((1u64 << (2 * u64::from(self.level))) - 1) / 3;

		let mut x = u64::from(self.x);
		let mut y = u64::from(self.y);
		let mut d: u64 = 0;
		let mut s = n / 2;
		while s > 0 {
			let rx = u64::from(x & s > 0);
			let ry = u64::from(y & s > 0);
			d += s * s * ((3 * rx) ^ ry);
			if ry == 0 {
				if rx == 1 {
					x = s - 1 - (x & (s - 1));
					y = s - 1 - (y & (s - 1));
				}
				std::mem::swap(&mut x, &mut y);
			}
			s /= 2;
		}

		Ok(base + d)
	}

	/// Longitude/latitude of the tile's centre pixel for tiles of `tile_size` pixels.
	#[must_use]
	pub fn center(&self, tile_size: u32) -> [f64; 2] {
		let size = f64::from(tile_size);
		let px = size / 2.0 + f64::from(self.x) * size;
		let py = size / 2.0 + f64::from(self.y) * size;
		pixel_to_lonlat(px, py, self.level, tile_size)
	}
}

/// Converts a global pixel position at `zoom` into `[longitude, latitude]` degrees.
///
/// The world is `tile_size * 2^zoom` pixels wide, with the origin in the north-west corner.
#[must_use]
pub fn pixel_to_lonlat(px: f64, py: f64, zoom: u8, tile_size: u32) -> [f64; 2] {
	let world = f64::from(tile_size) * 2f64.powi(i32::from(zoom));
	let lon = px / world * 360.0 - 180.0;
	let g = PI * (1.0 - 2.0 * py / world);
	let lat = (2.0 * g.exp().atan() - PI / 2.0).to_degrees();
	[lon, lat]
}

impl Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.level, self.x, self.y)
	}
}
