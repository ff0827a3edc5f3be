mod blob;
mod byte_range;
mod tile_coord;

pub use blob::Blob;
pub use byte_range::ByteRange;
pub use tile_coord::{TileCoord, pixel_to_lonlat};
