//! Tile archives: a single file holding many tiles plus an index for random access.
//!
//! The index format is PMTiles v3. [`ArchiveIndex`] maps a [`TileCoord`](tessera_core::TileCoord)
//! to a byte range and only ever talks to a [`ByteRangeBackend`](crate::ByteRangeBackend).
//! [`ArchiveManager`] keeps a bounded set of open [`ArchiveHandle`]s and picks the backend
//! for each archive from its location.

mod compression;
mod directory;
mod handle;
mod header;
mod index;
mod manager;

pub use compression::Compression;
pub use directory::{DirEntry, Directory};
pub use handle::ArchiveHandle;
pub use header::{ArchiveHeader, HEADER_LENGTH};
pub use index::ArchiveIndex;
pub use manager::{ARCHIVE_HANDLE_CAPACITY, ArchiveManager};
