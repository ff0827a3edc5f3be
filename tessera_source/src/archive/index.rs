use super::{ArchiveHeader, Directory, header::HEADER_LENGTH};
use crate::backend::ByteRangeBackend;
use anyhow::{Result, anyhow, bail, ensure};
use lru::LruCache;
use parking_lot::Mutex;
use std::{num::NonZeroUsize, sync::Arc};
use tessera_core::{ByteRange, TileCoord};
use tessera_derive::context;

/// Root directory plus at most three levels of leaves.
const MAX_DEPTH: usize = 4;

const LEAF_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(64).unwrap();

/// The parsed header and root directory of one archive.
///
/// Leaf directories are read on demand through the archive's backend and kept
/// in a small LRU cache.
#[derive(Debug)]
pub struct ArchiveIndex {
	header: ArchiveHeader,
	root: Arc<Directory>,
	leaves: Mutex<LruCache<ByteRange, Arc<Directory>>>,
}

impl ArchiveIndex {
	#[context("loading archive index of '{}'", backend.identify())]
	pub async fn load(backend: &dyn ByteRangeBackend) -> Result<ArchiveIndex> {
		let blob = backend.read(0, HEADER_LENGTH).await?;
		ensure!(!blob.is_empty(), "archive is empty or missing");
		let header = ArchiveHeader::deserialize(&blob)?;
		log::trace!("archive header of '{}': {header:?}", backend.identify());

		let root = backend.read(header.root_dir.offset, header.root_dir.length).await?;
		let root = Directory::from_blob(&header.internal_compression.decompress(&root)?)?;
		log::debug!(
			"opened archive '{}' with {} root entries",
			backend.identify(),
			root.len()
		);

		Ok(ArchiveIndex {
			header,
			root: Arc::new(root),
			leaves: Mutex::new(LruCache::new(LEAF_CACHE_CAPACITY)),
		})
	}

	pub fn header(&self) -> &ArchiveHeader {
		&self.header
	}

	/// Maps a coordinate to the absolute byte range of its tile, `None` if the archive has no such tile.
	pub async fn locate(&self, coord: &TileCoord, backend: &dyn ByteRangeBackend) -> Result<Option<ByteRange>> {
		let tile_id = coord.hilbert_index()?;
		let mut directory = self.root.clone();

		for _ in 0..MAX_DEPTH {
			let Some(entry) = directory.find_tile(tile_id) else {
				return Ok(None);
			};
			if entry.range.length == 0 {
				return Ok(None);
			}
			if !entry.is_leaf() {
				let range = entry
					.range
					.shifted_forward(self.header.tile_data.offset)
					.ok_or_else(|| anyhow!("tile {coord:?} has an out-of-bounds range {}", entry.range))?;
				return Ok(Some(range));
			}
			directory = self.leaf(entry.range, backend).await?;
		}

		bail!("tile {coord:?} is nested deeper than {MAX_DEPTH} directory levels")
	}

	async fn leaf(&self, range: ByteRange, backend: &dyn ByteRangeBackend) -> Result<Arc<Directory>> {
		if let Some(directory) = self.leaves.lock().get(&range) {
			return Ok(directory.clone());
		}

		let absolute = range
			.shifted_forward(self.header.leaf_dirs.offset)
			.ok_or_else(|| anyhow!("leaf directory {range} is out of bounds"))?;
		let blob = backend.read(absolute.offset, absolute.length).await?;
		ensure!(
			blob.len() == absolute.length,
			"leaf directory {absolute} is truncated ({} bytes read)",
			blob.len()
		);
		let directory = Arc::new(Directory::from_blob(
			&self.header.internal_compression.decompress(&blob)?,
		)?);

		self.leaves.lock().put(range, directory.clone());
		Ok(directory)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{archive::Compression, backend::FileBackend, testing::ArchiveBuilder};
	use assert_fs::NamedTempFile;
	use tessera_core::Blob;

	fn tile(z: u8, x: u32, y: u32) -> TileCoord {
		TileCoord::new(z, x, y).unwrap()
	}

	async fn read(index: &ArchiveIndex, backend: &FileBackend, coord: TileCoord) -> Result<Option<Blob>> {
		Ok(match index.locate(&coord, backend).await? {
			Some(range) => Some(backend.read(range.offset, range.length).await?),
			None => None,
		})
	}

	#[tokio::test]
	async fn locates_tiles_in_root_directory() -> Result<()> {
		let file = NamedTempFile::new("root.pmtiles")?;
		ArchiveBuilder::new()
			.tile(tile(0, 0, 0), "world")
			.tile(tile(3, 2, 1), "three-two-one")
			.write_to(file.path())?;

		let backend = FileBackend::open(file.path())?;
		let index = ArchiveIndex::load(&backend).await?;
		assert_eq!(index.header().tile_entries_count, 2);

		assert_eq!(read(&index, &backend, tile(0, 0, 0)).await?, Some(Blob::from("world")));
		assert_eq!(read(&index, &backend, tile(3, 2, 1)).await?, Some(Blob::from("three-two-one")));
		assert_eq!(read(&index, &backend, tile(3, 2, 2)).await?, None);
		assert_eq!(read(&index, &backend, tile(14, 0, 0)).await?, None);
		Ok(())
	}

	#[tokio::test]
	async fn follows_compressed_leaf_directories() -> Result<()> {
		let file = NamedTempFile::new("leaves.pmtiles")?;
		let mut builder = ArchiveBuilder::new()
			.internal_compression(Compression::Gzip)
			.leaf_size(4);
		for x in 0..16 {
			builder = builder.tile(tile(4, x, 7), format!("tile {x}"));
		}
		builder.write_to(file.path())?;

		let backend = FileBackend::open(file.path())?;
		let index = ArchiveIndex::load(&backend).await?;
		assert!(index.header().leaf_dirs.length > 0);

		for x in [0, 3, 4, 9, 15] {
			assert_eq!(
				read(&index, &backend, tile(4, x, 7)).await?,
				Some(Blob::from(format!("tile {x}")))
			);
		}
		assert_eq!(read(&index, &backend, tile(4, 0, 8)).await?, None);
		assert!(!index.leaves.lock().is_empty());
		Ok(())
	}

	#[tokio::test]
	async fn rejects_non_archives() -> Result<()> {
		let file = NamedTempFile::new("style.json")?;
		std::fs::write(file.path(), "{\"version\":8}".repeat(20))?;
		let backend = FileBackend::open(file.path())?;
		let err = ArchiveIndex::load(&backend).await.unwrap_err();
		assert!(format!("{err:#}").contains("archive magic number mismatch"));
		Ok(())
	}
}
