use super::ArchiveIndex;
use crate::backend::ByteRangeBackend;
use anyhow::Result;
use std::sync::Arc;
use tessera_core::{Blob, TileCoord};
use tokio::sync::OnceCell;

/// An open archive: its location, the backend it is read through, and its index once loaded.
///
/// The index is loaded on the first tile request. A failed load is not memoised,
/// the next request tries again.
#[derive(Debug)]
pub struct ArchiveHandle {
	location: String,
	backend: Arc<dyn ByteRangeBackend>,
	index: OnceCell<ArchiveIndex>,
}

impl ArchiveHandle {
	pub fn new(location: &str, backend: Arc<dyn ByteRangeBackend>) -> ArchiveHandle {
		ArchiveHandle {
			location: location.to_string(),
			backend,
			index: OnceCell::new(),
		}
	}

	/// Raw payload of one tile; `None` if the archive has no entry for `coord`.
	pub async fn get_tile(&self, coord: &TileCoord) -> Result<Option<Blob>> {
		let backend = self.backend.as_ref();
		let index = self.index.get_or_try_init(|| ArchiveIndex::load(backend)).await?;

		let Some(range) = index.locate(coord, backend).await? else {
			log::trace!("{coord:?} not in archive '{}'", self.location);
			return Ok(None);
		};

		let blob = backend.read(range.offset, range.length).await?;
		Ok(if blob.is_empty() { None } else { Some(blob) })
	}
}
