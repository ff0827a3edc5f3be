use super::ArchiveHandle;
use crate::{
	FetchConfig, ResourceLocation,
	backend::{ByteRangeBackend, FileBackend, HttpBackend, ObjectStoreBackend, ObjectStoreProvider},
};
use anyhow::{Result, bail};
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Client;
use std::{num::NonZeroUsize, sync::Arc};
use tessera_core::{Blob, TileCache, TileCoord};
use tokio::sync::OnceCell;

type HandleCell = Arc<OnceCell<Arc<ArchiveHandle>>>;

/// Maximum number of archives kept open at the same time.
pub const ARCHIVE_HANDLE_CAPACITY: usize = 50;

/// Owns every open archive handle, keyed by archive location.
///
/// At most [`ARCHIVE_HANDLE_CAPACITY`] handles are kept; opening one more evicts
/// the least recently used. Concurrent first requests for the same archive share
/// one handle.
pub struct ArchiveManager {
	handles: Mutex<LruCache<String, HandleCell>>,
	client: Client,
	object_stores: Arc<dyn ObjectStoreProvider>,
	http_retries: u32,
}

impl ArchiveManager {
	pub fn new(client: Client, object_stores: Arc<dyn ObjectStoreProvider>, fetch: &FetchConfig) -> ArchiveManager {
		let capacity = NonZeroUsize::new(ARCHIVE_HANDLE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
		ArchiveManager {
			handles: Mutex::new(LruCache::new(capacity)),
			client,
			object_stores,
			http_retries: fetch.http_retries,
		}
	}

	/// Extracts one tile from the archive at `archive`, which `inner` is the parsed form of.
	///
	/// Archives read over HTTP are cached under `uri`, the full tile URI. Missing
	/// archives, missing tiles and read failures all yield `None`; only backend
	/// configuration problems are errors.
	pub async fn get_tile(
		&self,
		uri: &str,
		archive: &str,
		inner: &ResourceLocation,
		coord: &TileCoord,
		cache: &dyn TileCache,
	) -> Result<Option<Blob>> {
		let cached = matches!(inner, ResourceLocation::Http(_));
		if cached && let Some(blob) = cache.get(uri).await {
			log::trace!("'{uri}' served from {} cache", cache.name());
			return Ok(Some(blob));
		}

		let Some(handle) = self.handle(archive, inner).await? else {
			return Ok(None);
		};

		let tile = match handle.get_tile(coord).await {
			Ok(tile) => tile,
			Err(err) => {
				log::warn!("reading {coord:?} from archive '{archive}' failed: {err:#}");
				return Ok(None);
			}
		};

		if cached && let Some(blob) = &tile {
			cache.set(uri, blob.clone()).await;
		}
		Ok(tile)
	}

	/// The handle for `archive`, opened on first use.
	///
	/// The lock is only held to find or insert the handle's cell. Opening the
	/// backend happens outside of it, and concurrent first requests for the same
	/// archive wait on the same cell.
	async fn handle(&self, archive: &str, inner: &ResourceLocation) -> Result<Option<Arc<ArchiveHandle>>> {
		let cell = self.cell(archive);
		let opened = cell
			.get_or_try_init(|| async {
				match self.open_backend(inner).await {
					Ok(Some(backend)) => Ok(Arc::new(ArchiveHandle::new(archive, backend))),
					Ok(None) => Err(None),
					Err(err) => Err(Some(err)),
				}
			})
			.await;

		match opened {
			Ok(handle) => Ok(Some(handle.clone())),
			Err(err) => {
				self.forget_unopened(archive, &cell);
				err.map_or(Ok(None), Err)
			}
		}
	}

	fn cell(&self, archive: &str) -> HandleCell {
		let mut handles = self.handles.lock();
		if let Some(cell) = handles.get(archive) {
			return cell.clone();
		}
		let cell = HandleCell::default();
		if let Some((evicted, _)) = handles.push(archive.to_string(), cell.clone()) {
			log::debug!("closed least recently used archive '{evicted}'");
		}
		log::debug!("opening archive '{archive}' ({} open)", handles.len());
		cell
	}

	/// Drops the cell of an archive that could not be opened, so the next request tries again.
	fn forget_unopened(&self, archive: &str, cell: &HandleCell) {
		let mut handles = self.handles.lock();
		if handles
			.peek(archive)
			.is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized())
		{
			handles.pop(archive);
		}
	}

	async fn open_backend(&self, inner: &ResourceLocation) -> Result<Option<Arc<dyn ByteRangeBackend>>> {
		let backend: Arc<dyn ByteRangeBackend> = match inner {
			ResourceLocation::Path(path) => {
				let path = path.clone();
				match tokio::task::spawn_blocking(move || FileBackend::open(&path)).await? {
					Ok(backend) => Arc::new(backend),
					Err(err) => {
						log::warn!("{err:#}");
						return Ok(None);
					}
				}
			}
			ResourceLocation::Http(url) => Arc::new(HttpBackend::new(
				self.client.clone(),
				url.clone(),
				self.http_retries,
			)?),
			ResourceLocation::ObjectStore { service, bucket, key } => {
				let object_stores = self.object_stores.clone();
				let (service, bucket_name) = (*service, bucket.clone());
				let store = tokio::task::spawn_blocking(move || object_stores.store(service, &bucket_name)).await??;
				Arc::new(ObjectStoreBackend::new(store, service, bucket, key))
			}
			ResourceLocation::Archive { archive, .. } => bail!("archive '{archive}' cannot be nested in another archive"),
		};
		Ok(Some(backend))
	}

	pub fn len(&self) -> usize {
		self.handles.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.handles.lock().is_empty()
	}

	/// Whether a handle for `archive` is open, without touching its recency.
	pub fn contains(&self, archive: &str) -> bool {
		self.handles.lock().peek(archive).is_some_and(|cell| cell.initialized())
	}

	pub fn clear(&self) {
		let mut handles = self.handles.lock();
		log::debug!("closing {} archives", handles.len());
		handles.clear();
	}
}

impl std::fmt::Debug for ArchiveManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ArchiveManager")
			.field("open", &self.len())
			.field("capacity", &ARCHIVE_HANDLE_CAPACITY)
			.finish()
	}
}
