//! Fixtures for tests in this crate and its dependents (feature `test`).

use crate::{
	ObjectStoreProvider, ResourceLocation, StoreService,
	archive::{ArchiveHeader, Compression, DirEntry, Directory, HEADER_LENGTH},
};
use anyhow::{Result, bail};
use axum::{
	Router,
	extract::State,
	http::{HeaderMap, StatusCode, Uri, header},
	response::{IntoResponse, Response},
};
use dashmap::DashMap;
use object_store::{ObjectStore, PutPayload, memory::InMemory, path::Path as ObjectPath};
use reqwest::Url;
use std::{
	collections::{BTreeMap, HashMap},
	net::SocketAddr,
	path::Path,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
use tessera_core::{Blob, ByteRange, TileCoord};
use tokio::{net::TcpListener, task::JoinHandle};

/// A local HTTP server that serves fixed files and honours `Range` headers.
///
/// Every request is counted, so tests can assert that a cache spared a network read.
pub struct RangeServer {
	addr: SocketAddr,
	requests: Arc<AtomicUsize>,
	task: JoinHandle<()>,
}

#[derive(Clone)]
struct ServerState {
	files: Arc<HashMap<String, Blob>>,
	requests: Arc<AtomicUsize>,
}

impl RangeServer {
	pub async fn start(files: &[(&str, Blob)]) -> RangeServer {
		let requests = Arc::new(AtomicUsize::new(0));
		let state = ServerState {
			files: Arc::new(files.iter().map(|(p, b)| ((*p).to_string(), b.clone())).collect()),
			requests: requests.clone(),
		};
		let app = Router::new().fallback(serve_file).with_state(state);

		let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
		let addr = listener.local_addr().expect("test server address");
		let task = tokio::spawn(async move {
			axum::serve(listener, app).await.expect("test server failed");
		});

		RangeServer { addr, requests, task }
	}

	pub fn url(&self, path: &str) -> Url {
		Url::parse(&format!("http://{}{path}", self.addr)).expect("valid test URL")
	}

	pub fn request_count(&self) -> usize {
		self.requests.load(Ordering::SeqCst)
	}
}

impl Drop for RangeServer {
	fn drop(&mut self) {
		self.task.abort();
	}
}

async fn serve_file(State(state): State<ServerState>, uri: Uri, headers: HeaderMap) -> Response {
	state.requests.fetch_add(1, Ordering::SeqCst);

	let Some(blob) = state.files.get(uri.path()) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) else {
		return (StatusCode::OK, blob.as_slice().to_vec()).into_response();
	};

	let len = blob.len();
	let parsed = range.strip_prefix("bytes=").and_then(|r| {
		let (start, end) = r.split_once('-')?;
		Some((start.parse::<u64>().ok()?, end.parse::<u64>().ok()?))
	});
	match parsed {
		Some((start, end)) if start <= end && start < len => {
			let end = end.min(len - 1);
			let body = blob.as_slice()[start as usize..=end as usize].to_vec();
			(
				StatusCode::PARTIAL_CONTENT,
				[(header::CONTENT_RANGE, format!("bytes {start}-{end}/{len}"))],
				body,
			)
				.into_response()
		}
		_ => (
			StatusCode::RANGE_NOT_SATISFIABLE,
			[(header::CONTENT_RANGE, format!("bytes */{len}"))],
		)
			.into_response(),
	}
}

/// Writes small PMTiles v3 archives.
///
/// Tiles are stored one entry each, in tile-id order. With [`leaf_size`](Self::leaf_size)
/// set, all entries go into leaf directories of that many entries and the root only
/// points at leaves.
pub struct ArchiveBuilder {
	tiles: BTreeMap<u64, (TileCoord, Blob)>,
	internal_compression: Compression,
	leaf_size: Option<usize>,
}

impl Default for ArchiveBuilder {
	fn default() -> Self {
		ArchiveBuilder {
			tiles: BTreeMap::new(),
			internal_compression: Compression::None,
			leaf_size: None,
		}
	}
}

impl ArchiveBuilder {
	pub fn new() -> ArchiveBuilder {
		ArchiveBuilder::default()
	}

	#[must_use]
	pub fn tile(mut self, coord: TileCoord, data: impl Into<Blob>) -> Self {
		let id = coord.hilbert_index().expect("valid tile coordinate");
		self.tiles.insert(id, (coord, data.into()));
		self
	}

	#[must_use]
	pub fn internal_compression(mut self, compression: Compression) -> Self {
		self.internal_compression = compression;
		self
	}

	#[must_use]
	pub fn leaf_size(mut self, entries: usize) -> Self {
		self.leaf_size = Some(entries.max(1));
		self
	}

	pub fn build(&self) -> Result<Blob> {
		let mut tile_data: Vec<u8> = Vec::new();
		let mut entries = Vec::with_capacity(self.tiles.len());
		for (id, (_, blob)) in &self.tiles {
			entries.push(DirEntry::new(*id, tile_data.len() as u64, blob.len(), 1));
			tile_data.extend_from_slice(blob.as_slice());
		}

		let compress = |dir: Directory| self.internal_compression.compress(dir.serialize());
		let mut leaves: Vec<u8> = Vec::new();
		let root = match self.leaf_size {
			None => compress(Directory::new(entries))?,
			Some(size) => {
				let mut pointers = Vec::new();
				for chunk in entries.chunks(size) {
					let leaf = compress(Directory::new(chunk.to_vec()))?;
					pointers.push(DirEntry::new(chunk[0].tile_id, leaves.len() as u64, leaf.len(), 0));
					leaves.extend_from_slice(leaf.as_slice());
				}
				compress(Directory::new(pointers))?
			}
		};
		let metadata = self.internal_compression.compress(Blob::from("{}"))?;

		let root_dir = ByteRange::new(HEADER_LENGTH, root.len());
		let metadata_range = ByteRange::new(root_dir.offset + root_dir.length, metadata.len());
		let leaf_dirs = ByteRange::new(metadata_range.offset + metadata_range.length, leaves.len() as u64);
		let tile_data_range = ByteRange::new(leaf_dirs.offset + leaf_dirs.length, tile_data.len() as u64);

		let levels = self.tiles.values().map(|(coord, _)| coord.level);
		let count = self.tiles.len() as u64;
		let header = ArchiveHeader {
			root_dir,
			metadata: metadata_range,
			leaf_dirs,
			tile_data: tile_data_range,
			addressed_tiles_count: count,
			tile_entries_count: count,
			tile_contents_count: count,
			clustered: true,
			internal_compression: self.internal_compression,
			min_zoom: levels.clone().min().unwrap_or(0),
			max_zoom: levels.max().unwrap_or(0),
			..ArchiveHeader::default()
		};

		let mut out = header.serialize()?.into_vec();
		out.extend_from_slice(root.as_slice());
		out.extend_from_slice(metadata.as_slice());
		out.extend_from_slice(&leaves);
		out.extend_from_slice(&tile_data);
		Ok(Blob::from(out))
	}

	pub fn write_to(&self, path: &Path) -> Result<()> {
		std::fs::write(path, self.build()?.as_slice())?;
		Ok(())
	}
}

/// Object storage backed by one [`InMemory`] store per service and bucket.
#[derive(Debug, Default)]
pub struct MemoryStoreProvider {
	buckets: DashMap<(StoreService, String), Arc<InMemory>>,
}

impl MemoryStoreProvider {
	/// Stores `blob` under an object URI such as `s3://bucket/key` or `gs://bucket/key`.
	pub async fn put(&self, uri: &str, blob: Blob) -> Result<()> {
		let ResourceLocation::ObjectStore { service, bucket, key } = ResourceLocation::parse(uri)? else {
			bail!("'{uri}' is not an object storage URI");
		};
		self
			.bucket(service, &bucket)
			.put(&ObjectPath::from(key), PutPayload::from(blob.into_vec()))
			.await?;
		Ok(())
	}

	fn bucket(&self, service: StoreService, bucket: &str) -> Arc<InMemory> {
		self
			.buckets
			.entry((service, bucket.to_string()))
			.or_insert_with(|| Arc::new(InMemory::new()))
			.clone()
	}
}

impl ObjectStoreProvider for MemoryStoreProvider {
	fn store(&self, service: StoreService, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
		Ok(self.bucket(service, bucket))
	}
}
