use crate::{ArchiveManager, FetchConfig, ObjectStoreProvider, ResourceLocation, StoreService};
use anyhow::Result;
use object_store::{ObjectStore, path::Path as ObjectPath};
use reqwest::{Client, Url};
use std::{path::Path, sync::Arc};
use tessera_core::{Blob, TileCache};
use tokio::time::timeout;

/// Turns any resource URI into bytes.
///
/// Absent resources and transport failures both come back as `Ok(None)` after
/// being logged. `Err` is reserved for URIs that cannot be routed at all and for
/// object-storage clients that cannot be built.
#[derive(Debug)]
pub struct SourceResolver {
	client: Client,
	archives: ArchiveManager,
	object_stores: Arc<dyn ObjectStoreProvider>,
	config: FetchConfig,
}

impl SourceResolver {
	pub fn new(object_stores: Arc<dyn ObjectStoreProvider>, config: FetchConfig) -> Result<SourceResolver> {
		let client = Client::builder()
			.user_agent(concat!("tessera/", env!("CARGO_PKG_VERSION")))
			.build()?;
		let archives = ArchiveManager::new(client.clone(), object_stores.clone(), &config);
		Ok(SourceResolver {
			client,
			archives,
			object_stores,
			config,
		})
	}

	pub fn archives(&self) -> &ArchiveManager {
		&self.archives
	}

	/// Fetches `uri`, bounded by the configured fetch timeout.
	///
	/// `cache` is only consulted for tiles of HTTP-hosted archives; callers cache everything else themselves.
	pub async fn fetch(&self, uri: &str, cache: &dyn TileCache) -> Result<Option<Blob>> {
		let location = ResourceLocation::parse(uri)?;
		match timeout(self.config.timeout(), self.fetch_location(uri, &location, cache)).await {
			Ok(result) => result,
			Err(_) => {
				log::warn!("fetching '{uri}' timed out after {:?}", self.config.timeout());
				Ok(None)
			}
		}
	}

	async fn fetch_location(&self, uri: &str, location: &ResourceLocation, cache: &dyn TileCache) -> Result<Option<Blob>> {
		match location {
			ResourceLocation::Path(path) => Ok(read_file(path).await),
			ResourceLocation::Http(url) => Ok(self.get_http(url).await),
			ResourceLocation::ObjectStore { service, bucket, key } => {
				let store = self.object_stores.store(*service, bucket)?;
				Ok(get_object(store.as_ref(), *service, bucket, key).await)
			}
			ResourceLocation::Archive { archive, inner, coord } => {
				self.archives.get_tile(uri, archive, inner, coord, cache).await
			}
		}
	}

	async fn get_http(&self, url: &Url) -> Option<Blob> {
		let response = match self.client.get(url.clone()).send().await {
			Ok(response) => response,
			Err(err) => {
				log::warn!("GET {url} failed: {err}");
				return None;
			}
		};
		if !response.status().is_success() {
			log::debug!("GET {url} returned {}", response.status());
			return None;
		}
		match response.bytes().await {
			Ok(bytes) => Some(Blob::from(&*bytes)),
			Err(err) => {
				log::warn!("reading body of {url} failed: {err}");
				None
			}
		}
	}
}

async fn read_file(path: &Path) -> Option<Blob> {
	match tokio::fs::read(path).await {
		Ok(data) => Some(Blob::from(data)),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
			log::debug!("file {path:?} not found");
			None
		}
		Err(err) => {
			log::warn!("reading {path:?} failed: {err}");
			None
		}
	}
}

async fn get_object(store: &dyn ObjectStore, service: StoreService, bucket: &str, key: &str) -> Option<Blob> {
	let result = match store.get(&ObjectPath::from(key)).await {
		Ok(result) => result.bytes().await,
		Err(err) => Err(err),
	};
	match result {
		Ok(bytes) => Some(Blob::from(&*bytes)),
		Err(object_store::Error::NotFound { .. }) => {
			log::debug!("object {service}://{bucket}/{key} not found");
			None
		}
		Err(err) => {
			log::warn!("reading object {service}://{bucket}/{key} failed: {err}");
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{ArchiveBuilder, MemoryStoreProvider, RangeServer};
	use assert_fs::{TempDir, prelude::*};
	use tessera_core::{NoCache, TileCoord};
	use tokio::net::TcpListener;

	fn resolver(stores: MemoryStoreProvider) -> SourceResolver {
		SourceResolver::new(Arc::new(stores), FetchConfig::default()).unwrap()
	}

	#[tokio::test]
	async fn reads_local_files() -> Result<()> {
		let dir = TempDir::new()?;
		dir.child("style.json").write_str("{\"version\":8}")?;
		let resolver = resolver(MemoryStoreProvider::default());

		let path = dir.path().join("style.json");
		let blob = resolver.fetch(&path.display().to_string(), &NoCache).await?;
		assert_eq!(blob, Some(Blob::from("{\"version\":8}")));

		let uri = format!("file://{}", path.display());
		assert_eq!(resolver.fetch(&uri, &NoCache).await?, blob);

		let missing = dir.path().join("missing.json");
		assert_eq!(resolver.fetch(&missing.display().to_string(), &NoCache).await?, None);
		Ok(())
	}

	#[tokio::test]
	async fn fetches_over_http() -> Result<()> {
		let server = RangeServer::start(&[("/sprite.png", Blob::from("png bytes"))]).await;
		let resolver = resolver(MemoryStoreProvider::default());

		let found = resolver.fetch(server.url("/sprite.png").as_str(), &NoCache).await?;
		assert_eq!(found, Some(Blob::from("png bytes")));

		let missing = resolver.fetch(server.url("/missing.png").as_str(), &NoCache).await?;
		assert_eq!(missing, None);
		Ok(())
	}

	#[tokio::test]
	async fn unreachable_host_is_absent() -> Result<()> {
		let resolver = resolver(MemoryStoreProvider::default());
		// port 9 (discard) is closed on test machines
		assert_eq!(resolver.fetch("http://127.0.0.1:9/style.json", &NoCache).await?, None);
		Ok(())
	}

	#[tokio::test]
	async fn hung_fetch_times_out() -> Result<()> {
		let listener = TcpListener::bind("127.0.0.1:0").await?;
		let addr = listener.local_addr()?;
		let _hold = tokio::spawn(async move {
			let mut sockets = Vec::new();
			while let Ok((socket, _)) = listener.accept().await {
				sockets.push(socket);
			}
		});

		let config = FetchConfig {
			timeout_secs: 1,
			..FetchConfig::default()
		};
		let resolver = SourceResolver::new(Arc::new(MemoryStoreProvider::default()), config)?;
		assert_eq!(resolver.fetch(&format!("http://{addr}/slow.json"), &NoCache).await?, None);
		Ok(())
	}

	#[tokio::test]
	async fn reads_objects() -> Result<()> {
		let stores = MemoryStoreProvider::default();
		stores.put("s3://styles/basic/style.json", Blob::from("{}")).await?;
		stores.put("gs://styles/basic/style.json", Blob::from("{\"gcs\":true}")).await?;
		let resolver = resolver(stores);

		assert_eq!(
			resolver.fetch("s3://styles/basic/style.json", &NoCache).await?,
			Some(Blob::from("{}"))
		);
		assert_eq!(
			resolver.fetch("objectstore://styles/basic/style.json", &NoCache).await?,
			Some(Blob::from("{}"))
		);
		assert_eq!(resolver.fetch("s3://styles/other.json", &NoCache).await?, None);
		assert_eq!(
			resolver.fetch("gs://styles/basic/style.json", &NoCache).await?,
			Some(Blob::from("{\"gcs\":true}"))
		);
		assert_eq!(resolver.fetch("gs://styles/other.json", &NoCache).await?, None);
		Ok(())
	}

	#[tokio::test]
	async fn dispatches_archive_tiles() -> Result<()> {
		let dir = TempDir::new()?;
		let path = dir.path().join("map.pmtiles");
		ArchiveBuilder::new()
			.tile(TileCoord::new(3, 2, 1)?, "archived")
			.write_to(&path)?;
		let resolver = resolver(MemoryStoreProvider::default());

		let uri = format!("pmtiles://{}/3/2/1", path.display());
		assert_eq!(resolver.fetch(&uri, &NoCache).await?, Some(Blob::from("archived")));
		assert_eq!(resolver.archives().len(), 1);
		Ok(())
	}

	#[tokio::test]
	async fn malformed_uris_are_errors() {
		let resolver = resolver(MemoryStoreProvider::default());
		assert!(resolver.fetch("gopher://old.net/style", &NoCache).await.is_err());
		assert!(resolver.fetch("pmtiles://map.pmtiles", &NoCache).await.is_err());
	}
}
