use super::ByteRangeBackend;
use crate::{ObjectStoreConfig, location::StoreService};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use object_store::{ObjectStore, aws::AmazonS3Builder, gcp::GoogleCloudStorageBuilder, path::Path as ObjectPath};
use std::{fmt::Debug, sync::Arc};
use tessera_core::Blob;
use tessera_derive::context;

/// Hands out an object-store client per service and bucket.
///
/// Client construction and authentication live behind this trait so the rest of
/// the crate only ever sees an `Arc<dyn ObjectStore>`.
pub trait ObjectStoreProvider: Debug + Send + Sync {
	fn store(&self, service: StoreService, bucket: &str) -> Result<Arc<dyn ObjectStore>>;
}

/// Builds S3 and GCS clients from [`ObjectStoreConfig`] plus the standard
/// `AWS_*` and `GOOGLE_*` environment. One client is created per bucket and reused.
#[derive(Debug)]
pub struct CloudStoreProvider {
	config: ObjectStoreConfig,
	stores: DashMap<(StoreService, String), Arc<dyn ObjectStore>>,
}

impl CloudStoreProvider {
	pub fn new(config: ObjectStoreConfig) -> Self {
		Self {
			config,
			stores: DashMap::new(),
		}
	}

	#[context("building S3 client for bucket '{bucket}'")]
	fn build_s3(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
		let mut builder = AmazonS3Builder::from_env()
			.with_bucket_name(bucket)
			.with_region(&self.config.region);
		if let Some(endpoint) = &self.config.endpoint {
			builder = builder.with_endpoint(endpoint).with_allow_http(true);
		}
		log::debug!("creating S3 client for bucket '{bucket}' in region '{}'", self.config.region);
		Ok(Arc::new(builder.build()?))
	}

	#[context("building GCS client for bucket '{bucket}'")]
	fn build_gcs(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
		let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
		if let Some(path) = &self.config.gcs_service_account {
			builder = builder.with_service_account_path(path.to_string_lossy());
		}
		log::debug!("creating GCS client for bucket '{bucket}'");
		Ok(Arc::new(builder.build()?))
	}
}

impl ObjectStoreProvider for CloudStoreProvider {
	fn store(&self, service: StoreService, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
		let key = (service, bucket.to_string());
		if let Some(store) = self.stores.get(&key) {
			return Ok(store.clone());
		}
		let store = match service {
			StoreService::S3 => self.build_s3(bucket)?,
			StoreService::Gcs => self.build_gcs(bucket)?,
		};
		Ok(self.stores.entry(key).or_insert(store).clone())
	}
}

/// Reads ranges of one object with a ranged GET per call.
///
/// A missing object reads as empty. Any other failure is logged and also reads as
/// empty, so storage trouble shows up as a missing tile, never as a failed render.
#[derive(Debug)]
pub struct ObjectStoreBackend {
	name: String,
	store: Arc<dyn ObjectStore>,
	path: ObjectPath,
}

impl ObjectStoreBackend {
	pub fn new(store: Arc<dyn ObjectStore>, service: StoreService, bucket: &str, key: &str) -> Self {
		Self {
			name: format!("{service}://{bucket}/{key}"),
			store,
			path: ObjectPath::from(key),
		}
	}
}

#[async_trait]
impl ByteRangeBackend for ObjectStoreBackend {
	fn identify(&self) -> &str {
		&self.name
	}

	async fn read(&self, offset: u64, length: u64) -> Result<Blob> {
		if length == 0 {
			return Ok(Blob::new_empty());
		}
		let Some(end) = offset.checked_add(length) else {
			log::warn!("range of {length} bytes at offset {offset} in '{}' is out of bounds", self.name);
			return Ok(Blob::new_empty());
		};
		match self.store.get_range(&self.path, offset..end).await {
			Ok(bytes) => Ok(Blob::from(&*bytes)),
			Err(object_store::Error::NotFound { .. }) => {
				log::trace!("'{}' not found", self.name);
				Ok(Blob::new_empty())
			}
			Err(err) => {
				log::warn!("reading {length} bytes at offset {offset} from '{}' failed: {err}", self.name);
				Ok(Blob::new_empty())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use object_store::{PutPayload, memory::InMemory};

	async fn store_with(key: &str, data: &[u8]) -> Arc<dyn ObjectStore> {
		let store = InMemory::new();
		store
			.put(&ObjectPath::from(key), PutPayload::from(data.to_vec()))
			.await
			.unwrap();
		Arc::new(store)
	}

	#[tokio::test]
	async fn ranged_reads() -> Result<()> {
		let store = store_with("tiles/map.pmtiles", b"0123456789").await;
		let backend = ObjectStoreBackend::new(store, StoreService::S3, "bucket", "tiles/map.pmtiles");

		assert_eq!(backend.identify(), "s3://bucket/tiles/map.pmtiles");
		assert_eq!(backend.read(2, 3).await?.as_str(), "234");
		assert_eq!(backend.read(9, 1).await?.as_str(), "9");
		Ok(())
	}

	#[tokio::test]
	async fn missing_key_reads_empty() -> Result<()> {
		let store = store_with("other", b"x").await;
		let backend = ObjectStoreBackend::new(store, StoreService::S3, "bucket", "missing.pmtiles");
		assert!(backend.read(0, 127).await?.is_empty());
		Ok(())
	}

	#[tokio::test]
	async fn invalid_range_reads_empty() -> Result<()> {
		let store = store_with("small", b"abc").await;
		let backend = ObjectStoreBackend::new(store, StoreService::S3, "bucket", "small");
		assert!(backend.read(100, 10).await?.is_empty());
		assert!(backend.read(u64::MAX, 2).await?.is_empty());
		Ok(())
	}

	#[tokio::test]
	async fn gcs_objects_are_named_by_scheme() -> Result<()> {
		let store = store_with("map.pmtiles", b"abc").await;
		let backend = ObjectStoreBackend::new(store, StoreService::Gcs, "bucket", "map.pmtiles");
		assert_eq!(backend.identify(), "gs://bucket/map.pmtiles");
		assert_eq!(backend.read(1, 2).await?.as_str(), "bc");
		Ok(())
	}

	#[test]
	fn clients_are_reused_per_service_and_bucket() -> Result<()> {
		let provider = CloudStoreProvider::new(ObjectStoreConfig {
			region: String::from("eu-west-1"),
			endpoint: Some(String::from("http://localhost:9000")),
			..ObjectStoreConfig::default()
		});
		let a = provider.store(StoreService::S3, "tiles")?;
		let b = provider.store(StoreService::S3, "tiles")?;
		let c = provider.store(StoreService::S3, "styles")?;
		assert!(Arc::ptr_eq(&a, &b));
		assert!(!Arc::ptr_eq(&a, &c));

		let gcs = provider.store(StoreService::Gcs, "tiles")?;
		assert!(!Arc::ptr_eq(&a, &gcs));
		assert!(Arc::ptr_eq(&gcs, &provider.store(StoreService::Gcs, "tiles")?));
		Ok(())
	}

	#[test]
	fn missing_gcs_service_account_file_is_an_error() {
		let provider = CloudStoreProvider::new(ObjectStoreConfig {
			gcs_service_account: Some("/does/not/exist.json".into()),
			..ObjectStoreConfig::default()
		});
		let err = provider.store(StoreService::Gcs, "tiles").unwrap_err();
		assert!(err.to_string().starts_with("building GCS client for bucket 'tiles'"));
	}
}
