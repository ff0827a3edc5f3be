use crate::{
	engine::{ResourceCallback, ResourceHandler, ResourceRequest},
	placeholder,
};
use std::sync::Arc;
use tessera_core::{Blob, TileCache};
use tessera_source::SourceResolver;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Vector tiles shorter than this are handed to the engine as empty buffers.
pub const MIN_VECTOR_TILE_SIZE: u64 = 512;

const VECTOR_TILE_EXTENSIONS: [&str; 2] = ["pbf", "mvt"];

/// Serves the engine's resource requests from the cache and the source resolver.
///
/// Every request is answered, and answered once. Whatever cannot be fetched is
/// replaced: raster images by a transparent placeholder, everything else by an
/// empty buffer. Vector tiles below [`MIN_VECTOR_TILE_SIZE`] are replaced by an
/// empty buffer even when the fetch succeeded.
#[derive(Clone)]
pub struct ResourceInterceptor {
	cache: Arc<dyn TileCache>,
	resolver: Arc<SourceResolver>,
	runtime: Handle,
	cancel: CancellationToken,
	min_vector_tile_size: u64,
}

impl ResourceInterceptor {
	pub fn new(
		cache: Arc<dyn TileCache>,
		resolver: Arc<SourceResolver>,
		runtime: Handle,
		cancel: CancellationToken,
		min_vector_tile_size: u64,
	) -> ResourceInterceptor {
		ResourceInterceptor {
			cache,
			resolver,
			runtime,
			cancel,
			min_vector_tile_size,
		}
	}

	/// The bytes handed to the engine for `url`.
	pub async fn resolve(&self, url: &str) -> Blob {
		let extension = placeholder::extension(url);
		let fetched = tokio::select! {
			biased;
			() = self.cancel.cancelled() => {
				log::debug!("fetch of '{url}' cancelled");
				None
			}
			blob = self.fetch(url) => blob,
		};

		match (fetched, extension.as_deref()) {
			(Some(blob), Some(ext)) if VECTOR_TILE_EXTENSIONS.contains(&ext) && blob.len() < self.min_vector_tile_size => {
				log::debug!(
					"dropping {} byte vector tile '{url}' (minimum {})",
					blob.len(),
					self.min_vector_tile_size
				);
				Blob::new_empty()
			}
			(Some(blob), _) => blob,
			(None, _) => substitute(url),
		}
	}

	async fn fetch(&self, url: &str) -> Option<Blob> {
		if let Some(blob) = self.cache.get(url).await {
			return Some(blob);
		}
		match self.resolver.fetch(url, self.cache.as_ref()).await {
			Ok(Some(blob)) => {
				self.cache.set(url, blob.clone()).await;
				Some(blob)
			}
			Ok(None) => {
				log::debug!("resource '{url}' not found");
				None
			}
			Err(err) => {
				log::warn!("resource '{url}' cannot be fetched: {err:#}");
				None
			}
		}
	}
}

/// The stand-in for a resource that could not be fetched.
fn substitute(url: &str) -> Blob {
	match placeholder::extension(url).as_deref().and_then(placeholder::for_extension) {
		Some(bytes) => {
			log::debug!("substituting placeholder for '{url}'");
			Blob::from(bytes)
		}
		None => Blob::new_empty(),
	}
}

/// Owns a pending callback and answers it with the substitute if it is dropped unanswered.
///
/// The fetch task may be dropped before it finishes: it panicked, or the runtime
/// shut down before or while running it.
struct PendingAnswer {
	url: String,
	callback: Option<ResourceCallback>,
}

impl PendingAnswer {
	fn new(url: &str, callback: ResourceCallback) -> Self {
		PendingAnswer {
			url: url.to_string(),
			callback: Some(callback),
		}
	}

	fn answer(mut self, blob: Blob) {
		if let Some(callback) = self.callback.take() {
			callback(blob);
		}
	}
}

impl Drop for PendingAnswer {
	fn drop(&mut self) {
		if let Some(callback) = self.callback.take() {
			log::debug!("request for '{}' dropped before it was answered", self.url);
			callback(substitute(&self.url));
		}
	}
}

impl ResourceHandler for ResourceInterceptor {
	fn request(&self, request: ResourceRequest, callback: ResourceCallback) {
		let this = self.clone();
		let pending = PendingAnswer::new(&request.url, callback);
		self.runtime.spawn(async move {
			let blob = this.resolve(&request.url).await;
			pending.answer(blob);
		});
	}
}

impl std::fmt::Debug for ResourceInterceptor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResourceInterceptor")
			.field("cache", &self.cache.name())
			.field("min_vector_tile_size", &self.min_vector_tile_size)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::placeholder::{BLANK_JPEG, TRANSPARENT_PNG, TRANSPARENT_WEBP};
	use assert_fs::{TempDir, prelude::*};
	use rstest::rstest;
	use tessera_core::{MemoryCache, NoCache};
	use tessera_source::{FetchConfig, testing::MemoryStoreProvider};
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		mpsc,
	};
	use tokio::sync::oneshot;

	fn interceptor(cache: Arc<dyn TileCache>) -> ResourceInterceptor {
		let resolver = SourceResolver::new(Arc::new(MemoryStoreProvider::default()), FetchConfig::default()).unwrap();
		ResourceInterceptor::new(
			cache,
			Arc::new(resolver),
			Handle::current(),
			CancellationToken::new(),
			MIN_VECTOR_TILE_SIZE,
		)
	}

	#[rstest]
	#[case("missing.png", TRANSPARENT_PNG)]
	#[case("missing.PNG?v=2", TRANSPARENT_PNG)]
	#[case("missing.webp", TRANSPARENT_WEBP)]
	#[case("missing.jpg", BLANK_JPEG)]
	#[case("missing.jpeg", BLANK_JPEG)]
	#[case("missing.pbf", &[])]
	#[case("missing.json", &[])]
	#[case("missing", &[])]
	#[tokio::test]
	async fn substitutes_missing_resources(#[case] name: &str, #[case] expected: &[u8]) {
		let dir = TempDir::new().unwrap();
		let url = dir.path().join(name).display().to_string();
		let blob = interceptor(Arc::new(NoCache)).resolve(&url).await;
		assert_eq!(blob.as_slice(), expected);
	}

	#[rstest]
	#[case("tile.pbf", 511, 0)]
	#[case("tile.pbf", 512, 512)]
	#[case("tile.mvt", 100, 0)]
	#[case("tile.png", 100, 100)]
	#[case("data.json", 10, 10)]
	#[tokio::test]
	async fn drops_short_vector_tiles(#[case] name: &str, #[case] size: usize, #[case] expected: u64) {
		let dir = TempDir::new().unwrap();
		dir.child(name).write_binary(&vec![7u8; size]).unwrap();
		let url = dir.path().join(name).display().to_string();
		let blob = interceptor(Arc::new(NoCache)).resolve(&url).await;
		assert_eq!(blob.len(), expected);
	}

	#[tokio::test]
	async fn populates_and_reads_the_cache() {
		let dir = TempDir::new().unwrap();
		dir.child("sprite.json").write_str("{\"icon\":{}}").unwrap();
		let url = dir.path().join("sprite.json").display().to_string();
		let cache = Arc::new(MemoryCache::new(1 << 20, None));
		let interceptor = interceptor(cache.clone());

		assert_eq!(interceptor.resolve(&url).await.as_str(), "{\"icon\":{}}");
		assert_eq!(cache.get(&url).await, Some(Blob::from("{\"icon\":{}}")));

		// served from cache once the file is gone
		std::fs::remove_file(dir.path().join("sprite.json")).unwrap();
		assert_eq!(interceptor.resolve(&url).await.as_str(), "{\"icon\":{}}");
	}

	#[tokio::test]
	async fn malformed_uri_degrades_to_substitution() {
		let interceptor = interceptor(Arc::new(NoCache));
		assert_eq!(interceptor.resolve("ftp://host/a.png").await.as_slice(), TRANSPARENT_PNG);
	}

	#[tokio::test]
	async fn cancelled_fetches_are_substituted() {
		let interceptor = interceptor(Arc::new(NoCache));
		interceptor.cancel.cancel();
		let blob = interceptor.resolve("https://example.invalid/sprite.webp").await;
		assert_eq!(blob.as_slice(), TRANSPARENT_WEBP);
	}

	#[tokio::test]
	async fn answers_requests_through_the_callback() {
		let interceptor = interceptor(Arc::new(NoCache));
		let (tx, rx) = oneshot::channel();
		interceptor.request(
			ResourceRequest::new("/nonexistent/icons.png"),
			Box::new(move |blob| {
				tx.send(blob).unwrap();
			}),
		);
		assert_eq!(rx.await.unwrap().as_slice(), TRANSPARENT_PNG);
	}

	#[test]
	fn dropped_requests_are_answered_once_with_the_substitute() {
		let answers = Arc::new(AtomicUsize::new(0));
		let (tx, rx) = mpsc::channel();
		let pending = PendingAnswer::new(
			"https://example.org/sprite.png",
			Box::new({
				let answers = answers.clone();
				move |blob| {
					answers.fetch_add(1, Ordering::SeqCst);
					tx.send(blob).unwrap();
				}
			}),
		);
		drop(pending);
		assert_eq!(answers.load(Ordering::SeqCst), 1);
		assert_eq!(rx.recv().unwrap().as_slice(), TRANSPARENT_PNG);

		let (tx, rx) = mpsc::channel();
		let pending = PendingAnswer::new("tile.pbf", Box::new(move |blob| tx.send(blob).unwrap()));
		pending.answer(Blob::from("answered"));
		assert_eq!(rx.recv().unwrap().as_str(), "answered");
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn requests_after_runtime_shutdown_are_answered() {
		let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
		let handle = runtime.handle().clone();
		drop(runtime);

		let resolver = SourceResolver::new(Arc::new(MemoryStoreProvider::default()), FetchConfig::default()).unwrap();
		let interceptor = ResourceInterceptor::new(
			Arc::new(NoCache),
			Arc::new(resolver),
			handle,
			CancellationToken::new(),
			MIN_VECTOR_TILE_SIZE,
		);

		let (tx, rx) = mpsc::channel();
		interceptor.request(
			ResourceRequest::new("/nonexistent/tile.pbf"),
			Box::new(move |blob| tx.send(blob).unwrap()),
		);
		let blob = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
		assert!(blob.is_empty());
	}

	#[tokio::test]
	async fn panicking_fetch_still_answers() {
		let (tx, rx) = oneshot::channel();
		let pending = PendingAnswer::new("icons.webp", Box::new(move |blob| tx.send(blob).unwrap()));
		let task = tokio::spawn(async move {
			let _pending = pending;
			panic!("fetch failed");
		});
		assert!(task.await.unwrap_err().is_panic());
		assert_eq!(rx.await.unwrap().as_slice(), TRANSPARENT_WEBP);
	}
}
