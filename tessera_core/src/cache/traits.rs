use crate::Blob;
use async_trait::async_trait;
use std::fmt::Debug;

/// Async key → bytes store.
///
/// `get` never fails: a miss and an unreadable entry both report `None`.
/// `set` is best-effort: implementations log persistence failures instead of
/// returning them, so a broken cache never fails the request that fed it.
#[async_trait]
pub trait TileCache: Debug + Send + Sync {
	async fn get(&self, key: &str) -> Option<Blob>;

	async fn set(&self, key: &str, value: Blob);

	/// Short name of the backend, used in log messages.
	fn name(&self) -> &str;
}
