//! Byte-range backends: the only capability the archive index needs.
//!
//! # Overview
//!
//! A [`ByteRangeBackend`] names itself and reads `length` bytes at `offset`.
//! Three implementations exist, one per place an archive can live:
//!
//! - [`FileBackend`]: a local file, opened once and read with positioned reads
//! - [`HttpBackend`]: a remote file, read with HTTP range requests
//! - [`ObjectStoreBackend`]: an object in S3-compatible storage or GCS, one ranged GET per read
//!
//! Archive extraction never looks at which one it is talking to.

mod file;
mod http;
mod object_store;

pub use file::FileBackend;
pub use http::HttpBackend;
pub use object_store::{CloudStoreProvider, ObjectStoreBackend, ObjectStoreProvider};

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use tessera_core::Blob;

#[async_trait]
pub trait ByteRangeBackend: Debug + Send + Sync {
	/// A stable name for the underlying resource, e.g. its path or URL.
	fn identify(&self) -> &str;

	/// Reads `length` bytes starting at `offset`.
	///
	/// Backends that cannot tell "missing" from "empty" return an empty blob instead of an error.
	async fn read(&self, offset: u64, length: u64) -> Result<Blob>;
}
