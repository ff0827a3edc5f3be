//! Fetching resource bytes from heterogeneous backends.
//!
//! - [`backend`]: byte-range reads from local files, HTTP servers and object storage
//! - [`archive`]: PMTiles archive index and the bounded archive-handle cache
//! - [`ResourceLocation`]: classification of resource URIs by scheme
//! - [`SourceResolver`]: turns any resource URI into bytes, or `None` when absent

pub mod archive;
pub mod backend;
mod config;
mod location;
mod resolver;
#[cfg(any(test, feature = "test"))]
pub mod testing;

pub use archive::{ARCHIVE_HANDLE_CAPACITY, ArchiveManager};
pub use backend::{ByteRangeBackend, CloudStoreProvider, ObjectStoreProvider};
pub use config::{FetchConfig, ObjectStoreConfig};
pub use location::{ResourceLocation, StoreService};
pub use resolver::SourceResolver;
