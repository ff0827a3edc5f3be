use super::ByteRangeBackend;
use anyhow::{Context, Result, anyhow, ensure};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
	fs::File,
	io::{Read, Seek, SeekFrom},
	path::Path,
	sync::Arc,
};
use tessera_core::Blob;
use tessera_derive::context;

/// Reads ranges from a local file that stays open for the lifetime of the backend.
#[derive(Debug)]
pub struct FileBackend {
	name: String,
	file: Arc<Mutex<File>>,
	size: u64,
}

impl FileBackend {
	#[context("opening archive file {path:?}")]
	pub fn open(path: &Path) -> Result<FileBackend> {
		let file = File::open(path)?;
		let metadata = file.metadata()?;
		anyhow::ensure!(metadata.is_file(), "{path:?} is not a file");

		Ok(FileBackend {
			name: path.to_string_lossy().into_owned(),
			file: Arc::new(Mutex::new(file)),
			size: metadata.len(),
		})
	}

	pub fn size(&self) -> u64 {
		self.size
	}
}

#[async_trait]
impl ByteRangeBackend for FileBackend {
	fn identify(&self) -> &str {
		&self.name
	}

	async fn read(&self, offset: u64, length: u64) -> Result<Blob> {
		let end = offset.checked_add(length);
		ensure!(
			end.is_some_and(|end| end <= self.size),
			"range of {length} bytes at offset {offset} lies beyond the end of '{}' ({} bytes)",
			self.name,
			self.size
		);
		let length = usize::try_from(length)?;

		let file = self.file.clone();
		tokio::task::spawn_blocking(move || -> Result<Blob> {
			let mut buffer = vec![0; length];
			let mut file = file.lock();
			file.seek(SeekFrom::Start(offset))?;
			file.read_exact(&mut buffer)?;
			Ok(Blob::from(buffer))
		})
		.await
		.map_err(|e| anyhow!("blocking read task failed: {e}"))?
		.with_context(|| format!("reading {length} bytes at offset {offset} from '{}'", self.name))
	}
}
