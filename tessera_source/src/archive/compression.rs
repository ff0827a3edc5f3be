use anyhow::{Context, Result, bail};
use flate2::bufread::{GzDecoder, GzEncoder};
use std::io::{Cursor, Read};
use tessera_core::Blob;
use tessera_derive::context;

/// Compression codes used in the archive header for directories and tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
	Unknown = 0x0,
	None = 0x1,
	Gzip = 0x2,
	Brotli = 0x3,
	Zstd = 0x4,
}

impl Compression {
	pub fn from_u8(value: u8) -> Result<Compression> {
		Ok(match value {
			0 => Compression::Unknown,
			1 => Compression::None,
			2 => Compression::Gzip,
			3 => Compression::Brotli,
			4 => Compression::Zstd,
			_ => bail!("unknown archive compression code {value}"),
		})
	}

	/// Undoes this compression. `Unknown` is treated as uncompressed, like most readers do.
	#[context("decompressing {} bytes ({self:?})", blob.len())]
	pub fn decompress(self, blob: &Blob) -> Result<Blob> {
		let mut out = Vec::new();
		match self {
			Compression::Unknown | Compression::None => return Ok(blob.clone()),
			Compression::Gzip => {
				GzDecoder::new(blob.as_slice()).read_to_end(&mut out)?;
			}
			Compression::Brotli => {
				brotli::BrotliDecompress(&mut Cursor::new(blob.as_slice()), &mut out)?;
			}
			Compression::Zstd => {
				out = zstd::decode_all(Cursor::new(blob.as_slice()))?;
			}
		}
		Ok(Blob::from(out))
	}

	/// Applies this compression. Only used to write archives in tests and fixtures.
	pub fn compress(self, blob: Blob) -> Result<Blob> {
		Ok(match self {
			Compression::Unknown | Compression::None => blob,
			Compression::Gzip => {
				let mut out = Vec::new();
				GzEncoder::new(blob.as_slice(), flate2::Compression::best())
					.read_to_end(&mut out)
					.context("gzip compression failed")?;
				Blob::from(out)
			}
			Compression::Brotli => {
				let mut out = Vec::new();
				let params = brotli::enc::BrotliEncoderParams::default();
				brotli::BrotliCompress(&mut Cursor::new(blob.as_slice()), &mut out, &params)?;
				Blob::from(out)
			}
			Compression::Zstd => Blob::from(zstd::encode_all(Cursor::new(blob.as_slice()), 3)?),
		})
	}
}
