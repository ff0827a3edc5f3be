use super::Compression;
use anyhow::{Result, ensure};
use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use tessera_core::{Blob, ByteRange};

pub const HEADER_LENGTH: u64 = 127;

/// The fixed-size PMTiles v3 header.
///
/// Only the fields needed to locate tiles are interpreted; the bounds and
/// centre fields are kept so a header can be written back unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveHeader {
	pub root_dir: ByteRange,
	pub metadata: ByteRange,
	pub leaf_dirs: ByteRange,
	pub tile_data: ByteRange,
	pub addressed_tiles_count: u64,
	pub tile_entries_count: u64,
	pub tile_contents_count: u64,
	pub clustered: bool,
	pub internal_compression: Compression,
	pub tile_compression: Compression,
	pub tile_type: u8,
	pub min_zoom: u8,
	pub max_zoom: u8,
	pub bounds_e7: [i32; 4],
	pub center_zoom: u8,
	pub center_e7: [i32; 2],
}

impl ArchiveHeader {
	pub fn deserialize(blob: &Blob) -> Result<ArchiveHeader> {
		let buffer = blob.as_slice();
		ensure!(
			buffer.len() as u64 == HEADER_LENGTH,
			"archive header must be {HEADER_LENGTH} bytes, got {}",
			buffer.len()
		);
		ensure!(&buffer[0..7] == b"PMTiles", "archive magic number mismatch");
		ensure!(buffer[7] == 3, "archive version must be 3, got {}", buffer[7]);

		let mut r = Cursor::new(&buffer[8..]);
		let range = |r: &mut Cursor<&[u8]>| -> Result<ByteRange> {
			Ok(ByteRange::new(r.read_u64::<LE>()?, r.read_u64::<LE>()?))
		};

		Ok(ArchiveHeader {
			root_dir: range(&mut r)?,
			metadata: range(&mut r)?,
			leaf_dirs: range(&mut r)?,
			tile_data: range(&mut r)?,
			addressed_tiles_count: r.read_u64::<LE>()?,
			tile_entries_count: r.read_u64::<LE>()?,
			tile_contents_count: r.read_u64::<LE>()?,
			clustered: r.read_u8()? == 1,
			internal_compression: Compression::from_u8(r.read_u8()?)?,
			tile_compression: Compression::from_u8(r.read_u8()?)?,
			tile_type: r.read_u8()?,
			min_zoom: r.read_u8()?,
			max_zoom: r.read_u8()?,
			bounds_e7: [
				r.read_i32::<LE>()?,
				r.read_i32::<LE>()?,
				r.read_i32::<LE>()?,
				r.read_i32::<LE>()?,
			],
			center_zoom: r.read_u8()?,
			center_e7: [r.read_i32::<LE>()?, r.read_i32::<LE>()?],
		})
	}

	pub fn serialize(&self) -> Result<Blob> {
		let mut w: Vec<u8> = Vec::with_capacity(HEADER_LENGTH as usize);
		w.extend_from_slice(b"PMTiles");
		w.write_u8(3)?;
		for range in [&self.root_dir, &self.metadata, &self.leaf_dirs, &self.tile_data] {
			w.write_u64::<LE>(range.offset)?;
			w.write_u64::<LE>(range.length)?;
		}
		w.write_u64::<LE>(self.addressed_tiles_count)?;
		w.write_u64::<LE>(self.tile_entries_count)?;
		w.write_u64::<LE>(self.tile_contents_count)?;
		w.write_u8(u8::from(self.clustered))?;
		w.write_u8(self.internal_compression as u8)?;
		w.write_u8(self.tile_compression as u8)?;
		w.write_u8(self.tile_type)?;
		w.write_u8(self.min_zoom)?;
		w.write_u8(self.max_zoom)?;
		for v in self.bounds_e7 {
			w.write_i32::<LE>(v)?;
		}
		w.write_u8(self.center_zoom)?;
		for v in self.center_e7 {
			w.write_i32::<LE>(v)?;
		}
		Ok(Blob::from(w))
	}
}

impl Default for ArchiveHeader {
	fn default() -> Self {
		ArchiveHeader {
			root_dir: ByteRange::empty(),
			metadata: ByteRange::empty(),
			leaf_dirs: ByteRange::empty(),
			tile_data: ByteRange::empty(),
			addressed_tiles_count: 0,
			tile_entries_count: 0,
			tile_contents_count: 0,
			clustered: false,
			internal_compression: Compression::None,
			tile_compression: Compression::None,
			tile_type: 0,
			min_zoom: 0,
			max_zoom: 0,
			bounds_e7: [-1_800_000_000, -850_511_287, 1_800_000_000, 850_511_287],
			center_zoom: 0,
			center_e7: [0, 0],
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> ArchiveHeader {
		ArchiveHeader {
			root_dir: ByteRange::new(127, 2271),
			metadata: ByteRange::new(2398, 592),
			leaf_dirs: ByteRange::new(2990, 17),
			tile_data: ByteRange::new(3007, 25_869_006),
			addressed_tiles_count: 878,
			tile_entries_count: 878,
			tile_contents_count: 876,
			clustered: true,
			internal_compression: Compression::Gzip,
			tile_compression: Compression::Brotli,
			tile_type: 1,
			min_zoom: 0,
			max_zoom: 14,
			bounds_e7: [130_828_300, 523_344_600, 137_622_450, 526_783_000],
			center_zoom: 7,
			center_e7: [134_225_380, 525_063_800],
		}
	}

	#[test]
	fn serialized_header_has_fixed_length() -> Result<()> {
		let blob = sample().serialize()?;
		assert_eq!(blob.len(), HEADER_LENGTH);
		assert_eq!(&blob.as_slice()[0..8], b"PMTiles\x03");
		assert_eq!(ArchiveHeader::deserialize(&blob)?, sample());
		Ok(())
	}

	#[test]
	fn rejects_wrong_magic_and_version() -> Result<()> {
		let mut bytes = sample().serialize()?.into_vec();
		bytes[7] = 2;
		let err = ArchiveHeader::deserialize(&Blob::from(bytes.clone())).unwrap_err();
		assert_eq!(err.to_string(), "archive version must be 3, got 2");

		bytes[0] = b'X';
		let err = ArchiveHeader::deserialize(&Blob::from(bytes)).unwrap_err();
		assert_eq!(err.to_string(), "archive magic number mismatch");
		Ok(())
	}

	#[test]
	fn rejects_truncated_header() {
		let err = ArchiveHeader::deserialize(&Blob::from(&b"PMTiles\x03"[..])).unwrap_err();
		assert_eq!(err.to_string(), "archive header must be 127 bytes, got 8");
	}

	#[test]
	fn rejects_unknown_compression() -> Result<()> {
		let mut bytes = sample().serialize()?.into_vec();
		// internal compression sits right after the clustered flag
		bytes[97] = 9;
		assert!(ArchiveHeader::deserialize(&Blob::from(bytes)).is_err());
		Ok(())
	}
}
