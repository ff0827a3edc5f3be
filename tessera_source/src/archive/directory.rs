use anyhow::{Result, anyhow, bail, ensure};
use tessera_core::{Blob, ByteRange};

/// One directory entry.
///
/// `run_length > 0` means `run_length` consecutive tile ids share the tile at
/// `range` (relative to the tile data section). `run_length == 0` points at a
/// leaf directory (relative to the leaf directory section).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirEntry {
	pub tile_id: u64,
	pub range: ByteRange,
	pub run_length: u32,
}

impl DirEntry {
	pub fn new(tile_id: u64, offset: u64, length: u64, run_length: u32) -> DirEntry {
		DirEntry {
			tile_id,
			range: ByteRange::new(offset, length),
			run_length,
		}
	}

	pub fn is_leaf(&self) -> bool {
		self.run_length == 0
	}
}

/// A decoded directory, sorted by tile id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Directory {
	entries: Vec<DirEntry>,
}

impl Directory {
	pub fn new(entries: Vec<DirEntry>) -> Directory {
		Directory { entries }
	}

	/// Decodes the column-wise varint layout: count, id deltas, run lengths, lengths, offsets.
	pub fn from_blob(blob: &Blob) -> Result<Directory> {
		let mut reader = VarintReader::new(blob.as_slice());

		let count = reader.read()?;
		// every entry needs at least four bytes
		ensure!(
			count <= blob.len(),
			"directory claims {count} entries but is only {} bytes long",
			blob.len()
		);
		let count = usize::try_from(count)?;

		let mut entries = Vec::with_capacity(count);
		let mut last_id: u64 = 0;
		for _ in 0..count {
			last_id = last_id
				.checked_add(reader.read()?)
				.ok_or_else(|| anyhow!("tile id overflows in directory"))?;
			entries.push(DirEntry::new(last_id, 0, 0, 0));
		}
		for entry in &mut entries {
			entry.run_length = u32::try_from(reader.read()?)?;
		}
		for entry in &mut entries {
			entry.range.length = reader.read()?;
		}
		for i in 0..count {
			let value = reader.read()?;
			entries[i].range.offset = if i > 0 && value == 0 {
				let prev = entries[i - 1].range;
				prev
					.offset
					.checked_add(prev.length)
					.ok_or_else(|| anyhow!("entry offset overflows in directory"))?
			} else {
				value.saturating_sub(1)
			};
		}

		Ok(Directory { entries })
	}

	pub fn serialize(&self) -> Blob {
		let mut out = Vec::new();
		write_varint(&mut out, self.entries.len() as u64);

		let mut last_id: u64 = 0;
		for entry in &self.entries {
			write_varint(&mut out, entry.tile_id - last_id);
			last_id = entry.tile_id;
		}
		for entry in &self.entries {
			write_varint(&mut out, u64::from(entry.run_length));
		}
		for entry in &self.entries {
			write_varint(&mut out, entry.range.length);
		}
		for (i, entry) in self.entries.iter().enumerate() {
			let contiguous = i > 0 && {
				let prev = &self.entries[i - 1];
				prev.range.offset.checked_add(prev.range.length) == Some(entry.range.offset)
			};
			write_varint(&mut out, if contiguous { 0 } else { entry.range.offset + 1 });
		}
		Blob::from(out)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Finds the entry covering `tile_id`: an exact match, a run that includes it,
	/// or the leaf directory whose first id precedes it.
	pub fn find_tile(&self, tile_id: u64) -> Option<DirEntry> {
		let index = match self.entries.binary_search_by(|e| e.tile_id.cmp(&tile_id)) {
			Ok(i) => return Some(self.entries[i]),
			Err(0) => return None,
			Err(i) => i - 1,
		};

		let entry = self.entries[index];
		if entry.is_leaf() || tile_id - entry.tile_id < u64::from(entry.run_length) {
			Some(entry)
		} else {
			None
		}
	}
}

struct VarintReader<'a> {
	data: &'a [u8],
	position: usize,
}

impl<'a> VarintReader<'a> {
	fn new(data: &'a [u8]) -> Self {
		VarintReader { data, position: 0 }
	}

	fn read(&mut self) -> Result<u64> {
		let mut value: u64 = 0;
		let mut shift = 0;
		loop {
			let Some(&byte) = self.data.get(self.position) else {
				bail!("unexpected end of directory at byte {}", self.position);
			};
			self.position += 1;
			ensure!(shift < 64, "varint too long at byte {}", self.position);
			value |= u64::from(byte & 0x7f) << shift;
			if byte & 0x80 == 0 {
				return Ok(value);
			}
			shift += 7;
		}
	}
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
	while value >= 0x80 {
		out.push((value as u8 & 0x7f) | 0x80);
		value >>= 7;
	}
	out.push(value as u8);
}
