use std::fmt;

/// A contiguous range of bytes, given by offset and length.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct ByteRange {
	pub offset: u64,
	pub length: u64,
}

impl ByteRange {
	#[must_use]
	pub fn new(offset: u64, length: u64) -> Self {
		Self { offset, length }
	}

	#[must_use]
	pub fn empty() -> Self {
		Self::default()
	}

	/// Returns the range moved forward by `offset` bytes, `None` if its end no longer fits in a `u64`.
	#[must_use]
	pub fn shifted_forward(&self, offset: u64) -> Option<Self> {
		let shifted = self.offset.checked_add(offset)?;
		shifted.checked_add(self.length)?;
		Some(Self {
			offset: shifted,
			length: self.length,
		})
	}

	/// The value of an HTTP `Range` request header selecting these bytes.
	///
	/// Both bounds are inclusive, so a range of length `n` ends at `offset + n - 1`.
	#[must_use]
	pub fn as_http_header(&self) -> String {
		format!("bytes={}-{}", self.offset, self.offset.saturating_add(self.length).saturating_sub(1))
	}
}

impl fmt::Debug for ByteRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}..{}", self.offset, self.offset.saturating_add(self.length))
	}
}

impl fmt::Display for ByteRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}+{}]", self.offset, self.length)
	}
}
