#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("out-of-bounds seek to {pos:#X} (size {size:#X})")]
	Seek { pos: usize, size: usize },
	#[error("out-of-bounds read of {pos:#X}+{len} (size {size:#X})")]
	Read { pos: usize, len: usize, size: usize },
	#[error("mismatched bytes at {pos:#X}. expected {expected:02X?}, got {got:02X?}")]
	Check { pos: usize, expected: Vec<u8>, got: Vec<u8> },
}

pub type Result<T, E=Error> = std::result::Result<T, E>;

impl Error {
	pub fn pos(&self) -> usize {
		match self {
			Error::Seek { pos, .. } => *pos,
			Error::Read { pos, .. } => *pos,
			Error::Check { pos, .. } => *pos,
		}
	}
}

/// An incremental reader over a byte slice.
///
/// Cloning is cheap; a clone reads independently from the same data.
#[derive(Clone)]
pub struct Reader<'a> {
	pos: usize,
	data: &'a [u8],
}

impl<'a> std::fmt::Debug for Reader<'a> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Reader")
			.field("pos", &self.pos)
			.field("data", &format_args!("[_; {}]", self.data.len()))
			.finish()
	}
}

impl<'a> Reader<'a> {
	pub fn new(data: &'a [u8]) -> Reader<'a> {
		Self { pos: 0, data }
	}

	/// Reads a slice of data from the input. No copying is done.
	///
	/// On error the read position is unchanged.
	pub fn slice(&mut self, len: usize) -> Result<&'a [u8]> {
		if len > self.remaining().len() {
			return Err(Error::Read { pos: self.pos, len, size: self.len() });
		}
		let pos = self.pos;
		self.pos += len;
		Ok(&self.data[pos..pos+len])
	}

	/// Reads a fixed-size array from the input.
	pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
		let mut x = [0; N];
		x.copy_from_slice(self.slice(N)?);
		Ok(x)
	}

	pub fn u8(&mut self) -> Result<u8> {
		Ok(u8::from_le_bytes(self.array()?))
	}

	pub fn u16(&mut self) -> Result<u16> {
		Ok(u16::from_le_bytes(self.array()?))
	}

	pub fn u32(&mut self) -> Result<u32> {
		Ok(u32::from_le_bytes(self.array()?))
	}

	/// Reads a 24-bit little-endian integer, as found in compression headers.
	pub fn u24(&mut self) -> Result<u32> {
		let [a, b, c] = self.array()?;
		Ok(u32::from_le_bytes([a, b, c, 0]))
	}

	#[must_use]
	pub fn pos(&self) -> usize {
		self.pos
	}

	/// Total length of the input. For the unread portion, see [`remaining`](Self::remaining).
	#[must_use]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	/// Returns true if there are no more bytes left to read.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.remaining().is_empty()
	}

	#[must_use]
	pub fn remaining(&self) -> &'a [u8] {
		&self.data[self.pos..]
	}

	#[must_use]
	pub fn data(&self) -> &'a [u8] {
		self.data
	}

	/// Sets the read position. Out-of-bounds positions are an error.
	pub fn seek(&mut self, pos: usize) -> Result<()> {
		if pos > self.len() {
			return Err(Error::Seek { pos, size: self.len() })
		}
		self.pos = pos;
		Ok(())
	}

	/// Returns a copy of the reader at the specified position.
	pub fn at(&self, pos: usize) -> Result<Self> {
		let mut a = self.clone();
		a.seek(pos)?;
		Ok(a)
	}

	/// Reads a number of bytes and errors if they are not as expected.
	///
	/// If they do not match, the read position is not affected.
	pub fn check(&mut self, v: &[u8]) -> Result<()> {
		let pos = self.pos;
		let u = self.slice(v.len())?;
		if u != v {
			self.pos = pos;
			return Err(Error::Check { pos, expected: v.to_owned(), got: u.to_owned() })
		}
		Ok(())
	}
}
