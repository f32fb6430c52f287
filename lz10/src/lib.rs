//! The type-0x10 LZ77 compression used on GBA-era handhelds.
//!
//! The stream is a one-byte type marker (`0x10`), a 24-bit little-endian
//! decompressed size, then blocks of eight tokens described by a flag byte,
//! most significant bit first. A clear flag bit is one literal byte; a set
//! bit is a 16-bit back-reference with a 4-bit length (3..=18) and a 12-bit
//! distance (1..=4096).
//!
//! Decompression validates every back-reference against the output cursor,
//! so untrusted ROM regions can be probed with [`trial_decompress`].

use spool::read::Reader;

mod compress;

pub use compress::compress;

pub const TYPE_BYTE: u8 = 0x10;

pub const MIN_RUN: usize = 3;
pub const MAX_RUN: usize = 18;
pub const MAX_DISTANCE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Read { #[from] source: spool::read::Error },
	#[error("not an LZ77 stream (type byte {type_byte:#04X})")]
	Type { type_byte: u8 },
	#[error("declared size {size} exceeds the allowed capacity {cap}")]
	Cap { size: usize, cap: usize },
	#[error("back-reference to {distance} bytes back, but only {len} bytes have been output")]
	BadReference { distance: usize, len: usize },
}

pub type Result<T, E=Error> = std::result::Result<T, E>;

/// Decompresses one LZ77 stream, advancing the reader past its final token.
///
/// `cap` bounds the declared decompressed size; ROM scanning would otherwise
/// happily allocate gigabytes for a stray `0x10` byte.
pub fn decompress(f: &mut Reader, cap: usize) -> Result<Vec<u8>> {
	let type_byte = f.u8()?;
	if type_byte != TYPE_BYTE {
		return Err(Error::Type { type_byte });
	}
	let size = f.u24()? as usize;
	if size > cap {
		return Err(Error::Cap { size, cap });
	}

	let mut out = Vec::with_capacity(size);
	'blocks: while out.len() < size {
		let flags = f.u8()?;
		for bit in (0..8).rev() {
			if out.len() >= size {
				break 'blocks;
			}
			if flags & (1 << bit) == 0 {
				out.push(f.u8()?);
			} else {
				let token = f.array::<2>()?;
				let run = MIN_RUN + (token[0] >> 4) as usize;
				let distance = (((token[0] & 0x0F) as usize) << 8 | token[1] as usize) + 1;
				if distance > out.len() {
					return Err(Error::BadReference { distance, len: out.len() });
				}
				for _ in 0..run.min(size - out.len()) {
					out.push(out[out.len() - distance]);
				}
			}
		}
	}
	Ok(out)
}

pub fn decompress_from_slice(data: &[u8], cap: usize) -> Result<Vec<u8>> {
	decompress(&mut Reader::new(data), cap)
}

/// Attempts decompression of an unverified ROM region.
///
/// Returns the decompressed bytes and the compressed length consumed, or
/// `None` if the region is not a valid stream or decodes to fewer than five
/// bytes, which no real text archive does.
pub fn trial_decompress(data: &[u8], cap: usize) -> Option<(Vec<u8>, usize)> {
	let mut f = Reader::new(data);
	let out = decompress(&mut f, cap).ok()?;
	if out.len() < 5 {
		return None;
	}
	Some((out, f.pos()))
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn literals_only() {
		// 0x10, size 5, one all-literal block
		let data = [0x10, 0x05, 0x00, 0x00, 0b00000000, b'h', b'e', b'l', b'l', b'o'];
		assert_eq!(decompress_from_slice(&data, 0x100).unwrap(), b"hello");
	}

	#[test]
	fn back_reference() {
		// "abc" then a run of 6 copying from distance 3
		let data = [0x10, 0x09, 0x00, 0x00, 0b00010000, b'a', b'b', b'c', 0x30, 0x02];
		assert_eq!(decompress_from_slice(&data, 0x100).unwrap(), b"abcabcabc");
	}

	#[test]
	fn reference_past_cursor_is_rejected() {
		let data = [0x10, 0x08, 0x00, 0x00, 0b01000000, b'a', 0x00, 0x04];
		assert!(matches!(
			decompress_from_slice(&data, 0x100),
			Err(Error::BadReference { distance: 5, len: 1 })
		));
	}

	#[test]
	fn type_byte_is_checked() {
		assert!(matches!(
			decompress_from_slice(&[0x11, 0x05, 0x00, 0x00, 0x00], 0x100),
			Err(Error::Type { type_byte: 0x11 })
		));
	}

	#[test]
	fn capacity_is_enforced() {
		let data = [0x10, 0xFF, 0xFF, 0x7F, 0x00];
		assert!(matches!(decompress_from_slice(&data, 0x100), Err(Error::Cap { .. })));
	}

	#[test]
	fn trial_rejects_short_output() {
		let data = [0x10, 0x03, 0x00, 0x00, 0b00000000, 1, 2, 3];
		assert_eq!(trial_decompress(&data, 0x100), None);
	}

	#[test]
	fn trial_reports_consumed_length() {
		let data = [0x10, 0x05, 0x00, 0x00, 0b00000000, 1, 2, 3, 4, 5, 0xEE, 0xEE];
		let (out, used) = trial_decompress(&data, 0x100).unwrap();
		assert_eq!(out, &[1, 2, 3, 4, 5]);
		assert_eq!(used, 10);
	}

	#[test]
	fn roundtrip() {
		let mut data = Vec::new();
		for i in 0..64u32 {
			data.extend_from_slice(&i.to_le_bytes());
			data.extend_from_slice(b"a text archive, a text archive");
		}
		let comp = compress(&data);
		assert!(comp.len() < data.len());
		assert_eq!(decompress_from_slice(&comp, data.len()).unwrap(), data);
	}

	#[test]
	fn roundtrip_incompressible() {
		let data: Vec<u8> = (0..=255).collect();
		let comp = compress(&data);
		assert_eq!(decompress_from_slice(&comp, data.len()).unwrap(), data);
	}
}
