//! Lookup-table character encodings.
//!
//! Games map byte sequences to strings through per-game tables; multi-byte
//! codes share prefixes with single-byte ones, so decoding walks a prefix
//! tree and takes the longest match. Unmapped bytes are surfaced as `None`
//! so the script reader can fall back to raw byte elements.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct Node {
	value: Option<String>,
	children: HashMap<u8, Node>,
}

/// A two-way byte↔string mapping.
#[derive(Debug, Clone, Default)]
pub struct TableEncoding {
	name: String,
	root: Node,
	/// string → bytes, with the longest mapped string length for greedy encoding.
	encode: HashMap<String, Vec<u8>>,
	longest_string: usize,
}

impl TableEncoding {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), ..Self::default() }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Adds one code point. Later insertions win on duplicate byte sequences.
	pub fn insert(&mut self, bytes: &[u8], text: impl Into<String>) {
		let text = text.into();
		let mut node = &mut self.root;
		for &b in bytes {
			node = node.children.entry(b).or_default();
		}
		node.value = Some(text.clone());
		self.longest_string = self.longest_string.max(text.chars().count());
		self.encode.entry(text).or_insert_with(|| bytes.to_vec());
	}

	/// Decodes the longest code point at the start of `data`.
	///
	/// Returns the decoded string and the number of bytes consumed.
	pub fn decode_prefix(&self, data: &[u8]) -> Option<(&str, usize)> {
		let mut node = &self.root;
		let mut best = None;
		for (i, b) in data.iter().enumerate() {
			match node.children.get(b) {
				Some(n) => node = n,
				None => break,
			}
			if let Some(v) = &node.value {
				best = Some((v.as_str(), i + 1));
			}
		}
		best
	}

	/// Encodes the longest mapped prefix of `text`.
	///
	/// Returns the encoded bytes and the number of chars consumed.
	pub fn encode_prefix(&self, text: &str) -> Option<(&[u8], usize)> {
		let chars: Vec<char> = text.chars().take(self.longest_string).collect();
		for n in (1..=chars.len()).rev() {
			let candidate: String = chars[..n].iter().collect();
			if let Some(bytes) = self.encode.get(&candidate) {
				return Some((bytes, n));
			}
		}
		None
	}

	/// Decodes a parameter value stored as table bytes.
	///
	/// Values pack their bytes little-endian into the integer, so the byte
	/// form, not the character form, is what round-trips.
	pub fn decode_value(&self, value: u64) -> Option<String> {
		let bytes = value.to_le_bytes();
		let len = bytes.iter().rposition(|&b| b != 0).map_or(1, |i| i + 1);
		let mut out = String::new();
		let mut rest = &bytes[..len];
		while !rest.is_empty() {
			let (s, n) = self.decode_prefix(rest)?;
			out.push_str(s);
			rest = &rest[n..];
		}
		Some(out)
	}

	/// Encodes a parameter value back into its packed byte form.
	pub fn encode_value(&self, text: &str) -> Option<u64> {
		let bytes = self.encode(text).ok()?;
		if bytes.len() > 8 {
			return None;
		}
		let mut packed = [0u8; 8];
		packed[..bytes.len()].copy_from_slice(&bytes);
		Some(u64::from_le_bytes(packed))
	}

	/// Encodes a whole string, or reports the first unmappable position.
	pub fn encode(&self, text: &str) -> Result<Vec<u8>, EncodeError> {
		let mut out = Vec::new();
		let mut rest = text;
		while !rest.is_empty() {
			let Some((bytes, n)) = self.encode_prefix(rest) else {
				return Err(EncodeError {
					table: self.name.clone(),
					text: rest.chars().take(8).collect(),
				});
			};
			out.extend_from_slice(bytes);
			rest = &rest[rest.char_indices().nth(n).map_or(rest.len(), |(i, _)| i)..];
		}
		Ok(out)
	}
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("table {table:?} cannot encode text starting at {text:?}")]
pub struct EncodeError {
	pub table: String,
	pub text: String,
}
