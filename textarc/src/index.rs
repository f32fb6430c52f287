//! The persistent index of text-archive locations inside one ROM or file.
//!
//! The on-disk form is one whitespace-separated line per entry:
//!
//! ```text
//! <OFFSET_HEX>  <SIZE_HEX>  <FLAGS>  [pointer_hex …]
//! ```
//!
//! `FLAGS` is drawn from `C` (compressed) and `H` (size header), or `-` for
//! neither. Lines starting with `#` are comments; the writer emits gap and
//! overlap diagnostics as comments, which readers ignore.

use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
	#[error("line {line}: {text:?}: {reason}")]
	Parse { line: usize, text: String, reason: String },
	#[error("two entries share offset {offset:#X}")]
	DuplicateOffset { offset: usize },
}

pub type Result<T, E=IndexError> = std::result::Result<T, E>;

/// One known text archive location.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RomEntry {
	pub offset: usize,
	/// Stored size in the ROM; for compressed entries, the compressed size.
	pub size: usize,
	pub compressed: bool,
	/// The decompressed stream carried a four-byte length prefix.
	pub size_header: bool,
	/// Offsets of ROM words pointing at this archive.
	pub pointers: Vec<usize>,
}

impl RomEntry {
	pub fn new(offset: usize) -> Self {
		Self { offset, ..Self::default() }
	}

	pub fn end(&self) -> usize {
		self.offset + self.size
	}
}

/// All known entries of one ROM, keyed by offset.
#[derive(Debug, Clone, Default)]
pub struct RomEntryIndex {
	entries: BTreeMap<usize, RomEntry>,
}

impl RomEntryIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, offset: usize) -> Option<&RomEntry> {
		self.entries.get(&offset)
	}

	pub fn get_mut(&mut self, offset: usize) -> Option<&mut RomEntry> {
		self.entries.get_mut(&offset)
	}

	/// Inserts an entry, replacing any previous one at the same offset.
	pub fn insert(&mut self, entry: RomEntry) {
		self.entries.insert(entry.offset, entry);
	}

	pub fn remove(&mut self, offset: usize) -> Option<RomEntry> {
		self.entries.remove(&offset)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &RomEntry> {
		self.entries.values()
	}

	/// The first known entry starting at or after `offset`.
	pub fn next_at_or_after(&self, offset: usize) -> Option<&RomEntry> {
		self.entries.range(offset..).next().map(|(_, e)| e)
	}

	/// Parses the text form. Duplicate offsets are an inconsistency.
	pub fn parse(text: &str) -> Result<Self> {
		let mut index = Self::new();
		for (n, line) in text.lines().enumerate() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			let entry = parse_entry(line).map_err(|reason| IndexError::Parse {
				line: n + 1,
				text: line.to_owned(),
				reason,
			})?;
			if index.entries.contains_key(&entry.offset) {
				return Err(IndexError::DuplicateOffset { offset: entry.offset });
			}
			index.insert(entry);
		}
		Ok(index)
	}

	/// Renders the text form, with gap and overlap comments interleaved.
	pub fn render(&self) -> String {
		let mut out = String::new();
		let mut prev: Option<&RomEntry> = None;
		for e in self.iter() {
			if let Some(prev) = prev {
				if e.offset > prev.end() {
					let _ = writeln!(out, "# gap: {:#X} bytes", e.offset - prev.end());
				} else if e.offset < prev.end() {
					let _ = writeln!(
						out,
						"# overlap: {:06X} extends {:#X} bytes past {:06X}",
						prev.offset, prev.end() - e.offset, e.offset,
					);
				}
			}
			if e.pointers.is_empty() {
				let _ = writeln!(out, "# no pointers to {:06X}", e.offset);
			}
			let mut flags = String::new();
			if e.compressed {
				flags.push('C');
			}
			if e.size_header {
				flags.push('H');
			}
			if flags.is_empty() {
				flags.push('-');
			}
			let _ = write!(out, "{:06X}\t{:X}\t{}", e.offset, e.size, flags);
			for p in &e.pointers {
				let _ = write!(out, " {p:06X}");
			}
			out.push('\n');
			prev = Some(e);
		}
		out
	}
}

fn parse_entry(line: &str) -> Result<RomEntry, String> {
	let mut tokens = line.split_whitespace();
	let offset = tokens.next().ok_or("missing offset")?;
	let offset = usize::from_str_radix(offset, 16).map_err(|e| format!("bad offset: {e}"))?;
	let size = tokens.next().ok_or("missing size")?;
	let size = usize::from_str_radix(size, 16).map_err(|e| format!("bad size: {e}"))?;

	let mut entry = RomEntry::new(offset);
	entry.size = size;

	if let Some(flags) = tokens.next() {
		for c in flags.chars() {
			match c {
				'C' => entry.compressed = true,
				'H' => entry.size_header = true,
				'-' => {}
				c => return Err(format!("unknown flag {c:?}")),
			}
		}
	}
	for p in tokens {
		entry.pointers.push(
			usize::from_str_radix(p, 16).map_err(|e| format!("bad pointer: {e}"))?,
		);
	}
	Ok(entry)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parse_the_documented_form() {
		let index = RomEntryIndex::parse(
			"# comment\n\
			 6C1FC0\t1A4C\tCH\t740100 740180\n\
			 \n\
			 7000A0  24  -\n",
		).unwrap();
		assert_eq!(index.len(), 2);
		let e = index.get(0x6C1FC0).unwrap();
		assert_eq!(e.size, 0x1A4C);
		assert!(e.compressed);
		assert!(e.size_header);
		assert_eq!(e.pointers, [0x740100, 0x740180]);
		let e = index.get(0x7000A0).unwrap();
		assert!(!e.compressed);
		assert!(!e.size_header);
	}

	#[test]
	fn duplicate_offsets_are_rejected() {
		let r = RomEntryIndex::parse("10 4 -\n10 8 C\n");
		assert!(matches!(r, Err(IndexError::DuplicateOffset { offset: 0x10 })));
	}

	#[test]
	fn render_parses_back() {
		let mut index = RomEntryIndex::new();
		index.insert(RomEntry { offset: 0x100, size: 0x20, compressed: true, size_header: false, pointers: vec![0x40] });
		index.insert(RomEntry { offset: 0x200, size: 0x10, compressed: false, size_header: true, pointers: vec![] });
		let text = index.render();
		assert!(text.contains("# gap"));
		assert!(text.contains("# no pointers to 000200"));
		let back = RomEntryIndex::parse(&text).unwrap();
		assert_eq!(back.get(0x100).unwrap(), index.get(0x100).unwrap());
		assert_eq!(back.get(0x200).unwrap(), index.get(0x200).unwrap());
	}

	#[test]
	fn overlap_comment() {
		let mut index = RomEntryIndex::new();
		index.insert(RomEntry { offset: 0x100, size: 0x200, ..RomEntry::default() });
		index.insert(RomEntry { offset: 0x180, size: 0x10, ..RomEntry::default() });
		assert!(index.render().contains("# overlap"));
	}
}
