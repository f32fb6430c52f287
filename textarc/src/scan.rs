//! Probes files and ROM images for text archives.
//!
//! Nothing in here reports errors: a region that fails to decompress, parse,
//! or pass the plausibility gates is simply not an archive, and the scan
//! moves on. Callers that know an archive must exist (a direct read against
//! an index entry) use [`session`](crate::session) instead, where the same
//! failures are inconsistencies.

use spool::Reader;

use crate::binary::read::ScriptReader;
use crate::db::CommandDatabase;
use crate::defs::EndType;
use crate::encoding::TableEncoding;
use crate::index::{RomEntry, RomEntryIndex};
use crate::script::{Element, TextArchive};

/// The ROM-mapped base of the cartridge address space; a word whose top byte
/// is `0x08` (mirrors masked off) addresses the ROM.
const ROM_BASE: u32 = 0x08;

/// How many trailing elements a script may carry past its first ending
/// command before the scanner disbelieves it. Rewind overlap legitimately
/// leaves a few.
const MAX_OVERFLOW: usize = 3;

/// Jump value meaning "no jump"; exempt from the range gate.
const NO_JUMP_SENTINEL: i64 = 0xFF;

#[derive(Debug, Clone)]
pub struct ScanOptions {
	/// Accept implausible archives instead of applying the strict gates.
	pub deep: bool,
	/// Record discoveries in the entry index.
	pub update_index: bool,
	/// Sweep the whole stream for pointers to each discovered archive.
	pub pointer_scan: bool,
	/// Read unknown-size regions to end of stream rather than stopping at
	/// the first script that does not close.
	pub read_to_end: bool,
	/// Cap on a trial decompression's declared output size.
	pub max_decompressed: usize,
}

impl Default for ScanOptions {
	fn default() -> Self {
		Self {
			deep: false,
			update_index: true,
			pointer_scan: false,
			read_to_end: false,
			max_decompressed: 0x8_0000,
		}
	}
}

/// One discovered archive, with the entry describing its stored form.
#[derive(Debug)]
pub struct ScanHit {
	pub archive: TextArchive,
	pub entry: RomEntry,
}

pub struct Scanner<'a> {
	db: &'a CommandDatabase,
	encoding: Option<&'a TableEncoding>,
	options: ScanOptions,
}

impl<'a> Scanner<'a> {
	pub fn new(db: &'a CommandDatabase, encoding: Option<&'a TableEncoding>, options: ScanOptions) -> Self {
		Self { db, encoding, options }
	}

	pub fn options(&self) -> &ScanOptions {
		&self.options
	}

	/// Sweeps a whole stream, collecting every archive it believes in.
	///
	/// `progress` is called with (position, total) between probes, so the
	/// caller can interleave reporting.
	pub fn scan(
		&self,
		data: &[u8],
		stem: Option<&str>,
		index: &mut RomEntryIndex,
		mut progress: impl FnMut(usize, usize),
	) -> Vec<TextArchive> {
		let mut found = Vec::new();
		let mut offset = 0;
		while offset < data.len() {
			progress(offset, data.len());
			match self.read_at(data, offset, stem, index) {
				Some(hit) => {
					tracing::debug!(
						offset = %format_args!("{offset:06X}"),
						size = hit.entry.size,
						compressed = hit.entry.compressed,
						scripts = hit.archive.scripts.len(),
						"found text archive",
					);
					// Continue past the archive, keeping word alignment.
					offset = (hit.entry.end() + 3) & !3;
					if self.options.update_index {
						index.insert(hit.entry);
					}
					found.push(hit.archive);
				}
				None => offset += 4,
			}
		}
		found
	}

	/// Tries to read one archive at `start`, against the index's knowledge.
	///
	/// Returns `None` if there is no plausible archive here. The index is
	/// only consulted, never modified; [`scan`](Self::scan) does the
	/// recording.
	pub fn read_at(
		&self,
		data: &[u8],
		start: usize,
		stem: Option<&str>,
		index: &RomEntryIndex,
	) -> Option<ScanHit> {
		if start >= data.len() {
			return None;
		}
		let entry = index.get(start);
		let identifier = TextArchive::offset_identifier(start, stem);

		// A compressed stream is tried first unless the index says otherwise.
		if entry.map_or(true, |e| e.compressed) {
			if let Some(hit) = self.read_compressed(data, start, &identifier) {
				return self.accept(data, start, hit);
			}
			if entry.is_some_and(|e| e.compressed) {
				// The index promised compressed data and there is none.
				return None;
			}
		}

		let hit = match entry {
			Some(e) => self.read_sized(data, start, e, &identifier)?,
			None => self.read_unsized(data, start, index, &identifier)?,
		};
		self.accept(data, start, hit)
	}

	fn read_compressed(&self, data: &[u8], start: usize, identifier: &str) -> Option<ScanHit> {
		let (buf, comp_len) = lz10::trial_decompress(&data[start..], self.options.max_decompressed)?;
		let (body, size_header) = match detect_size_header(&buf) {
			Some(skip) => (&buf[skip..], true),
			None => (&buf[..], false),
		};

		let reader = ScriptReader::new(self.db, self.encoding);
		let mut f = Reader::new(body);
		let outcome = reader.read_archive(&mut f, identifier, body.len(), false).ok()?;
		if outcome.archive.scripts.is_empty() {
			return None;
		}
		Some(ScanHit {
			archive: outcome.archive,
			entry: RomEntry {
				offset: start,
				size: comp_len,
				compressed: true,
				size_header,
				pointers: Vec::new(),
			},
		})
	}

	fn read_sized(&self, data: &[u8], start: usize, entry: &RomEntry, identifier: &str) -> Option<ScanHit> {
		let end = entry.end().min(data.len());
		let skip = entry.size_header.then(|| detect_size_header(&data[start..end])).flatten().unwrap_or(0);

		let reader = ScriptReader::new(self.db, self.encoding);
		let mut f = Reader::new(data).at(start + skip).ok()?;
		let outcome = reader.read_archive(&mut f, identifier, end, false).ok()?;
		if outcome.archive.scripts.is_empty() {
			return None;
		}
		Some(ScanHit {
			archive: outcome.archive,
			entry: RomEntry {
				offset: start,
				size: entry.size,
				compressed: false,
				size_header: skip != 0,
				pointers: entry.pointers.clone(),
			},
		})
	}

	fn read_unsized(&self, data: &[u8], start: usize, index: &RomEntryIndex, identifier: &str) -> Option<ScanHit> {
		let reader = ScriptReader::new(self.db, self.encoding);
		let mut f = Reader::new(data).at(start).ok()?;
		let mut outcome = reader
			.read_archive(&mut f, identifier, data.len(), !self.options.read_to_end)
			.ok()?;
		if !self.options.read_to_end && !outcome.closed {
			// With no size to trust, an archive is the run of scripts that
			// actually close; whatever petered out after them is the
			// neighbouring data, not a script.
			outcome.archive.scripts.pop();
			outcome.spans.pop();
		}
		if outcome.archive.scripts.is_empty() {
			return None;
		}
		let mut size = outcome.spans.last().map_or(0, |s| s.end) - start;

		// An unknown-size read that runs into a known entry has eaten
		// someone else's bytes; the tail scripts were never real.
		if let Some(next) = index.next_at_or_after(start + 1) {
			if start + size > next.offset {
				while let Some(span) = outcome.spans.last() {
					if span.end <= next.offset {
						break;
					}
					outcome.spans.pop();
					outcome.archive.scripts.pop();
				}
				if outcome.archive.scripts.is_empty() {
					return None;
				}
				size = next.offset - start;
			}
		}

		Some(ScanHit {
			archive: outcome.archive,
			entry: RomEntry {
				offset: start,
				size,
				compressed: false,
				size_header: false,
				pointers: Vec::new(),
			},
		})
	}

	/// Applies the strict-mode gates and the pointer scan.
	fn accept(&self, data: &[u8], start: usize, mut hit: ScanHit) -> Option<ScanHit> {
		if !self.options.deep && !plausible(&hit.archive) {
			return None;
		}
		if self.options.pointer_scan {
			hit.entry.pointers = scan_pointers(data, start);
		}
		Some(hit)
	}
}

/// The strict-mode plausibility gates.
///
/// An archive is believed when some command can actually end a script, no
/// script trails more than a rewind's worth of junk past its ender, and
/// every jump picks a script that exists (or the no-jump sentinel).
pub fn plausible(archive: &TextArchive) -> bool {
	let script_count = archive.scripts.len() as i64;

	let mut any_ender = false;
	for script in &archive.scripts {
		let mut after_end = None;
		for (i, e) in script.elements.iter().enumerate() {
			if let Element::Command(c) = e {
				if c.definition().end_type == EndType::Always {
					any_ender = true;
				}
				if after_end.is_none() && c.ends_script() {
					after_end = Some(script.elements.len() - i - 1);
				}
				for v in c.jumps() {
					if v != NO_JUMP_SENTINEL && !(0..script_count).contains(&v) {
						return false;
					}
				}
			}
		}
		if after_end.is_some_and(|n| n > MAX_OVERFLOW) {
			return false;
		}
	}
	any_ender
}

/// Detects the four-byte `00 LL LL LL` length prefix some archives carry.
///
/// `LL LL LL` holds either the full stream length or the length minus the
/// header itself. Returns the number of bytes to skip.
pub fn detect_size_header(buf: &[u8]) -> Option<usize> {
	if buf.len() < 4 || buf[0] != 0 {
		return None;
	}
	let declared = u32::from_le_bytes([buf[1], buf[2], buf[3], 0]) as usize;
	(declared == buf.len() || declared == buf.len() - 4).then_some(4)
}

/// Sweeps the stream for ROM-mapped words addressing `target`.
///
/// A word matches when, with its mirror bit masked off, its top byte is the
/// ROM base and its low 24 bits equal the target offset.
pub fn scan_pointers(data: &[u8], target: usize) -> Vec<usize> {
	let mut out = Vec::new();
	let target = target as u32;
	for i in (0..data.len().saturating_sub(3)).step_by(4) {
		let v = u32::from_le_bytes([data[i], data[i+1], data[i+2], data[i+3]]);
		let v = v & 0x7FFF_FFFF;
		if v >> 24 == ROM_BASE && v & 0x00FF_FFFF == target {
			out.push(i);
		}
	}
	out
}
