//! The driver tying a game's database, the entry index, and the codecs
//! into whole read/write/test/patch flows.

use spool::{Label, Reader, Writer};

use crate::binary::{ReadError, ScriptReader, ScriptWriter, WriteError};
use crate::db::CommandDatabase;
use crate::encoding::TableEncoding;
use crate::index::{IndexError, RomEntry, RomEntryIndex};
use crate::patch::{self, PatchError};
use crate::scan::{detect_size_header, ScanOptions, Scanner};
use crate::script::TextArchive;
use crate::textbox::{self, TextBoxError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	InvalidInput(String),
	#[error(transparent)]
	Format { #[from] source: ReadError },
	#[error(transparent)]
	Write { #[from] source: WriteError },
	#[error("{0}")]
	Inconsistency(String),
	#[error(transparent)]
	Patch { #[from] source: PatchError },
	#[error(transparent)]
	Index { #[from] source: IndexError },
	#[error(transparent)]
	TextBox { #[from] source: TextBoxError },
	#[error(transparent)]
	Io { #[from] source: std::io::Error },
}

pub type Result<T, E=Error> = std::result::Result<T, E>;

/// A loaded game: its command database and table encoding.
#[derive(Debug)]
pub struct Game {
	pub name: String,
	pub db: CommandDatabase,
	pub encoding: Option<TableEncoding>,
}

/// The outcome of a round-trip test on one archive.
#[derive(Debug)]
pub struct RoundTrip {
	pub identifier: String,
	pub original: Vec<u8>,
	pub rewritten: Vec<u8>,
}

impl RoundTrip {
	pub fn ok(&self) -> bool {
		self.original == self.rewritten
	}
}

/// One loaded ROM-editing session.
pub struct Session {
	game: Option<Game>,
	index: RomEntryIndex,
	options: ScanOptions,
}

impl Default for Session {
	fn default() -> Self {
		Self::new()
	}
}

impl Session {
	pub fn new() -> Self {
		Self {
			game: None,
			index: RomEntryIndex::new(),
			options: ScanOptions::default(),
		}
	}

	pub fn set_game(&mut self, game: Game) {
		self.game = Some(game);
	}

	pub fn game(&self) -> Result<&Game> {
		self.game.as_ref()
			.ok_or_else(|| Error::InvalidInput("no game is active".into()))
	}

	pub fn options_mut(&mut self) -> &mut ScanOptions {
		&mut self.options
	}

	pub fn index(&self) -> &RomEntryIndex {
		&self.index
	}

	pub fn index_mut(&mut self) -> &mut RomEntryIndex {
		&mut self.index
	}

	pub fn load_entries(&mut self, text: &str) -> Result<()> {
		self.index = RomEntryIndex::parse(text)?;
		Ok(())
	}

	pub fn render_entries(&self) -> String {
		self.index.render()
	}

	/// Sweeps a whole ROM image for text archives.
	#[tracing::instrument(skip_all, fields(size = data.len()))]
	pub fn scan_rom(
		&mut self,
		data: &[u8],
		stem: Option<&str>,
		progress: impl FnMut(usize, usize),
	) -> Result<Vec<TextArchive>> {
		let game = self.game.as_ref()
			.ok_or_else(|| Error::InvalidInput("no game is active".into()))?;
		let scanner = Scanner::new(&game.db, game.encoding.as_ref(), self.options.clone());
		Ok(scanner.scan(data, stem, &mut self.index, progress))
	}

	/// Reads the archive at a known offset. Unlike the scanner, failures
	/// here are errors: the caller asserted an archive exists.
	#[tracing::instrument(skip_all, fields(offset = offset))]
	pub fn read_archive(&self, data: &[u8], offset: usize, stem: Option<&str>) -> Result<TextArchive> {
		let game = self.game()?;
		if offset >= data.len() {
			return Err(Error::InvalidInput(format!(
				"offset {offset:#X} is outside the file (size {:#X})", data.len(),
			)));
		}
		let identifier = TextArchive::offset_identifier(offset, stem);
		let reader = ScriptReader::new(&game.db, game.encoding.as_ref());

		match self.index.get(offset) {
			Some(entry) if entry.compressed => {
				let (buf, _) = lz10::trial_decompress(&data[offset..], self.options.max_decompressed)
					.ok_or_else(|| Error::Inconsistency(format!(
						"entry {identifier} is marked compressed, but the bytes do not decompress",
					)))?;
				let skip = detect_size_header(&buf).unwrap_or(0);
				let body = &buf[skip..];
				let mut f = Reader::new(body);
				let outcome = reader.read_archive(&mut f, identifier, body.len(), false)?;
				Ok(outcome.archive)
			}
			Some(entry) => {
				let end = entry.end().min(data.len());
				let skip = detect_size_header(&data[offset..end])
					.filter(|_| entry.size_header)
					.unwrap_or(0);
				let mut f = Reader::new(data).at(offset + skip).map_err(ReadError::from)?;
				let outcome = reader.read_archive(&mut f, identifier, end, false)?;
				Ok(outcome.archive)
			}
			None => {
				let scanner = Scanner::new(&game.db, game.encoding.as_ref(), self.options.clone());
				scanner.read_at(data, offset, stem, &self.index)
					.map(|hit| hit.archive)
					.ok_or_else(|| Error::Inconsistency(format!(
						"no text archive found at {identifier}",
					)))
			}
		}
	}

	/// Reads one standalone archive file (a whole `.msg` image).
	pub fn read_archive_file(&self, data: &[u8], stem: &str) -> Result<TextArchive> {
		let game = self.game()?;
		let reader = ScriptReader::new(&game.db, game.encoding.as_ref());
		let mut f = Reader::new(data);
		let outcome = reader.read_archive(&mut f, stem, data.len(), false)?;
		Ok(outcome.archive)
	}

	/// The archive's binary image, with the size header its entry asks for,
	/// before any compression.
	pub fn write_archive_bytes(&self, archive: &TextArchive) -> Result<Vec<u8>> {
		let game = self.game()?;
		let writer = ScriptWriter::new(game.encoding.as_ref());
		let body = writer.write_archive(archive)?;

		let size_header = self.entry_for(archive).is_some_and(|e| e.size_header);
		if !size_header {
			return Ok(body);
		}
		let mut w = Writer::new();
		let start = Label::new();
		let end = Label::new();
		// The header is `00 LL LL LL`: the payload length behind a zero
		// byte, which is exactly a u32 of the length shifted up a byte.
		w.delay(move |ctx| {
			let len = (ctx.label(end)? - ctx.label(start)?) as u32;
			Ok((len << 8).to_le_bytes())
		});
		w.label(start);
		w.slice(&body);
		w.label(end);
		w.finish().map_err(|e| Error::Inconsistency(e.to_string()))
	}

	/// Writes an archive back into a ROM image.
	///
	/// The archive goes back to its own offset when the stored form fits
	/// the entry's slot; otherwise it goes to `free_offset` and every known
	/// pointer is retargeted. Returns the offset actually used.
	#[tracing::instrument(skip_all, fields(identifier = %archive.identifier))]
	pub fn insert_archive(
		&mut self,
		rom: &mut [u8],
		archive: &TextArchive,
		free_offset: Option<usize>,
	) -> Result<usize> {
		let entry = self.entry_for(archive)
			.ok_or_else(|| Error::InvalidInput(format!(
				"no index entry for archive {}", archive.identifier,
			)))?
			.clone();

		let bytes = self.write_archive_bytes(archive)?;
		let stored = if entry.compressed { lz10::compress(&bytes) } else { bytes };

		let target = if stored.len() <= entry.size {
			entry.offset
		} else {
			let free = free_offset.ok_or_else(|| Error::InvalidInput(format!(
				"archive {} grew from {:#X} to {:#X} bytes; supply a free-space offset",
				archive.identifier, entry.size, stored.len(),
			)))?;
			if self.index.next_at_or_after(free)
				.is_some_and(|e| e.offset != entry.offset && e.offset < free + stored.len())
			{
				return Err(Error::Inconsistency(format!(
					"free space at {free:#X} overlaps a known entry",
				)));
			}
			free
		};

		if target + stored.len() > rom.len() {
			return Err(Error::InvalidInput(format!(
				"archive {} does not fit the image at {target:#X}", archive.identifier,
			)));
		}
		rom[target..target + stored.len()].copy_from_slice(&stored);

		if target != entry.offset {
			for &p in &entry.pointers {
				if p + 4 > rom.len() {
					continue;
				}
				let old = u32::from_le_bytes(rom[p..p+4].try_into().unwrap());
				let new = (old & 0xFF00_0000) | target as u32;
				rom[p..p+4].copy_from_slice(&new.to_le_bytes());
			}
			self.index.remove(entry.offset);
			self.index.insert(RomEntry {
				offset: target,
				size: stored.len(),
				..entry
			});
		} else {
			self.index.get_mut(entry.offset).expect("entry exists").size = stored.len();
		}
		Ok(target)
	}

	pub fn extract_text_boxes(&self, archive: &TextArchive) -> Result<String> {
		Ok(textbox::write_text_boxes(&self.game()?.db, archive))
	}

	pub fn parse_text_boxes(&self, text: &str) -> Result<Vec<TextArchive>> {
		Ok(textbox::parse_text_boxes(&self.game()?.db, text)?)
	}

	/// Splices an authored patch archive onto a base archive.
	pub fn patch_archive(&self, base: &mut TextArchive, patch: &TextArchive) -> Result<()> {
		Ok(patch::patch_archive(&self.game()?.db, base, patch)?)
	}

	/// Reads the archive at `offset` and re-serialises it, reporting both
	/// byte images so the caller can diff them.
	pub fn test_roundtrip(&self, data: &[u8], offset: usize) -> Result<RoundTrip> {
		let game = self.game()?;
		let archive = self.read_archive(data, offset, None)?;

		let original = match self.index.get(offset) {
			Some(e) if e.compressed => {
				let (buf, _) = lz10::trial_decompress(&data[offset..], self.options.max_decompressed)
					.ok_or_else(|| Error::Inconsistency(format!(
						"entry {offset:06X} is marked compressed, but the bytes do not decompress",
					)))?;
				let skip = detect_size_header(&buf).unwrap_or(0);
				buf[skip..].to_vec()
			}
			Some(e) => {
				let end = e.end().min(data.len());
				let skip = detect_size_header(&data[offset..end])
					.filter(|_| e.size_header)
					.unwrap_or(0);
				data[offset + skip..end].to_vec()
			}
			None => return Err(Error::InvalidInput(format!(
				"no index entry for offset {offset:#X}",
			))),
		};

		let writer = ScriptWriter::new(game.encoding.as_ref());
		let rewritten = writer.write_archive(&archive)?;
		Ok(RoundTrip { identifier: archive.identifier, original, rewritten })
	}

	fn entry_for(&self, archive: &TextArchive) -> Option<&RomEntry> {
		self.index.get(identifier_offset(&archive.identifier)?)
	}
}

/// Recovers the ROM offset from an archive identifier, which is either a
/// bare hex offset or `stem_OFFSET`.
pub fn identifier_offset(identifier: &str) -> Option<usize> {
	let hex = identifier.rsplit('_').next()?;
	usize::from_str_radix(hex, 16).ok()
}
