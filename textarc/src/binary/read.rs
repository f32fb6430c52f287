//! Reads scripts out of a byte stream, one matched command at a time.

use std::ops::Range;
use std::sync::Arc;

use spool::Reader;

use crate::binary::read_bits;
use crate::cmd::{Command, DataEntry, ElementData};
use crate::db::CommandDatabase;
use crate::defs::{CommandDefinition, ElementDefinition, EndType};
use crate::encoding::TableEncoding;
use crate::script::{Element, Script, TextArchive};

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
	#[error(transparent)]
	Read { #[from] source: spool::read::Error },
	#[error("command {command:?} at {pos:#X}: data entry count {count} out of range")]
	EntryCount { pos: usize, command: String, count: i64 },
}

pub type Result<T, E=ReadError> = std::result::Result<T, E>;

/// Why a script read stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEnd {
	/// A command that always ends its script was consumed.
	Ended,
	/// The stream or the byte budget ran out first.
	Exhausted,
}

/// The scripts read from one region, with the byte span of each.
#[derive(Debug)]
pub struct ReadOutcome {
	pub archive: TextArchive,
	pub spans: Vec<Range<usize>>,
	/// Whether the last script stopped at an always-ending command.
	pub closed: bool,
}

/// Reads scripts by driving the database matcher over a stream.
pub struct ScriptReader<'a> {
	db: &'a CommandDatabase,
	encoding: Option<&'a TableEncoding>,
}

impl<'a> ScriptReader<'a> {
	pub fn new(db: &'a CommandDatabase, encoding: Option<&'a TableEncoding>) -> Self {
		Self { db, encoding }
	}

	/// Reads scripts until `max_pos` or the end of the stream.
	///
	/// With `stop_on_open_script`, reading stops after the first script that
	/// does not close with an always-ending command; this is how regions of
	/// unknown size are probed without swallowing the rest of the file.
	pub fn read_archive(
		&self,
		f: &mut Reader,
		identifier: impl Into<String>,
		max_pos: usize,
		stop_on_open_script: bool,
	) -> Result<ReadOutcome> {
		let mut archive = TextArchive::new(identifier);
		let mut spans = Vec::new();
		let mut closed = true;
		while f.pos() < max_pos && !f.is_empty() {
			let start = f.pos();
			let (script, end) = self.read_script(f, max_pos)?;
			if script.elements.is_empty() {
				break;
			}
			spans.push(start..f.pos());
			archive.scripts.push(script);
			closed = end == ScriptEnd::Ended;
			if !closed && stop_on_open_script {
				break;
			}
		}
		Ok(ReadOutcome { archive, spans, closed })
	}

	/// Reads one script, stopping after an always-ending command.
	pub fn read_script(&self, f: &mut Reader, max_pos: usize) -> Result<(Script, ScriptEnd)> {
		let mut script = Script::new(self.db.name());
		while f.pos() < max_pos && !f.is_empty() {
			match self.read_element(f, max_pos)? {
				Element::Text(t) => match script.elements.last_mut() {
					// Adjacent code points merge into one text run.
					Some(Element::Text(run)) => run.push_str(&t),
					_ => script.elements.push(Element::Text(t)),
				},
				e => {
					let ends = matches!(
						&e,
						Element::Command(c) if c.definition().end_type == EndType::Always,
					);
					script.elements.push(e);
					if ends {
						return Ok((script, ScriptEnd::Ended));
					}
				}
			}
		}
		Ok((script, ScriptEnd::Exhausted))
	}

	fn read_element(&self, f: &mut Reader, max_pos: usize) -> Result<Element> {
		let start = f.pos();
		match self.match_command(f, max_pos)? {
			Some(def) => {
				f.seek(start)?;
				Ok(Element::Command(self.read_command(f, def)?))
			}
			None => {
				f.seek(start)?;
				if let Some(enc) = self.encoding {
					if let Some((text, len)) = enc.decode_prefix(f.remaining()) {
						let text = text.to_owned();
						f.slice(len)?;
						return Ok(Element::Text(text));
					}
				}
				Ok(Element::Byte(f.u8()?))
			}
		}
	}

	/// Feeds bytes to the matcher until a definition can be chosen.
	///
	/// Bytes are read while more than one definition survives, or while the
	/// sole survivor still has unverified base bytes. When the candidate set
	/// collapses to nothing, the choice falls back to the shortest member of
	/// the last surviving set; if even the first byte matched nothing, there
	/// is no command here.
	fn match_command(&self, f: &mut Reader, max_pos: usize) -> Result<Option<Arc<CommandDefinition>>> {
		let mut seq = Vec::new();
		let mut alive: Vec<Arc<CommandDefinition>> = Vec::new();
		while f.pos() < max_pos && !f.is_empty() {
			seq.push(f.u8()?);
			let cands = self.db.match_prefix(&seq);
			if cands.is_empty() {
				break;
			}
			let longest = cands.iter().map(|d| d.base.len()).max().unwrap_or(0);
			alive = cands;
			if seq.len() >= longest {
				break;
			}
		}
		Ok(alive.into_iter().min_by_key(|d| d.base.len()))
	}

	/// Reads one command whose definition has been chosen.
	///
	/// The stream is left `rewind_count` bytes before the end of the
	/// command, so overlapping opcodes see their shared bytes again.
	fn read_command(&self, f: &mut Reader, def: Arc<CommandDefinition>) -> Result<Command> {
		let start = f.pos();
		let mut buf = Vec::with_capacity(def.base.len());
		extend_to(&mut buf, f, def.base.len())?;

		let mut elements = Vec::with_capacity(def.elements.len());
		for ed in &def.elements {
			if ed.has_multiple_entries() {
				elements.push(self.read_data_entries(f, &mut buf, def.as_ref(), ed)?);
			} else {
				let mut values = Vec::new();
				for p in ed.parameters() {
					extend_to(&mut buf, f, p.offset + p.minimum_byte_count())?;
					values.push(p.add + read_bits(&buf, p.offset, p.shift, p.bits) as i64);
				}
				elements.push(ElementData { entries: vec![DataEntry::from_values(values)] });
			}
		}

		let consumed = buf.len();
		f.seek(start + consumed - def.rewind_count.min(consumed))?;
		Ok(Command::from_parts(def, elements))
	}

	fn read_data_entries(
		&self,
		f: &mut Reader,
		buf: &mut Vec<u8>,
		def: &CommandDefinition,
		ed: &ElementDefinition,
	) -> Result<ElementData> {
		let lp = ed.length.as_ref().expect("table element has a length parameter");
		extend_to(buf, f, lp.offset + lp.minimum_byte_count())?;
		let count = lp.add + read_bits(buf, lp.offset, lp.shift, lp.bits) as i64;
		// The count also has to be satisfiable from the bytes that exist;
		// a bogus length in scanned garbage must not allocate for it.
		let ok = usize::try_from(count).ok()
			.filter(|&n| n <= f.remaining().len() + buf.len());
		let count = ok.ok_or_else(|| ReadError::EntryCount {
			pos: f.pos(),
			command: def.name.clone(),
			count,
		})?;

		// Group-major layout: all entries' group 0 records, then group 1, …
		let mut values = vec![Vec::new(); count];
		for (g, params) in ed.groups.iter().enumerate() {
			let extent = params.iter()
				.map(|p| p.offset + p.minimum_byte_count())
				.max()
				.unwrap_or(0);
			let record = ed.group_size(g).max(extent);
			for entry in values.iter_mut() {
				let rec = buf.len();
				extend_to(buf, f, rec + record)?;
				for p in params {
					entry.push(p.add + read_bits(&buf[rec..], p.offset, p.shift, p.bits) as i64);
				}
			}
		}
		Ok(ElementData {
			entries: values.into_iter().map(DataEntry::from_values).collect(),
		})
	}
}

fn extend_to(buf: &mut Vec<u8>, f: &mut Reader, len: usize) -> Result<(), spool::read::Error> {
	while buf.len() < len {
		buf.push(f.u8()?);
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::defs::{ElementDefinition, ParameterDefinition};

	fn always(name: &str, byte: u8) -> Arc<CommandDefinition> {
		let mut d = CommandDefinition::new(name, vec![byte], vec![0xFF]).unwrap();
		d.end_type = EndType::Always;
		d.build().unwrap()
	}

	#[test]
	fn single_command_leaves_the_rest() {
		let mut db = CommandDatabase::new("t");
		db.add(always("end", 0xE0));
		let mut f = Reader::new(&[0xE0, 0xFF]);
		let (script, end) = ScriptReader::new(&db, None)
			.read_script(&mut f, usize::MAX)
			.unwrap();
		assert_eq!(end, ScriptEnd::Ended);
		assert_eq!(script.elements.len(), 1);
		assert!(matches!(script.elements[0], Element::Command(_)));
		assert_eq!(f.remaining(), &[0xFF]);
	}

	#[test]
	fn archives_keep_reading_scripts_to_the_limit() {
		let mut db = CommandDatabase::new("t");
		db.add(always("end", 0xE0));
		let mut f = Reader::new(&[0xE0, 0xE0, 0xFF]);
		let out = ScriptReader::new(&db, None)
			.read_archive(&mut f, "t", usize::MAX, false)
			.unwrap();
		assert_eq!(out.archive.scripts.len(), 3);
		assert_eq!(out.spans, [0..1, 1..2, 2..3]);
		assert!(!out.closed);
		// The stray 0xFF is nobody's command; it ends up a raw byte.
		assert_eq!(out.archive.scripts[2].elements, [Element::Byte(0xFF)]);
	}

	#[test]
	fn bit_packed_parameter() {
		let mut db = CommandDatabase::new("t");
		let mut d = CommandDefinition::new("tone", vec![0x10], vec![0xF0]).unwrap();
		d.elements.push(ElementDefinition::scalar("main", vec![
			ParameterDefinition::new("level", 0, 0, 4).unwrap(),
		]));
		db.add(d.build().unwrap());

		let mut f = Reader::new(&[0x17]);
		let (script, end) = ScriptReader::new(&db, None)
			.read_script(&mut f, usize::MAX)
			.unwrap();
		assert_eq!(end, ScriptEnd::Exhausted);
		let Element::Command(c) = &script.elements[0] else { panic!() };
		assert_eq!(c.value("level"), Some(7));
	}

	#[test]
	fn data_entries_group_major() {
		// length byte at offset 1; three one-byte fields per entry
		let mut db = CommandDatabase::new("t");
		let mut d = CommandDefinition::new("menu", vec![0x80, 0x00], vec![0xFF, 0x00]).unwrap();
		let length = ParameterDefinition::new("count", 1, 0, 8).unwrap();
		let mut pars = Vec::new();
		for (i, name) in ["a", "b", "c"].iter().enumerate() {
			let mut p = ParameterDefinition::new(*name, i, 0, 8).unwrap();
			p.offset_kind = if i == 0 {
				crate::defs::OffsetKind::End
			} else {
				crate::defs::OffsetKind::Label("a".into())
			};
			pars.push(p);
		}
		d.elements.push(ElementDefinition::table("items", length, vec![pars]));
		db.add(d.build().unwrap());

		let data = [0x80, 0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
		let mut f = Reader::new(&data);
		let (script, _) = ScriptReader::new(&db, None)
			.read_script(&mut f, usize::MAX)
			.unwrap();
		let Element::Command(c) = &script.elements[0] else { panic!() };
		let items = c.element("items").unwrap();
		assert_eq!(items.entries.len(), 2);
		assert_eq!(items.entries[0].values(), [0xAA, 0xBB, 0xCC]);
		assert_eq!(items.entries[1].values(), [0xDD, 0xEE, 0xFF]);
		assert!(f.is_empty());
	}

	#[test]
	fn zero_candidates_fall_back_to_text_then_bytes() {
		let mut db = CommandDatabase::new("t");
		db.add(always("end", 0xE0));
		let mut enc = TableEncoding::new("main");
		enc.insert(&[0x41], "A");
		enc.insert(&[0x42], "B");

		let mut f = Reader::new(&[0x41, 0x42, 0x99, 0xE0]);
		let (script, end) = ScriptReader::new(&db, Some(&enc))
			.read_script(&mut f, usize::MAX)
			.unwrap();
		assert_eq!(end, ScriptEnd::Ended);
		assert_eq!(script.elements.len(), 3);
		assert_eq!(script.elements[0], Element::Text("AB".into()));
		assert_eq!(script.elements[1], Element::Byte(0x99));
	}

	#[test]
	fn shorter_overload_wins_when_the_longer_dies() {
		let mut db = CommandDatabase::new("t");
		db.add(always("e", 0xE0));
		let d = CommandDefinition::new("ext", vec![0xE0, 0x01], vec![0xFF, 0xFF]).unwrap();
		db.add(d.build().unwrap());

		// 0xE0 0x01 picks the two-byte command...
		let mut f = Reader::new(&[0xE0, 0x01]);
		let (script, _) = ScriptReader::new(&db, None).read_script(&mut f, usize::MAX).unwrap();
		let Element::Command(c) = &script.elements[0] else { panic!() };
		assert_eq!(c.name(), "ext");

		// ...0xE0 0x02 falls back to the one-byte ender, leaving 0x02.
		let mut f = Reader::new(&[0xE0, 0x02]);
		let (script, end) = ScriptReader::new(&db, None).read_script(&mut f, usize::MAX).unwrap();
		assert_eq!(end, ScriptEnd::Ended);
		let Element::Command(c) = &script.elements[0] else { panic!() };
		assert_eq!(c.name(), "e");
		assert_eq!(f.remaining(), &[0x02]);
	}

	#[test]
	fn rewind_reexposes_tail_bytes() {
		let mut db = CommandDatabase::new("t");
		let mut d = CommandDefinition::new("pause", vec![0xE8, 0xE0], vec![0xFF, 0xFF]).unwrap();
		d.rewind_count = 1;
		db.add(d.build().unwrap());
		db.add(always("end", 0xE0));

		let mut f = Reader::new(&[0xE8, 0xE0]);
		let (script, end) = ScriptReader::new(&db, None).read_script(&mut f, usize::MAX).unwrap();
		assert_eq!(end, ScriptEnd::Ended);
		assert_eq!(script.elements.len(), 2);
		let Element::Command(c) = &script.elements[1] else { panic!() };
		assert_eq!(c.name(), "end");
	}
}
