//! Serialises scripts back to bytes.

use std::collections::HashMap;

use crate::binary::write_bits;
use crate::cmd::Command;
use crate::defs::{ElementDefinition, OffsetKind, ParameterDefinition};
use crate::encoding::{EncodeError, TableEncoding};
use crate::script::{Element, Script, TextArchive};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
	#[error("command {command:?}: parameter {parameter:?} references unwritten label {label:?}")]
	Label { command: String, parameter: String, label: String },
	#[error("command {command:?}: value {value} of {parameter:?} is outside {min}..={max}")]
	Range { command: String, parameter: String, value: i64, min: i64, max: i64 },
	#[error("command {command:?}: {count} data entries do not fit the length parameter")]
	EntryCount { command: String, count: usize },
	#[error("directive elements cannot be serialised to a binary script")]
	Directive,
	#[error("no table encoding to write text with")]
	NoEncoding,
	#[error(transparent)]
	Encode { #[from] source: EncodeError },
}

pub type Result<T, E=WriteError> = std::result::Result<T, E>;

/// Serialises scripts and whole archives.
pub struct ScriptWriter<'a> {
	encoding: Option<&'a TableEncoding>,
}

impl<'a> ScriptWriter<'a> {
	pub fn new(encoding: Option<&'a TableEncoding>) -> Self {
		Self { encoding }
	}

	/// The byte image of an archive: its scripts, concatenated.
	pub fn write_archive(&self, archive: &TextArchive) -> Result<Vec<u8>> {
		let mut out = Vec::new();
		for script in &archive.scripts {
			out.extend_from_slice(&self.write_script(script)?);
		}
		Ok(out)
	}

	pub fn write_script(&self, script: &Script) -> Result<Vec<u8>> {
		let mut out = Vec::new();
		for element in &script.elements {
			match element {
				Element::Command(c) => out.extend_from_slice(&write_command(c)?),
				Element::Text(t) => {
					let enc = self.encoding.ok_or(WriteError::NoEncoding)?;
					out.extend_from_slice(&enc.encode(t)?);
				}
				Element::Byte(b) => out.push(*b),
				Element::Directive { .. } => return Err(WriteError::Directive),
			}
		}
		Ok(out)
	}
}

/// Serialises one command.
///
/// The buffer starts as the base bytes; parameters are written over them in
/// declaration order, growing the buffer as End- and label-relative offsets
/// demand. The final `rewind_count` bytes are cut so the next command can
/// overlap them.
pub fn write_command(cmd: &Command) -> Result<Vec<u8>> {
	let def = cmd.definition();
	let mut buf = def.base.clone();
	let mut labels: HashMap<&str, usize> = HashMap::new();

	for (ed, data) in std::iter::zip(&def.elements, cmd.elements()) {
		if ed.has_multiple_entries() {
			write_data_entries(&mut buf, &mut labels, cmd, ed, data)?;
		} else if let Some(entry) = data.entries.first() {
			for (p, &v) in std::iter::zip(ed.parameters(), entry.values()) {
				write_parameter(&mut buf, &mut labels, cmd, p, v)?;
			}
		}
	}

	buf.truncate(buf.len().saturating_sub(def.rewind_count));
	Ok(buf)
}

fn write_data_entries<'d>(
	buf: &mut Vec<u8>,
	labels: &mut HashMap<&'d str, usize>,
	cmd: &'d Command,
	ed: &'d ElementDefinition,
	data: &crate::cmd::ElementData,
) -> Result<()> {
	let lp = ed.length.as_ref().expect("table element has a length parameter");
	let count = data.entries.len();
	let value = i64::try_from(count).map_err(|_| WriteError::EntryCount {
		command: cmd.name().to_owned(),
		count,
	})?;
	write_parameter(buf, labels, cmd, lp, value)?;

	// Group-major: every entry's group-0 record, then every group-1 record.
	let mut group_start = 0;
	for (g, params) in ed.groups.iter().enumerate() {
		let record = ed.group_size(g).max(
			params.iter().map(|p| p.offset + p.minimum_byte_count()).max().unwrap_or(0),
		);
		for entry in &data.entries {
			let rec = buf.len();
			let values = &entry.values()[group_start..group_start + params.len()];
			for (p, &v) in std::iter::zip(params, values) {
				write_parameter(buf, labels, cmd, p, v)?;
			}
			// Records are fixed-size; pad short ones.
			if buf.len() < rec + record {
				buf.resize(rec + record, 0);
			}
		}
		group_start += params.len();
	}
	Ok(())
}

fn write_parameter<'d>(
	buf: &mut Vec<u8>,
	labels: &mut HashMap<&'d str, usize>,
	cmd: &Command,
	p: &'d ParameterDefinition,
	value: i64,
) -> Result<()> {
	let base = match &p.offset_kind {
		OffsetKind::Start => 0,
		OffsetKind::End => buf.len(),
		OffsetKind::Label(name) => {
			*labels.get(name.as_str()).ok_or_else(|| WriteError::Label {
				command: cmd.name().to_owned(),
				parameter: p.name.clone(),
				label: name.clone(),
			})?
		}
	};
	let pos = base + p.offset;

	let required = pos + p.minimum_byte_count();
	if buf.len() < required {
		buf.resize(required, 0);
	}
	labels.insert(&p.name, pos);

	if !p.in_range(value) {
		return Err(WriteError::Range {
			command: cmd.name().to_owned(),
			parameter: p.name.clone(),
			value,
			min: p.add,
			max: p.max_value(),
		});
	}
	write_bits(buf, pos, p.shift, p.bits, (value - p.add) as u64);
	Ok(())
}
