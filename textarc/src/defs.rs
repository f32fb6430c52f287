//! Definitions describing the byte layout of script commands.
//!
//! A [`CommandDefinition`] is the template for one opcode family: a base byte
//! sequence, a bitmask deciding which bits identify the command, and the
//! parameters packed into the remaining bits. Definitions are immutable once
//! constructed; commands refer back to them through an [`Arc`].

use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DefError {
	#[error("empty name")]
	EmptyName,
	#[error("command {name:?}: base is {base} bytes but mask is {mask} bytes")]
	MaskLength { name: String, base: usize, mask: usize },
	#[error("command {name:?}: base may not be empty")]
	EmptyBase { name: String },
	#[error("parameter {name:?}: needs at least one bit")]
	NoBits { name: String },
	#[error("parameter {name:?}: {bits} bits do not fit a parameter value")]
	TooManyBits { name: String, bits: usize },
	#[error("command {name:?}: mugshot parameter {parameter:?} does not resolve to a scalar parameter")]
	BadMugshot { name: String, parameter: String },
}

pub type Result<T, E=DefError> = std::result::Result<T, E>;

/// Where a parameter's byte offset is measured from when writing.
///
/// Reading always measures from the start of the command; these only matter
/// for variable-length layouts, where a later field's position depends on
/// how much has been written before it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OffsetKind {
	/// From the start of the command.
	#[default]
	Start,
	/// From the end of the buffer at the moment the parameter is written.
	End,
	/// From where the named parameter was last written.
	Label(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndType {
	/// The command never ends its script.
	#[default]
	Never,
	/// Ends the script if every jump it carries leaves the script.
	Default,
	/// The command always ends its script.
	Always,
}

/// How a command interacts with the active mugshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mugshot {
	#[default]
	None,
	/// The command hides the active mugshot.
	Hide,
	/// The named parameter selects the portrait to show.
	Parameter(String),
}

/// One field inside a command's byte layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDefinition {
	pub name: String,
	/// Byte offset, relative per `offset_kind`.
	pub offset: usize,
	/// Bit shift within the byte at `offset`.
	pub shift: usize,
	/// Field width in bits.
	pub bits: usize,
	/// Additive bias; the stored range is `add ..= add + 2^bits - 1`.
	pub add: i64,
	/// Values name another script in the same archive.
	pub is_jump: bool,
	/// Decode the value through the named table encoding for display.
	pub value_encoding: Option<String>,
	/// Per-entry byte widths of each data group, if this counts data entries.
	pub data_group_sizes: Vec<usize>,
	pub offset_kind: OffsetKind,
}

impl ParameterDefinition {
	pub fn new(name: impl Into<String>, offset: usize, shift: usize, bits: usize) -> Result<Self> {
		let name = name.into();
		if name.is_empty() {
			return Err(DefError::EmptyName);
		}
		if bits == 0 {
			return Err(DefError::NoBits { name });
		}
		if bits > 56 {
			return Err(DefError::TooManyBits { name, bits });
		}
		Ok(Self {
			name,
			offset,
			shift,
			bits,
			add: 0,
			is_jump: false,
			value_encoding: None,
			data_group_sizes: Vec::new(),
			offset_kind: OffsetKind::Start,
		})
	}

	/// The number of bytes this field touches, from its own offset.
	pub fn minimum_byte_count(&self) -> usize {
		(self.shift + self.bits + 7) / 8
	}

	pub fn in_range(&self, value: i64) -> bool {
		self.add <= value && value <= self.max_value()
	}

	pub fn max_value(&self) -> i64 {
		self.add + ((1i64 << self.bits) - 1)
	}
}

/// A named grouping of parameters inside a command.
///
/// An element is either a plain set of scalar parameters, or a table of data
/// entries counted by a length parameter and laid out in one or more data
/// groups. Data groups are serialised group-major: all entries' group 0,
/// then all entries' group 1, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDefinition {
	pub name: String,
	pub length: Option<ParameterDefinition>,
	pub groups: Vec<Vec<ParameterDefinition>>,
}

impl ElementDefinition {
	pub fn scalar(name: impl Into<String>, parameters: Vec<ParameterDefinition>) -> Self {
		Self { name: name.into(), length: None, groups: vec![parameters] }
	}

	pub fn table(name: impl Into<String>, length: ParameterDefinition, groups: Vec<Vec<ParameterDefinition>>) -> Self {
		Self { name: name.into(), length: Some(length), groups }
	}

	pub fn has_multiple_entries(&self) -> bool {
		self.length.is_some()
	}

	/// All parameters of every group, in declaration order.
	pub fn parameters(&self) -> impl Iterator<Item = &ParameterDefinition> {
		self.groups.iter().flatten()
	}

	pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
		self.parameters().find(|p| p.name.eq_ignore_ascii_case(name))
	}

	/// The per-entry byte width of one data group.
	///
	/// The length parameter's declared sizes win; otherwise the width is the
	/// furthest extent of the group's parameters.
	pub fn group_size(&self, group: usize) -> usize {
		if let Some(l) = &self.length {
			if let Some(&size) = l.data_group_sizes.get(group) {
				return size;
			}
		}
		self.groups[group].iter()
			.map(|p| p.offset + p.minimum_byte_count())
			.max()
			.unwrap_or(0)
	}
}

/// The template for one command: base bytes, identification mask, and the
/// elements laid out over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
	pub name: String,
	pub base: Vec<u8>,
	pub mask: Vec<u8>,
	pub end_type: EndType,
	/// Whether this command produces glyphs inside a text box.
	pub prints: bool,
	pub mugshot: Mugshot,
	/// Bytes to back up after this command, letting the next one overlap.
	pub rewind_count: usize,
	/// Carried for definition round-trips; never used for selection.
	pub priority_length: usize,
	pub elements: Vec<ElementDefinition>,
}

impl CommandDefinition {
	pub fn new(name: impl Into<String>, base: Vec<u8>, mask: Vec<u8>) -> Result<Self> {
		let name = name.into();
		if name.is_empty() {
			return Err(DefError::EmptyName);
		}
		if base.is_empty() {
			return Err(DefError::EmptyBase { name });
		}
		if base.len() != mask.len() {
			return Err(DefError::MaskLength { name, base: base.len(), mask: mask.len() });
		}
		Ok(Self {
			name,
			base,
			mask,
			end_type: EndType::Never,
			prints: false,
			mugshot: Mugshot::None,
			rewind_count: 0,
			priority_length: 0,
			elements: Vec::new(),
		})
	}

	/// Validates cross-references and wraps the definition for sharing.
	pub fn build(self) -> Result<Arc<Self>> {
		if let Mugshot::Parameter(par) = &self.mugshot {
			let ok = self.elements.iter()
				.filter(|e| !e.has_multiple_entries())
				.any(|e| e.parameter(par).is_some());
			if !ok {
				return Err(DefError::BadMugshot {
					name: self.name,
					parameter: par.clone(),
				});
			}
		}
		Ok(Arc::new(self))
	}

	/// The length of the fixed part, in bytes.
	pub fn minimum_length(&self) -> usize {
		self.base.len()
	}

	/// Whether `data` could be the start of this command.
	///
	/// Only the bytes present are tested; a shorter sequence than the base
	/// still matches if nothing read so far contradicts it.
	pub fn matches(&self, data: &[u8]) -> bool {
		if data.len() > self.base.len() {
			return false;
		}
		std::iter::zip(data, std::iter::zip(&self.base, &self.mask))
			.all(|(d, (b, m))| d & m == *b)
	}

	pub fn element(&self, name: &str) -> Option<&ElementDefinition> {
		self.elements.iter().find(|e| e.name.eq_ignore_ascii_case(name))
	}
}
