//! Concrete commands: a definition plus the parameter values read for it.

use std::sync::Arc;

use crate::defs::{CommandDefinition, ElementDefinition, EndType};

/// Jump value meaning "do not jump"; execution falls through to the next
/// text box instead of selecting a script.
pub const NO_JUMP: i64 = 0xFF;

/// One row of an element's embedded tabular data.
///
/// Values are stored in the element's parameter declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataEntry {
	values: Vec<i64>,
}

impl DataEntry {
	/// An entry with every parameter at the low end of its range.
	pub fn defaults(def: &ElementDefinition) -> Self {
		Self { values: def.parameters().map(|p| p.add).collect() }
	}

	pub fn get(&self, def: &ElementDefinition, name: &str) -> Option<i64> {
		let i = def.parameters().position(|p| p.name.eq_ignore_ascii_case(name))?;
		self.values.get(i).copied()
	}

	pub fn set(&mut self, def: &ElementDefinition, name: &str, value: i64) -> bool {
		let Some(i) = def.parameters().position(|p| p.name.eq_ignore_ascii_case(name)) else {
			return false;
		};
		self.values[i] = value;
		true
	}

	pub fn values(&self) -> &[i64] {
		&self.values
	}

	pub fn values_mut(&mut self) -> &mut [i64] {
		&mut self.values
	}

	pub fn from_values(values: Vec<i64>) -> Self {
		Self { values }
	}
}

/// Per-element data of one command instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementData {
	pub entries: Vec<DataEntry>,
}

/// A command bound to its definition, with decoded parameter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
	def: Arc<CommandDefinition>,
	elements: Vec<ElementData>,
}

impl Command {
	/// A command with default parameter values.
	///
	/// Scalar elements get one default entry; tables start empty.
	pub fn new(def: Arc<CommandDefinition>) -> Self {
		let elements = def.elements.iter().map(|e| {
			let entries = if e.has_multiple_entries() {
				Vec::new()
			} else {
				vec![DataEntry::defaults(e)]
			};
			ElementData { entries }
		}).collect();
		Self { def, elements }
	}

	pub fn from_parts(def: Arc<CommandDefinition>, elements: Vec<ElementData>) -> Self {
		debug_assert_eq!(def.elements.len(), elements.len());
		Self { def, elements }
	}

	pub fn name(&self) -> &str {
		&self.def.name
	}

	pub fn definition(&self) -> &Arc<CommandDefinition> {
		&self.def
	}

	pub fn elements(&self) -> &[ElementData] {
		&self.elements
	}

	pub fn elements_mut(&mut self) -> &mut [ElementData] {
		&mut self.elements
	}

	/// The data for a named element, if the definition has it.
	pub fn element(&self, name: &str) -> Option<&ElementData> {
		let i = self.def.elements.iter().position(|e| e.name.eq_ignore_ascii_case(name))?;
		self.elements.get(i)
	}

	/// A scalar parameter's value, searched across all single-entry elements.
	pub fn value(&self, parameter: &str) -> Option<i64> {
		std::iter::zip(&self.def.elements, &self.elements)
			.filter(|(d, _)| !d.has_multiple_entries())
			.find_map(|(d, e)| e.entries.first()?.get(d, parameter))
	}

	pub fn set_value(&mut self, parameter: &str, value: i64) -> bool {
		for (d, e) in std::iter::zip(&self.def.elements, &mut self.elements) {
			if d.has_multiple_entries() {
				continue;
			}
			if let Some(entry) = e.entries.first_mut() {
				if entry.set(d, parameter, value) {
					return true;
				}
			}
		}
		false
	}

	/// Every jump parameter value in the command, across all data entries.
	pub fn jumps(&self) -> impl Iterator<Item = i64> + '_ {
		std::iter::zip(&self.def.elements, &self.elements).flat_map(|(d, e)| {
			e.entries.iter().flat_map(move |entry| {
				std::iter::zip(d.parameters(), entry.values())
					.filter(|(p, _)| p.is_jump)
					.map(|(_, v)| *v)
			})
		})
	}

	/// Whether executing this command terminates its script.
	///
	/// `Default` commands end the script when all of their jumps select a
	/// script; a [`NO_JUMP`] target means execution can fall through.
	pub fn ends_script(&self) -> bool {
		match self.def.end_type {
			EndType::Always => true,
			EndType::Never => false,
			EndType::Default => {
				let mut any = false;
				for v in self.jumps() {
					if v == NO_JUMP {
						return false;
					}
					any = true;
				}
				any
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::defs::{ElementDefinition, ParameterDefinition};

	fn jump_def(end_type: EndType) -> Arc<CommandDefinition> {
		let mut d = CommandDefinition::new("jump", vec![0xE6, 0x00], vec![0xFF, 0x00]).unwrap();
		d.end_type = end_type;
		let mut p = ParameterDefinition::new("target", 1, 0, 8).unwrap();
		p.is_jump = true;
		d.elements.push(ElementDefinition::scalar("main", vec![p]));
		d.build().unwrap()
	}

	#[test]
	fn default_ends_script_unless_a_jump_falls_through() {
		let mut c = Command::new(jump_def(EndType::Default));
		c.set_value("target", 2);
		assert!(c.ends_script());
		c.set_value("target", NO_JUMP);
		assert!(!c.ends_script());
	}

	#[test]
	fn default_without_jumps_never_ends() {
		let d = CommandDefinition::new("nop", vec![0xE0], vec![0xFF]).unwrap();
		let mut d = d;
		d.end_type = EndType::Default;
		let c = Command::new(d.build().unwrap());
		assert!(!c.ends_script());
	}

	#[test]
	fn always_wins_over_values() {
		let mut c = Command::new(jump_def(EndType::Always));
		c.set_value("target", NO_JUMP);
		assert!(c.ends_script());
	}
}
