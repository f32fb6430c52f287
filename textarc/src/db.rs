//! The command database: every command definition a game knows, indexed for
//! name lookup and for prefix matching against bytes read from a stream.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cmd::{Command, DataEntry, ElementData};
use crate::defs::CommandDefinition;
use crate::script::Script;

/// A named collection of command definitions.
///
/// Names are not unique: a command may have several overloads with different
/// byte layouts, distinguished only when a concrete value set is known.
/// Insertion order is preserved, and overload selection is stable under it.
pub struct CommandDatabase {
	name: String,
	defs: Vec<Arc<CommandDefinition>>,
	by_name: HashMap<String, Vec<usize>>,
	/// The last query and its result. `match_prefix` is called once per byte
	/// of every command, almost always with the previous query plus one
	/// byte, so re-filtering the cached candidates skips most of the table.
	cache: RefCell<Option<MatchCache>>,
	split_snippet: Option<Script>,
}

struct MatchCache {
	sequence: Vec<u8>,
	candidates: Vec<Arc<CommandDefinition>>,
}

impl std::fmt::Debug for CommandDatabase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CommandDatabase")
			.field("name", &self.name)
			.field("defs", &self.defs.len())
			.finish()
	}
}

impl CommandDatabase {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			defs: Vec::new(),
			by_name: HashMap::new(),
			cache: RefCell::new(None),
			split_snippet: None,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Appends a definition. Invalidates the match cache.
	pub fn add(&mut self, def: Arc<CommandDefinition>) {
		self.by_name
			.entry(def.name.to_uppercase())
			.or_default()
			.push(self.defs.len());
		self.defs.push(def);
		*self.cache.borrow_mut() = None;
	}

	pub fn definitions(&self) -> &[Arc<CommandDefinition>] {
		&self.defs
	}

	/// All definitions with a case-insensitive name match, in insertion order.
	pub fn find(&self, name: &str) -> Vec<Arc<CommandDefinition>> {
		self.by_name
			.get(&name.to_uppercase())
			.map(|v| v.iter().map(|&i| self.defs[i].clone()).collect())
			.unwrap_or_default()
	}

	/// The short script the patcher uses to split one logical text box into
	/// two rendered boxes.
	pub fn split_snippet(&self) -> Option<&Script> {
		self.split_snippet.as_ref()
	}

	pub fn set_split_snippet(&mut self, snippet: Script) {
		self.split_snippet = Some(snippet);
	}

	/// Every definition still structurally possible for a byte sequence.
	///
	/// Matching is monotone: extending the sequence can only narrow the
	/// result. A definition survives while the sequence is no longer than
	/// its base and every byte passes its mask.
	pub fn match_prefix(&self, sequence: &[u8]) -> Vec<Arc<CommandDefinition>> {
		if sequence.is_empty() {
			return Vec::new();
		}

		let mut cache = self.cache.borrow_mut();
		let mut candidates = match cache.take() {
			Some(c) if sequence.starts_with(&c.sequence) => c.candidates,
			_ => self.defs.iter()
				.filter(|d| d.matches(&sequence[..1]))
				.cloned()
				.collect(),
		};

		candidates.retain(|d| d.matches(sequence));

		*cache = Some(MatchCache {
			sequence: sequence.to_vec(),
			candidates: candidates.clone(),
		});
		candidates
	}

	/// Finds a definition of the same name under which `cmd`'s concrete
	/// values are valid, and rebinds the command to it.
	///
	/// A candidate is suitable when every element present in `cmd` exists in
	/// it, every parameter of every entry exists in the matching element, and
	/// every value is in range under the candidate's parameter. Values are
	/// copied entry by entry; parameters the candidate adds start at their
	/// range minimum. Returns `None` if no overload fits.
	pub fn make_valid_command(&self, cmd: &Command) -> Option<Command> {
		if is_suitable(cmd.definition(), cmd) {
			return Some(cmd.clone());
		}
		for def in self.find(cmd.name()) {
			if is_suitable(&def, cmd) {
				return Some(rebind(def, cmd));
			}
		}
		None
	}
}

fn is_suitable(def: &Arc<CommandDefinition>, cmd: &Command) -> bool {
	std::iter::zip(&cmd.definition().elements, cmd.elements()).all(|(ed, data)| {
		let Some(cand) = def.element(&ed.name) else { return false };
		if !cand.has_multiple_entries() && data.entries.len() > 1 {
			return false;
		}
		data.entries.iter().all(|entry| {
			ed.parameters().all(|p| {
				match (entry.get(ed, &p.name), cand.parameter(&p.name)) {
					(Some(v), Some(cp)) => cp.in_range(v),
					_ => false,
				}
			})
		})
	})
}

fn rebind(def: Arc<CommandDefinition>, cmd: &Command) -> Command {
	let elements = def.elements.iter().map(|cand| {
		let Some((ed, data)) = std::iter::zip(&cmd.definition().elements, cmd.elements())
			.find(|(ed, _)| ed.name.eq_ignore_ascii_case(&cand.name))
		else {
			// An element the old definition lacked entirely; default it.
			return ElementData {
				entries: if cand.has_multiple_entries() {
					Vec::new()
				} else {
					vec![DataEntry::defaults(cand)]
				},
			};
		};
		let entries = data.entries.iter().map(|entry| {
			let mut new = DataEntry::defaults(cand);
			for p in ed.parameters() {
				if let Some(v) = entry.get(ed, &p.name) {
					new.set(cand, &p.name, v);
				}
			}
			new
		}).collect();
		ElementData { entries }
	}).collect();
	Command::from_parts(def, elements)
}
