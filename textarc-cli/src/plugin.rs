//! Loads game definition files: the command database and character tables
//! a game needs before any of its archives can be read.
//!
//! The format is line-based. `#` starts a comment. A `command` block runs
//! until the next top-level keyword:
//!
//! ```text
//! game example
//!
//! table main
//! 	00=A
//! 	E8=\n
//! end
//!
//! snippet split
//!
//! command menu E700/FF00
//! 	end default
//! 	length count at 1 bits 8
//! 	data text at 0 bits 8 end-relative
//! 	data target at 1 bits 8 jump label text
//! ```

use std::sync::Arc;

use textarc::defs::{CommandDefinition, DefError, ElementDefinition, EndType, Mugshot, OffsetKind, ParameterDefinition};
use textarc::script::{Element, Script};
use textarc::{Command, CommandDatabase, Game, TableEncoding};

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
	#[error("line {line}: {reason}")]
	Syntax { line: usize, reason: String },
	#[error("line {line}: {source}")]
	Def { line: usize, source: DefError },
	#[error("snippet names unknown command {name:?}")]
	SnippetCommand { name: String },
	#[error("no game name declared")]
	NoName,
}

pub type Result<T, E=PluginError> = std::result::Result<T, E>;

fn syntax(line: usize, reason: impl Into<String>) -> PluginError {
	PluginError::Syntax { line, reason: reason.into() }
}

pub fn load(text: &str) -> Result<Game> {
	Loader::default().load(text)
}

#[derive(Default)]
struct Loader {
	name: Option<String>,
	db: Option<CommandDatabase>,
	tables: Vec<TableEncoding>,
	snippet_names: Vec<String>,
	command: Option<CommandBuilder>,
	table: Option<TableEncoding>,
}

struct CommandBuilder {
	line: usize,
	def: CommandDefinition,
	elements: Vec<ElementDefinition>,
	group: usize,
}

impl Loader {
	fn load(mut self, text: &str) -> Result<Game> {
		for (n, raw) in text.lines().enumerate() {
			let lineno = n + 1;
			let line = raw.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			self.line(lineno, line)?;
		}
		self.finish()
	}

	fn line(&mut self, lineno: usize, line: &str) -> Result<()> {
		// Table blocks swallow everything up to their `end`.
		if self.table.is_some() {
			if line == "end" {
				self.tables.push(self.table.take().unwrap());
			} else {
				let (hex, text) = line.split_once('=')
					.ok_or_else(|| syntax(lineno, "expected HEX=text"))?;
				let bytes = parse_hex(hex.trim())
					.ok_or_else(|| syntax(lineno, format!("bad hex {hex:?}")))?;
				self.table.as_mut().unwrap().insert(&bytes, unescape(text));
			}
			return Ok(());
		}

		let mut words = line.split_whitespace();
		let keyword = words.next().expect("line is non-empty");
		match keyword {
			"game" => {
				let name = words.next().ok_or_else(|| syntax(lineno, "game needs a name"))?;
				self.name = Some(name.to_owned());
				self.db = Some(CommandDatabase::new(name));
			}
			"table" => {
				let name = words.next().ok_or_else(|| syntax(lineno, "table needs a name"))?;
				self.table = Some(TableEncoding::new(name));
			}
			"snippet" => {
				self.snippet_names = words.map(str::to_owned).collect();
			}
			"command" => {
				self.flush_command()?;
				let name = words.next().ok_or_else(|| syntax(lineno, "command needs a name"))?;
				let bytes = words.next().ok_or_else(|| syntax(lineno, "command needs BASE/MASK"))?;
				let (base, mask) = bytes.split_once('/')
					.ok_or_else(|| syntax(lineno, "expected BASE/MASK"))?;
				let base = parse_hex(base).ok_or_else(|| syntax(lineno, "bad base hex"))?;
				let mask = parse_hex(mask).ok_or_else(|| syntax(lineno, "bad mask hex"))?;
				let def = CommandDefinition::new(name, base, mask)
					.map_err(|source| PluginError::Def { line: lineno, source })?;
				self.command = Some(CommandBuilder { line: lineno, def, elements: Vec::new(), group: 0 });
			}
			_ => self.command_attribute(lineno, keyword, words)?,
		}
		Ok(())
	}

	fn command_attribute<'a>(
		&mut self,
		lineno: usize,
		keyword: &str,
		mut words: impl Iterator<Item = &'a str>,
	) -> Result<()> {
		let Some(cb) = &mut self.command else {
			return Err(syntax(lineno, format!("unknown keyword {keyword:?}")));
		};
		match keyword {
			"end" => {
				cb.def.end_type = match words.next() {
					Some("always") => EndType::Always,
					Some("never") => EndType::Never,
					Some("default") => EndType::Default,
					other => return Err(syntax(lineno, format!("bad end type {other:?}"))),
				};
			}
			"prints" => cb.def.prints = true,
			"rewind" => {
				cb.def.rewind_count = parse_num(words.next())
					.ok_or_else(|| syntax(lineno, "rewind needs a count"))?;
			}
			"priority" => {
				cb.def.priority_length = parse_num(words.next())
					.ok_or_else(|| syntax(lineno, "priority needs a length"))?;
			}
			"mugshot" => {
				cb.def.mugshot = match words.next() {
					Some("hide") => Mugshot::Hide,
					Some(par) => Mugshot::Parameter(par.to_owned()),
					None => return Err(syntax(lineno, "mugshot needs a parameter name or `hide`")),
				};
			}
			"elem" => {
				let name = words.next().ok_or_else(|| syntax(lineno, "elem needs a name"))?;
				cb.elements.push(ElementDefinition::scalar(name, Vec::new()));
				cb.group = 0;
			}
			"group" => {
				let elem = cb.elements.last_mut()
					.ok_or_else(|| syntax(lineno, "group outside an element"))?;
				elem.groups.push(Vec::new());
				cb.group = elem.groups.len() - 1;
			}
			"par" | "data" | "length" => {
				let par = parse_parameter(lineno, &mut words)?;
				if cb.elements.is_empty() {
					cb.elements.push(ElementDefinition::scalar("main", Vec::new()));
				}
				let group = cb.group;
				let elem = cb.elements.last_mut().unwrap();
				match keyword {
					"length" => elem.length = Some(par),
					_ => elem.groups[group].push(par),
				}
			}
			_ => return Err(syntax(lineno, format!("unknown keyword {keyword:?}"))),
		}
		Ok(())
	}

	fn flush_command(&mut self) -> Result<()> {
		let Some(mut cb) = self.command.take() else { return Ok(()) };
		cb.def.elements = cb.elements;
		let def = cb.def.build().map_err(|source| PluginError::Def { line: cb.line, source })?;
		self.db.as_mut().ok_or(PluginError::NoName)?.add(def);
		Ok(())
	}

	fn finish(mut self) -> Result<Game> {
		self.flush_command()?;
		let name = self.name.ok_or(PluginError::NoName)?;
		let mut db = self.db.expect("db exists when name does");

		if !self.snippet_names.is_empty() {
			let mut snippet = Script::new(db.name());
			for name in &self.snippet_names {
				let def = db.find(name).into_iter().next()
					.ok_or_else(|| PluginError::SnippetCommand { name: name.clone() })?;
				snippet.elements.push(Element::Command(Command::new(def)));
			}
			db.set_split_snippet(snippet);
		}

		let encoding = self.tables.into_iter().next();
		Ok(Game { name, db, encoding })
	}
}

/// `par NAME at OFF[.SHIFT] bits N [add N] [jump] [enc TABLE]
///  [end-relative | label NAME]`
fn parse_parameter<'a>(lineno: usize, words: &mut impl Iterator<Item = &'a str>) -> Result<ParameterDefinition> {
	let name = words.next().ok_or_else(|| syntax(lineno, "parameter needs a name"))?;
	let mut offset = 0;
	let mut shift = 0;
	let mut bits = 8;
	let mut add = 0i64;
	let mut is_jump = false;
	let mut value_encoding = None;
	let mut offset_kind = OffsetKind::Start;
	let mut group_sizes = Vec::new();

	while let Some(word) = words.next() {
		match word {
			"at" => {
				let spec = words.next().ok_or_else(|| syntax(lineno, "at needs OFF[.SHIFT]"))?;
				let (o, s) = match spec.split_once('.') {
					Some((o, s)) => (o, s.parse().ok()),
					None => (spec, Some(0)),
				};
				offset = o.parse().map_err(|_| syntax(lineno, format!("bad offset {spec:?}")))?;
				shift = s.ok_or_else(|| syntax(lineno, format!("bad shift in {spec:?}")))?;
			}
			"bits" => {
				bits = parse_num(words.next())
					.ok_or_else(|| syntax(lineno, "bits needs a width"))?;
			}
			"add" => {
				add = words.next().and_then(|w| w.parse().ok())
					.ok_or_else(|| syntax(lineno, "add needs a number"))?;
			}
			"jump" => is_jump = true,
			"enc" => {
				value_encoding = Some(
					words.next().ok_or_else(|| syntax(lineno, "enc needs a table name"))?.to_owned(),
				);
			}
			"end-relative" => offset_kind = OffsetKind::End,
			"label" => {
				let l = words.next().ok_or_else(|| syntax(lineno, "label needs a name"))?;
				offset_kind = OffsetKind::Label(l.to_owned());
			}
			"groups" => {
				let spec = words.next().ok_or_else(|| syntax(lineno, "groups needs sizes"))?;
				group_sizes = spec.split(',')
					.map(|s| s.parse().map_err(|_| syntax(lineno, format!("bad group size {s:?}"))))
					.collect::<Result<_>>()?;
			}
			_ => return Err(syntax(lineno, format!("unknown parameter attribute {word:?}"))),
		}
	}

	let mut par = ParameterDefinition::new(name, offset, shift, bits)
		.map_err(|source| PluginError::Def { line: lineno, source })?;
	par.add = add;
	par.is_jump = is_jump;
	par.value_encoding = value_encoding;
	par.offset_kind = offset_kind;
	par.data_group_sizes = group_sizes;
	Ok(par)
}

fn parse_num(word: Option<&str>) -> Option<usize> {
	word?.parse().ok()
}

fn parse_hex(s: &str) -> Option<Vec<u8>> {
	let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
	if s.is_empty() || s.len() % 2 != 0 {
		return None;
	}
	(0..s.len()).step_by(2)
		.map(|i| u8::from_str_radix(&s[i..i+2], 16).ok())
		.collect()
}

fn unescape(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	let mut chars = s.chars();
	while let Some(c) = chars.next() {
		if c == '\\' {
			match chars.next() {
				Some('n') => out.push('\n'),
				Some(c) => out.push(c),
				None => out.push('\\'),
			}
		} else {
			out.push(c);
		}
	}
	out
}
