//! The text-box extract format.
//!
//! Extraction writes only what a translator needs to see: the printed
//! content of every text box, with `[name]` placeholders for printed
//! commands and `[#XX]` for stray bytes. The surrounding command skeleton
//! stays in the ROM and is reunited with the authored text by the patcher.
//!
//! ```text
//! @archive 6C1FC0
//! @script 0
//! Hello [icon] world
//! ---
//! second box
//! |split|
//! same box, next screen
//! ```
//!
//! `---` separates boxes, `|split|` separates the rendered halves of one
//! box, and a literal `[` is written `[[`. Every box's content is written
//! with a terminating newline; the parser joins physical lines verbatim.

use std::fmt::Write as _;

use crate::cmd::Command;
use crate::db::CommandDatabase;
use crate::script::{DirectiveKind, Element, Script, TextArchive};

#[derive(Debug, thiserror::Error)]
pub enum TextBoxError {
	#[error("line {line}: unknown command {name:?}")]
	UnknownCommand { line: usize, name: String },
	#[error("line {line}: bad byte placeholder {text:?}")]
	BadByte { line: usize, text: String },
	#[error("line {line}: unterminated placeholder")]
	Unterminated { line: usize },
	#[error("line {line}: content before any @script header")]
	NoScript { line: usize },
}

pub type Result<T, E=TextBoxError> = std::result::Result<T, E>;

/// Renders the text boxes of an archive.
pub fn write_text_boxes(db: &CommandDatabase, archive: &TextArchive) -> String {
	let mut out = String::new();
	let _ = writeln!(out, "@archive {}", archive.identifier);
	for (i, script) in archive.scripts.iter().enumerate() {
		if !script.has_printed() {
			continue;
		}
		let _ = writeln!(out, "@script {i}");
		write_script_boxes(db, script, &mut out);
	}
	out
}

fn write_script_boxes(db: &CommandDatabase, script: &Script, out: &mut String) {
	let b = &script.elements;
	let mut bi = 0;
	let mut first = true;
	while bi < b.len() {
		if !b[bi].is_printed() {
			bi += 1;
			continue;
		}
		if !first {
			out.push_str("---\n");
		}
		first = false;
		loop {
			// One printed run.
			while bi < b.len() && b[bi].is_printed() {
				match &b[bi] {
					Element::Text(t) => out.push_str(&t.replace('[', "[[")),
					Element::Byte(v) => { let _ = write!(out, "[#{v:02X}]"); }
					Element::Command(c) => { let _ = write!(out, "[{}]", c.name()); }
					Element::Directive { .. } => {}
				}
				bi += 1;
			}
			if !out.ends_with('\n') {
				out.push('\n');
			}
			match crate::patch::boundary_after(db, b, bi) {
				Some(next_run) => {
					out.push_str("|split|\n");
					bi = next_run;
				}
				None => break,
			}
		}
	}
}

/// Parses a text-box file back into archives keyed by their headers.
///
/// Scripts keep their declared indices; the gaps are empty scripts, so the
/// result lines up with the base archive it will patch.
pub fn parse_text_boxes(db: &CommandDatabase, text: &str) -> Result<Vec<TextArchive>> {
	let mut archives: Vec<TextArchive> = Vec::new();
	let mut script: Option<Script> = None;
	let mut script_index = 0usize;
	let mut fresh = true;

	let flush = |archives: &mut Vec<TextArchive>, script: &mut Option<Script>, index: usize| {
		if let Some(s) = script.take() {
			let archive = archives.last_mut().expect("script header precedes content");
			while archive.scripts.len() <= index {
				archive.scripts.push(Script::new(s.database_name.clone()));
			}
			archive.scripts[index] = s;
		}
	};

	for (n, line) in text.lines().enumerate() {
		let lineno = n + 1;
		if let Some(id) = line.strip_prefix("@archive") {
			flush(&mut archives, &mut script, script_index);
			archives.push(TextArchive::new(id.trim()));
			continue;
		}
		if let Some(num) = line.strip_prefix("@script") {
			if archives.is_empty() {
				archives.push(TextArchive::new(""));
			}
			flush(&mut archives, &mut script, script_index);
			script_index = num.trim().parse().unwrap_or(0);
			script = Some(Script::new(db.name()));
			fresh = true;
			continue;
		}

		let Some(s) = script.as_mut() else {
			if line.trim().is_empty() {
				continue;
			}
			return Err(TextBoxError::NoScript { line: lineno });
		};

		if line.trim_end() == "---" {
			s.elements.push(Element::directive(DirectiveKind::TextBoxSeparator, ""));
			fresh = true;
			continue;
		}
		if line.trim_end() == "|split|" {
			s.elements.push(Element::directive(DirectiveKind::TextBoxSplit, ""));
			fresh = true;
			continue;
		}

		if !fresh {
			push_text(s, "\n");
		}
		parse_content_line(db, s, line, lineno)?;
		fresh = false;
	}
	flush(&mut archives, &mut script, script_index);
	Ok(archives)
}

fn push_text(script: &mut Script, text: &str) {
	match script.elements.last_mut() {
		Some(Element::Text(run)) => run.push_str(text),
		_ => script.elements.push(Element::Text(text.to_owned())),
	}
}

fn parse_content_line(db: &CommandDatabase, script: &mut Script, line: &str, lineno: usize) -> Result<()> {
	let mut rest = line;
	while let Some(open) = rest.find('[') {
		if !rest[..open].is_empty() {
			push_text(script, &rest[..open]);
		}
		let after = &rest[open + 1..];
		if let Some(after) = after.strip_prefix('[') {
			push_text(script, "[");
			rest = after;
			continue;
		}
		let Some(close) = after.find(']') else {
			return Err(TextBoxError::Unterminated { line: lineno });
		};
		let name = &after[..close];
		if let Some(hex) = name.strip_prefix('#') {
			let v = u8::from_str_radix(hex, 16)
				.map_err(|_| TextBoxError::BadByte { line: lineno, text: name.to_owned() })?;
			script.elements.push(Element::Byte(v));
		} else {
			let def = db.find(name).into_iter().next()
				.ok_or_else(|| TextBoxError::UnknownCommand { line: lineno, name: name.to_owned() })?;
			script.elements.push(Element::Command(Command::new(def)));
		}
		rest = &after[close + 1..];
	}
	if !rest.is_empty() {
		push_text(script, rest);
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use std::sync::Arc;

	use super::*;
	use crate::defs::{CommandDefinition, EndType};

	fn db() -> CommandDatabase {
		let mut db = CommandDatabase::new("t");
		let mut icon = CommandDefinition::new("icon", vec![0xE5], vec![0xFF]).unwrap();
		icon.prints = true;
		db.add(icon.build().unwrap());
		let split: Arc<CommandDefinition> = CommandDefinition::new("split", vec![0xE4], vec![0xFF])
			.unwrap().build().unwrap();
		db.add(split.clone());
		let mut end = CommandDefinition::new("end", vec![0xE0], vec![0xFF]).unwrap();
		end.end_type = EndType::Always;
		db.add(end.build().unwrap());

		let mut snippet = Script::new("t");
		snippet.elements.push(Element::Command(Command::new(split)));
		db.set_split_snippet(snippet);
		db
	}

	#[test]
	fn extract_writes_boxes_and_markers() {
		let db = db();
		let end = db.find("end")[0].clone();
		let split = db.find("split")[0].clone();
		let icon = db.find("icon")[0].clone();

		let mut archive = TextArchive::new("6C1FC0");
		let mut s = Script::new("t");
		s.elements.push(Element::Text("Hello ".into()));
		s.elements.push(Element::Command(Command::new(icon)));
		s.elements.push(Element::Command(Command::new(end.clone())));
		s.elements.push(Element::Text("second".into()));
		s.elements.push(Element::Command(Command::new(split)));
		s.elements.push(Element::Text("third".into()));
		s.elements.push(Element::Command(Command::new(end)));
		archive.scripts.push(s);

		let text = write_text_boxes(&db, &archive);
		assert_eq!(text, "@archive 6C1FC0\n@script 0\nHello [icon]\n---\nsecond\n|split|\nthird\n");
	}

	#[test]
	fn parse_reads_back_the_extract() {
		let db = db();
		let text = "@archive 6C1FC0\n@script 1\nHello [icon] brackets [[x\n---\nbyte [#2A]\n|split|\nmore\n";
		let archives = parse_text_boxes(&db, text).unwrap();
		assert_eq!(archives.len(), 1);
		assert_eq!(archives[0].identifier, "6C1FC0");
		assert_eq!(archives[0].scripts.len(), 2);
		assert!(!archives[0].scripts[0].has_printed());

		let s = &archives[0].scripts[1];
		assert_eq!(s.elements[0], Element::Text("Hello ".into()));
		assert!(matches!(&s.elements[1], Element::Command(c) if c.name() == "icon"));
		assert_eq!(s.elements[2], Element::Text(" brackets [x".into()));
		assert!(s.elements[3].ends_text_box());
		assert_eq!(s.elements[4], Element::Text("byte ".into()));
		assert_eq!(s.elements[5], Element::Byte(0x2A));
		assert!(s.elements[6].splits_text_box());
		assert_eq!(s.elements[7], Element::Text("more".into()));
	}

	#[test]
	fn multiline_boxes_keep_their_newlines() {
		let db = db();
		let text = "@script 0\nline one\nline two\n";
		let archives = parse_text_boxes(&db, text).unwrap();
		let s = &archives[0].scripts[0];
		assert_eq!(s.elements, vec![Element::Text("line one\nline two".into())]);
	}

	#[test]
	fn unknown_placeholders_are_errors() {
		let db = db();
		assert!(matches!(
			parse_text_boxes(&db, "@script 0\n[bogus]\n"),
			Err(TextBoxError::UnknownCommand { line: 2, .. }),
		));
	}
}
