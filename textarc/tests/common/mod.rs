//! A small fixture game shared by the integration tests: a handful of
//! commands shaped like a real dialogue engine's, and a letter table.

use std::sync::Arc;

use textarc::defs::{CommandDefinition, ElementDefinition, EndType, OffsetKind, ParameterDefinition};
use textarc::script::{Element, Script};
use textarc::{Command, CommandDatabase, Game, TableEncoding};

pub fn game() -> Game {
	let mut db = CommandDatabase::new("fixture");

	// E0: ends the script unconditionally.
	let mut end = CommandDefinition::new("end", vec![0xE0], vec![0xFF]).unwrap();
	end.end_type = EndType::Always;
	db.add(end.build().unwrap());

	// E1: clears the text box; non-printing.
	let clear = CommandDefinition::new("clear", vec![0xE1], vec![0xFF]).unwrap();
	db.add(clear.build().unwrap());

	// E2: splits the rendered box; used as the split snippet.
	let split: Arc<CommandDefinition> = CommandDefinition::new("split", vec![0xE2], vec![0xFF])
		.unwrap().build().unwrap();
	db.add(split.clone());

	// E4 nn: selects a mugshot; nn = FF hides it.
	let mut mug = CommandDefinition::new("mugshot", vec![0xE4, 0x00], vec![0xFF, 0x00]).unwrap();
	mug.mugshot = textarc::Mugshot::Parameter("face".into());
	mug.elements.push(ElementDefinition::scalar("main", vec![
		ParameterDefinition::new("face", 1, 0, 8).unwrap(),
	]));
	db.add(mug.build().unwrap());

	// E6 nn: jumps to script nn; FF falls through.
	let mut jump = CommandDefinition::new("jump", vec![0xE6, 0x00], vec![0xFF, 0x00]).unwrap();
	jump.end_type = EndType::Default;
	let mut target = ParameterDefinition::new("target", 1, 0, 8).unwrap();
	target.is_jump = true;
	jump.elements.push(ElementDefinition::scalar("main", vec![target]));
	db.add(jump.build().unwrap());

	// E7 nn (tt jj)*: a menu of nn options, text id and jump per entry.
	let mut menu = CommandDefinition::new("menu", vec![0xE7, 0x00], vec![0xFF, 0x00]).unwrap();
	menu.end_type = EndType::Default;
	let length = ParameterDefinition::new("count", 1, 0, 8).unwrap();
	let mut text = ParameterDefinition::new("text", 0, 0, 8).unwrap();
	text.offset_kind = OffsetKind::End;
	let mut target = ParameterDefinition::new("target", 1, 0, 8).unwrap();
	target.offset_kind = OffsetKind::Label("text".into());
	target.is_jump = true;
	menu.elements.push(ElementDefinition::table("options", length, vec![vec![text, target]]));
	db.add(menu.build().unwrap());

	// E5 cs: prints an item icon; packed colour and style nibbles.
	let mut icon = CommandDefinition::new("icon", vec![0xE5, 0x00], vec![0xFF, 0x00]).unwrap();
	icon.prints = true;
	icon.elements.push(ElementDefinition::scalar("main", vec![
		ParameterDefinition::new("colour", 1, 0, 4).unwrap(),
		ParameterDefinition::new("style", 1, 4, 4).unwrap(),
	]));
	db.add(icon.build().unwrap());

	let mut snippet = Script::new("fixture");
	snippet.elements.push(Element::Command(Command::new(split)));
	db.set_split_snippet(snippet);

	let mut encoding = TableEncoding::new("fixture");
	for (i, c) in ('A'..='Z').enumerate() {
		encoding.insert(&[i as u8], c.to_string());
	}
	for (i, c) in ('a'..='z').enumerate() {
		encoding.insert(&[0x1A + i as u8], c.to_string());
	}
	encoding.insert(&[0x34], " ");
	encoding.insert(&[0x35], "\n");
	encoding.insert(&[0x36, 0x00], "…");

	Game { name: "fixture".into(), db, encoding: Some(encoding) }
}

pub fn encode(text: &str) -> Vec<u8> {
	game().encoding.unwrap().encode(text).unwrap()
}
