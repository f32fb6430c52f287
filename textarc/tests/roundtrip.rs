//! Binary round-trips: everything the reader understands, the writer must
//! reproduce byte for byte.

mod common;

use spool::Reader;
use textarc::binary::{ScriptReader, ScriptWriter};
use textarc::script::Element;

fn archive_image() -> Vec<u8> {
	let mut data = Vec::new();
	// script 0: portrait, text, an icon, a fall-through jump, end
	data.extend_from_slice(&[0xE4, 0x02]);
	data.extend_from_slice(&common::encode("Hi"));
	data.extend_from_slice(&[0xE5, 0x13]);
	data.extend_from_slice(&[0xE6, 0xFF]);
	data.push(0xE0);
	// script 1: a two-option menu, then end
	data.extend_from_slice(&[0xE7, 0x02, 0x01, 0x00, 0x02, 0xFF]);
	data.push(0xE0);
	data
}

#[test]
fn archive_roundtrips_byte_exact() {
	let game = common::game();
	let data = archive_image();

	let reader = ScriptReader::new(&game.db, game.encoding.as_ref());
	let mut f = Reader::new(&data);
	let outcome = reader.read_archive(&mut f, "t", data.len(), false).unwrap();
	assert_eq!(outcome.archive.scripts.len(), 2);
	assert!(outcome.closed);

	let writer = ScriptWriter::new(game.encoding.as_ref());
	let rewritten = writer.write_archive(&outcome.archive).unwrap();
	assert_eq!(rewritten, data);
}

#[test]
fn decoded_structure_is_faithful() {
	let game = common::game();
	let data = archive_image();

	let reader = ScriptReader::new(&game.db, game.encoding.as_ref());
	let mut f = Reader::new(&data);
	let archive = reader.read_archive(&mut f, "t", data.len(), false).unwrap().archive;

	let s0 = &archive.scripts[0];
	let Element::Command(mug) = &s0.elements[0] else { panic!() };
	assert_eq!(mug.name(), "mugshot");
	assert_eq!(mug.value("face"), Some(2));
	assert_eq!(s0.elements[1], Element::Text("Hi".into()));
	let Element::Command(icon) = &s0.elements[2] else { panic!() };
	assert_eq!(icon.value("colour"), Some(3));
	assert_eq!(icon.value("style"), Some(1));
	let Element::Command(jump) = &s0.elements[3] else { panic!() };
	assert!(!jump.ends_script());

	let s1 = &archive.scripts[1];
	let Element::Command(menu) = &s1.elements[0] else { panic!() };
	let options = menu.element("options").unwrap();
	assert_eq!(options.entries.len(), 2);
	assert_eq!(options.entries[0].values(), [0x01, 0x00]);
	assert_eq!(options.entries[1].values(), [0x02, 0xFF]);
	// One real target, one fall-through: the menu does not end the script.
	assert!(!menu.ends_script());
}

#[test]
fn multibyte_code_points_roundtrip() {
	let game = common::game();
	let mut data = common::encode("So…");
	data.push(0xE0);

	let reader = ScriptReader::new(&game.db, game.encoding.as_ref());
	let mut f = Reader::new(&data);
	let archive = reader.read_archive(&mut f, "t", data.len(), false).unwrap().archive;
	assert_eq!(archive.scripts[0].elements[0], Element::Text("So…".into()));

	let writer = ScriptWriter::new(game.encoding.as_ref());
	assert_eq!(writer.write_archive(&archive).unwrap(), data);
}

#[test]
fn unmapped_bytes_survive_as_bytes() {
	let game = common::game();
	// 0xC3 is neither a command nor in the table.
	let data = [0x07, 0xC3, 0xE0];

	let reader = ScriptReader::new(&game.db, game.encoding.as_ref());
	let mut f = Reader::new(&data);
	let archive = reader.read_archive(&mut f, "t", data.len(), false).unwrap().archive;
	assert_eq!(archive.scripts[0].elements[1], Element::Byte(0xC3));

	let writer = ScriptWriter::new(game.encoding.as_ref());
	assert_eq!(writer.write_archive(&archive).unwrap(), data);
}
