//! End-to-end driver flows: scan a ROM, extract text boxes, patch a
//! translation back, reinsert, and verify the round-trip.

mod common;

use textarc::session::Session;
use textarc::RomEntry;

fn archive_image(text1: &str, text2: &str) -> Vec<u8> {
	let game = common::game();
	let enc = game.encoding.as_ref().unwrap();
	let mut data = Vec::new();
	data.extend_from_slice(&enc.encode(text1).unwrap());
	data.push(0xE2); // split
	data.extend_from_slice(&enc.encode(text2).unwrap());
	data.push(0xE0);
	data
}

/// A little ROM: one uncompressed archive, one LZ77 archive with a size
/// header, a pointer table, and filler.
fn build_rom() -> (Vec<u8>, usize, usize) {
	let plain = archive_image("Hello", "World");
	// Filler decodes as jump commands with junk targets, which the strict
	// gates reject, so only the planted archives are found.
	let mut rom = vec![0xE6u8; 0x200];

	let plain_at = 0x40;
	rom[plain_at..plain_at + plain.len()].copy_from_slice(&plain);

	let mut image = Vec::new();
	image.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // size header, patched below
	image.extend_from_slice(&archive_image("Bye", "Now"));
	let len = (image.len() - 4) as u32;
	image[1..4].copy_from_slice(&len.to_le_bytes()[..3]);
	let packed = lz10::compress(&image);
	let packed_at = 0x100;
	rom[packed_at..packed_at + packed.len()].copy_from_slice(&packed);

	// ROM-mapped pointers to both archives.
	rom[0x10..0x14].copy_from_slice(&(0x0800_0000 + plain_at as u32).to_le_bytes());
	rom[0x14..0x18].copy_from_slice(&(0x0800_0000 + packed_at as u32).to_le_bytes());

	(rom, plain_at, packed_at)
}

fn session() -> Session {
	let mut s = Session::new();
	s.set_game(common::game());
	s
}

#[test]
fn scan_finds_both_archives_and_their_pointers() {
	let (rom, plain_at, packed_at) = build_rom();
	let mut s = session();
	s.options_mut().pointer_scan = true;

	let found = s.scan_rom(&rom, None, |_, _| ()).unwrap();
	let ids: Vec<&str> = found.iter().map(|a| a.identifier.as_str()).collect();
	assert!(ids.contains(&"000040"));
	assert!(ids.contains(&"000100"));

	let plain = s.index().get(plain_at).unwrap();
	assert!(!plain.compressed);
	assert_eq!(plain.pointers, vec![0x10]);

	let packed = s.index().get(packed_at).unwrap();
	assert!(packed.compressed);
	assert!(packed.size_header);
	assert_eq!(packed.pointers, vec![0x14]);
}

#[test]
fn entry_file_roundtrips_through_a_fresh_session() {
	let (rom, ..) = build_rom();
	let mut s = session();
	s.options_mut().pointer_scan = true;
	s.scan_rom(&rom, None, |_, _| ()).unwrap();
	let text = s.render_entries();

	let mut s2 = session();
	s2.load_entries(&text).unwrap();
	assert_eq!(s2.index().len(), s.index().len());
	for e in s.index().iter() {
		assert_eq!(s2.index().get(e.offset), Some(e));
	}
}

#[test]
fn roundtrip_test_passes_for_scanned_archives() {
	let (rom, plain_at, packed_at) = build_rom();
	let mut s = session();
	s.scan_rom(&rom, None, |_, _| ()).unwrap();

	for offset in [plain_at, packed_at] {
		let rt = s.test_roundtrip(&rom, offset).unwrap();
		assert!(rt.ok(), "{}: {:02X?} != {:02X?}", rt.identifier, rt.original, rt.rewritten);
	}
}

#[test]
fn extract_edit_patch_insert() {
	let (mut rom, plain_at, _) = build_rom();
	let mut s = session();
	s.scan_rom(&rom, None, |_, _| ()).unwrap();

	let mut base = s.read_archive(&rom, plain_at, None).unwrap();
	let extract = s.extract_text_boxes(&base).unwrap();
	assert!(extract.contains("Hello"));
	assert!(extract.contains("|split|"));

	// The "translation" keeps the split and stays the same length.
	let edited = extract.replace("Hello", "Howdy").replace("World", "Earth");
	let patches = s.parse_text_boxes(&edited).unwrap();
	s.patch_archive(&mut base, &patches[0]).unwrap();

	let target = s.insert_archive(&mut rom, &base, None).unwrap();
	assert_eq!(target, plain_at);

	let back = s.read_archive(&rom, plain_at, None).unwrap();
	let text = s.extract_text_boxes(&back).unwrap();
	assert!(text.contains("Howdy"));
	assert!(text.contains("Earth"));
}

#[test]
fn growing_archives_move_to_free_space() {
	let (mut rom, plain_at, _) = build_rom();
	let mut s = session();
	s.scan_rom(&rom, None, |_, _| ()).unwrap();
	// Pointer lists come from the scan.
	s.options_mut().pointer_scan = true;
	s.scan_rom(&rom, None, |_, _| ()).unwrap();

	let mut base = s.read_archive(&rom, plain_at, None).unwrap();
	let extract = s.extract_text_boxes(&base).unwrap();
	let edited = extract.replace("Hello", "A considerably longer line");
	let patches = s.parse_text_boxes(&edited).unwrap();
	s.patch_archive(&mut base, &patches[0]).unwrap();

	let free = 0x1C0;
	let target = s.insert_archive(&mut rom, &base, Some(free)).unwrap();
	assert_eq!(target, free);

	// The pointer now addresses the new location.
	let p = u32::from_le_bytes(rom[0x10..0x14].try_into().unwrap());
	assert_eq!(p, 0x0800_0000 + free as u32);
	assert!(s.index().get(free).is_some());
	assert!(s.index().get(plain_at).is_none());

	let moved = s.read_archive(&rom, free, None).unwrap();
	let text = s.extract_text_boxes(&moved).unwrap();
	assert!(text.contains("considerably longer"));
}

#[test]
fn compressed_entries_with_garbage_are_an_inconsistency() {
	let (rom, ..) = build_rom();
	let mut s = session();
	s.index_mut().insert(RomEntry {
		offset: 0x20,
		size: 8,
		compressed: true,
		..RomEntry::default()
	});
	assert!(matches!(
		s.read_archive(&rom, 0x20, None),
		Err(textarc::session::Error::Inconsistency(_)),
	));
}
