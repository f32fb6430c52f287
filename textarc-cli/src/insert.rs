use std::path::PathBuf;

use clap::ValueHint;
use eyre::Context;
use textarc::session::identifier_offset;

/// Patch authored text-box files back into a ROM.
///
/// Each input file holds the text boxes of one or more archives; every
/// archive is read from the ROM, patched, and written back. Archives that
/// no longer fit their slot move to the free-space offset.
#[derive(Debug, Clone, clap::Args)]
pub struct Command {
	/// Game definition file.
	#[clap(long, short, value_hint = ValueHint::FilePath)]
	game: PathBuf,

	/// Entry file locating the archives.
	#[clap(long, value_hint = ValueHint::FilePath)]
	entries: PathBuf,

	/// Where grown archives are placed, as a hex ROM offset.
	#[clap(long, value_parser = parse_hex_offset)]
	free: Option<usize>,

	/// Path for the patched ROM. Defaults to `<rom>.patched.gba`.
	#[clap(long, short, value_hint = ValueHint::FilePath)]
	output: Option<PathBuf>,

	/// Entry file to write the updated offsets to.
	///
	/// Defaults to overwriting the input entry file when any archive moved.
	#[clap(long, value_hint = ValueHint::FilePath)]
	entries_out: Option<PathBuf>,

	/// The ROM image to patch.
	#[clap(value_hint = ValueHint::FilePath)]
	rom: PathBuf,

	/// Text-box files to apply.
	#[clap(value_hint = ValueHint::FilePath, required = true)]
	patch: Vec<PathBuf>,
}

fn parse_hex_offset(s: &str) -> Result<usize, String> {
	usize::from_str_radix(s.trim_start_matches("0x"), 16)
		.map_err(|e| format!("bad hex offset: {e}"))
}

#[tracing::instrument(skip_all, fields(rom = %cmd.rom.display()))]
pub fn run(cmd: &Command) -> eyre::Result<()> {
	let mut session = crate::util::session(&cmd.game, Some(&cmd.entries))?;
	let mut rom = crate::util::read_rom(&cmd.rom)?;

	let mut moved = 0usize;
	let mut patched = 0usize;
	for path in &cmd.patch {
		let text = std::fs::read_to_string(path)
			.with_context(|| format!("could not read {}", path.display()))?;
		for patch in session.parse_text_boxes(&text)? {
			let offset = identifier_offset(&patch.identifier)
				.ok_or_else(|| eyre::eyre!(
					"{}: archive identifier {:?} is not an offset",
					path.display(), patch.identifier,
				))?;
			let mut base = session.read_archive(&rom, offset, None)?;
			session.patch_archive(&mut base, &patch)?;
			let target = session.insert_archive(&mut rom, &base, cmd.free)?;
			if target != offset {
				tracing::info!("archive {} moved to {target:06X}", patch.identifier);
				moved += 1;
			}
			patched += 1;
		}
	}

	let out = cmd.output.clone()
		.unwrap_or_else(|| cmd.rom.with_extension("patched.gba"));
	std::fs::write(&out, &rom)
		.with_context(|| format!("could not write {}", out.display()))?;
	tracing::info!("patched {patched} archives into {}", out.display());

	if moved > 0 || cmd.entries_out.is_some() {
		let entries_out = cmd.entries_out.as_ref().unwrap_or(&cmd.entries);
		std::fs::write(entries_out, session.render_entries())
			.with_context(|| format!("could not write {}", entries_out.display()))?;
		tracing::info!("updated entries in {}", entries_out.display());
	}
	Ok(())
}
