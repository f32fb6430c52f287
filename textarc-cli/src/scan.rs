use std::path::PathBuf;

use clap::ValueHint;
use eyre::Context;

/// Scan a ROM image for text archives.
///
/// Writes the discovered entries to an entry file, which the other commands
/// use to locate archives without rescanning.
#[derive(Debug, Clone, clap::Args)]
pub struct Command {
	/// Game definition file.
	#[clap(long, short, value_hint = ValueHint::FilePath)]
	game: PathBuf,

	/// Start from an existing entry file instead of a blank slate.
	#[clap(long, value_hint = ValueHint::FilePath)]
	entries: Option<PathBuf>,

	/// Entry file to write.
	///
	/// Defaults to the ROM path with an `.entries.txt` extension.
	#[clap(long, short, value_hint = ValueHint::FilePath)]
	output: Option<PathBuf>,

	/// Accept archives the plausibility gates would reject.
	#[clap(long)]
	deep: bool,

	/// Record pointers to each archive found.
	#[clap(long)]
	pointers: bool,

	/// The ROM image to scan.
	#[clap(value_hint = ValueHint::FilePath)]
	rom: PathBuf,
}

#[tracing::instrument(skip_all, fields(rom = %cmd.rom.display()))]
pub fn run(cmd: &Command) -> eyre::Result<()> {
	let mut session = crate::util::session(&cmd.game, cmd.entries.as_deref())?;
	session.options_mut().deep = cmd.deep;
	session.options_mut().pointer_scan = cmd.pointers;

	let rom = crate::util::read_rom(&cmd.rom)?;
	let bar = crate::util::progress_bar(rom.len() as u64);
	let found = session.scan_rom(&rom, None, |pos, _| bar.set_position(pos as u64))?;
	bar.finish_and_clear();

	let out = cmd.output.clone()
		.unwrap_or_else(|| cmd.rom.with_extension("entries.txt"));
	std::fs::write(&out, session.render_entries())
		.with_context(|| format!("could not write {}", out.display()))?;

	tracing::info!("found {} archives, wrote {}", found.len(), out.display());
	Ok(())
}
