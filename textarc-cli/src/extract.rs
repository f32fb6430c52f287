use std::path::PathBuf;

use clap::ValueHint;
use eyre::Context;
use crate::util::emit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
	/// Raw decompressed text archives.
	Msg,
	/// Text-box extracts for translation.
	Txt,
}

/// Extract every indexed archive from a ROM.
#[derive(Debug, Clone, clap::Args)]
pub struct Command {
	/// Game definition file.
	#[clap(long, short, value_hint = ValueHint::FilePath)]
	game: PathBuf,

	/// Entry file locating the archives.
	#[clap(long, value_hint = ValueHint::FilePath)]
	entries: PathBuf,

	/// Directory to write extracted files to.
	#[clap(long, short, value_hint = ValueHint::DirPath, default_value = ".")]
	output: PathBuf,

	/// Output format.
	#[clap(long, value_enum, default_value = "txt")]
	format: Format,

	/// The ROM image to extract from.
	#[clap(value_hint = ValueHint::FilePath)]
	rom: PathBuf,
}

#[tracing::instrument(skip_all, fields(rom = %cmd.rom.display()))]
pub fn run(cmd: &Command) -> eyre::Result<()> {
	let session = crate::util::session(&cmd.game, Some(&cmd.entries))?;
	let rom = crate::util::read_rom(&cmd.rom)?;

	let offsets: Vec<usize> = session.index().iter().map(|e| e.offset).collect();
	let bar = crate::util::progress_bar(offsets.len() as u64);
	let mut written = 0usize;
	for offset in offsets {
		emit(extract_one(cmd, &session, &rom, offset).map(|()| written += 1));
		bar.inc(1);
	}
	bar.finish_and_clear();

	tracing::info!("extracted {written} archives to {}", cmd.output.display());
	Ok(())
}

#[tracing::instrument(skip_all, fields(offset = offset))]
fn extract_one(
	cmd: &Command,
	session: &textarc::Session,
	rom: &[u8],
	offset: usize,
) -> eyre::Result<()> {
	let archive = session.read_archive(rom, offset, None)?;
	let (ext, bytes) = match cmd.format {
		Format::Msg => ("msg", session.write_archive_bytes(&archive)?),
		Format::Txt => ("txt", session.extract_text_boxes(&archive)?.into_bytes()),
	};
	let path = crate::util::out_path(&cmd.output, &archive.identifier, ext)?;
	std::fs::write(&path, bytes)
		.with_context(|| format!("could not write {}", path.display()))?;
	Ok(())
}
