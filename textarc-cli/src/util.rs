use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use textarc::Session;

pub const BAR_STYLE: &str = "{elapsed_precise} ({percent}%) {wide_bar} {msg}";

/// Logs an error through tracing instead of aborting, so one bad archive
/// does not end a whole sweep.
pub fn emit<T>(result: Result<T>) -> Option<T> {
	match result {
		Ok(v) => Some(v),
		Err(e) => {
			tracing::error!("{e:#}");
			None
		}
	}
}

pub fn progress_bar(len: u64) -> ProgressBar {
	ProgressBar::new(len)
		.with_style(ProgressStyle::with_template(BAR_STYLE).unwrap())
}

/// Builds a session from the definition file and, optionally, an entry file.
pub fn session(game: &Path, entries: Option<&Path>) -> Result<Session> {
	let text = std::fs::read_to_string(game)
		.with_context(|| format!("could not read {}", game.display()))?;
	let game = crate::plugin::load(&text)
		.with_context(|| format!("could not load {}", game.display()))?;

	let mut session = Session::new();
	session.set_game(game);
	if let Some(entries) = entries {
		let text = std::fs::read_to_string(entries)
			.with_context(|| format!("could not read {}", entries.display()))?;
		session.load_entries(&text)
			.with_context(|| format!("could not parse {}", entries.display()))?;
	}
	Ok(session)
}

pub fn read_rom(path: &Path) -> Result<Vec<u8>> {
	let data = std::fs::read(path)
		.with_context(|| format!("could not read {}", path.display()))?;
	// The format tops out at 32 MiB cartridges; anything bigger is a
	// mistaken path, not a ROM.
	eyre::ensure!(data.len() <= 32 << 20, "{} is too large for a ROM image", path.display());
	Ok(data)
}

pub fn stem(path: &Path) -> Option<String> {
	Some(path.file_stem()?.to_string_lossy().into_owned())
}

/// `<dir>/<identifier>.<ext>`, creating the directory.
pub fn out_path(dir: &Path, identifier: &str, ext: &str) -> Result<PathBuf> {
	std::fs::create_dir_all(dir)
		.with_context(|| format!("could not create {}", dir.display()))?;
	Ok(dir.join(format!("{identifier}.{ext}")))
}
