use clap::Parser;

use util::emit;

mod plugin;
mod util;

mod scan;
mod extract;
mod insert;

#[derive(Debug, Clone, Parser)]
#[command(disable_help_subcommand = true)]
struct Cli {
	#[clap(subcommand)]
	command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
enum Command {
	/// Scan a ROM for text archives and write an entry file
	Scan(scan::Command),
	/// Extract text archives as binary or text-box files
	Extract(extract::Command),
	/// Patch authored text boxes back into a ROM
	Insert(insert::Command),
	/// Verify that every indexed archive reads and rewrites byte-exact
	Test(test::Command),
}

fn main() -> eyre::Result<()> {
	use tracing_error::ErrorLayer;
	use tracing_subscriber::prelude::*;
	use tracing_subscriber::{fmt, EnvFilter};

	let fmt_layer = fmt::layer().with_target(false);
	let filter_layer = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new("info"))?;

	tracing_subscriber::registry()
		.with(filter_layer)
		.with(fmt_layer)
		.with(ErrorLayer::default())
		.init();

	match Cli::parse().command {
		Command::Scan(cmd) => emit(scan::run(&cmd)),
		Command::Extract(cmd) => emit(extract::run(&cmd)),
		Command::Insert(cmd) => emit(insert::run(&cmd)),
		Command::Test(cmd) => emit(test::run(&cmd)),
	};
	Ok(())
}
