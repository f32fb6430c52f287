//! Extracts, edits, and reinserts script text archives from the ROM images
//! of old handheld-console games.
//!
//! A game's scripts live in *text archives*: runs of scripts, each a
//! sequence of opcode-driven commands, table-encoded text, and raw bytes.
//! The [`db`] module holds the command definitions and answers which
//! commands a byte prefix could begin; [`binary`] turns bytes into
//! structured scripts and back; [`scan`] hunts archives down inside a ROM,
//! [`index`] remembers where they were, and [`patch`] splices translated
//! text boxes back onto the original command skeleton. [`session`] ties the
//! pieces into whole flows for a frontend to drive.

pub mod defs;
pub mod cmd;
pub mod script;
pub mod encoding;
pub mod db;
pub mod binary;
pub mod index;
pub mod scan;
pub mod patch;
pub mod textbox;
pub mod session;

pub use cmd::Command;
pub use db::CommandDatabase;
pub use defs::{CommandDefinition, ElementDefinition, EndType, Mugshot, OffsetKind, ParameterDefinition};
pub use encoding::TableEncoding;
pub use index::{RomEntry, RomEntryIndex};
pub use script::{DirectiveKind, Element, Script, TextArchive};
pub use session::{Game, Session};
