//! Splices authored text boxes onto the command skeleton of an existing
//! script.
//!
//! The base script keeps every non-printed element exactly where it was;
//! only the printed runs (the text boxes) are rewritten from the patch.
//! Printed commands inside a box are carried over by name, so authored
//! placeholders pick up the original parameter values. A patch box may ask
//! for an engine split where the base has none (the database's split
//! snippet is inserted), and an empty patch box asks for the opposite: the
//! snippet is consumed from the base, merging two rendered boxes.

use crate::db::CommandDatabase;
use crate::script::{DirectiveKind, Element, Script, TextArchive};

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
	#[error("{identifier}: patch has fewer text boxes than the script")]
	PatchTooShort { identifier: String },
	#[error("{identifier}: patch has more text boxes than the script")]
	ExtraBoxes { identifier: String },
	#[error("{identifier}: no command {name:?} left in this text box")]
	NameMismatch { identifier: String, name: String },
	#[error("{identifier}: box commands left unplaced: {names:?}")]
	LeftoverCommands { identifier: String, names: Vec<String> },
	#[error("{identifier}: the command database has no text box split snippet")]
	NoSnippet { identifier: String },
	#[error("{identifier}: merge requested, but the split snippet is not present here")]
	MergeMismatch { identifier: String },
	#[error("patch script {script} has no matching script in {identifier}")]
	NoMatchingScript { identifier: String, script: usize },
}

pub type Result<T, E=PatchError> = std::result::Result<T, E>;

/// Patches every script of `base` that the patch archive has content for.
pub fn patch_archive(
	db: &CommandDatabase,
	base: &mut TextArchive,
	patch: &TextArchive,
) -> Result<()> {
	for (i, ps) in patch.scripts.iter().enumerate() {
		if !ps.has_printed() {
			continue;
		}
		let identifier = format!("{}:{}", base.identifier, i);
		let Some(bs) = base.scripts.get(i) else {
			return Err(PatchError::NoMatchingScript {
				identifier: base.identifier.clone(),
				script: i,
			});
		};
		base.scripts[i] = patch_script(db, bs, ps, &identifier)?;
	}
	Ok(())
}

/// One patch box: its printed segments, separated by requested splits.
struct PatchBox {
	segments: Vec<Vec<Element>>,
}

impl PatchBox {
	fn is_empty(&self) -> bool {
		self.segments.len() == 1 && self.segments[0].is_empty()
	}
}

/// Splits a patch script into its text boxes.
///
/// Separator directives delimit boxes; split directives delimit segments
/// within one box. Anything else non-printed is dropped. Trailing empty
/// boxes are an artifact of trailing separators, not merge requests.
fn patch_boxes(p: &[Element]) -> Vec<PatchBox> {
	let mut boxes = vec![PatchBox { segments: vec![Vec::new()] }];
	for e in p {
		if matches!(e, Element::Directive { kind: DirectiveKind::TextBoxSeparator, .. }) {
			boxes.push(PatchBox { segments: vec![Vec::new()] });
		} else if e.splits_text_box() {
			boxes.last_mut().unwrap().segments.push(Vec::new());
		} else if e.is_printed() {
			boxes.last_mut().unwrap().segments.last_mut().unwrap().push(e.clone());
		}
	}
	while boxes.last().is_some_and(PatchBox::is_empty) {
		boxes.pop();
	}
	boxes
}

/// Applies one patch script to one base script, returning the result.
pub fn patch_script(
	db: &CommandDatabase,
	base: &Script,
	patch: &Script,
	identifier: &str,
) -> Result<Script> {
	let b = &base.elements;
	let mut out = Vec::with_capacity(b.len());
	let mut bi = 0;

	let mut boxes = patch_boxes(&patch.elements).into_iter();
	loop {
		// Empty boxes are merge requests; they carry over into the splice
		// of the following box, which then spans the merged runs.
		let mut pending_merges = 0usize;
		let patch_box = loop {
			match boxes.next() {
				Some(pb) if pb.is_empty() => {
					if db.split_snippet().is_none() {
						return Err(PatchError::NoSnippet { identifier: identifier.to_owned() });
					}
					pending_merges += 1;
				}
				pb => break pb,
			}
		};

		// Everything before the next text box stays as it is.
		while bi < b.len() && !b[bi].is_printed() {
			out.push(b[bi].clone());
			bi += 1;
		}

		let Some(pb) = patch_box else {
			if pending_merges > 0 {
				return Err(PatchError::MergeMismatch { identifier: identifier.to_owned() });
			}
			if bi < b.len() {
				// A printed run remains with nothing to fill it.
				return Err(PatchError::PatchTooShort { identifier: identifier.to_owned() });
			}
			break;
		};
		if bi == b.len() {
			return Err(PatchError::ExtraBoxes { identifier: identifier.to_owned() });
		}

		splice_box(db, b, &mut bi, &mut out, pb, pending_merges, identifier)?;
	}

	Ok(Script { database_name: base.database_name.clone(), elements: out })
}

/// Splices one patch box over one logical base box.
///
/// Each segment replaces one printed run; between segments, an existing
/// base boundary is kept verbatim, or the snippet is inserted where the
/// base has none. Pending merges let the window swallow a snippet between
/// two runs, joining them.
fn splice_box(
	db: &CommandDatabase,
	b: &[Element],
	bi: &mut usize,
	out: &mut Vec<Element>,
	pb: PatchBox,
	mut pending_merges: usize,
	identifier: &str,
) -> Result<()> {
	for (k, seg) in pb.segments.into_iter().enumerate() {
		if k > 0 {
			match boundary_after(db, b, *bi) {
				Some(next_run) => {
					// The base already splits here; keep its gap verbatim.
					out.extend(b[*bi..next_run].iter().cloned());
					*bi = next_run;
				}
				None => {
					let snippet = db.split_snippet()
						.ok_or_else(|| PatchError::NoSnippet { identifier: identifier.to_owned() })?;
					out.extend(snippet.elements.iter().cloned());
				}
			}
		}

		// The window under the cursor: a maximal printed run, extended
		// across split snippets for every merge this box absorbs.
		let mut window: Vec<&Element> = Vec::new();
		loop {
			if *bi < b.len() && b[*bi].is_printed() {
				window.push(&b[*bi]);
				*bi += 1;
			} else if pending_merges > 0 {
				let Some(end) = match_snippet(db, b, *bi) else {
					return Err(PatchError::MergeMismatch { identifier: identifier.to_owned() });
				};
				*bi = end;
				pending_merges -= 1;
			} else {
				break;
			}
		}

		let mut pool: Vec<&Element> = window.iter()
			.copied()
			.filter(|e| matches!(e, Element::Command(_)))
			.collect();

		for e in seg {
			match e {
				Element::Command(placeholder) => {
					let found = pool.iter().position(|e| match e {
						Element::Command(c) => c.name().eq_ignore_ascii_case(placeholder.name()),
						_ => false,
					});
					match found {
						Some(i) => out.push(pool.remove(i).clone()),
						None => return Err(PatchError::NameMismatch {
							identifier: identifier.to_owned(),
							name: placeholder.name().to_owned(),
						}),
					}
				}
				e => out.push(e),
			}
		}

		if !pool.is_empty() {
			let names = pool.iter().filter_map(|e| match e {
				Element::Command(c) => Some(c.name().to_owned()),
				_ => None,
			}).collect();
			return Err(PatchError::LeftoverCommands {
				identifier: identifier.to_owned(),
				names,
			});
		}
	}
	Ok(())
}

/// If the snippet's command sequence starts at `bi`, returns the position
/// just past it.
fn match_snippet(db: &CommandDatabase, b: &[Element], bi: usize) -> Option<usize> {
	let snippet = db.split_snippet()?;
	let mut pos = bi;
	for sc in snippet.commands() {
		match b.get(pos) {
			Some(Element::Command(c)) if c.name().eq_ignore_ascii_case(sc.name()) => pos += 1,
			_ => return None,
		}
	}
	(pos > bi).then_some(pos)
}

/// Looks past the gap at `bi` for an existing box boundary: the snippet's
/// commands somewhere in the gap, with another printed run after them.
pub(crate) fn boundary_after(db: &CommandDatabase, b: &[Element], bi: usize) -> Option<usize> {
	let snippet = db.split_snippet()?;
	let mut names: Vec<&str> = snippet.commands().map(|c| c.name()).collect();
	if names.is_empty() {
		return None;
	}
	let mut pos = bi;
	while pos < b.len() && !b[pos].is_printed() {
		if let Element::Command(c) = &b[pos] {
			if !names.is_empty() && c.name().eq_ignore_ascii_case(names[0]) {
				names.remove(0);
			}
		}
		pos += 1;
	}
	(names.is_empty() && pos > bi && pos < b.len()).then_some(pos)
}
