use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("undefined label {label:?} referenced at {pos:#X}")]
	Label { pos: usize, label: Label },
	#[error("value {value:#X} at {pos:#X} does not fit in {size} bytes")]
	Size { pos: usize, value: usize, size: usize },
}

pub type Result<T, E=Error> = std::result::Result<T, E>;

type Delayed = Box<dyn FnOnce(&DelayContext) -> Result<Vec<u8>>>;

/// An opaque position marker inside a [`Writer`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u64);

impl std::fmt::Debug for Label {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Label({:#X})", self.0)
	}
}

impl Label {
	#[allow(clippy::new_without_default)]
	pub fn new() -> Label {
		use std::sync::atomic::{AtomicU64, Ordering};
		static COUNT: AtomicU64 = AtomicU64::new(0);
		Label(COUNT.fetch_add(1, Ordering::Relaxed))
	}
}

/// An incremental writer to a `Vec<u8>`, with support for delayed fixups.
///
/// A delayed slot is reserved with [`delay`](Self::delay) and filled in by
/// [`finish`](Self::finish), once every label position is known. This is how
/// length fields that precede the data they describe are written.
#[derive(Default)]
#[must_use]
pub struct Writer {
	data: Vec<u8>,
	delays: Vec<(Range<usize>, Delayed)>,
	labels: HashMap<Label, usize>,
}

/// Context passed to delay closures.
pub struct DelayContext<'a> {
	pos: usize,
	labels: &'a HashMap<Label, usize>,
}

impl<'a> DelayContext<'a> {
	/// The position the delayed bytes will be written at.
	pub fn pos(&self) -> usize {
		self.pos
	}

	/// Looks up a label's position. The label must have been placed.
	pub fn label(&self, label: Label) -> Result<usize> {
		self.labels.get(&label).copied()
			.ok_or(Error::Label { pos: self.pos, label })
	}
}

impl Writer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Finalizes all delayed slots and returns the written bytes.
	pub fn finish(mut self) -> Result<Vec<u8>> {
		let labels = std::mem::take(&mut self.labels);
		for (range, cb) in self.delays {
			let pos = range.start;
			let bytes = cb(&DelayContext { pos, labels: &labels })?;
			debug_assert_eq!(bytes.len(), range.len());
			self.data[range].copy_from_slice(&bytes);
		}
		Ok(self.data)
	}

	pub fn slice(&mut self, data: &[u8]) {
		self.data.extend_from_slice(data)
	}

	pub fn u8(&mut self, v: u8) {
		self.slice(&v.to_le_bytes())
	}

	pub fn u16(&mut self, v: u16) {
		self.slice(&v.to_le_bytes())
	}

	pub fn u32(&mut self, v: u32) {
		self.slice(&v.to_le_bytes())
	}

	/// Writes a 24-bit little-endian integer. The value must fit.
	pub fn u24(&mut self, v: u32) {
		debug_assert!(v < 1 << 24);
		self.slice(&v.to_le_bytes()[..3])
	}

	/// Places a label at the current position.
	pub fn label(&mut self, label: Label) {
		if let Some(p) = self.labels.insert(label, self.len()) {
			panic!("label already defined at {p:#06X}")
		}
	}

	/// Creates and places a label at the current position.
	pub fn here(&mut self) -> Label {
		let l = Label::new();
		self.label(l);
		l
	}

	/// Reserves `N` bytes to be filled in by `finish`, from label positions.
	pub fn delay<const N: usize>(&mut self, cb: impl FnOnce(&DelayContext) -> Result<[u8; N]> + 'static) {
		let start = self.len();
		self.slice(&[0; N]);
		let end = self.len();
		self.delays.push((start..end, Box::new(move |ctx| Ok(cb(ctx)?.to_vec()))));
	}

	/// Reserves a `u16` holding a label's final position.
	pub fn delay_u16(&mut self, label: Label) {
		self.delay(move |ctx| {
			let value = ctx.label(label)?;
			u16::try_from(value)
				.map(u16::to_le_bytes)
				.map_err(|_| Error::Size { pos: ctx.pos(), value, size: 2 })
		});
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Writes null bytes until the length is a multiple of `size`.
	pub fn align(&mut self, size: usize) {
		self.slice(&vec![0; (size - self.len() % size) % size]);
	}
}
