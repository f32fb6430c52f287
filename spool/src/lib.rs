//! Incremental byte readers and writers for little-endian binary formats.
//!
//! [`Reader`](read::Reader) is a positioned cursor over a byte slice;
//! [`Writer`](write::Writer) appends to a `Vec<u8>` and supports delayed
//! fixups for values that are not known until the rest of the stream has
//! been written, such as trailing length fields.

pub mod read;
pub mod write;

pub use read::Reader;
pub use write::{Writer, Label};
