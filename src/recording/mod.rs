//! `.bfpc` recordings: gzip-compressed, varint length-delimited messages.
//!
//! Layout of the decompressed stream:
//!
//! ```text
//! Header | Data(frame) | Data(frame) | ... | Data(footer)
//! ```
//!
//! Each message is prefixed with its length as a protobuf varint. There is no
//! index; readers locate the footer by scanning forward once and remembering
//! where the last message started. A zero-length data message ends the
//! stream like the end of the file does.

mod footer;
mod format;
mod reader;
mod writer;

pub use footer::{FooterTracker, scan_patterns_match};
pub use reader::RecordingReader;
pub use writer::Recorder;
