//! Single-stream resumable downloads.
//!
//! The same resume algorithm as the segmented engine, applied to one HTTP
//! stream: the temp file's size is the resume offset, and the server's range
//! support decides between appending and restarting.

mod session;
mod status;

pub use session::StreamSession;
pub use status::{StreamOutcome, StreamStatus};
