//! partfetch - segmented, resumable downloads of very large remote archives
//!
//! The library splits a remote file into fixed-size byte-range segments,
//! downloads them concurrently under a bounded worker pool, verifies them
//! against the live server and against the merged output, and reassembles
//! them into a single artifact. Every stage is idempotent, so an interrupted
//! run resumes from whatever is already committed on disk.
//!
//! # Architecture
//!
//! ```text
//! pipeline::Pipeline
//!         │
//!         ├── source (which artifact?)
//!         ├── probe  (name, size, resumability)
//!         ├── segment::plan ──► segment::PendingSet
//!         ├── download::Coordinator
//!         │       └── download::SegmentDownloader × N (semaphore-bounded)
//!         ├── verify (network cross-check, self-consistency)
//!         └── merge
//!
//! stream::StreamSession (single-stream resumer, shares transport + probe)
//! ```
//!
//! All network access goes through the [`transport::Transport`] trait so the
//! engine can be exercised against an in-memory server in tests.

pub mod config;
pub mod download;
pub mod instance;
pub mod logging;
pub mod merge;
pub mod naming;
pub mod pipeline;
pub mod probe;
pub mod retry;
pub mod segment;
pub mod source;
pub mod stream;
pub mod transport;
pub mod verify;

pub use config::{FetchConfig, VerifyStrictness};
pub use download::{DownloadError, DownloadResult};
pub use pipeline::{Pipeline, RunOutcome, RunReport};
pub use probe::DownloadTarget;
