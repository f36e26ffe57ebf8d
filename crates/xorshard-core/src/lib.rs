//! # xorshard Core
//!
//! Parallel repeating-key XOR file transform engine.
//!
//! This crate provides:
//! - Key and payload loading into owned, wiped-on-drop buffers
//! - Fragment planning (exact partition of the payload across workers)
//! - The in-place XOR transform run by each worker
//! - A job coordinator driving a scoped fork-join over the fragments
//! - Result write-back and status code mapping for external callers
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │  Loader  │──▶│ Planner  │──▶│ Coordinator              │──▶│  Writer  │
//! │ key+data │   │ fragments│   │ spawn ─▶ workers ─▶ join │   │  output  │
//! └──────────┘   └──────────┘   └──────────────────────────┘   └──────────┘
//! ```
//!
//! The transform is self-inverse: running a job twice with the same key
//! restores the original bytes, so encryption and decryption are one call.
//!
//! ```no_run
//! use xorshard_core::transform_file;
//!
//! let status = transform_file("/tmp/plain.bin", "/tmp/cipher.bin", "/tmp/key.bin", 4);
//! assert!(status.is_success());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod error;
pub mod job;
pub mod loader;
pub mod planner;
pub mod worker;
pub mod writer;

pub use error::{Result, StatusCode, TransformError};
pub use job::{Coordinator, Job, JobOptions, JobReport, JobState, StageTimings, transform_file};
pub use loader::{DataBuffer, KeyBuffer};
pub use planner::{Fragment, FragmentRange, plan_fragments, split_fragments};
pub use worker::{WorkerReport, transform_in_place, xor_range};

/// Prefix used for worker thread names (`xorshard-worker-{index}`)
pub const WORKER_THREAD_PREFIX: &str = "xorshard-worker";
