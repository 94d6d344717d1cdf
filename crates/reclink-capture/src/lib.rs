//! reclink-capture: one supervised capture process per recording.
//!
//! [`CaptureSupervisor::start`] launches the external capture binary for a
//! `pending` recording, drains its output into a bounded [`OutputTail`] and
//! registers a watcher task. The watcher turns the process outcome into a
//! terminal recording status:
//!
//! - exit 0, exit 130 or death by SIGINT → `completed`
//! - any other exit → `failed`, with the output tail as the error message
//! - [`CaptureSupervisor::stop`] → SIGINT, forced kill after the grace
//!   period, then `completed`

pub mod error;
pub mod exit;
pub mod supervisor;
pub mod tail;

pub use error::{CaptureError, Result};
pub use supervisor::{resolve_binary, CaptureSettings, CaptureSupervisor};
pub use tail::{OutputTail, StreamKind};
