#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Shared job/host domain model for the remote-command execution pipeline.
//!
//! This crate has no I/O of its own: it defines the record types that flow
//! between the submission shim, the queue, the persistent store, and the
//! worker, plus the small amount of pure state-machine logic that all of
//! them need to agree on.

pub mod descriptor;
pub mod error;
pub mod host;
pub mod job;

pub use descriptor::JobDescriptor;
pub use error::CoreError;
pub use host::{AuthType, Host};
pub use job::{Job, JobPatch, JobStatus, DEFAULT_PRIORITY, DEFAULT_TIMEOUT_SECONDS, PRIORITY_RANGE};
