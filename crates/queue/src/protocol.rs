//! The wire protocol spoken over each queue connection: newline-delimited
//! JSON frames, one command or response per line (§6).
//!
//! A connection commits to exactly one role — pusher, popper, or
//! cancel-subscriber — on its first frame, decided by [`Command`]'s variant.

use fleetq_core::JobDescriptor;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single frame sent from a client to the queue service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Enqueue a job descriptor. The server assigns `sequence`.
    Push { descriptor: JobDescriptor },
    /// Block until a descriptor is available.
    Pop,
    /// Publish a cancellation notice for `job_id` to every live subscriber.
    CancelPub { job_id: Uuid },
    /// Open a long-lived stream of cancellation notices.
    CancelSub,
    /// Liveness check.
    Ping,
}

/// A single frame sent from the queue service back to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Ok,
    Err { message: String },
    Descriptor { descriptor: JobDescriptor },
    Pong,
    /// One frame per cancellation notice on a `CancelSub` stream.
    Cancel { job_id: Uuid },
}
