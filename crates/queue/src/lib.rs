#![forbid(unsafe_code)]

//! The priority queue service (Q): an in-memory dispatch heap and
//! cancellation bus, reachable over a framed TCP protocol (§4.1).
//!
//! This crate has no persistence of its own — on restart every pending
//! descriptor is lost, and the store is left holding `queued` rows for an
//! operator to re-enqueue.

pub mod cancel;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod server;
pub mod shutdown;

pub use cancel::CancelBus;
pub use client::{CancelPublisher, CancelSubscriber, PopHandle, PushHandle};
pub use dispatcher::Dispatcher;
pub use error::QueueError;
pub use server::{serve, QueueService, DEFAULT_HEAP_CAPACITY};
