#![forbid(unsafe_code)]

//! The remote session and key-fetch collaborators (§6): everything the
//! worker needs to turn a resolved host and credential set into a running
//! remote command with streamed output.

pub mod error;
pub mod key_fetch;
pub mod russh_session;
pub mod session;

pub use error::{KeyFetchError, SshError};
pub use key_fetch::{KeyFetcher, LocalFileKeyFetcher};
pub use russh_session::RusshSessionFactory;
pub use session::{Credentials, ExitOutcome, RemoteExecution, Session, SessionFactory};
