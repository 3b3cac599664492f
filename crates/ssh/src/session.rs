//! The remote session collaborator (§6): an authenticated shell connection
//! to a single host, exposing one `run` per invocation.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::SshError;

/// A line of output from either stream of a running remote command.
pub type OutputLine = Result<String, SshError>;

/// The terminal outcome of a remote command invocation.
#[derive(Debug, Clone)]
pub enum ExitOutcome {
    /// The remote command exited on its own.
    ExitCode(i32),
    /// The session was torn down before the command exited, either because
    /// `cancel` fired or `timeout` elapsed.
    Canceled(String),
}

/// The three artifacts of a running remote command: its two output
/// streams and a future resolving once the command (or the cancellation)
/// concludes.
pub struct RemoteExecution {
    pub stdout: Pin<Box<dyn Stream<Item = OutputLine> + Send>>,
    pub stderr: Pin<Box<dyn Stream<Item = OutputLine> + Send>>,
    pub exit: BoxFuture<'static, Result<ExitOutcome, SshError>>,
}

/// Credentials resolved and ready to present to a host. Built by the
/// worker from the host's `auth_type` and the key-fetch collaborator.
#[derive(Clone)]
pub enum Credentials {
    Password(String),
    PrivateKey(Vec<u8>),
}

/// An authenticated connection to one remote host.
#[async_trait]
pub trait Session: Send + Sync {
    /// Runs `command` on the remote host. `timeout` is a hard deadline;
    /// `cancel` is fired externally (e.g. by the worker's cancellation map)
    /// to abort the command early. Both converge on `ExitOutcome::Canceled`.
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<RemoteExecution, SshError>;
}

/// Opens an authenticated session to `host:port` as `user` with
/// `credentials`. Implemented over `russh` by [`crate::russh_session::connect`].
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(
        &self,
        host: &str,
        port: u16,
        user: &str,
        credentials: Credentials,
    ) -> Result<Box<dyn Session>, SshError>;
}
