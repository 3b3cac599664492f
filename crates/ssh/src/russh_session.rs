//! The `russh`-backed [`Session`]/[`SessionFactory`] implementation (§6).
//!
//! Host key verification is intentionally permissive: every server key is
//! accepted. A production deployment would pin known-hosts entries per
//! `server_id`; that policy lives outside this crate's scope (see
//! `DESIGN.md`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::ChannelMsg;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SshError;
use crate::session::{Credentials, ExitOutcome, RemoteExecution, Session, SessionFactory};

struct AcceptAllHandler;

#[async_trait]
impl client::Handler for AcceptAllHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &russh::keys::PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Opens authenticated sessions over `russh`.
pub struct RusshSessionFactory;

#[async_trait]
impl SessionFactory for RusshSessionFactory {
    async fn open_session(
        &self,
        host: &str,
        port: u16,
        user: &str,
        credentials: Credentials,
    ) -> Result<Box<dyn Session>, SshError> {
        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, (host, port), AcceptAllHandler)
            .await
            .map_err(|err| SshError::Connect {
                host: host.to_string(),
                port,
                source: std::io::Error::other(err.to_string()),
            })?;

        let authenticated = match credentials {
            Credentials::Password(password) => handle
                .authenticate_password(user, password)
                .await
                .map_err(SshError::Transport)?,
            Credentials::PrivateKey(key_bytes) => {
                let pem = String::from_utf8(key_bytes).map_err(|err| SshError::KeyMaterial(err.to_string()))?;
                let key_pair =
                    russh::keys::decode_secret_key(&pem, None).map_err(|err| SshError::KeyMaterial(err.to_string()))?;
                handle
                    .authenticate_publickey(user, Arc::new(key_pair))
                    .await
                    .map_err(SshError::Transport)?
            }
        };

        if !authenticated {
            return Err(SshError::AuthRefused {
                host: host.to_string(),
                user: user.to_string(),
            });
        }

        Ok(Box::new(RusshSession {
            handle: Arc::new(Mutex::new(handle)),
        }))
    }
}

pub struct RusshSession {
    handle: Arc<Mutex<Handle<AcceptAllHandler>>>,
}

/// Splits `buf` on newlines, sending each completed line through `tx` as a
/// UTF-8 string (lossily, since remote output is not guaranteed valid
/// UTF-8) and leaving any trailing partial line in `buf`.
fn drain_lines(buf: &mut Vec<u8>, tx: &mpsc::UnboundedSender<Result<String, SshError>>) {
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line).trim_end_matches(['\n', '\r']).to_string();
        let _ = tx.send(Ok(text));
    }
}

#[async_trait]
impl Session for RusshSession {
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<RemoteExecution, SshError> {
        let mut channel = {
            let handle = self.handle.lock().await;
            handle.channel_open_session().await.map_err(|err| SshError::Channel(err.to_string()))?
        };
        channel
            .exec(true, command)
            .await
            .map_err(|err| SshError::Channel(err.to_string()))?;

        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            let mut exit_code: Option<i32> = None;

            loop {
                tokio::select! {
                    () = &mut deadline => {
                        debug!(%command, ?timeout, "remote command exceeded its deadline");
                        let _ = exit_tx.send(Ok(ExitOutcome::Canceled("timeout elapsed".into())));
                        return;
                    }
                    () = cancel.cancelled() => {
                        let _ = exit_tx.send(Ok(ExitOutcome::Canceled("canceled".into())));
                        return;
                    }
                    msg = channel.wait() => {
                        match msg {
                            Some(ChannelMsg::Data { data }) => {
                                stdout_buf.extend_from_slice(&data);
                                drain_lines(&mut stdout_buf, &stdout_tx);
                            }
                            Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                                stderr_buf.extend_from_slice(&data);
                                drain_lines(&mut stderr_buf, &stderr_tx);
                            }
                            Some(ChannelMsg::ExitStatus { exit_status }) => {
                                exit_code = Some(exit_status as i32);
                            }
                            Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                                if !stdout_buf.is_empty() {
                                    stdout_buf.push(b'\n');
                                    drain_lines(&mut stdout_buf, &stdout_tx);
                                }
                                if !stderr_buf.is_empty() {
                                    stderr_buf.push(b'\n');
                                    drain_lines(&mut stderr_buf, &stderr_tx);
                                }
                                let result = match exit_code {
                                    Some(code) => Ok(ExitOutcome::ExitCode(code)),
                                    None => {
                                        warn!("remote channel closed before an exit status arrived");
                                        Err(SshError::Disconnected)
                                    }
                                };
                                let _ = exit_tx.send(result);
                                return;
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        Ok(RemoteExecution {
            stdout: Box::pin(UnboundedReceiverStream::new(stdout_rx)),
            stderr: Box::pin(UnboundedReceiverStream::new(stderr_rx)),
            exit: Box::pin(async move {
                exit_rx
                    .await
                    .map_err(|_| SshError::Channel("exit watcher task dropped".into()))?
            }),
        })
    }
}
