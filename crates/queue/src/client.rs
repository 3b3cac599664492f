//! Thin clients over the queue wire protocol, used by the submission shim
//! (pusher role) and the worker's consumer task (popper + cancel roles).
//!
//! Each handle commits to one role for its connection's lifetime, matching
//! the server's contract (§4.1, §6).

use std::net::SocketAddr;

use fleetq_core::JobDescriptor;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};
use uuid::Uuid;

use crate::error::QueueError;
use crate::protocol::{Command, Response};

async fn connect(addr: SocketAddr) -> Result<Framed<TcpStream, LinesCodec>, QueueError> {
    let socket = TcpStream::connect(addr).await?;
    Ok(Framed::new(socket, LinesCodec::new()))
}

async fn write_command(framed: &mut Framed<TcpStream, LinesCodec>, command: &Command) -> Result<(), QueueError> {
    let line = serde_json::to_string(command).map_err(|e| QueueError::Protocol(e.to_string()))?;
    framed.send(line).await?;
    Ok(())
}

async fn read_response(framed: &mut Framed<TcpStream, LinesCodec>) -> Result<Response, QueueError> {
    match framed.next().await {
        Some(line) => {
            let line = line.map_err(|e| QueueError::Protocol(e.to_string()))?;
            serde_json::from_str(&line).map_err(|e| QueueError::Protocol(e.to_string()))
        }
        None => Err(QueueError::ConnectionClosed),
    }
}

fn expect_ok(response: Response) -> Result<(), QueueError> {
    match response {
        Response::Ok => Ok(()),
        Response::Err { message } => Err(QueueError::Protocol(message)),
        other => Err(QueueError::Protocol(format!("unexpected response: {other:?}"))),
    }
}

/// A connection committed to the pusher role. Used by the submission shim
/// to enqueue job descriptors.
pub struct PushHandle {
    framed: Framed<TcpStream, LinesCodec>,
}

impl PushHandle {
    pub async fn connect(addr: SocketAddr) -> Result<Self, QueueError> {
        Ok(Self { framed: connect(addr).await? })
    }

    pub async fn push(&mut self, descriptor: JobDescriptor) -> Result<(), QueueError> {
        write_command(&mut self.framed, &Command::Push { descriptor }).await?;
        expect_ok(read_response(&mut self.framed).await?)
    }
}

/// A connection committed to the popper role. The worker's consumer task
/// holds exactly one of these for its lifetime.
pub struct PopHandle {
    framed: Framed<TcpStream, LinesCodec>,
}

impl PopHandle {
    pub async fn connect(addr: SocketAddr) -> Result<Self, QueueError> {
        Ok(Self { framed: connect(addr).await? })
    }

    /// Blocks until a descriptor is available or the connection is severed.
    pub async fn pop(&mut self) -> Result<JobDescriptor, QueueError> {
        write_command(&mut self.framed, &Command::Pop).await?;
        match read_response(&mut self.framed).await? {
            Response::Descriptor { descriptor } => Ok(descriptor),
            Response::Err { message } => Err(QueueError::Protocol(message)),
            other => Err(QueueError::Protocol(format!("unexpected response: {other:?}"))),
        }
    }
}

/// A connection committed to publishing cancellation notices.
pub struct CancelPublisher {
    framed: Framed<TcpStream, LinesCodec>,
}

impl CancelPublisher {
    pub async fn connect(addr: SocketAddr) -> Result<Self, QueueError> {
        Ok(Self { framed: connect(addr).await? })
    }

    pub async fn publish(&mut self, job_id: Uuid) -> Result<(), QueueError> {
        write_command(&mut self.framed, &Command::CancelPub { job_id }).await?;
        expect_ok(read_response(&mut self.framed).await?)
    }
}

/// A connection committed to receiving cancellation notices. The worker
/// holds one of these alongside its `PopHandle`.
pub struct CancelSubscriber {
    framed: Framed<TcpStream, LinesCodec>,
}

impl CancelSubscriber {
    pub async fn connect(addr: SocketAddr) -> Result<Self, QueueError> {
        let mut framed = connect(addr).await?;
        write_command(&mut framed, &Command::CancelSub).await?;
        Ok(Self { framed })
    }

    /// Awaits the next cancellation notice, or `None` once the connection
    /// closes.
    pub async fn next_cancel(&mut self) -> Result<Option<Uuid>, QueueError> {
        match self.framed.next().await {
            None => Ok(None),
            Some(line) => {
                let line = line.map_err(|e| QueueError::Protocol(e.to_string()))?;
                match serde_json::from_str(&line).map_err(|e| QueueError::Protocol(e.to_string()))? {
                    Response::Cancel { job_id } => Ok(Some(job_id)),
                    other => Err(QueueError::Protocol(format!("unexpected response: {other:?}"))),
                }
            }
        }
    }
}

/// A one-shot liveness check against the queue service.
pub async fn ping(addr: SocketAddr) -> Result<(), QueueError> {
    let mut framed = connect(addr).await?;
    write_command(&mut framed, &Command::Ping).await?;
    match read_response(&mut framed).await? {
        Response::Pong => Ok(()),
        other => Err(QueueError::Protocol(format!("unexpected response: {other:?}"))),
    }
}
