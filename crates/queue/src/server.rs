//! The TCP front end: accepts connections, frames them as newline-delimited
//! JSON, and routes each to the role fixed by its first command (§4.1, §6).

use std::net::SocketAddr;
use std::sync::Arc;

use fleetq_core::JobDescriptor;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancel::CancelBus;
use crate::dispatcher::Dispatcher;
use crate::error::QueueError;
use crate::protocol::{Command, Response};

/// Heap capacity beyond which `Push` is refused with queue-full.
pub const DEFAULT_HEAP_CAPACITY: usize = 10_000;

/// The queue's shared state: the dispatch heap and the cancellation bus.
/// `Arc`-shared across every accepted connection's task.
pub struct QueueService {
    dispatcher: Arc<Dispatcher>,
    cancel_bus: Arc<CancelBus>,
}

impl QueueService {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(capacity)),
            cancel_bus: Arc::new(CancelBus::new()),
        }
    }
}

impl Default for QueueService {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_CAPACITY)
    }
}

type Sink = SplitSink<Framed<TcpStream, LinesCodec>, String>;
type Stream = SplitStream<Framed<TcpStream, LinesCodec>>;

/// Binds `addr` and serves connections until the listener errors or the
/// process is torn down by its caller (e.g. on ctrl-c).
pub async fn serve(addr: SocketAddr, service: Arc<QueueService>) -> Result<(), QueueError> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "queue service listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, service).await {
                warn!(%peer, error = %err, "connection ended");
            }
        });
    }
}

async fn handle_connection(socket: TcpStream, service: Arc<QueueService>) -> Result<(), QueueError> {
    let framed = Framed::new(socket, LinesCodec::new());
    let (mut sink, mut stream) = framed.split();

    let first_line = match stream.next().await {
        Some(line) => line.map_err(|e| QueueError::Protocol(e.to_string()))?,
        None => return Ok(()),
    };
    let command = decode(&first_line)?;

    match command {
        Command::Push { descriptor } => push_loop(descriptor, &mut sink, &mut stream, &service).await,
        Command::Pop => pop_loop(&mut sink, &mut stream, &service).await,
        Command::CancelPub { job_id } => cancel_pub_loop(job_id, &mut sink, &mut stream, &service).await,
        Command::CancelSub => cancel_sub_loop(&mut sink, &service).await,
        Command::Ping => send(&mut sink, &Response::Pong).await,
    }
}

fn decode(line: &str) -> Result<Command, QueueError> {
    serde_json::from_str(line).map_err(|e| QueueError::Protocol(e.to_string()))
}

async fn send(sink: &mut Sink, response: &Response) -> Result<(), QueueError> {
    let line = serde_json::to_string(response).map_err(|e| QueueError::Protocol(e.to_string()))?;
    sink.send(line).await?;
    Ok(())
}

async fn next_command(stream: &mut Stream) -> Result<Option<Command>, QueueError> {
    match stream.next().await {
        Some(line) => Ok(Some(decode(&line.map_err(|e| QueueError::Protocol(e.to_string()))?)?)),
        None => Ok(None),
    }
}

async fn push_loop(
    first: JobDescriptor,
    sink: &mut Sink,
    stream: &mut Stream,
    service: &QueueService,
) -> Result<(), QueueError> {
    let mut pending = Some(first);
    loop {
        let descriptor = match pending.take() {
            Some(d) => d,
            None => match next_command(stream).await? {
                None => return Ok(()),
                Some(Command::Push { descriptor }) => descriptor,
                Some(_) => {
                    send(sink, &Response::Err {
                        message: "connection is committed to PUSH".into(),
                    })
                    .await?;
                    continue;
                }
            },
        };

        match service.dispatcher.push(descriptor) {
            Ok(()) => send(sink, &Response::Ok).await?,
            Err(err) => send(sink, &Response::Err { message: err.to_string() }).await?,
        }
    }
}

async fn pop_loop(sink: &mut Sink, stream: &mut Stream, service: &QueueService) -> Result<(), QueueError> {
    loop {
        match next_command(stream).await? {
            None => return Ok(()),
            Some(Command::Pop) => {}
            Some(_) => {
                send(sink, &Response::Err {
                    message: "connection is committed to POP".into(),
                })
                .await?;
                continue;
            }
        }

        let descriptor = match service.dispatcher.try_pop() {
            Some(d) => d,
            None => {
                let rx = service.dispatcher.park();
                tokio::select! {
                    result = rx => match result {
                        Ok(d) => d,
                        Err(_) => return Err(QueueError::ConnectionClosed),
                    },
                    frame = stream.next() => {
                        return match frame {
                            None => Err(QueueError::ConnectionClosed),
                            Some(Err(e)) => Err(QueueError::Protocol(e.to_string())),
                            Some(Ok(_)) => Err(QueueError::Protocol(
                                "unexpected frame while a POP is outstanding".into(),
                            )),
                        };
                    }
                }
            }
        };

        send(sink, &Response::Descriptor { descriptor }).await?;
    }
}

async fn cancel_pub_loop(
    first: Uuid,
    sink: &mut Sink,
    stream: &mut Stream,
    service: &QueueService,
) -> Result<(), QueueError> {
    let mut pending = Some(first);
    loop {
        let job_id = match pending.take() {
            Some(id) => id,
            None => match next_command(stream).await? {
                None => return Ok(()),
                Some(Command::CancelPub { job_id }) => job_id,
                Some(_) => {
                    send(sink, &Response::Err {
                        message: "connection is committed to CANCEL_PUB".into(),
                    })
                    .await?;
                    continue;
                }
            },
        };

        service.cancel_bus.publish(job_id);
        send(sink, &Response::Ok).await?;
    }
}

async fn cancel_sub_loop(sink: &mut Sink, service: &QueueService) -> Result<(), QueueError> {
    let mut rx = service.cancel_bus.subscribe();
    loop {
        match rx.recv().await {
            Ok(job_id) => send(sink, &Response::Cancel { job_id }).await?,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "cancel subscriber fell behind; notices dropped");
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}
