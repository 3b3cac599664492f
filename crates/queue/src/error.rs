/// Errors surfaced by the dispatcher, the server, and the client (§7,
/// category 2: queue-full; category 3: transient infrastructure).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is at capacity")]
    Full,

    #[error("connection closed before a descriptor arrived")]
    ConnectionClosed,

    #[error("malformed frame: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue service unreachable: {0}")]
    Unreachable(String),
}
