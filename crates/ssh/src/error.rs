/// Failures surfaced by the remote session and key-fetch collaborators
/// (§6, §7 category 4: remote execution failure).
#[derive(Debug, thiserror::Error)]
pub enum SshError {
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication refused for user {user:?} on {host}")]
    AuthRefused { host: String, user: String },

    #[error("failed to open a channel: {0}")]
    Channel(String),

    #[error("remote session deadline of {0:?} elapsed")]
    Timeout(std::time::Duration),

    #[error("remote session was canceled: {0}")]
    Canceled(String),

    #[error("remote connection closed before an exit status arrived")]
    Disconnected,

    #[error("key material error: {0}")]
    KeyMaterial(String),

    #[error("underlying transport error: {0}")]
    Transport(#[from] russh::Error),
}

/// Failures from the key-fetch collaborator (§6).
#[derive(Debug, thiserror::Error)]
pub enum KeyFetchError {
    #[error("key locator not found: {0}")]
    NotFound(String),

    #[error("fetching key material timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("io error reading key material: {0}")]
    Io(#[from] std::io::Error),
}
