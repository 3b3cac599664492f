/// Errors surfaced inside the worker, mapped to the failure taxonomy in
/// §4.2.5 by the caller rather than carried as distinct variants here.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("host has auth_type=key but neither private_key nor pem_file_url is set")]
    MissingCredentials,

    #[error("key fetch failed: {0}")]
    KeyFetch(#[from] fleetq_ssh::KeyFetchError),

    #[error("remote session error: {0}")]
    Session(#[from] fleetq_ssh::SshError),

    #[error("store error: {0}")]
    Store(#[from] fleetq_store::StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] fleetq_queue::QueueError),
}
