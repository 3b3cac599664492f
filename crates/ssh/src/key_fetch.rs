//! The key-fetch collaborator (§6): resolves an opaque `pem_file_url`
//! locator to key bytes. The core treats the locator as opaque; only a
//! local-filesystem implementation is provided here, a remote object-store
//! backend is out of scope.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::KeyFetchError;

/// Resolves a key locator to PEM-encoded bytes.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_key(&self, locator: &str, timeout: Duration) -> Result<Vec<u8>, KeyFetchError>;
}

/// Resolves `file://` locators (and bare paths) against the local
/// filesystem.
pub struct LocalFileKeyFetcher;

#[async_trait]
impl KeyFetcher for LocalFileKeyFetcher {
    async fn fetch_key(&self, locator: &str, timeout: Duration) -> Result<Vec<u8>, KeyFetchError> {
        let path = locator.strip_prefix("file://").unwrap_or(locator).to_string();
        tokio::time::timeout(timeout, tokio::fs::read(&path))
            .await
            .map_err(|_| KeyFetchError::Timeout(timeout))?
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => KeyFetchError::NotFound(locator.to_string()),
                _ => KeyFetchError::Io(err),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_key_material_from_a_file_url() {
        let dir = tempdir();
        let path = dir.join("id_ed25519");
        tokio::fs::write(&path, b"-----BEGIN KEY-----\n").await.unwrap();

        let fetcher = LocalFileKeyFetcher;
        let locator = format!("file://{}", path.display());
        let bytes = fetcher.fetch_key(&locator, Duration::from_secs(1)).await.unwrap();
        assert_eq!(bytes, b"-----BEGIN KEY-----\n");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn missing_file_surfaces_not_found() {
        let fetcher = LocalFileKeyFetcher;
        let err = fetcher
            .fetch_key("file:///no/such/path/id_rsa", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, KeyFetchError::NotFound(_)));
    }

    fn tempdir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("fleetq-ssh-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
