use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default SSH port when a host record omits one.
pub const DEFAULT_PORT: u16 = 22;

/// Credential mechanism used to authenticate to a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Password,
    Key,
}

/// A registered remote host, and the credentials the worker uses to reach
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: Uuid,
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub user: String,
    pub auth_type: AuthType,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub pem_file_url: Option<String>,
    pub is_active: bool,
}

/// Why a [`Host`] record failed validation (§3: exactly one credential
/// field must be present for the chosen [`AuthType`]).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HostValidationError {
    #[error("auth_type is password but `password` is missing or empty")]
    MissingPassword,
    #[error("auth_type is key but neither `private_key` nor `pem_file_url` is set")]
    MissingKeyMaterial,
    #[error("auth_type is key but both `private_key` and `pem_file_url` are set")]
    AmbiguousKeyMaterial,
}

impl Host {
    /// Validates the credential invariant in §3: exactly one of
    /// `private_key`/`pem_file_url` for `key` auth, a non-empty `password`
    /// for `password` auth.
    pub fn validate(&self) -> Result<(), HostValidationError> {
        match self.auth_type {
            AuthType::Password => {
                if self.password.as_deref().unwrap_or("").is_empty() {
                    return Err(HostValidationError::MissingPassword);
                }
            }
            AuthType::Key => {
                match (self.private_key.is_some(), self.pem_file_url.is_some()) {
                    (false, false) => return Err(HostValidationError::MissingKeyMaterial),
                    (true, true) => return Err(HostValidationError::AmbiguousKeyMaterial),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Whether a job may leave `queued` against this host: the row must
    /// exist (trivially true here) and be active.
    #[must_use]
    pub fn is_dispatchable(&self) -> bool {
        self.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_host(auth_type: AuthType) -> Host {
        Host {
            id: Uuid::new_v4(),
            name: "web-1".into(),
            hostname: "10.0.0.1".into(),
            port: DEFAULT_PORT,
            user: "deploy".into(),
            auth_type,
            password: None,
            private_key: None,
            pem_file_url: None,
            is_active: true,
        }
    }

    #[test]
    fn password_auth_requires_non_empty_password() {
        let mut host = base_host(AuthType::Password);
        assert_eq!(host.validate(), Err(HostValidationError::MissingPassword));
        host.password = Some(String::new());
        assert_eq!(host.validate(), Err(HostValidationError::MissingPassword));
        host.password = Some("s3cret".into());
        assert_eq!(host.validate(), Ok(()));
    }

    #[test]
    fn key_auth_requires_exactly_one_key_source() {
        let mut host = base_host(AuthType::Key);
        assert_eq!(
            host.validate(),
            Err(HostValidationError::MissingKeyMaterial)
        );

        host.private_key = Some("-----BEGIN KEY-----".into());
        assert_eq!(host.validate(), Ok(()));

        host.pem_file_url = Some("s3://bucket/key.pem".into());
        assert_eq!(
            host.validate(),
            Err(HostValidationError::AmbiguousKeyMaterial)
        );

        host.private_key = None;
        assert_eq!(host.validate(), Ok(()));
    }

    #[test]
    fn inactive_host_is_not_dispatchable() {
        let mut host = base_host(AuthType::Password);
        host.password = Some("x".into());
        assert!(host.is_dispatchable());
        host.is_active = false;
        assert!(!host.is_dispatchable());
    }
}
