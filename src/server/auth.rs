//! Login for the transfer server.
//!
//! `authenticate` only checks credentials. `resolve_home` is the side
//! effect: it provisions today's album and returns it as the session home.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::AlbumSource;
use crate::library::{AlbumProvisioner, ProvisioningError};

/// USER/PASS pair from the control channel
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unknown user '{0}'")]
    UnknownUser(String),

    #[error("Wrong password for '{0}'")]
    BadPassword(String),
}

/// Single-account authenticator
pub struct Authenticator {
    username: String,
    password: String,
    provisioner: AlbumProvisioner,
}

impl Authenticator {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        provisioner: AlbumProvisioner,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            provisioner,
        }
    }

    /// Check credentials against the configured account
    pub fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        if credentials.username != self.username {
            return Err(AuthError::UnknownUser(credentials.username.clone()));
        }
        if !constant_time_eq(credentials.password.as_bytes(), self.password.as_bytes()) {
            return Err(AuthError::BadPassword(credentials.username.clone()));
        }

        Ok(Identity {
            username: credentials.username.clone(),
        })
    }

    /// Home directory for a login: today's album, created on first use
    pub async fn resolve_home(&self, identity: &Identity) -> Result<PathBuf, ProvisioningError> {
        let album = self.provisioner.resolve(&AlbumSource::Today).await?;
        tracing::info!(
            user = %identity.username,
            album = %album.key,
            created = album.created,
            "Resolved session home"
        );
        Ok(album.path)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;
    use tempfile::TempDir;

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_authenticate() {
        let auth = Authenticator::new("user", "hunter2", AlbumProvisioner::new("/tmp", Tz::UTC));

        assert_eq!(
            auth.authenticate(&credentials("user", "hunter2")).unwrap(),
            Identity {
                username: "user".to_string()
            }
        );
        assert!(matches!(
            auth.authenticate(&credentials("user", "hunter3")),
            Err(AuthError::BadPassword(_))
        ));
        assert!(matches!(
            auth.authenticate(&credentials("root", "hunter2")),
            Err(AuthError::UnknownUser(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let debug = format!("{:?}", credentials("user", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_resolve_home_creates_todays_album() {
        let temp = TempDir::new().unwrap();
        let auth = Authenticator::new("user", "pw", AlbumProvisioner::new(temp.path(), Tz::UTC));
        let identity = auth.authenticate(&credentials("user", "pw")).unwrap();

        let home = auth.resolve_home(&identity).await.unwrap();
        assert!(home.is_dir());
        assert!(home.join("index.md").exists());
        assert_eq!(home.parent(), Some(temp.path()));
    }
}
