//! Remote endpoint configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials and location of the remote share.
///
/// Persisted as a single record; its presence is what makes an installation
/// "configured".
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Endpoint URL (for example `https://dav.example.com/remote.php/dav`).
    pub url: String,
    /// User name passed through to the remote.
    pub username: String,
    /// Password passed through to the remote.
    pub password: String,
}

impl RemoteConfig {
    /// Creates a new remote configuration.
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
