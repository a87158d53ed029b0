//! Connection settings shared by every connection builder.

use std::time::Duration;

/// Settings applied when a connection is established.
///
/// Anything left unset falls back to what the connection URI or the backend defaults to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectSettings {
    /// Application name reported to the store.
    pub app_name: Option<String>,
    /// How long to wait for a socket connection.
    pub connect_timeout: Option<Duration>,
    /// How long to wait for a usable server before failing an operation.
    pub server_selection_timeout: Option<Duration>,
}

impl ConnectSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }
}
