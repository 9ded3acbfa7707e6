//! [`RelaySettings`] – listener, endpoint and per-connection limits.

use std::fmt;
use std::num::NonZeroU32;

use nexus_middleware::DEFAULT_OUTBOUND_CAPACITY;
use nexus_types::RelayError;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 3000;
/// Default WebSocket endpoint.
pub const DEFAULT_WS_PATH: &str = "/ws";
/// Default inbound text frames per second per connection.
pub const DEFAULT_RATE_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct RelaySettings {
    port: u16,
    ws_path: String,
    shared_secret: Option<Zeroizing<String>>,
    rate_limit: Option<NonZeroU32>,
    outbound_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ws_path: DEFAULT_WS_PATH.to_string(),
            shared_secret: None,
            rate_limit: NonZeroU32::new(DEFAULT_RATE_LIMIT),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl RelaySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Endpoint path; a missing leading `/` is added.
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.ws_path = if path.starts_with('/') { path } else { format!("/{path}") };
        self
    }

    /// Require `?token=<secret>` on the upgrade request.  An empty secret
    /// disables the check.
    pub fn with_shared_secret(mut self, secret: Option<Zeroizing<String>>) -> Self {
        self.shared_secret = secret.filter(|s| !s.is_empty());
        self
    }

    /// Inbound text frames per second per connection; `0` disables
    /// limiting.
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.rate_limit = NonZeroU32::new(per_second);
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ws_path(&self) -> &str {
        &self.ws_path
    }

    pub fn requires_token(&self) -> bool {
        self.shared_secret.is_some()
    }

    pub fn rate_limit(&self) -> Option<NonZeroU32> {
        self.rate_limit
    }

    pub fn outbound_capacity(&self) -> usize {
        self.outbound_capacity
    }

    /// Check an upgrade request target against the endpoint and secret.
    ///
    /// # Errors
    ///
    /// [`RelayError::Transport`] for a path other than the endpoint,
    /// [`RelayError::Unauthorized`] for a missing or wrong token.
    pub fn authorize(&self, path: &str, query: Option<&str>) -> Result<(), RelayError> {
        if path != self.ws_path {
            return Err(RelayError::Transport(format!("no endpoint at {path}")));
        }
        let Some(secret) = &self.shared_secret else {
            return Ok(());
        };
        let presented = query
            .unwrap_or_default()
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="));
        match presented {
            Some(token) if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) => Ok(()),
            Some(_) => Err(RelayError::Unauthorized("invalid token".to_string())),
            None => Err(RelayError::Unauthorized("missing token".to_string())),
        }
    }
}

impl fmt::Debug for RelaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySettings")
            .field("port", &self.port)
            .field("ws_path", &self.ws_path)
            .field(
                "shared_secret",
                if self.shared_secret.is_some() { &"<redacted>" } else { &"<not set>" },
            )
            .field("rate_limit", &self.rate_limit)
            .field("outbound_capacity", &self.outbound_capacity)
            .finish()
    }
}
