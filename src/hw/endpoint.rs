use std::fmt::{self, Display, Formatter};

use serde_with::SerializeDisplay;

/// TCP port TESmart switches listen on out of the box.
pub const DEFAULT_PORT: u16 = 5000;

/// Network location of one switch.
#[derive(Debug, Clone, Eq, PartialEq, Hash, SerializeDisplay)]
pub struct Endpoint {
    host: String,
    port: Option<u16>,
}

impl Endpoint {
    /// Creates an endpoint from a host name or address and an optional port.
    ///
    /// ```
    /// let endpoint = tesmart::Endpoint::new("192.168.1.10", None);
    /// assert_eq!("tcp://192.168.1.10", endpoint.to_string());
    /// ```
    #[must_use]
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the configured host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the configured port, if one was given.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the host and the port a connection should target.
    pub(crate) fn socket_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port.unwrap_or(DEFAULT_PORT))
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "tcp://{}:{port}", self.host),
            None => write!(f, "tcp://{}", self.host),
        }
    }
}
