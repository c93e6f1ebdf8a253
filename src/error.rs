use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::hw::Endpoint;
use crate::protocol::FrameCodecError;

/// Errors raised by a device session. These never leave [`crate::DeviceClient`]
/// except as the source of a [`ClientError`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out after {timeout:?} waiting for the device")]
    Timeout { timeout: Duration },
    #[error("connection refused by the device")]
    ConnectionRefused { source: io::Error },
    #[error("invalid {argument} `{value}`")]
    InvalidArgument {
        argument: &'static str,
        value: String,
    },
    #[error("the device closed the connection")]
    Closed,
    #[error("malformed device response: {payload}")]
    MalformedResponse { payload: String },
    #[error(transparent)]
    FrameCodec(#[from] FrameCodecError),
    #[error("device I/O failed")]
    Io { source: io::Error },
}

impl SessionError {
    /// Returns whether the failure indicates an unreachable device.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ConnectionRefused { .. })
    }

    /// Maps a transport error by kind, with `timeout` recorded for timeouts.
    pub(crate) fn from_io(source: io::Error, timeout: Duration) -> Self {
        match source.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout { timeout },
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused { source },
            io::ErrorKind::UnexpectedEof => Self::Closed,
            _ => Self::Io { source },
        }
    }
}

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum ClientErrorKind {
    /// The device timed out or refused the connection; retrying later is expected to help.
    #[display("connection")]
    Communication,
    /// Invalid input or an unexpected device condition.
    #[display("unknown")]
    Client,
}

/// Errors returned by [`crate::DeviceClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed connecting to device `{name}` at {endpoint}")]
    Communication {
        name: String,
        endpoint: Endpoint,
        source: SessionError,
    },
    #[error("unexpected error talking to device `{name}` at {endpoint}")]
    Device {
        name: String,
        endpoint: Endpoint,
        source: SessionError,
    },
    #[error("invalid source identifier `{value}`")]
    InvalidSource { value: String },
    #[error("invalid LED timeout setting `{seconds}`")]
    InvalidLedTimeout { seconds: u32, source: SessionError },
}

impl ClientError {
    /// Returns the surfaced error kind.
    ///
    /// ```
    /// use tesmart::{ClientError, ClientErrorKind};
    ///
    /// let error = ClientError::InvalidSource { value: "abc".into() };
    /// assert_eq!(ClientErrorKind::Client, error.kind());
    /// ```
    #[must_use]
    pub fn kind(&self) -> ClientErrorKind {
        match self {
            Self::Communication { .. } => ClientErrorKind::Communication,
            Self::Device { .. } | Self::InvalidSource { .. } | Self::InvalidLedTimeout { .. } => {
                ClientErrorKind::Client
            }
        }
    }
}

/// Errors returned when parsing fake device fixtures.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FixtureError {
    #[error("fault fixture `{value}` must look like `stage:kind`")]
    InvalidFaultRecord { value: String },
    #[error("unknown fault stage `{value}` (expected connect, update or command)")]
    UnknownFaultStage { value: String },
    #[error("unknown fault kind `{value}` (expected timeout, refused, malformed or closed)")]
    UnknownFaultKind { value: String },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("--host is required unless --fake is set")]
    MissingHost,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn io_error(kind: io::ErrorKind) -> io::Error {
        io::Error::new(kind, "test")
    }

    #[rstest]
    #[case::timed_out(io::ErrorKind::TimedOut, true)]
    #[case::refused(io::ErrorKind::ConnectionRefused, true)]
    #[case::reset(io::ErrorKind::ConnectionReset, false)]
    #[case::eof(io::ErrorKind::UnexpectedEof, false)]
    fn io_errors_classify_by_kind(#[case] kind: io::ErrorKind, #[case] transient: bool) {
        let error = SessionError::from_io(io_error(kind), Duration::from_secs(3));
        assert_eq!(transient, error.is_transient());
    }

    #[test]
    fn communication_errors_carry_device_and_endpoint() {
        let error = ClientError::Communication {
            name: "Rack".into(),
            endpoint: Endpoint::new("10.0.0.5", Some(5000)),
            source: SessionError::Timeout {
                timeout: Duration::from_secs(3),
            },
        };

        assert_eq!(ClientErrorKind::Communication, error.kind());
        assert_eq!(
            "failed connecting to device `Rack` at tcp://10.0.0.5:5000",
            error.to_string()
        );
    }

    #[test]
    fn invalid_led_timeout_is_client_kind() {
        let error = ClientError::InvalidLedTimeout {
            seconds: 20,
            source: SessionError::InvalidArgument {
                argument: "LED timeout",
                value: "20".into(),
            },
        };
        assert_eq!(ClientErrorKind::Client, error.kind());
    }
}
