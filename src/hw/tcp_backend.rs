use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, trace};

use super::session::{DeviceSession, SessionConnector, SwitchProperties};
use super::{Endpoint, SwitchLayout};
use crate::error::SessionError;
use crate::protocol::{self, FRAME_LEN, LedTimeout, SwitchCommand, SwitchReply};
use crate::utils::format_hex;

/// Default limit for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default limit for one request/response exchange.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(3);

/// The switch may push status frames on its own; skip at most this many
/// before giving up on the reply.
const MAX_SKIPPED_FRAMES: usize = 4;

const DRAIN_BUFFER_LEN: usize = 64;
const MAX_DRAIN_READS: usize = 8;

/// Connects to switches over TCP.
#[derive(Debug, Clone, Builder)]
pub struct TcpConnector {
    #[builder(default)]
    layout: SwitchLayout,
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    connect_timeout: Duration,
    #[builder(default = DEFAULT_IO_TIMEOUT)]
    io_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[async_trait]
impl SessionConnector for TcpConnector {
    #[instrument(skip(self, endpoint), level = "debug", fields(%endpoint))]
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn DeviceSession>, SessionError> {
        let target = endpoint.socket_target();
        let stream = with_timeout(self.connect_timeout, TcpStream::connect(target)).await?;
        stream
            .set_nodelay(true)
            .map_err(|source| SessionError::from_io(source, self.connect_timeout))?;
        debug!("connected to switch");

        Ok(Box::new(TcpSession {
            stream,
            layout: self.layout,
            io_timeout: self.io_timeout,
        }))
    }
}

/// A TCP session speaking the TESmart frame protocol.
#[derive(Debug)]
struct TcpSession {
    stream: TcpStream,
    layout: SwitchLayout,
    io_timeout: Duration,
}

impl TcpSession {
    async fn send(&mut self, command: SwitchCommand) -> Result<(), SessionError> {
        let frame = command.encode();
        trace!(?command, frame = %format_hex(&frame), "sending frame");
        with_timeout(self.io_timeout, self.stream.write_all(&frame)).await
    }

    async fn receive(&mut self) -> Result<SwitchReply, SessionError> {
        let mut frame = [0u8; FRAME_LEN];
        with_timeout(self.io_timeout, self.stream.read_exact(&mut frame)).await?;
        protocol::decode_reply(&frame).map_err(|error| SessionError::MalformedResponse {
            payload: format!("{} ({error})", format_hex(&frame)),
        })
    }

    /// Discards bytes the switch sent since the last exchange. The switch
    /// answers commands such as input selection with a status frame, and a
    /// stale one must not be taken as the reply to the next query.
    #[instrument(skip(self), level = "trace")]
    fn drain_pending(&mut self) -> Result<(), SessionError> {
        let mut buffer = [0u8; DRAIN_BUFFER_LEN];
        let mut drained = 0usize;
        for _attempt in 0..MAX_DRAIN_READS {
            match self.stream.try_read(&mut buffer) {
                Ok(0) => return Err(SessionError::Closed),
                Ok(read) => drained += read,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(source) => return Err(SessionError::Io { source }),
            }
        }

        if drained > 0 {
            trace!(drained_bytes = drained, "drained stale bytes before query");
        }

        Ok(())
    }

    async fn query_active_input(&mut self) -> Result<u8, SessionError> {
        self.drain_pending()?;
        self.send(SwitchCommand::QueryActiveInput).await?;
        for _ in 0..=MAX_SKIPPED_FRAMES {
            match self.receive().await? {
                SwitchReply::ActiveInput(input) => return Ok(input),
                SwitchReply::Other { opcode, operand } => {
                    trace!(opcode, operand, "skipping unsolicited frame");
                }
            }
        }

        Err(SessionError::MalformedResponse {
            payload: format!("no active-input reply within {MAX_SKIPPED_FRAMES} frames"),
        })
    }
}

#[async_trait]
impl DeviceSession for TcpSession {
    #[instrument(skip(self), level = "debug")]
    async fn update(&mut self) -> Result<SwitchProperties, SessionError> {
        let active_input = self.query_active_input().await?;
        Ok(SwitchProperties::new(
            self.layout.inputs().max(active_input),
            self.layout.outputs(),
            active_input,
        ))
    }

    #[instrument(skip(self), level = "debug")]
    async fn select_source(&mut self, source: u8) -> Result<(), SessionError> {
        if source == 0 {
            return Err(SessionError::InvalidArgument {
                argument: "source",
                value: source.to_string(),
            });
        }
        self.send(SwitchCommand::SelectInput(source)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_buzzer_muting(&mut self, muted: bool) -> Result<(), SessionError> {
        self.send(SwitchCommand::SetBuzzerMuted(muted)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_led_timeout_seconds(&mut self, seconds: u32) -> Result<(), SessionError> {
        let led_timeout =
            LedTimeout::from_seconds(seconds).ok_or_else(|| SessionError::InvalidArgument {
                argument: "LED timeout",
                value: seconds.to_string(),
            })?;
        self.send(SwitchCommand::SetLedTimeout(led_timeout)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_auto_input_detection(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.send(SwitchCommand::SetAutoInputDetection(enabled))
            .await
    }
}

async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T, SessionError>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(SessionError::from_io(source, limit)),
        Err(_elapsed) => Err(SessionError::Timeout { timeout: limit }),
    }
}
